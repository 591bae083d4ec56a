//! `log4rs` setup.
//!
//! With a log directory the root logger writes to a size-rolled
//! `bookstore_queries.log` and the audit target to a separate `audit.log`.
//! Without one, everything goes to stderr so stdout stays reserved for results.

use crate::config::AppConfig;
use crate::errors::DbError;
use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;
use std::sync::OnceLock;

/// Target for records of mutating operations.
pub const AUDIT_TARGET: &str = "bookstore_queries::audit";
pub const APP_LOG_FILE: &str = "bookstore_queries.log";
pub const AUDIT_LOG_FILE: &str = "audit.log";
pub const DEFAULT_RETENTION: u32 = 7;

const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

static HANDLE: OnceLock<Handle> = OnceLock::new();

/// Parses `error|warn|info|debug|trace|off`.
///
/// # Errors
/// Any other name.
pub fn parse_level(level: &str) -> Result<LevelFilter, DbError> {
    level.parse::<LevelFilter>().map_err(|_| DbError::Logger(format!("unknown log level '{level}'")))
}

fn rolling(dir: &Path, file: &str, stem: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let pattern = format!("{}", dir.join(format!("{stem}.{{}}.log")).display());
    let roller = FixedWindowRoller::builder()
        .build(&pattern, keep)
        .map_err(|e| DbError::Logger(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(file), Box::new(policy))
        .map_err(|e| DbError::Logger(e.to_string()))
}

/// Builds the logging configuration without installing it.
///
/// # Errors
/// Unknown level names, an uncreatable directory or appender failures.
pub fn build_config(dir: Option<&Path>, level: Option<&str>, retention: u32) -> Result<Config, DbError> {
    let builder = Config::builder();
    let config = match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let lvl = level.map(parse_level).transpose()?.unwrap_or(LevelFilter::Info);
            builder
                .appender(Appender::builder().build("app", Box::new(rolling(dir, APP_LOG_FILE, "bookstore_queries", retention)?)))
                .appender(Appender::builder().build("audit", Box::new(rolling(dir, AUDIT_LOG_FILE, "audit", retention)?)))
                .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, LevelFilter::Info))
                .build(Root::builder().appender("app").build(lvl))
        }
        None => {
            let lvl = level.map(parse_level).transpose()?.unwrap_or(LevelFilter::Warn);
            let stderr = ConsoleAppender::builder()
                .target(Target::Stderr)
                .encoder(Box::new(PatternEncoder::new("[{l}] {m}{n}")))
                .build();
            builder
                .appender(Appender::builder().build("stderr", Box::new(stderr)))
                .build(Root::builder().appender("stderr").build(lvl))
        }
    };
    config.map_err(|e| DbError::Logger(e.to_string()))
}

/// Installs (or replaces) the process logger.
///
/// # Errors
/// See [`build_config`]; also fails if another logger was installed outside this module.
pub fn configure(dir: Option<&Path>, level: Option<&str>, retention: u32) -> Result<(), DbError> {
    let config = build_config(dir, level, retention)?;
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config).map_err(|e| DbError::Logger(e.to_string()))?;
    let _ = HANDLE.set(handle);
    Ok(())
}

/// # Errors
/// See [`configure`].
pub fn init(cfg: &AppConfig) -> Result<(), DbError> {
    configure(cfg.log_dir.as_deref(), cfg.log_level.as_deref(), DEFAULT_RETENTION)
}
