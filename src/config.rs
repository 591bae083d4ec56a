//! Layered configuration.
//!
//! Precedence: CLI flags > environment > TOML file > defaults. Each source is
//! read into a [`ConfigLayer`] of optional values; layers are merged so that
//! the first one to set a field wins, then [`AppConfig::from_layer`] applies
//! defaults and validates names.

use crate::errors::DbError;
use crate::output::OutputMode;
use crate::{DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_URI};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE_NAME: &str = "bookstore_queries.toml";

pub const ENV_CONFIG: &str = "BOOKSTORE_CONFIG";
pub const ENV_URI: &str = "BOOKSTORE_URI";
pub const ENV_DB: &str = "BOOKSTORE_DB";
pub const ENV_COLLECTION: &str = "BOOKSTORE_COLLECTION";
pub const ENV_BACKEND: &str = "BOOKSTORE_BACKEND";
pub const ENV_OUTPUT: &str = "BOOKSTORE_OUTPUT";
pub const ENV_SEED: &str = "BOOKSTORE_SEED";
pub const ENV_TIMEOUT_MS: &str = "BOOKSTORE_TIMEOUT_MS";
pub const ENV_LOG_DIR: &str = "BOOKSTORE_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "BOOKSTORE_LOG_LEVEL";

/// Which `BookStore` implementation the binary drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Mongo,
    /// In-process store seeded from the bundled or configured dataset.
    Memory,
}

impl FromStr for Backend {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(DbError::Config(format!("unknown backend '{other}' (expected mongo or memory)"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mongo => "mongo",
            Self::Memory => "memory",
        })
    }
}

/// Effective settings after all layers are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub backend: Backend,
    pub output: OutputMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            backend: Backend::default(),
            output: OutputMode::default(),
            seed_file: None,
            server_selection_timeout_ms: None,
            log_dir: None,
            log_level: None,
        }
    }
}

/// One configuration source. Field names double as the TOML keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub backend: Option<String>,
    pub output: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub server_selection_timeout_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Reads `BOOKSTORE_*` variables through `env`. Empty values count as unset.
    ///
    /// # Errors
    /// A non-numeric `BOOKSTORE_TIMEOUT_MS`.
    pub fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let var = |k: &str| env(k).filter(|v| !v.trim().is_empty());
        let timeout = match var(ENV_TIMEOUT_MS) {
            Some(v) => Some(v.trim().parse::<u64>().map_err(|_| {
                DbError::Config(format!("{ENV_TIMEOUT_MS} must be a non-negative integer, got '{v}'"))
            })?),
            None => None,
        };
        Ok(Self {
            uri: var(ENV_URI),
            database: var(ENV_DB),
            collection: var(ENV_COLLECTION),
            backend: var(ENV_BACKEND),
            output: var(ENV_OUTPUT),
            seed_file: var(ENV_SEED).map(PathBuf::from),
            server_selection_timeout_ms: timeout,
            log_dir: var(ENV_LOG_DIR).map(PathBuf::from),
            log_level: var(ENV_LOG_LEVEL),
        })
    }

    /// # Errors
    /// Malformed TOML or unknown keys.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        toml::from_str(s).map_err(|e| DbError::Config(format!("invalid config: {e}")))
    }

    /// # Errors
    /// Unreadable file, malformed TOML or unknown keys.
    pub fn read(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| DbError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Fills every unset field from `lower`.
    pub fn fill_from(&mut self, lower: Self) {
        fn fill<T>(slot: &mut Option<T>, v: Option<T>) {
            if slot.is_none() {
                *slot = v;
            }
        }
        fill(&mut self.uri, lower.uri);
        fill(&mut self.database, lower.database);
        fill(&mut self.collection, lower.collection);
        fill(&mut self.backend, lower.backend);
        fill(&mut self.output, lower.output);
        fill(&mut self.seed_file, lower.seed_file);
        fill(&mut self.server_selection_timeout_ms, lower.server_selection_timeout_ms);
        fill(&mut self.log_dir, lower.log_dir);
        fill(&mut self.log_level, lower.log_level);
    }
}

impl AppConfig {
    /// Applies defaults to a merged layer.
    ///
    /// # Errors
    /// Unknown backend, output mode or log level names.
    pub fn from_layer(layer: ConfigLayer) -> Result<Self, DbError> {
        let defaults = Self::default();
        let backend = layer.backend.as_deref().map(str::parse::<Backend>).transpose()?.unwrap_or(defaults.backend);
        let output = layer.output.as_deref().map(str::parse::<OutputMode>).transpose()?.unwrap_or(defaults.output);
        if let Some(level) = &layer.log_level {
            level
                .parse::<log::LevelFilter>()
                .map_err(|_| DbError::Config(format!("unknown log level '{level}'")))?;
        }
        Ok(Self {
            uri: layer.uri.unwrap_or(defaults.uri),
            database: layer.database.unwrap_or(defaults.database),
            collection: layer.collection.unwrap_or(defaults.collection),
            backend,
            output,
            seed_file: layer.seed_file,
            server_selection_timeout_ms: layer.server_selection_timeout_ms,
            log_dir: layer.log_dir,
            log_level: layer.log_level,
        })
    }

    /// Loads from the process environment and the default search paths.
    /// Skipped config files come back as warnings, since this runs before
    /// the logger exists.
    ///
    /// # Errors
    /// See [`AppConfig::load_with`].
    pub fn load(cli: ConfigLayer, explicit: Option<&Path>) -> Result<(Self, Vec<String>), DbError> {
        Self::load_with_warnings(cli, explicit, &default_search_paths(), |k| std::env::var(k).ok())
    }

    /// Merges `cli`, the environment, the explicit file (`explicit`, else
    /// `BOOKSTORE_CONFIG`) and every existing file in `search`, in that order.
    /// Skipped files are logged at warn level.
    ///
    /// # Errors
    /// An explicit file that cannot be read or parsed, a malformed environment
    /// value, or invalid names in the merged result. Discovered files that fail
    /// to parse are skipped.
    pub fn load_with<F>(cli: ConfigLayer, explicit: Option<&Path>, search: &[PathBuf], env: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (cfg, warnings) = Self::load_with_warnings(cli, explicit, search, env)?;
        for w in &warnings {
            log::warn!("{w}");
        }
        Ok(cfg)
    }

    /// Like [`AppConfig::load_with`], returning one message per skipped file
    /// instead of logging it.
    ///
    /// # Errors
    /// See [`AppConfig::load_with`].
    pub fn load_with_warnings<F>(
        cli: ConfigLayer,
        explicit: Option<&Path>,
        search: &[PathBuf],
        env: F,
    ) -> Result<(Self, Vec<String>), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = cli;
        let mut warnings = Vec::new();
        merged.fill_from(ConfigLayer::from_env(&env)?);
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG).filter(|v| !v.trim().is_empty()).map(PathBuf::from));
        if let Some(path) = &explicit {
            merged.fill_from(ConfigLayer::read(path)?);
        }
        for path in search {
            if explicit.as_ref() == Some(path) || !path.is_file() {
                continue;
            }
            match ConfigLayer::read(path) {
                Ok(layer) => merged.fill_from(layer),
                Err(e) => warnings.push(format!("skipping config file: {e}")),
            }
        }
        Ok((Self::from_layer(merged)?, warnings))
    }

    /// Rejects `action` when the backend is the in-process store, whose
    /// contents are gone once the command exits.
    ///
    /// # Errors
    /// `DbError::Config` for [`Backend::Memory`].
    pub fn require_persistent(&self, action: &str) -> Result<(), DbError> {
        match self.backend {
            Backend::Mongo => Ok(()),
            Backend::Memory => Err(DbError::Config(format!(
                "{action} needs a persistent backend; the memory backend is discarded on exit (use --backend mongo)"
            ))),
        }
    }

    /// Effective configuration rendered as TOML.
    ///
    /// # Errors
    /// Serialization failures.
    pub fn to_toml(&self) -> Result<String, DbError> {
        toml::to_string_pretty(self).map_err(|e| DbError::Config(format!("cannot render config: {e}")))
    }
}

/// `<config dir>/bookstore_queries.toml` then `./bookstore_queries.toml`.
#[must_use]
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    paths
}
