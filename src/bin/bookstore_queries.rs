use bookstore_queries::config::ConfigLayer;
use bookstore_queries::seed::{self, SeedFormat};
use bookstore_queries::{AppConfig, Backend, BookStore, DbError, MemoryStore, MongoStore, Reporter, logger, run_queries};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bookstore-queries", version, about = "Run the bookstore queries against a document store", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Overrides BOOKSTORE_CONFIG.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Connection string, e.g. mongodb://localhost:27017")]
    uri: Option<String>,
    #[arg(long = "db", help = "Database name")]
    database: Option<String>,
    #[arg(long, help = "Collection name")]
    collection: Option<String>,
    #[arg(long, help = "Store backend: mongo | memory")]
    backend: Option<String>,
    #[arg(long, help = "Output mode: human | json")]
    output: Option<String>,
    #[arg(long, help = "Seed file used by the memory backend and by `seed`")]
    seed_file: Option<PathBuf>,
    #[arg(long, help = "Server selection timeout in milliseconds")]
    timeout_ms: Option<u64>,
    #[arg(long, help = "Directory for rolling log files; logs go to stderr when omitted")]
    log_dir: Option<PathBuf>,
    #[arg(long, help = "Log level: error | warn | info | debug | trace")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the query sequence (default)")]
    Run,
    #[command(about = "Insert the seed dataset into the configured collection")]
    Seed {
        #[arg(long, help = "Seed file (json, ndjson or csv); the bundled dataset when omitted")]
        file: Option<PathBuf>,
        #[arg(long, default_value = "auto", help = "auto | json | ndjson | csv")]
        format: String,
        #[arg(long, help = "Drop the collection before inserting")]
        drop: bool,
    },
    #[command(about = "Print the effective configuration as TOML")]
    Config,
}

impl Cli {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            uri: self.uri.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            backend: self.backend.clone(),
            output: self.output.clone(),
            seed_file: self.seed_file.clone(),
            server_selection_timeout_ms: self.timeout_ms,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

async fn memory_store(cfg: &AppConfig) -> Result<MemoryStore, DbError> {
    let store = MemoryStore::new(&cfg.database, &cfg.collection);
    let docs = seed::load_or_bundled(cfg.seed_file.as_deref(), SeedFormat::Auto)?;
    seed::seed_store(&store, docs, false).await?;
    Ok(store)
}

async fn run(cfg: &AppConfig) -> Result<(), DbError> {
    let stdout = std::io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), cfg.output);
    let summary = match cfg.backend {
        Backend::Mongo => run_queries(MongoStore::from_config(cfg).await?, &mut reporter).await?,
        Backend::Memory => run_queries(memory_store(cfg).await?, &mut reporter).await?,
    };
    log::debug!("run summary: {summary:?}");
    Ok(())
}

async fn seed_into<S: BookStore>(store: S, file: Option<PathBuf>, format: SeedFormat, drop: bool) -> Result<u64, DbError> {
    let result = match seed::load_or_bundled(file.as_deref(), format) {
        Ok(docs) => seed::seed_store(&store, docs, drop).await,
        Err(e) => Err(e),
    };
    let closed = store.close().await;
    let n = result?;
    closed?;
    Ok(n)
}

async fn dispatch(cli: Cli, cfg: AppConfig) -> Result<(), DbError> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cfg).await,
        Commands::Seed { file, format, drop } => {
            let format: SeedFormat = format.parse()?;
            let file = file.or_else(|| cfg.seed_file.clone());
            cfg.require_persistent("seed")?;
            let n = seed_into(MongoStore::from_config(&cfg).await?, file, format, drop).await?;
            println!("inserted {n} documents into {}.{}", cfg.database, cfg.collection);
            Ok(())
        }
        Commands::Config => {
            print!("{}", cfg.to_toml()?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (cfg, warnings) = match AppConfig::load(cli.layer(), cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = logger::init(&cfg) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    for w in &warnings {
        log::warn!("{w}");
    }
    if let Err(e) = dispatch(cli, cfg).await {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
