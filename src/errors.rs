use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MongoDB: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Seed error: {0}")]
    Seed(String),

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("operation failed at step {step} ({label}): {source}")]
    StepFailed {
        step: usize,
        label: String,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    /// Shorthand for a malformed request description.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Unwraps step context down to the originating error.
    #[must_use]
    pub fn root(&self) -> &DbError {
        match self {
            Self::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
