//! Loading the `books` dataset into a store.

mod csv;
mod detect;
mod json;

pub use csv::{field_to_bson, parse_csv};
pub use detect::detect_format;
pub use json::{parse_json, parse_ndjson};

use crate::errors::DbError;
use crate::store::BookStore;
use bson::Document;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const BUNDLED_BOOKS: &str = include_str!("../../fixtures/books.json");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeedFormat {
    #[default]
    Auto,
    Json,
    Ndjson,
    Csv,
}

impl FromStr for SeedFormat {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "json" => Ok(Self::Json),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "csv" => Ok(Self::Csv),
            other => Err(DbError::Seed(format!("unknown seed format '{other}'"))),
        }
    }
}

impl fmt::Display for SeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Json => "json",
            Self::Ndjson => "ndjson",
            Self::Csv => "csv",
        })
    }
}

/// The dataset shipped with the binary.
///
/// # Errors
/// Only if the embedded fixture is malformed.
pub fn bundled_books() -> Result<Vec<Document>, DbError> {
    parse_json(BUNDLED_BOOKS)
}

/// # Errors
/// Parse failures of the chosen (or detected) format.
pub fn parse_seed(text: &str, format: SeedFormat) -> Result<Vec<Document>, DbError> {
    parse_as(text, format, None)
}

fn parse_as(text: &str, format: SeedFormat, path: Option<&Path>) -> Result<Vec<Document>, DbError> {
    let format = match format {
        SeedFormat::Auto => detect_format(path, text),
        f => f,
    };
    match format {
        SeedFormat::Json | SeedFormat::Auto => parse_json(text),
        SeedFormat::Ndjson => parse_ndjson(text),
        SeedFormat::Csv => parse_csv(text),
    }
}

/// # Errors
/// An unreadable file or a parse failure.
pub fn load_seed_file(path: &Path, format: SeedFormat) -> Result<Vec<Document>, DbError> {
    let text = std::fs::read_to_string(path)?;
    let docs = parse_as(&text, format, Some(path))?;
    log::info!("read {} seed documents from {}", docs.len(), path.display());
    Ok(docs)
}

/// The configured seed file, else the bundled dataset.
///
/// # Errors
/// See [`load_seed_file`].
pub fn load_or_bundled(path: Option<&Path>, format: SeedFormat) -> Result<Vec<Document>, DbError> {
    match path {
        Some(p) => load_seed_file(p, format),
        None => bundled_books(),
    }
}

/// Inserts `docs`, optionally dropping the collection first. Returns the inserted count.
///
/// # Errors
/// Store failures.
pub async fn seed_store<S: BookStore>(store: &S, docs: Vec<Document>, drop_first: bool) -> Result<u64, DbError> {
    if drop_first {
        store.drop_collection().await?;
        log::info!(target: crate::logger::AUDIT_TARGET, "dropped {}", store.namespace());
    }
    let n = store.insert_many(docs).await?;
    log::info!(target: crate::logger::AUDIT_TARGET, "seeded {n} documents into {}", store.namespace());
    Ok(n)
}
