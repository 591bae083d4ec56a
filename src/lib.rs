//! Bookstore query runner.
//!
//! Connects to a document store, runs a fixed sequence of CRUD, filtering,
//! sorting/pagination, aggregation and index-management requests against the
//! `books` collection, and reports every result.

pub mod config;
pub mod errors;
pub mod logger;
pub mod output;
pub mod query;
pub mod runner;
pub mod seed;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, Backend};
pub use errors::DbError;
pub use output::{OutputMode, Reporter};
pub use runner::{QueryRunner, QueryStep, Request, Outcome, RunSummary, bookstore_steps, run_queries};
pub use store::{BookStore, DeleteReport, FindOptions, UpdateReport};
pub use store::memory::MemoryStore;
pub use store::mongo::MongoStore;

/// Default server endpoint.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
/// Default database name.
pub const DEFAULT_DATABASE: &str = "plp_bookstore";
/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "books";
