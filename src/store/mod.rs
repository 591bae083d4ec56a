//! Storage seam between the runner and a document engine.

pub mod memory;
pub mod mongo;

use crate::errors::DbError;
use bson::Document;
use serde::{Deserialize, Serialize};

/// Options for `BookStore::find`, mirroring the server's find options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    #[must_use]
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: u64,
}

/// One collection of a document database.
///
/// Every request is a declarative BSON description handed to the engine
/// as-is. `close` consumes the store so a released connection cannot be used.
#[allow(async_fn_in_trait)]
pub trait BookStore {
    /// Namespace in `database.collection` form.
    fn namespace(&self) -> String;

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Document>, DbError>;

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateReport, DbError>;

    async fn delete_one(&self, filter: Document) -> Result<DeleteReport, DbError>;

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, DbError>;

    /// Returns the index name.
    async fn create_index(&self, keys: Document) -> Result<String, DbError>;

    /// Execution-stats explain of a find with `filter`.
    async fn explain_find(&self, filter: Document) -> Result<Document, DbError>;

    /// Returns the number of inserted documents.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64, DbError>;

    async fn drop_collection(&self) -> Result<(), DbError>;

    async fn close(self) -> Result<(), DbError>;
}
