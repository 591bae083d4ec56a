use crate::errors::DbError;
use crate::output::doc_to_json;
use crate::store::{BookStore, DeleteReport, FindOptions, UpdateReport};
use bson::{Document, doc};

/// A request description handed to the store unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Find { filter: Document, options: FindOptions },
    UpdateOne { filter: Document, update: Document },
    DeleteOne { filter: Document },
    Aggregate { pipeline: Vec<Document> },
    CreateIndex { keys: Document },
    /// Find plan with execution statistics.
    Explain { filter: Document },
}

impl Request {
    /// # Errors
    /// Whatever the store reports.
    pub async fn dispatch<S: BookStore>(&self, store: &S) -> Result<Outcome, DbError> {
        Ok(match self {
            Self::Find { filter, options } => Outcome::Documents(store.find(filter.clone(), options.clone()).await?),
            Self::UpdateOne { filter, update } => {
                Outcome::Updated(store.update_one(filter.clone(), update.clone()).await?)
            }
            Self::DeleteOne { filter } => Outcome::Deleted(store.delete_one(filter.clone()).await?),
            Self::Aggregate { pipeline } => Outcome::Documents(store.aggregate(pipeline.clone()).await?),
            Self::CreateIndex { keys } => Outcome::IndexCreated(store.create_index(keys.clone()).await?),
            Self::Explain { filter } => Outcome::Explained(store.explain_find(filter.clone()).await?),
        })
    }

    /// Update, delete and index creation change server state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::UpdateOne { .. } | Self::DeleteOne { .. } | Self::CreateIndex { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Documents(Vec<Document>),
    Updated(UpdateReport),
    Deleted(DeleteReport),
    IndexCreated(String),
    Explained(Document),
}

impl Outcome {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Documents(_) => "documents",
            Self::Updated(_) => "update",
            Self::Deleted(_) => "delete",
            Self::IndexCreated(_) => "index",
            Self::Explained(_) => "explain",
        }
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Documents(docs) => serde_json::Value::Array(docs.iter().map(doc_to_json).collect()),
            Self::Updated(r) => serde_json::json!({"matched": r.matched, "modified": r.modified}),
            Self::Deleted(r) => serde_json::json!({"deleted": r.deleted}),
            Self::IndexCreated(name) => serde_json::Value::String(name.clone()),
            Self::Explained(plan) => doc_to_json(plan),
        }
    }

    #[must_use]
    pub fn documents(&self) -> Option<&[Document]> {
        match self {
            Self::Documents(docs) => Some(docs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryStep {
    pub label: String,
    pub request: Request,
}

impl QueryStep {
    pub fn new(label: &str, request: Request) -> Self {
        Self { label: label.to_string(), request }
    }
}

fn find(filter: Document) -> Request {
    Request::Find { filter, options: FindOptions::default() }
}

/// The fixed bookstore sequence, in execution order.
#[must_use]
pub fn bookstore_steps() -> Vec<QueryStep> {
    vec![
        QueryStep::new("Science Fiction books", find(doc! {"genre": "Science Fiction"})),
        QueryStep::new("Books published after 2015", find(doc! {"published_year": {"$gt": 2015}})),
        QueryStep::new("Books by J.K. Rowling", find(doc! {"author": "J.K. Rowling"})),
        QueryStep::new(
            "Update result (Harry Potter price)",
            Request::UpdateOne { filter: doc! {"title": "Harry Potter"}, update: doc! {"$set": {"price": 25.99}} },
        ),
        QueryStep::new("Delete result (Old Book)", Request::DeleteOne { filter: doc! {"title": "Old Book"} }),
        QueryStep::new(
            "Books in stock and published after 2010",
            find(doc! {"in_stock": true, "published_year": {"$gt": 2010}}),
        ),
        QueryStep::new(
            "Projection (title, author, price only)",
            Request::Find {
                filter: doc! {},
                options: FindOptions::default().projection(doc! {"title": 1, "author": 1, "price": 1, "_id": 0}),
            },
        ),
        QueryStep::new(
            "Books sorted by price (ascending)",
            Request::Find { filter: doc! {}, options: FindOptions::default().sort(doc! {"price": 1}) },
        ),
        QueryStep::new(
            "Books sorted by price (descending)",
            Request::Find { filter: doc! {}, options: FindOptions::default().sort(doc! {"price": -1}) },
        ),
        QueryStep::new(
            "Pagination (page 1, 5 books)",
            Request::Find { filter: doc! {}, options: FindOptions::default().skip(0).limit(5) },
        ),
        QueryStep::new(
            "Average price of books by genre",
            Request::Aggregate { pipeline: vec![doc! {"$group": {"_id": "$genre", "avgPrice": {"$avg": "$price"}}}] },
        ),
        QueryStep::new(
            "Author with most books",
            Request::Aggregate {
                pipeline: vec![
                    doc! {"$group": {"_id": "$author", "count": {"$sum": 1}}},
                    doc! {"$sort": {"count": -1}},
                    doc! {"$limit": 1},
                ],
            },
        ),
        QueryStep::new(
            "Books grouped by publication decade",
            Request::Aggregate {
                pipeline: vec![
                    doc! {"$group": {
                        "_id": {"$multiply": [{"$floor": {"$divide": ["$published_year", 10]}}, 10]},
                        "count": {"$sum": 1},
                    }},
                    doc! {"$sort": {"_id": 1}},
                ],
            },
        ),
        QueryStep::new("Index created on title", Request::CreateIndex { keys: doc! {"title": 1} }),
        QueryStep::new(
            "Compound index created on author + published_year",
            Request::CreateIndex { keys: doc! {"author": 1, "published_year": 1} },
        ),
        QueryStep::new(
            "Explain query performance (find Harry Potter by title)",
            Request::Explain { filter: doc! {"title": "Harry Potter"} },
        ),
    ]
}
