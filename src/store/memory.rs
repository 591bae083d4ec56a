use crate::errors::DbError;
use crate::query::{
    CmpOp, Filter, IndexCatalog, IndexSpec, QueryPlan, apply_update, compare_bson,
    compare_docs, eval_filter, parse_filter, parse_pipeline, parse_projection, parse_sort,
    parse_update, project, run_pipeline,
};
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use parking_lot::RwLock;
use std::time::Instant;

use super::{BookStore, DeleteReport, FindOptions, UpdateReport};

/// In-process `BookStore`: a document list in insertion order plus an index
/// catalog. Requests are evaluated by the `query` module with server
/// semantics for the shapes the runner and the seed loader issue.
pub struct MemoryStore {
    database: String,
    collection: String,
    docs: RwLock<Vec<Document>>,
    indexes: RwLock<IndexCatalog>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(database: &str, collection: &str) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
            docs: RwLock::new(Vec::new()),
            indexes: RwLock::new(IndexCatalog::default()),
        }
    }

    /// # Errors
    /// Duplicate `_id` values in `docs`.
    pub fn with_documents(database: &str, collection: &str, docs: Vec<Document>) -> Result<Self, DbError> {
        let store = Self::new(database, collection);
        store.insert_now(docs)?;
        Ok(store)
    }

    /// Copy of every stored document, in natural order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    #[must_use]
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.indexes.read().list().to_vec()
    }

    fn insert_now(&self, docs: Vec<Document>) -> Result<u64, DbError> {
        let mut stored = self.docs.write();
        let mut inserted = 0u64;
        for mut d in docs {
            let id = match d.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    // _id leads the document, as on the server
                    let mut with_id = doc! {"_id": id.clone()};
                    with_id.extend(d);
                    d = with_id;
                    id
                }
            };
            if stored.iter().any(|s| s.get("_id").is_some_and(|x| compare_bson(x, &id).is_eq())) {
                return Err(DbError::query(format!(
                    "E11000 duplicate key error collection: {}.{} index: _id_ dup key: {{ _id: {id} }}",
                    self.database, self.collection
                )));
            }
            stored.push(d);
            inserted += 1;
        }
        Ok(inserted)
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl BookStore for MemoryStore {
    fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Document>, DbError> {
        let filter = parse_filter(&filter)?;
        let sort = options.sort.as_ref().map(parse_sort).transpose()?;
        let projection = options.projection.as_ref().map(parse_projection).transpose()?;
        let mut found: Vec<Document> =
            self.docs.read().iter().filter(|d| eval_filter(d, &filter)).cloned().collect();
        if let Some(spec) = sort.filter(|s| !s.is_empty()) {
            found.sort_by(|a, b| compare_docs(a, b, &spec));
        }
        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        // limit 0 means no limit; a negative limit uses its absolute value
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(n) => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
        };
        let out: Vec<Document> = found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| match &projection {
                Some(p) => project(&d, p),
                None => d,
            })
            .collect();
        log::debug!("find on {} returned {} documents", self.namespace(), out.len());
        Ok(out)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateReport, DbError> {
        let filter = parse_filter(&filter)?;
        let update = parse_update(&update)?;
        let mut docs = self.docs.write();
        let Some(pos) = docs.iter().position(|d| eval_filter(d, &filter)) else {
            return Ok(UpdateReport::default());
        };
        let mut next = docs[pos].clone();
        let changed = apply_update(&mut next, &update)?;
        if changed {
            docs[pos] = next;
        }
        Ok(UpdateReport { matched: 1, modified: u64::from(changed) })
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteReport, DbError> {
        let filter = parse_filter(&filter)?;
        let mut docs = self.docs.write();
        match docs.iter().position(|d| eval_filter(d, &filter)) {
            Some(pos) => {
                docs.remove(pos);
                Ok(DeleteReport { deleted: 1 })
            }
            None => Ok(DeleteReport { deleted: 0 }),
        }
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, DbError> {
        let stages = parse_pipeline(&pipeline)?;
        let docs = self.snapshot();
        run_pipeline(docs, &stages)
    }

    async fn create_index(&self, keys: Document) -> Result<String, DbError> {
        let name = self.indexes.write().create(&keys)?;
        log::debug!("index {name} ready on {}", self.namespace());
        Ok(name)
    }

    async fn explain_find(&self, filter: Document) -> Result<Document, DbError> {
        let parsed = parse_filter(&filter)?;
        let started = Instant::now();
        let plan = self.indexes.read().plan(&parsed);
        let docs = self.docs.read();
        let (winning_plan, keys_examined, docs_examined, returned) = match plan {
            QueryPlan::CollScan => {
                let n = docs.iter().filter(|d| eval_filter(d, &parsed)).count();
                let stage = doc! {"stage": "COLLSCAN", "filter": filter.clone(), "direction": "forward"};
                (stage, 0, docs.len(), n)
            }
            QueryPlan::IxScan { index, bounds } => {
                let key_match = Filter::And(
                    bounds
                        .iter()
                        .map(|(p, v)| Filter::Cmp { path: p.clone(), op: CmpOp::Eq, value: v.clone() })
                        .collect(),
                );
                let candidates: Vec<&Document> =
                    docs.iter().filter(|d| eval_filter(d, &key_match)).collect();
                let n = candidates.iter().filter(|d| eval_filter(d, &parsed)).count();
                let mut index_bounds = Document::new();
                for (field, _) in &index.keys {
                    let range = match bounds.iter().find(|(p, _)| p == field) {
                        Some((_, v)) => format!("[{v}, {v}]"),
                        None => "[MinKey, MaxKey]".to_string(),
                    };
                    index_bounds.insert(field.clone(), vec![Bson::String(range)]);
                }
                let stage = doc! {
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "keyPattern": index.key_document(),
                        "indexName": index.name.clone(),
                        "direction": "forward",
                        "indexBounds": index_bounds,
                    },
                };
                (stage, candidates.len(), candidates.len(), n)
            }
        };
        let millis = count(usize::try_from(started.elapsed().as_millis()).unwrap_or(usize::MAX));
        Ok(doc! {
            "explainVersion": "1",
            "queryPlanner": {
                "namespace": self.namespace(),
                "parsedQuery": filter,
                "winningPlan": winning_plan,
                "rejectedPlans": [],
            },
            "executionStats": {
                "executionSuccess": true,
                "nReturned": count(returned),
                "executionTimeMillis": millis,
                "totalKeysExamined": count(keys_examined),
                "totalDocsExamined": count(docs_examined),
            },
            "ok": 1.0,
        })
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64, DbError> {
        self.insert_now(docs)
    }

    async fn drop_collection(&self) -> Result<(), DbError> {
        self.docs.write().clear();
        *self.indexes.write() = IndexCatalog::default();
        Ok(())
    }

    async fn close(self) -> Result<(), DbError> {
        log::debug!("memory store {} released", self.namespace());
        Ok(())
    }
}
