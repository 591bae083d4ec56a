use bson::{Bson, Document, doc};
use bookstore_queries::seed::bundled_books;
use bookstore_queries::{
    BookStore, DbError, DeleteReport, FindOptions, MemoryStore, Outcome, OutputMode, QueryRunner, Reporter,
    UpdateReport, bookstore_steps, run_queries,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn seeded() -> MemoryStore {
    MemoryStore::with_documents("plp_bookstore", "books", bundled_books().unwrap()).unwrap()
}

/// Runs every step against `store` and collects the outcomes in order.
async fn outcomes(store: &MemoryStore) -> Vec<Outcome> {
    let mut out = Vec::new();
    for step in bookstore_steps() {
        out.push(step.request.dispatch(store).await.unwrap());
    }
    out
}

fn docs(o: &Outcome) -> &[Document] {
    o.documents().unwrap()
}

fn price(d: &Document) -> f64 {
    match d.get("price") {
        Some(Bson::Double(f)) => *f,
        Some(Bson::Int32(i)) => f64::from(*i),
        other => panic!("unexpected price {other:?}"),
    }
}

#[tokio::test]
async fn end_to_end_sequence_on_seeded_collection() {
    let store = seeded();
    let seed = store.snapshot();
    let out = outcomes(&store).await;
    assert_eq!(out.len(), 16);

    // 1 and 2: exact subsets, in natural order
    let sci_fi: Vec<&Document> = seed.iter().filter(|d| d.get_str("genre").unwrap() == "Science Fiction").collect();
    assert_eq!(docs(&out[0]).iter().collect::<Vec<_>>(), sci_fi);
    let recent: Vec<&Document> = seed.iter().filter(|d| d.get_i32("published_year").unwrap() > 2015).collect();
    assert_eq!(docs(&out[1]).iter().collect::<Vec<_>>(), recent);
    assert_eq!(docs(&out[2]).len(), 2);

    assert_eq!(out[3], Outcome::Updated(UpdateReport { matched: 1, modified: 1 }));
    assert_eq!(out[4], Outcome::Deleted(DeleteReport { deleted: 1 }));

    let after = store.snapshot();
    let hp = after.iter().find(|d| d.get_str("title").unwrap() == "Harry Potter").unwrap();
    assert_eq!(price(hp), 25.99);
    assert!(after.iter().all(|d| d.get_str("title").unwrap() != "Old Book"));
    // everything else untouched
    for d in &after {
        if d.get_str("title").unwrap() != "Harry Potter" {
            assert!(seed.contains(d));
        }
    }
    assert_eq!(after.len(), seed.len() - 1);

    // 6: in stock and after 2010
    for d in docs(&out[5]) {
        assert!(d.get_bool("in_stock").unwrap());
        assert!(d.get_i32("published_year").unwrap() > 2010);
    }

    // 7: projection allow-list without _id
    for d in docs(&out[6]) {
        assert!(d.get("_id").is_none());
        assert!(d.keys().all(|k| ["title", "author", "price"].contains(&k.as_str())));
    }

    // 8 and 9: same set, reversed order of prices
    let asc: Vec<f64> = docs(&out[7]).iter().map(price).collect();
    let mut desc: Vec<f64> = docs(&out[8]).iter().map(price).collect();
    assert!(asc.windows(2).all(|w| w[0] <= w[1]));
    desc.reverse();
    assert_eq!(asc, desc);

    // 10: prefix of the unpaginated result
    let all = store.find(doc! {}, FindOptions::default()).await.unwrap();
    assert_eq!(docs(&out[9]), &all[..5]);
}

#[tokio::test]
async fn aggregations_agree_with_the_data() {
    let store = seeded();
    let out = outcomes(&store).await;
    let data = store.snapshot();

    for g in docs(&out[10]) {
        let genre = g.get_str("_id").unwrap();
        let prices: Vec<f64> = data.iter().filter(|d| d.get_str("genre").unwrap() == genre).map(price).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        assert!((g.get_f64("avgPrice").unwrap() - mean).abs() < 1e-9);
    }

    let top = docs(&out[11]);
    assert_eq!(top.len(), 1);
    let top_count = top[0].get_i32("count").unwrap();
    let mut authors: Vec<&str> = data.iter().map(|d| d.get_str("author").unwrap()).collect();
    authors.sort_unstable();
    authors.dedup();
    for a in authors {
        let n = data.iter().filter(|d| d.get_str("author").unwrap() == a).count();
        assert!(usize::try_from(top_count).unwrap() >= n);
    }

    let decades = docs(&out[12]);
    let keys: Vec<f64> = decades.iter().map(|d| d.get_f64("_id").unwrap()).collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    let total: i32 = decades.iter().map(|d| d.get_i32("count").unwrap()).sum();
    assert_eq!(usize::try_from(total).unwrap(), data.len());
    for d in &data {
        let y = f64::from(d.get_i32("published_year").unwrap());
        assert!(keys.contains(&((y / 10.0).floor() * 10.0)));
    }

    assert_eq!(out[13], Outcome::IndexCreated("title_1".into()));
    assert_eq!(out[14], Outcome::IndexCreated("author_1_published_year_1".into()));
    let Outcome::Explained(plan) = &out[15] else { panic!("expected explain") };
    let stats = plan.get_document("executionStats").unwrap();
    assert_eq!(stats.get_i64("nReturned").unwrap(), 1);
}

#[tokio::test]
async fn second_run_keeps_indexes_and_results_stable() {
    let store = seeded();
    let first = outcomes(&store).await;
    let second = outcomes(&store).await;
    assert_eq!(first[13], second[13]);
    assert_eq!(first[14], second[14]);
    assert_eq!(second[3], Outcome::Updated(UpdateReport { matched: 1, modified: 0 }));
    assert_eq!(second[4], Outcome::Deleted(DeleteReport { deleted: 0 }));
    assert_eq!(store.indexes().len(), 3);
}

#[tokio::test]
async fn run_queries_reports_every_step_as_json() {
    let mut reporter = Reporter::new(Vec::new(), OutputMode::Json);
    let summary = run_queries(seeded(), &mut reporter).await.unwrap();
    assert_eq!(summary.steps_completed, 16);
    let text = String::from_utf8(reporter.into_inner()).unwrap();
    let records: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(records.len(), 16);
    assert_eq!(records[0]["step"], 1);
    assert_eq!(records[3]["result"]["modified"], 1);
    assert_eq!(records[13]["kind"], "index");
}

/// Delegates to a memory store, fails at one step number and records `close`.
struct FlakyStore {
    inner: MemoryStore,
    fail_at: usize,
    calls: AtomicUsize,
    fail_close: bool,
    closed: Arc<AtomicBool>,
}

impl FlakyStore {
    fn new(fail_at: usize, closed: Arc<AtomicBool>) -> Self {
        Self { inner: seeded(), fail_at, calls: AtomicUsize::new(0), fail_close: false, closed }
    }

    fn tick(&self) -> Result<(), DbError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at { Err(DbError::query("connection reset")) } else { Ok(()) }
    }
}

impl BookStore for FlakyStore {
    fn namespace(&self) -> String {
        self.inner.namespace()
    }
    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Document>, DbError> {
        self.tick()?;
        self.inner.find(filter, options).await
    }
    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateReport, DbError> {
        self.tick()?;
        self.inner.update_one(filter, update).await
    }
    async fn delete_one(&self, filter: Document) -> Result<DeleteReport, DbError> {
        self.tick()?;
        self.inner.delete_one(filter).await
    }
    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, DbError> {
        self.tick()?;
        self.inner.aggregate(pipeline).await
    }
    async fn create_index(&self, keys: Document) -> Result<String, DbError> {
        self.tick()?;
        self.inner.create_index(keys).await
    }
    async fn explain_find(&self, filter: Document) -> Result<Document, DbError> {
        self.tick()?;
        self.inner.explain_find(filter).await
    }
    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64, DbError> {
        self.inner.insert_many(docs).await
    }
    async fn drop_collection(&self) -> Result<(), DbError> {
        self.inner.drop_collection().await
    }
    async fn close(self) -> Result<(), DbError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close { Err(DbError::query("close failed")) } else { self.inner.close().await }
    }
}

#[tokio::test]
async fn failure_aborts_remaining_steps_and_still_closes() {
    let closed = Arc::new(AtomicBool::new(false));
    let store = FlakyStore::new(6, closed.clone());
    let mut reporter = Reporter::new(Vec::new(), OutputMode::Json);
    let err = run_queries(store, &mut reporter).await.unwrap_err();
    assert!(closed.load(Ordering::SeqCst));
    match &err {
        DbError::StepFailed { step, label, .. } => {
            assert_eq!(*step, 6);
            assert_eq!(label, "Books in stock and published after 2010");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(err.root(), DbError::Query(m) if m == "connection reset"));
    let text = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(text.lines().count(), 5);
}

#[tokio::test]
async fn step_error_wins_over_close_error() {
    let closed = Arc::new(AtomicBool::new(false));
    let mut store = FlakyStore::new(1, closed.clone());
    store.fail_close = true;
    let mut reporter = Reporter::new(Vec::new(), OutputMode::Human);
    let err = run_queries(store, &mut reporter).await.unwrap_err();
    assert!(closed.load(Ordering::SeqCst));
    assert!(matches!(err, DbError::StepFailed { step: 1, .. }));
}

#[tokio::test]
async fn close_error_surfaces_after_success() {
    let closed = Arc::new(AtomicBool::new(false));
    let mut store = FlakyStore::new(usize::MAX, closed.clone());
    store.fail_close = true;
    let mut reporter = Reporter::new(Vec::new(), OutputMode::Human);
    let err = QueryRunner::default().run_and_close(store, &mut reporter).await.unwrap_err();
    assert!(matches!(err, DbError::Query(m) if m == "close failed"));
}
