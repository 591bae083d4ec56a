use crate::config::AppConfig;
use crate::errors::DbError;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;

use super::{BookStore, DeleteReport, FindOptions, UpdateReport};

const APP_NAME: &str = "bookstore-queries";

/// `BookStore` backed by a MongoDB server through the official driver.
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connects and pings the server so that an unreachable endpoint fails here.
    ///
    /// # Errors
    /// URI parse failures, client construction errors and a failed ping.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        server_selection_timeout: Option<Duration>,
    ) -> Result<Self, DbError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(APP_NAME.to_string());
        if let Some(t) = server_selection_timeout {
            options.server_selection_timeout = Some(t);
        }
        let client = Client::with_options(options)?;
        client.database("admin").run_command(doc! {"ping": 1}).await?;
        log::info!("connected to {uri}; using {database}.{collection}");
        let database = client.database(database);
        let collection = database.collection::<Document>(collection);
        Ok(Self { client, database, collection })
    }

    /// # Errors
    /// See [`MongoStore::connect`].
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, DbError> {
        Self::connect(
            &cfg.uri,
            &cfg.database,
            &cfg.collection,
            cfg.server_selection_timeout_ms.map(Duration::from_millis),
        )
        .await
    }
}

impl BookStore for MongoStore {
    fn namespace(&self) -> String {
        format!("{}.{}", self.database.name(), self.collection.name())
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Document>, DbError> {
        let mut find = self.collection.find(filter);
        if let Some(p) = options.projection {
            find = find.projection(p);
        }
        if let Some(s) = options.sort {
            find = find.sort(s);
        }
        if let Some(n) = options.skip {
            find = find.skip(n);
        }
        if let Some(n) = options.limit {
            find = find.limit(n);
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateReport, DbError> {
        let r = self.collection.update_one(filter, update).await?;
        Ok(UpdateReport { matched: r.matched_count, modified: r.modified_count })
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteReport, DbError> {
        let r = self.collection.delete_one(filter).await?;
        Ok(DeleteReport { deleted: r.deleted_count })
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, DbError> {
        let cursor = self.collection.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn create_index(&self, keys: Document) -> Result<String, DbError> {
        let model = IndexModel::builder().keys(keys).build();
        let r = self.collection.create_index(model).await?;
        Ok(r.index_name)
    }

    async fn explain_find(&self, filter: Document) -> Result<Document, DbError> {
        let cmd = doc! {
            "explain": { "find": self.collection.name(), "filter": filter },
            "verbosity": "executionStats",
        };
        Ok(self.database.run_command(cmd).await?)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64, DbError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let r = self.collection.insert_many(docs).await?;
        Ok(u64::try_from(r.inserted_ids.len()).unwrap_or(u64::MAX))
    }

    async fn drop_collection(&self) -> Result<(), DbError> {
        self.collection.drop().await?;
        Ok(())
    }

    async fn close(self) -> Result<(), DbError> {
        self.client.shutdown().await;
        log::info!("connection closed");
        Ok(())
    }
}
