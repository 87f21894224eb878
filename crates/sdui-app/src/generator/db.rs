pub mod record;

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem, SurrealKv};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use sdui_core::{Error, ImageRecord, RequestId};
use crate::error::AppError;
use crate::generator::db::record::StoredImage;

const IMAGES: &str = "images";
const NAMESPACE: &str = "sdui";
const DATABASE: &str = "history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    /// Most recent first, the order history is shown in.
    #[default]
    Descending,
}

/// Append-only store of finished generations.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Adds one record. Concurrent appends are serialized; an id that is
    /// already stored is rejected.
    async fn append(&self, record: &ImageRecord) -> Result<(), Error>;

    async fn list_ordered(&self, order: SortOrder) -> Result<Vec<ImageRecord>, Error>;

    async fn get(&self, id: RequestId) -> Result<Option<ImageRecord>, Error>;

    /// Revision counter bumped after every successful append.
    fn subscribe(&self) -> watch::Receiver<u64>;

    async fn list(&self) -> Result<Vec<ImageRecord>, Error> {
        self.list_ordered(SortOrder::Descending).await
    }
}

/// [`MetadataStore`] on embedded SurrealDB.
#[derive(Clone)]
pub struct ImageDatabase {
    db: Surreal<Db>,
    // Guards appends and holds the next sequence number
    writer: Arc<Mutex<i64>>,
    revision: Arc<watch::Sender<u64>>,
}

impl ImageDatabase {
    /// Opens (or creates) the file-backed database at `db_path`.
    pub async fn open(db_path: PathBuf) -> Result<Self, AppError> {
        info!("Setting up image history at {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Surreal::new::<SurrealKv>(db_path.to_string_lossy().into_owned()).await?;
        Self::setup(db).await
    }

    /// Non-durable store, for tests and previews.
    pub async fn in_memory() -> Result<Self, AppError> {
        let db = Surreal::new::<Mem>(()).await?;
        Self::setup(db).await
    }

    async fn setup(db: Surreal<Db>) -> Result<Self, AppError> {
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;

        let rows: Vec<StoredImage> = db.select(IMAGES).await?;
        let next_sequence = rows.iter().map(|row| row.sequence + 1).max().unwrap_or(0);
        debug!(records = rows.len(), "Image history opened");

        let (revision, _) = watch::channel(0);

        Ok(Self {
            db,
            writer: Arc::new(Mutex::new(next_sequence)),
            revision: Arc::new(revision),
        })
    }

    pub async fn count(&self) -> Result<usize, Error> {
        Ok(self.rows().await?.len())
    }

    async fn rows(&self) -> Result<Vec<StoredImage>, Error> {
        self.db
            .select(IMAGES)
            .await
            .map_err(|e| Error::persistence("reading image history", e))
    }
}

#[async_trait]
impl MetadataStore for ImageDatabase {
    async fn append(&self, record: &ImageRecord) -> Result<(), Error> {
        let mut next_sequence = self.writer.lock().await;
        let row = StoredImage::from_record(record, *next_sequence);

        let created: Option<StoredImage> = self
            .db
            .create((IMAGES, record.id.to_string()))
            .content(row)
            .await
            .map_err(|e| Error::persistence(&format!("appending record {}", record.id), e))?;

        if created.is_none() {
            return Err(Error::Persistence(format!("record {} was not stored", record.id)));
        }

        *next_sequence += 1;
        self.revision.send_modify(|revision| *revision += 1);

        debug!(request_id = %record.id, "Record appended");
        Ok(())
    }

    async fn list_ordered(&self, order: SortOrder) -> Result<Vec<ImageRecord>, Error> {
        let mut rows = self.rows().await?;

        rows.sort_by_key(|row| (row.timestamp_micros, row.sequence));
        if order == SortOrder::Descending {
            rows.reverse();
        }

        rows.into_iter().map(StoredImage::into_record).collect()
    }

    async fn get(&self, id: RequestId) -> Result<Option<ImageRecord>, Error> {
        let row: Option<StoredImage> = self
            .db
            .select((IMAGES, id.to_string()))
            .await
            .map_err(|e| Error::persistence(&format!("reading record {id}"), e))?;

        row.map(StoredImage::into_record).transpose()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn record(prompt: &str, timestamp: DateTime<Utc>) -> ImageRecord {
        let id = RequestId::new();
        ImageRecord {
            id,
            prompt: prompt.to_string(),
            negative_prompt: None,
            seed: "42".into(),
            steps: 10,
            guidance_scale: 7.5,
            artifact_path: PathBuf::from(format!("/pictures/{id}.jpeg")),
            timestamp,
            is_finished: true,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_is_most_recent_first() {
        let db = ImageDatabase::in_memory().await.unwrap();
        let r1 = record("first", t0());
        let r2 = record("second", t0() + Duration::seconds(1));
        let r3 = record("third", t0() + Duration::seconds(2));

        // Insertion order deliberately differs from time order
        db.append(&r2).await.unwrap();
        db.append(&r3).await.unwrap();
        db.append(&r1).await.unwrap();

        let prompts: Vec<String> = db.list().await.unwrap().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["third", "second", "first"]);

        let prompts: Vec<String> = db
            .list_ordered(SortOrder::Ascending)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.prompt)
            .collect();
        assert_eq!(prompts, vec!["first", "second", "third"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_equal_timestamps_keep_both_records() {
        let db = ImageDatabase::in_memory().await.unwrap();
        let a = record("a", t0());
        let b = record("b", t0());

        db.append(&a).await.unwrap();
        db.append(&b).await.unwrap();

        let listed = db.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        // Later append wins the tie
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_id_is_rejected() {
        let db = ImageDatabase::in_memory().await.unwrap();
        let r = record("once", t0());

        db.append(&r).await.unwrap();
        let err = db.append(&r).await.unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_round_trips_record() {
        let db = ImageDatabase::in_memory().await.unwrap();
        let r = record("lookup", t0());
        db.append(&r).await.unwrap();

        assert_eq!(db.get(r.id).await.unwrap(), Some(r));
        assert_eq!(db.get(RequestId::new()).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_appends_are_all_kept() {
        let db = ImageDatabase::in_memory().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move { db.append(&record(&format!("p{i}"), t0())).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(db.list().await.unwrap().len(), 8);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_append_bumps_revision() {
        let db = ImageDatabase::in_memory().await.unwrap();
        let mut changes = db.subscribe();
        assert_eq!(*changes.borrow_and_update(), 0);

        db.append(&record("x", t0())).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), 1);

        // A rejected append is not a change
        let dup = db.list().await.unwrap().remove(0);
        assert!(db.append(&dup).await.is_err());
        assert!(!changes.has_changed().unwrap());
    }
}
