use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use sdui_core::{Error, ImageRecord, RequestId};
use crate::generator::db::MetadataStore;

/// Cached, most-recent-first view of the store.
///
/// A background task re-lists the store after every append, so reads never
/// touch the database. Dropping the index stops the task.
pub struct HistoryIndex {
    records: watch::Receiver<Arc<Vec<ImageRecord>>>,
    task: JoinHandle<()>,
}

impl HistoryIndex {
    pub async fn spawn(store: Arc<dyn MetadataStore>) -> Result<Self, Error> {
        // Subscribe before the first listing so no append slips between them
        let mut changes = store.subscribe();
        changes.borrow_and_update();

        let initial = store.list().await?;
        debug!(records = initial.len(), "History loaded");
        let (tx, records) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                changes.borrow_and_update();

                match store.list().await {
                    Ok(list) => {
                        if tx.send(Arc::new(list)).is_err() {
                            break;
                        }
                    }
                    // Keep serving the last good snapshot
                    Err(err) => warn!("Refreshing history failed: {err}"),
                }
            }
        });

        Ok(Self { records, task })
    }

    /// Current snapshot, most recent first.
    pub fn records(&self) -> Arc<Vec<ImageRecord>> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn latest(&self) -> Option<ImageRecord> {
        self.records.borrow().first().cloned()
    }

    pub fn get(&self, id: RequestId) -> Option<ImageRecord> {
        self.records.borrow().iter().find(|record| record.id == id).cloned()
    }

    /// Receiver that fires with each new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<ImageRecord>>> {
        self.records.clone()
    }

    /// Waits until a snapshot satisfies `pred` and returns it.
    pub async fn wait_for(&self, mut pred: impl FnMut(&[ImageRecord]) -> bool) -> Arc<Vec<ImageRecord>> {
        let mut records = self.records.clone();
        match records.wait_for(|list| pred(list)).await {
            Ok(list) => list.clone(),
            // Sender only goes away with the task; serve what we have
            Err(_) => self.records(),
        }
    }
}

impl Drop for HistoryIndex {
    fn drop(&mut self) {
        self.task.abort();
    }
}
