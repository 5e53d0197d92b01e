use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::models::{FeedKey, RecordKey, RecordPatch, RequestRecord, RequestStatus};
use super::{CheckpointStore, MirrorBackend, MAX_BATCH_WRITE};
use crate::chain::models::ChainId;
use crate::error::{AppResult, StoreError};

/// In-memory mirror table for local runs and tests.
/// Records every batch size it receives so callers can inspect chunking.
#[derive(Debug, Default)]
pub struct MemoryMirrorBackend {
    rows: RwLock<HashMap<RecordKey, RequestRecord>>,
    batches: Mutex<Vec<usize>>,
    fail_writes: AtomicBool,
}

impl MemoryMirrorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_calls(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Snapshot of every stored record
    pub fn records(&self) -> Vec<RequestRecord> {
        self.rows.read().values().cloned().collect()
    }

    /// Make subsequent batch writes fail (outage simulation)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MirrorBackend for MemoryMirrorBackend {
    async fn batch_write(&self, records: &[RequestRecord]) -> AppResult<()> {
        if records.len() > MAX_BATCH_WRITE {
            return Err(StoreError::BatchTooLarge {
                size: records.len(),
                limit: MAX_BATCH_WRITE,
            }
            .into());
        }

        self.batches.lock().push(records.len());

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("batch write rejected".to_string()).into());
        }

        let mut rows = self.rows.write();
        for record in records {
            rows.insert(record.key(), record.clone());
        }
        debug!(count = records.len(), "💾 Stored mirror batch");
        Ok(())
    }

    async fn query(
        &self,
        chain_id: ChainId,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<RequestRecord>> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|r| r.chain_id == chain_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn update(
        &self,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> AppResult<Option<RequestRecord>> {
        let mut rows = self.rows.write();
        Ok(rows.get_mut(key).map(|record| {
            patch.apply_to(record);
            record.clone()
        }))
    }

    async fn delete(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>> {
        Ok(self.rows.write().remove(key))
    }
}

/// In-memory checkpoint table. Keeps the full write history per feed.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    heights: RwLock<HashMap<FeedKey, u64>>,
    history: Mutex<Vec<(FeedKey, u64)>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value written for `feed`, oldest first
    pub fn history(&self, feed: FeedKey) -> Vec<u64> {
        self.history
            .lock()
            .iter()
            .filter(|(key, _)| *key == feed)
            .map(|(_, height)| *height)
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_checkpoint(&self, feed: FeedKey) -> AppResult<u64> {
        Ok(self.heights.read().get(&feed).copied().unwrap_or(0))
    }

    async fn set_checkpoint(&self, feed: FeedKey, block_height: u64) -> AppResult<()> {
        self.heights.write().insert(feed, block_height);
        self.history.lock().push((feed, block_height));
        Ok(())
    }
}
