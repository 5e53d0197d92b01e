// Mirror of on-chain request state plus per-feed ingestion checkpoints
pub mod memory;
pub mod mirror;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::chain::models::ChainId;
use crate::error::AppResult;
use models::{FeedKey, RecordKey, RecordPatch, RequestRecord, RequestStatus};

pub use memory::{MemoryCheckpointStore, MemoryMirrorBackend};
pub use mirror::{MirrorStore, MAX_BATCH_WRITE};
pub use postgres::{PgCheckpointStore, PgMirrorBackend};

/// Per-feed "next block to scan" cursor.
///
/// One writer per feed; there is no compare-and-swap.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns 0 when the feed has never been checkpointed
    async fn get_checkpoint(&self, feed: FeedKey) -> AppResult<u64>;

    async fn set_checkpoint(&self, feed: FeedKey, block_height: u64) -> AppResult<()>;
}

/// Raw table operations behind [`MirrorStore`]
#[async_trait]
pub trait MirrorBackend: Send + Sync {
    /// Upsert one chunk; callers keep chunks within the batch write limit
    async fn batch_write(&self, records: &[RequestRecord]) -> AppResult<()>;

    /// Index scan over `chain_id`, optionally narrowed to one status
    async fn query(
        &self,
        chain_id: ChainId,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<RequestRecord>>;

    async fn get(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>>;

    /// Applies a non-empty patch, returning the updated record if it exists
    async fn update(&self, key: &RecordKey, patch: &RecordPatch)
        -> AppResult<Option<RequestRecord>>;

    /// Deletes and returns the prior record if it existed
    async fn delete(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>>;
}
