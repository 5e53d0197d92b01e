use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::models::{RecordKey, RecordPatch, RequestRecord, RequestStatus};
use super::MirrorBackend;
use crate::chain::models::{ChainId, QuestionId};
use crate::error::{AppResult, StoreError};

/// Hard per-request item cap of the batch write API
pub const MAX_BATCH_WRITE: usize = 25;

/// Mirror record store: projection-only writes, chunked batch upserts and
/// index scans over `(chain_id, status)`.
pub struct MirrorStore {
    backend: Arc<dyn MirrorBackend>,
    batch_limit: usize,
}

impl MirrorStore {
    pub fn new(backend: Arc<dyn MirrorBackend>) -> Self {
        Self {
            backend,
            batch_limit: MAX_BATCH_WRITE,
        }
    }

    /// Lower the chunk size; values above the hard cap are clamped
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.clamp(1, MAX_BATCH_WRITE);
        self
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Upsert `records`, one concurrent backend batch per chunk.
    ///
    /// Duplicate keys collapse to the last occurrence. A failing chunk fails the
    /// whole call; chunks that already landed stay written.
    pub async fn put<R>(&self, records: impl IntoIterator<Item = R>) -> AppResult<usize>
    where
        R: Into<RequestRecord>,
    {
        let records = dedupe(records.into_iter().map(Into::into));
        if records.is_empty() {
            return Ok(0);
        }

        let chunks: Vec<&[RequestRecord]> = records.chunks(self.batch_limit).collect();
        debug!(
            records = records.len(),
            chunks = chunks.len(),
            "writing mirror batch"
        );

        try_join_all(
            chunks
                .into_iter()
                .map(|chunk| self.backend.batch_write(chunk)),
        )
        .await?;

        Ok(records.len())
    }

    pub async fn query_by_chain_and_status(
        &self,
        chain_id: ChainId,
        status: RequestStatus,
    ) -> AppResult<Vec<RequestRecord>> {
        self.backend.query(chain_id, Some(status)).await
    }

    pub async fn query_by_chain(&self, chain_id: ChainId) -> AppResult<Vec<RequestRecord>> {
        self.backend.query(chain_id, None).await
    }

    /// Apply `patch` and return the full updated record
    pub async fn update(
        &self,
        question_id: &QuestionId,
        chain_id: ChainId,
        patch: RecordPatch,
    ) -> AppResult<RequestRecord> {
        let key = RecordKey {
            question_id: question_id.clone(),
            chain_id,
        };

        let updated = if patch.is_empty() {
            self.backend.get(&key).await?
        } else {
            self.backend.update(&key, &patch).await?
        };

        updated.ok_or_else(|| not_found(key))
    }

    /// Delete and return the record as it was just before removal
    pub async fn remove(
        &self,
        question_id: &QuestionId,
        chain_id: ChainId,
    ) -> AppResult<RequestRecord> {
        let key = RecordKey {
            question_id: question_id.clone(),
            chain_id,
        };

        self.backend
            .delete(&key)
            .await?
            .ok_or_else(|| not_found(key))
    }
}

fn not_found(key: RecordKey) -> crate::error::AppError {
    StoreError::NotFound {
        question_id: key.question_id,
        chain_id: key.chain_id,
    }
    .into()
}

fn dedupe(records: impl Iterator<Item = RequestRecord>) -> Vec<RequestRecord> {
    let mut positions: HashMap<RecordKey, usize> = HashMap::new();
    let mut unique: Vec<RequestRecord> = Vec::new();

    for record in records {
        match positions.get(&record.key()) {
            Some(&index) => unique[index] = record,
            None => {
                positions.insert(record.key(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}
