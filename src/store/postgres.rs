use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::models::{FeedKey, MirrorRow, RecordKey, RecordPatch, RequestRecord, RequestStatus};
use super::{CheckpointStore, MirrorBackend, MAX_BATCH_WRITE};
use crate::chain::models::ChainId;
use crate::error::{AppError, AppResult, StoreError};

const RETURNING_COLUMNS: &str =
    " RETURNING question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer";

fn chain_id_param(chain_id: ChainId) -> AppResult<i64> {
    i64::try_from(chain_id.0).map_err(|_| {
        StoreError::Corrupt {
            field: "chain_id",
            value: chain_id.to_string(),
        }
        .into()
    })
}

fn into_records(rows: Vec<MirrorRow>) -> AppResult<Vec<RequestRecord>> {
    rows.into_iter().map(RequestRecord::try_from).collect()
}

/// Multi-row upsert keyed on `(question_id, chain_id)`
fn upsert_query(records: &[RequestRecord]) -> AppResult<QueryBuilder<'_, Postgres>> {
    let chain_ids = records
        .iter()
        .map(|r| chain_id_param(r.chain_id))
        .collect::<AppResult<Vec<_>>>()?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO requests (question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer) ",
    );
    builder.push_values(records.iter().zip(chain_ids), |mut row, (record, chain_id)| {
        row.push_bind(record.question_id.to_string())
            .push_bind(chain_id)
            .push_bind(record.status)
            .push_bind(record.requester_answer.as_ref().map(|a| a.0.clone()))
            .push_bind(record.arbitrator_answer.as_ref().map(|a| a.0.clone()))
            .push_bind(record.latest_answer.as_ref().map(|a| a.0.clone()));
    });
    builder.push(
        " ON CONFLICT (question_id, chain_id) DO UPDATE SET \
         status = EXCLUDED.status, \
         requester_answer = EXCLUDED.requester_answer, \
         arbitrator_answer = EXCLUDED.arbitrator_answer, \
         latest_answer = EXCLUDED.latest_answer, \
         updated_at = NOW()",
    );
    Ok(builder)
}

/// `UPDATE ... SET` over the fields present in `patch`
fn update_query<'a>(
    key: &RecordKey,
    patch: &RecordPatch,
) -> AppResult<QueryBuilder<'a, Postgres>> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE requests SET ");
    {
        let mut set = builder.separated(", ");
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status);
        }
        if let Some(answer) = &patch.requester_answer {
            set.push("requester_answer = ")
                .push_bind_unseparated(answer.0.clone());
        }
        if let Some(answer) = &patch.arbitrator_answer {
            set.push("arbitrator_answer = ")
                .push_bind_unseparated(answer.0.clone());
        }
        if let Some(answer) = &patch.latest_answer {
            set.push("latest_answer = ")
                .push_bind_unseparated(answer.0.clone());
        }
        set.push("updated_at = NOW()");
    }
    builder
        .push(" WHERE question_id = ")
        .push_bind(key.question_id.to_string())
        .push(" AND chain_id = ")
        .push_bind(chain_id_param(key.chain_id)?)
        .push(RETURNING_COLUMNS);
    Ok(builder)
}

/// Mirror table in PostgreSQL (`requests`, indexed on `(chain_id, status)`)
pub struct PgMirrorBackend {
    pool: PgPool,
}

impl PgMirrorBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MirrorBackend for PgMirrorBackend {
    async fn batch_write(&self, records: &[RequestRecord]) -> AppResult<()> {
        if records.len() > MAX_BATCH_WRITE {
            return Err(StoreError::BatchTooLarge {
                size: records.len(),
                limit: MAX_BATCH_WRITE,
            }
            .into());
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut builder = upsert_query(records)?;
        builder.build().execute(&self.pool).await?;
        debug!(count = records.len(), "upserted mirror batch");
        Ok(())
    }

    async fn query(
        &self,
        chain_id: ChainId,
        status: Option<RequestStatus>,
    ) -> AppResult<Vec<RequestRecord>> {
        let chain_id = chain_id_param(chain_id)?;

        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, MirrorRow>(
                    r#"
                    SELECT question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer
                    FROM requests
                    WHERE chain_id = $1 AND status = $2
                    "#,
                )
                .bind(chain_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MirrorRow>(
                    r#"
                    SELECT question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer
                    FROM requests
                    WHERE chain_id = $1
                    "#,
                )
                .bind(chain_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_records(rows)
    }

    async fn get(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>> {
        let row = sqlx::query_as::<_, MirrorRow>(
            r#"
            SELECT question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer
            FROM requests
            WHERE question_id = $1 AND chain_id = $2
            "#,
        )
        .bind(key.question_id.as_str())
        .bind(chain_id_param(key.chain_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RequestRecord::try_from).transpose()
    }

    async fn update(
        &self,
        key: &RecordKey,
        patch: &RecordPatch,
    ) -> AppResult<Option<RequestRecord>> {
        let mut builder = update_query(key, patch)?;

        let row = builder
            .build_query_as::<MirrorRow>()
            .fetch_optional(&self.pool)
            .await?;

        row.map(RequestRecord::try_from).transpose()
    }

    async fn delete(&self, key: &RecordKey) -> AppResult<Option<RequestRecord>> {
        let row = sqlx::query_as::<_, MirrorRow>(
            r#"
            DELETE FROM requests
            WHERE question_id = $1 AND chain_id = $2
            RETURNING question_id, chain_id, status, requester_answer, arbitrator_answer, latest_answer
            "#,
        )
        .bind(key.question_id.as_str())
        .bind(chain_id_param(key.chain_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RequestRecord::try_from).transpose()
    }
}

/// Checkpoint table in PostgreSQL (`checkpoints`, keyed by feed)
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn get_checkpoint(&self, feed: FeedKey) -> AppResult<u64> {
        let height: Option<i64> =
            sqlx::query_scalar("SELECT block_height FROM checkpoints WHERE feed_key = $1")
                .bind(feed.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match height {
            None => Ok(0),
            Some(height) => u64::try_from(height).map_err(|_| {
                AppError::from(StoreError::Corrupt {
                    field: "block_height",
                    value: height.to_string(),
                })
            }),
        }
    }

    async fn set_checkpoint(&self, feed: FeedKey, block_height: u64) -> AppResult<()> {
        let height = i64::try_from(block_height).map_err(|_| StoreError::Corrupt {
            field: "block_height",
            value: block_height.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (feed_key, block_height, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (feed_key) DO UPDATE
            SET block_height = EXCLUDED.block_height, updated_at = NOW()
            "#,
        )
        .bind(feed.as_str())
        .bind(height)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
