use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::counterpart::OnChainRecord;
use super::executor::{run_isolated, ReconciliationReport};
use super::fetcher::EventFetcher;
use super::outcome::{Action, Outcome};
use super::table::ConditionTable;
use crate::chain::models::{ChainId, EventQuery, EventSpec, QuestionId};
use crate::chain::ChainApi;
use crate::error::AppResult;
use crate::store::models::{FeedKey, RecordPatch, RequestRecord, RequestStatus};
use crate::store::{CheckpointStore, MirrorStore};

/// One reconciliation feed: where its events come from, which mirror slice it
/// owns, how counterparts are read and which corrective calls it can issue.
#[async_trait]
pub trait Feed: Send + Sync {
    type Counterpart: OnChainRecord + 'static;
    type Chain: ChainApi + ?Sized;

    fn key(&self) -> FeedKey;

    fn event(&self) -> &'static EventSpec;

    fn chain_id(&self) -> ChainId;

    fn chain(&self) -> &Self::Chain;

    /// Mirror statuses to dispatch; `None` selects every record on the chain
    fn status_filter(&self) -> Option<&'static [RequestStatus]>;

    fn table(&self) -> &ConditionTable<Self::Counterpart>;

    async fn counterpart(&self, question_id: &QuestionId) -> AppResult<Self::Counterpart>;

    /// Submit the transaction behind a corrective `action` and project the
    /// request it returns. The mirror is left untouched.
    async fn correct(
        &self,
        action: Action,
        counterpart: &Self::Counterpart,
    ) -> AppResult<RequestRecord>;
}

/// Phase A result, logged as `{data, fromBlock, toBlock}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub data: usize,
    pub from_block: u64,
    pub to_block: u64,
}

/// Both phases of one scheduled invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub pass_id: Uuid,
    pub feed: FeedKey,
    pub started_at: DateTime<Utc>,
    pub ingestion: IngestionStats,
    pub report: ReconciliationReport,
}

pub struct Pipeline<F> {
    feed: F,
    checkpoints: Arc<dyn CheckpointStore>,
    mirror: Arc<MirrorStore>,
    fetcher: EventFetcher,
}

impl<F: Feed> Pipeline<F> {
    pub fn new(
        feed: F,
        checkpoints: Arc<dyn CheckpointStore>,
        mirror: Arc<MirrorStore>,
        fetcher: EventFetcher,
    ) -> Self {
        Self {
            feed,
            checkpoints,
            mirror,
            fetcher,
        }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Ingestion followed by dispatch. An ingestion error aborts the pass
    /// before any record is dispatched.
    #[instrument(skip(self), fields(feed = %self.feed.key()))]
    pub async fn run(&self) -> AppResult<PassSummary> {
        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();

        let ingestion = self.ingest().await?;
        let report = self.dispatch().await?;

        Ok(PassSummary {
            pass_id,
            feed: self.feed.key(),
            started_at,
            ingestion,
            report,
        })
    }

    /// Mirror every request seen in events since the checkpoint, then advance
    /// the checkpoint past the chain head read at the start.
    #[instrument(skip(self), fields(feed = %self.feed.key(), chain_id = %self.feed.chain_id()))]
    pub async fn ingest(&self) -> AppResult<IngestionStats> {
        let key = self.feed.key();
        let from_block = self.checkpoints.get_checkpoint(key).await?;
        let to_block = self.feed.chain().block_number().await?;

        if to_block < from_block {
            debug!(from_block, to_block, "chain head behind checkpoint; nothing to ingest");
            return Ok(IngestionStats {
                data: 0,
                from_block,
                to_block,
            });
        }

        let events = self
            .fetcher
            .fetch_events(
                self.feed.chain(),
                self.feed.event(),
                &EventQuery::range(from_block, to_block),
            )
            .await?;

        let question_ids: BTreeSet<QuestionId> = events
            .iter()
            .filter_map(|event| match event.question_id() {
                Ok(question_id) => Some(question_id),
                Err(err) => {
                    warn!(
                        block = event.block_number,
                        tx = ?event.transaction_hash,
                        error = %err,
                        "skipping event with unusable question id"
                    );
                    None
                }
            })
            .collect();

        let counterparts = try_join_all(
            question_ids
                .iter()
                .map(|question_id| self.feed.counterpart(question_id)),
        )
        .await?;

        let records: Vec<RequestRecord> = counterparts
            .iter()
            .filter(|counterpart| !counterpart.is_terminal())
            .map(OnChainRecord::to_record)
            .collect();

        let data = self.mirror.put(records).await?;
        self.checkpoints
            .set_checkpoint(key, to_block.saturating_add(1))
            .await?;

        let stats = IngestionStats {
            data,
            from_block,
            to_block,
        };
        info!(
            events = events.len(),
            data = stats.data,
            from_block = stats.from_block,
            to_block = stats.to_block,
            "✅ Ingested {}",
            key
        );
        Ok(stats)
    }

    /// Reconcile every record in the feed's mirror slice concurrently
    #[instrument(skip(self), fields(feed = %self.feed.key(), chain_id = %self.feed.chain_id()))]
    pub async fn dispatch(&self) -> AppResult<ReconciliationReport> {
        let chain_id = self.feed.chain_id();
        let records: Vec<RequestRecord> = match self.feed.status_filter() {
            Some(statuses) => try_join_all(
                statuses
                    .iter()
                    .map(|status| self.mirror.query_by_chain_and_status(chain_id, *status)),
            )
            .await?
            .into_iter()
            .flatten()
            .collect(),
            None => self.mirror.query_by_chain(chain_id).await?,
        };

        let outcomes = run_isolated(records, |record| self.reconcile(record)).await;
        let report = ReconciliationReport::from_outcomes(&outcomes);

        info!(
            records = report.total(),
            failures = report.failures().len(),
            report = %serde_json::to_string(&report).unwrap_or_default(),
            "📊 Reconciled {}",
            self.feed.key()
        );
        Ok(report)
    }

    /// Classify one record against its counterpart and carry out the action
    pub async fn reconcile(&self, record: RequestRecord) -> AppResult<Outcome> {
        let counterpart = self.feed.counterpart(&record.question_id).await?;
        let action = self.feed.table().classify(&record, &counterpart);

        debug!(
            question_id = %record.question_id,
            mirror_status = %record.status,
            chain_status = %counterpart.status(),
            action = %action,
            "classified record"
        );

        let result = match action {
            Action::Removed => {
                self.mirror
                    .remove(&record.question_id, record.chain_id)
                    .await?
            }
            Action::StatusChanged => {
                let patch = RecordPatch::diff(&record, &counterpart.to_record());
                self.mirror
                    .update(&record.question_id, record.chain_id, patch)
                    .await?
            }
            Action::NoOp => record,
            corrective => self.feed.correct(corrective, &counterpart).await?,
        };

        Ok(Outcome::applied(action, result))
    }
}
