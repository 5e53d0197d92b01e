//! Requests waiting on the home chain for acknowledgement.

use async_trait::async_trait;
use std::sync::Arc;

use super::counterpart::{HomeCounterpart, OnChainRecord};
use super::outcome::Action;
use super::pipeline::Feed;
use super::table::{ConditionTable, Rule};
use crate::chain::models::{ChainId, EventSpec, HomeStatus, QuestionId, REQUEST_PENDING};
use crate::chain::HomeChainApi;
use crate::error::{AppError, AppResult};
use crate::store::models::{FeedKey, RequestRecord, RequestStatus};

/// On-chain request no longer exists or is finished
pub(super) fn is_gone(_: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    counterpart.is_terminal()
}

pub(super) fn status_differs(record: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    record.status != counterpart.status()
}

fn still_pending(_: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    counterpart.request.status == HomeStatus::Pending
}

// Acknowledged requests belong to the foreign chain until ruled
fn question_finalized(record: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    still_pending(record, counterpart) && counterpart.question.is_finalized
}

fn answer_changed(record: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    still_pending(record, counterpart)
        && counterpart.question.best_answer != counterpart.request.requester_answer
}

pub fn table() -> ConditionTable<HomeCounterpart> {
    ConditionTable::new([
        Rule::new(Action::Removed, is_gone),
        Rule::new(Action::StatusChanged, status_differs),
        Rule::new(Action::FinalizedQuestionHandled, question_finalized),
        Rule::new(Action::ChangedAnswerHandled, answer_changed),
        Rule::new(Action::NotifiedRequestHandled, still_pending),
    ])
}

/// Acknowledged requests stay in this slice so a rejection on the home chain
/// still removes them.
const SLICE: &[RequestStatus] = &[RequestStatus::Pending, RequestStatus::AwaitingRuling];

pub struct HomePendingFeed {
    chain: Arc<dyn HomeChainApi>,
    chain_id: ChainId,
    table: ConditionTable<HomeCounterpart>,
}

impl HomePendingFeed {
    pub fn new(chain: Arc<dyn HomeChainApi>, chain_id: ChainId) -> Self {
        Self {
            chain,
            chain_id,
            table: table(),
        }
    }
}

#[async_trait]
impl Feed for HomePendingFeed {
    type Counterpart = HomeCounterpart;
    type Chain = dyn HomeChainApi;

    fn key(&self) -> FeedKey {
        FeedKey::PendingRequests
    }

    fn event(&self) -> &'static EventSpec {
        &REQUEST_PENDING
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn chain(&self) -> &Self::Chain {
        self.chain.as_ref()
    }

    fn status_filter(&self) -> Option<&'static [RequestStatus]> {
        Some(SLICE)
    }

    fn table(&self) -> &ConditionTable<HomeCounterpart> {
        &self.table
    }

    async fn counterpart(&self, question_id: &QuestionId) -> AppResult<HomeCounterpart> {
        HomeCounterpart::load(self.chain.as_ref(), self.chain_id, question_id).await
    }

    async fn correct(
        &self,
        action: Action,
        counterpart: &HomeCounterpart,
    ) -> AppResult<RequestRecord> {
        let question_id = &counterpart.question_id;
        let request = match action {
            Action::FinalizedQuestionHandled => {
                self.chain.handle_finalized_question(question_id).await?
            }
            Action::ChangedAnswerHandled => self.chain.handle_changed_answer(question_id).await?,
            Action::NotifiedRequestHandled => {
                self.chain.handle_notified_request(question_id).await?
            }
            other => {
                return Err(AppError::Internal(format!(
                    "{} has no corrective call on {}",
                    other,
                    self.key()
                )))
            }
        };

        Ok(counterpart.with_request(request).to_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::{event, question_id, FakeChain};
    use crate::chain::models::{Answer, HomeRequest, Question};
    use crate::chain::models::QUESTION_ID_FIELD;
    use crate::reconcile::executor::{ReconciliationReport, ReportEntry};
    use crate::reconcile::fetcher::{EventFetcher, RetryPolicy};
    use crate::reconcile::outcome::OutcomeTag;
    use crate::reconcile::pipeline::Pipeline;
    use crate::store::{CheckpointStore, MemoryCheckpointStore, MemoryMirrorBackend, MirrorStore};

    struct Harness {
        chain: Arc<FakeChain>,
        checkpoints: Arc<MemoryCheckpointStore>,
        backend: Arc<MemoryMirrorBackend>,
        mirror: Arc<MirrorStore>,
        pipeline: Pipeline<HomePendingFeed>,
    }

    fn harness() -> Harness {
        let chain = Arc::new(FakeChain::new(100));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let backend = Arc::new(MemoryMirrorBackend::new());
        let mirror = Arc::new(MirrorStore::new(backend.clone()));
        let pipeline = Pipeline::new(
            HomePendingFeed::new(chain.clone(), ChainId(100)),
            checkpoints.clone(),
            mirror.clone(),
            EventFetcher::new(RetryPolicy::immediate(5)),
        );

        Harness {
            chain,
            checkpoints,
            backend,
            mirror,
            pipeline,
        }
    }

    fn answer(value: &str) -> Option<Answer> {
        Some(Answer(value.to_string()))
    }

    fn request(status: HomeStatus) -> HomeRequest {
        HomeRequest {
            status,
            requester: Some("0xrequester".to_string()),
            requester_answer: answer("0x01"),
            arbitrator_answer: None,
        }
    }

    fn question(best_answer: &str, is_finalized: bool) -> Question {
        Question {
            best_answer: answer(best_answer),
            is_finalized,
            finalize_ts: None,
        }
    }

    fn counterpart(status: HomeStatus, best_answer: &str, is_finalized: bool) -> HomeCounterpart {
        HomeCounterpart {
            question_id: question_id(1),
            chain_id: ChainId(100),
            request: request(status),
            question: question(best_answer, is_finalized),
        }
    }

    fn pending_record(n: u8) -> RequestRecord {
        let mut record = RequestRecord::new(question_id(n), ChainId(100), RequestStatus::Pending);
        record.requester_answer = answer("0x01");
        record.latest_answer = answer("0x01");
        record
    }

    #[test]
    fn test_table_priority() {
        let table = table();
        let record = pending_record(1);

        // removal beats every other rule
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::None, "0x02", true)),
            Action::Removed
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::Finished, "0x01", false)),
            Action::Removed
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::Ruled, "0x02", true)),
            Action::StatusChanged
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::Pending, "0x02", true)),
            Action::FinalizedQuestionHandled
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::Pending, "0x02", false)),
            Action::ChangedAnswerHandled
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::Pending, "0x01", false)),
            Action::NotifiedRequestHandled
        );
        assert_eq!(table.actions().last(), Some(&Action::NoOp));
    }

    #[test]
    fn test_acknowledged_request_left_alone() {
        let table = table();
        let mut record = pending_record(1);
        record.status = RequestStatus::AwaitingRuling;

        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::AwaitingRuling, "0x02", true)),
            Action::NoOp
        );
        assert_eq!(
            table.classify(&record, &counterpart(HomeStatus::None, "0x01", false)),
            Action::Removed
        );
    }

    #[tokio::test]
    async fn test_ruled_on_chain_updates_mirror_status() {
        let h = harness();
        let qid = question_id(1);
        h.mirror
            .put(vec![pending_record(1)])
            .await
            .unwrap();
        h.chain
            .set_home(&qid, request(HomeStatus::Ruled), question("0x01", false));

        let report = h.pipeline.dispatch().await.unwrap();

        assert_eq!(report.count(Action::StatusChanged), 1);
        assert_eq!(
            report.entries(Action::StatusChanged),
            &[ReportEntry::Record {
                question_id: qid,
                chain_id: ChainId(100),
            }]
        );
        let stored = h.backend.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RequestStatus::Ruled);
        assert!(h.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_after_acknowledgement_is_removed() {
        let h = harness();
        let qid = question_id(1);
        h.chain.set_head(10);
        h.chain.push_event(event("RequestPending", 5, &qid));
        h.chain
            .set_home(&qid, request(HomeStatus::Pending), question("0x01", false));

        let first = h.pipeline.run().await.unwrap();
        assert_eq!(first.report.count(Action::NotifiedRequestHandled), 1);

        let second = h.pipeline.run().await.unwrap();
        assert_eq!(second.ingestion.data, 0);
        assert_eq!(second.report.count(Action::StatusChanged), 1);
        assert_eq!(h.backend.records()[0].status, RequestStatus::AwaitingRuling);

        // home chain rejects the request and clears it
        h.chain
            .set_home(&qid, request(HomeStatus::None), question("0x01", false));

        let third = h.pipeline.run().await.unwrap();
        assert_eq!(third.report.count(Action::Removed), 1);
        assert!(h.backend.is_empty());
    }

    #[tokio::test]
    async fn test_pending_request_is_acknowledged() {
        let h = harness();
        let qid = question_id(1);
        h.mirror
            .put(vec![pending_record(1)])
            .await
            .unwrap();
        h.chain
            .set_home(&qid, request(HomeStatus::Pending), question("0x01", false));

        let report = h.pipeline.dispatch().await.unwrap();

        assert_eq!(report.count(Action::NotifiedRequestHandled), 1);
        assert_eq!(h.chain.calls(), vec![("handle_notified_request", qid.clone())]);
        assert_eq!(h.chain.home_status(&qid), HomeStatus::AwaitingRuling);
        // mirror catches up on the next pass
        assert_eq!(h.backend.records()[0].status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_failing_record_is_isolated() {
        let h = harness();
        h.mirror
            .put((1..=3).map(pending_record))
            .await
            .unwrap();
        for n in 1..=3 {
            h.chain.set_home(
                &question_id(n),
                request(HomeStatus::Finished),
                question("0x01", false),
            );
        }
        h.chain.fail_for(&question_id(2));

        let report: ReconciliationReport = h.pipeline.dispatch().await.unwrap();

        assert_eq!(report.count(OutcomeTag::Failure), 1);
        assert_eq!(report.count(Action::Removed), 2);
        assert!(report.failures()[0].contains("node unreachable"));
        assert_eq!(h.backend.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_from_absent_checkpoint() {
        let h = harness();
        h.chain.set_head(99);
        for n in 1..=3 {
            h.chain
                .push_event(event("RequestPending", u64::from(n) * 10, &question_id(n)));
            h.chain.set_home(
                &question_id(n),
                request(HomeStatus::Pending),
                question("0x01", false),
            );
        }

        assert_eq!(
            h.checkpoints
                .get_checkpoint(FeedKey::PendingRequests)
                .await
                .unwrap(),
            0
        );

        let stats = h.pipeline.ingest().await.unwrap();

        assert_eq!(stats.data, 3);
        assert_eq!((stats.from_block, stats.to_block), (0, 99));
        assert_eq!(
            h.checkpoints
                .get_checkpoint(FeedKey::PendingRequests)
                .await
                .unwrap(),
            100
        );
        assert_eq!(h.backend.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_skips_terminal_requests() {
        let h = harness();
        h.chain.set_head(10);
        h.chain
            .push_event(event("RequestPending", 5, &question_id(1)));
        h.chain
            .push_event(event("RequestPending", 6, &question_id(2)));
        h.chain.set_home(
            &question_id(1),
            request(HomeStatus::Pending),
            question("0x01", false),
        );
        h.chain.set_home(
            &question_id(2),
            request(HomeStatus::Finished),
            question("0x01", false),
        );

        let stats = h.pipeline.ingest().await.unwrap();

        assert_eq!(stats.data, 1);
        assert_eq!(h.backend.records()[0].question_id, question_id(1));
    }

    #[tokio::test]
    async fn test_ingest_skips_event_with_bad_question_id() {
        let h = harness();
        h.chain.set_head(10);
        let mut garbled = event("RequestPending", 4, &question_id(9));
        garbled
            .return_values
            .insert(QUESTION_ID_FIELD.to_string(), serde_json::json!("0xnothex"));
        h.chain.push_event(garbled);
        h.chain
            .push_event(event("RequestPending", 6, &question_id(1)));
        h.chain.set_home(
            &question_id(1),
            request(HomeStatus::Pending),
            question("0x01", false),
        );

        let stats = h.pipeline.ingest().await.unwrap();

        assert_eq!(stats.data, 1);
        assert_eq!(h.checkpoints.history(FeedKey::PendingRequests), vec![11]);
    }

    #[tokio::test]
    async fn test_repeated_ingestion_is_idempotent() {
        let h = harness();
        h.chain.set_head(50);
        h.chain
            .push_event(event("RequestPending", 20, &question_id(1)));
        h.chain
            .push_event(event("RequestPending", 21, &question_id(1)));
        h.chain.set_home(
            &question_id(1),
            request(HomeStatus::Pending),
            question("0x01", false),
        );

        h.pipeline.ingest().await.unwrap();
        let first = h.backend.records();

        // rewind and scan the same range again
        h.checkpoints
            .set_checkpoint(FeedKey::PendingRequests, 0)
            .await
            .unwrap();
        h.pipeline.ingest().await.unwrap();

        assert_eq!(h.backend.records(), first);
        assert_eq!(h.backend.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_never_moves_backwards() {
        let h = harness();
        h.chain.set_head(99);
        h.pipeline.ingest().await.unwrap();

        // head reported behind the checkpoint
        h.chain.set_head(40);
        let stats = h.pipeline.ingest().await.unwrap();
        assert_eq!(stats.data, 0);

        h.chain.set_head(150);
        h.pipeline.ingest().await.unwrap();

        let history = h.checkpoints.history(FeedKey::PendingRequests);
        assert_eq!(history, vec![100, 151]);
        assert!(history.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn test_ingestion_failure_leaves_checkpoint() {
        let h = harness();
        h.chain.set_head(30);
        h.chain
            .push_event(event("RequestPending", 3, &question_id(1)));
        h.chain.set_home(
            &question_id(1),
            request(HomeStatus::Pending),
            question("0x01", false),
        );
        h.backend.set_fail_writes(true);

        assert!(h.pipeline.run().await.is_err());
        assert!(h.checkpoints.history(FeedKey::PendingRequests).is_empty());
    }
}
