//! Requests accepted on the foreign chain, tracked until the dispute is ruled.

use async_trait::async_trait;
use std::sync::Arc;

use super::counterpart::{ForeignCounterpart, OnChainRecord};
use super::outcome::Action;
use super::pipeline::Feed;
use super::table::{ConditionTable, Rule};
use crate::chain::models::{ChainId, EventSpec, ForeignStatus, QuestionId, REQUEST_ACCEPTED};
use crate::chain::ForeignChainApi;
use crate::error::{AppError, AppResult};
use crate::store::models::{FeedKey, RequestRecord, RequestStatus};

fn is_gone(_: &RequestRecord, counterpart: &ForeignCounterpart) -> bool {
    counterpart.is_terminal()
}

fn dispute_creation_failed(_: &RequestRecord, counterpart: &ForeignCounterpart) -> bool {
    counterpart.request.status == ForeignStatus::Failed
}

fn status_differs(record: &RequestRecord, counterpart: &ForeignCounterpart) -> bool {
    record.status != counterpart.status()
}

pub fn table() -> ConditionTable<ForeignCounterpart> {
    ConditionTable::new([
        Rule::new(Action::Removed, is_gone),
        Rule::new(Action::FailedDisputeCreationHandled, dispute_creation_failed),
        Rule::new(Action::StatusChanged, status_differs),
    ])
}

pub struct ForeignAcceptedFeed {
    chain: Arc<dyn ForeignChainApi>,
    chain_id: ChainId,
    table: ConditionTable<ForeignCounterpart>,
}

impl ForeignAcceptedFeed {
    pub fn new(chain: Arc<dyn ForeignChainApi>, chain_id: ChainId) -> Self {
        Self {
            chain,
            chain_id,
            table: table(),
        }
    }
}

#[async_trait]
impl Feed for ForeignAcceptedFeed {
    type Counterpart = ForeignCounterpart;
    type Chain = dyn ForeignChainApi;

    fn key(&self) -> FeedKey {
        FeedKey::AcceptedRequests
    }

    fn event(&self) -> &'static EventSpec {
        &REQUEST_ACCEPTED
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn chain(&self) -> &Self::Chain {
        self.chain.as_ref()
    }

    fn status_filter(&self) -> Option<&'static [RequestStatus]> {
        None
    }

    fn table(&self) -> &ConditionTable<ForeignCounterpart> {
        &self.table
    }

    async fn counterpart(&self, question_id: &QuestionId) -> AppResult<ForeignCounterpart> {
        ForeignCounterpart::load(self.chain.as_ref(), self.chain_id, question_id).await
    }

    async fn correct(
        &self,
        action: Action,
        counterpart: &ForeignCounterpart,
    ) -> AppResult<RequestRecord> {
        if action != Action::FailedDisputeCreationHandled {
            return Err(AppError::Internal(format!(
                "{} has no corrective call on {}",
                action,
                self.key()
            )));
        }

        let request = self
            .chain
            .handle_failed_dispute_creation(&counterpart.question_id)
            .await?;
        Ok(counterpart.with_request(request).to_record())
    }
}
