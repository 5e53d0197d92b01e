//! Rulings relayed to the home chain that still need reporting to the oracle.

use async_trait::async_trait;
use std::sync::Arc;

use super::counterpart::{HomeCounterpart, OnChainRecord};
use super::home_pending::{is_gone, status_differs};
use super::outcome::Action;
use super::pipeline::Feed;
use super::table::{ConditionTable, Rule};
use crate::chain::models::{ChainId, EventSpec, HomeStatus, QuestionId, ARBITRATOR_ANSWERED};
use crate::chain::HomeChainApi;
use crate::error::{AppError, AppResult};
use crate::store::models::{FeedKey, RequestRecord, RequestStatus};

fn ruled(_: &RequestRecord, counterpart: &HomeCounterpart) -> bool {
    counterpart.request.status == HomeStatus::Ruled
}

pub fn table() -> ConditionTable<HomeCounterpart> {
    ConditionTable::new([
        Rule::new(Action::Removed, is_gone),
        Rule::new(Action::StatusChanged, status_differs),
        Rule::new(Action::ArbitrationAnswerReported, ruled),
    ])
}

pub struct HomeAnsweredFeed {
    chain: Arc<dyn HomeChainApi>,
    chain_id: ChainId,
    table: ConditionTable<HomeCounterpart>,
}

impl HomeAnsweredFeed {
    pub fn new(chain: Arc<dyn HomeChainApi>, chain_id: ChainId) -> Self {
        Self {
            chain,
            chain_id,
            table: table(),
        }
    }
}

#[async_trait]
impl Feed for HomeAnsweredFeed {
    type Counterpart = HomeCounterpart;
    type Chain = dyn HomeChainApi;

    fn key(&self) -> FeedKey {
        FeedKey::AnsweredRequests
    }

    fn event(&self) -> &'static EventSpec {
        &ARBITRATOR_ANSWERED
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn chain(&self) -> &Self::Chain {
        self.chain.as_ref()
    }

    fn status_filter(&self) -> Option<&'static [RequestStatus]> {
        Some(&[RequestStatus::Ruled])
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
        if action != Action::ArbitrationAnswerReported {
            return Err(AppError::Internal(format!(
                "{} has no corrective call on {}",
                action,
                self.key()
            )));
        }

        let request = self
            .chain
            .report_arbitration_answer(&counterpart.question_id)
            .await?;
        Ok(counterpart.with_request(request).to_record())
    }
}
