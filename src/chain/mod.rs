pub mod gateway;
pub mod models;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;

use crate::error::AppResult;
use models::{EventQuery, ForeignRequest, HomeRequest, Question, QuestionId, RawEvent};

pub use gateway::{ForeignGateway, GatewayClient, HomeGateway};

/// Read access shared by both chains
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn chain_id(&self) -> AppResult<models::ChainId>;

    /// Current chain head
    async fn block_number(&self) -> AppResult<u64>;

    /// Historical events named `event` within the inclusive block range of `query`
    async fn past_events(&self, event: &str, query: &EventQuery) -> AppResult<Vec<RawEvent>>;
}

/// Home proxy: receives requests, holds the oracle question, reports rulings
///
/// Every write returns the request as it stands after the transaction is mined.
#[async_trait]
pub trait HomeChainApi: ChainApi {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest>;

    async fn get_question(&self, question_id: &QuestionId) -> AppResult<Question>;

    /// Acknowledge a pending request so the foreign side can create the dispute
    async fn handle_notified_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest>;

    /// Reject a pending request whose question was finalized in the meantime
    async fn handle_finalized_question(&self, question_id: &QuestionId)
        -> AppResult<HomeRequest>;

    /// Reject a pending request whose best answer moved away from the requester's
    async fn handle_changed_answer(&self, question_id: &QuestionId) -> AppResult<HomeRequest>;

    /// Push a relayed ruling into the oracle
    async fn report_arbitration_answer(&self, question_id: &QuestionId)
        -> AppResult<HomeRequest>;
}

/// Foreign proxy: owns the dispute with the arbitrator
#[async_trait]
pub trait ForeignChainApi: ChainApi {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<ForeignRequest>;

    /// Refund the requester and notify the home chain after a failed dispute creation
    async fn handle_failed_dispute_creation(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<ForeignRequest>;
}
