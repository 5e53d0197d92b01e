//! Typed on-chain counterparts of mirror records and their storage projection.

use crate::chain::models::{ChainId, ForeignRequest, HomeRequest, Question, QuestionId};
use crate::chain::{ForeignChainApi, HomeChainApi};
use crate::error::AppResult;
use crate::store::models::{RequestRecord, RequestStatus};

/// On-chain state that projects onto a mirror record
pub trait OnChainRecord: Send + Sync {
    fn status(&self) -> RequestStatus;

    /// The request has left the arbitration flow for good
    fn is_terminal(&self) -> bool;

    fn to_record(&self) -> RequestRecord;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomeCounterpart {
    pub question_id: QuestionId,
    pub chain_id: ChainId,
    pub request: HomeRequest,
    pub question: Question,
}

impl HomeCounterpart {
    /// Request and question are read concurrently
    pub async fn load<C>(chain: &C, chain_id: ChainId, question_id: &QuestionId) -> AppResult<Self>
    where
        C: HomeChainApi + ?Sized,
    {
        let (request, question) = tokio::try_join!(
            chain.get_request(question_id),
            chain.get_question(question_id)
        )?;

        Ok(Self {
            question_id: question_id.clone(),
            chain_id,
            request,
            question,
        })
    }

    /// Same question with the request as returned by a corrective call
    pub fn with_request(&self, request: HomeRequest) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }
}

impl OnChainRecord for HomeCounterpart {
    fn status(&self) -> RequestStatus {
        self.request.status.into()
    }

    fn is_terminal(&self) -> bool {
        self.request.status.is_terminal()
    }

    fn to_record(&self) -> RequestRecord {
        RequestRecord {
            question_id: self.question_id.clone(),
            chain_id: self.chain_id,
            status: self.status(),
            requester_answer: self.request.requester_answer.clone(),
            arbitrator_answer: self.request.arbitrator_answer.clone(),
            latest_answer: self.question.best_answer.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignCounterpart {
    pub question_id: QuestionId,
    pub chain_id: ChainId,
    pub request: ForeignRequest,
}

impl ForeignCounterpart {
    pub async fn load<C>(chain: &C, chain_id: ChainId, question_id: &QuestionId) -> AppResult<Self>
    where
        C: ForeignChainApi + ?Sized,
    {
        let request = chain.get_request(question_id).await?;

        Ok(Self {
            question_id: question_id.clone(),
            chain_id,
            request,
        })
    }

    pub fn with_request(&self, request: ForeignRequest) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }
}

impl OnChainRecord for ForeignCounterpart {
    fn status(&self) -> RequestStatus {
        self.request.status.into()
    }

    fn is_terminal(&self) -> bool {
        self.request.status.is_terminal()
    }

    fn to_record(&self) -> RequestRecord {
        RequestRecord {
            question_id: self.question_id.clone(),
            chain_id: self.chain_id,
            status: self.status(),
            requester_answer: self.request.requester_answer.clone(),
            arbitrator_answer: self.request.arbitrator_answer.clone(),
            latest_answer: None,
        }
    }
}

impl From<HomeCounterpart> for RequestRecord {
    fn from(counterpart: HomeCounterpart) -> Self {
        counterpart.to_record()
    }
}

impl From<ForeignCounterpart> for RequestRecord {
    fn from(counterpart: ForeignCounterpart) -> Self {
        counterpart.to_record()
    }
}
