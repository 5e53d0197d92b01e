//! Scripted in-memory chain used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::models::{
    ChainId, EventQuery, ForeignRequest, ForeignStatus, HomeRequest, HomeStatus, Question,
    QuestionId, RawEvent, QUESTION_ID_FIELD,
};
use super::{ChainApi, ForeignChainApi, HomeChainApi};
use crate::error::{AppResult, ChainError};

pub fn question_id(n: u8) -> QuestionId {
    hex::encode([n; 32]).parse().unwrap()
}

pub fn event(name: &str, block: u64, question_id: &QuestionId) -> RawEvent {
    RawEvent {
        event: Some(name.to_string()),
        block_number: Some(block),
        transaction_hash: Some(format!("0x{:064x}", block)),
        return_values: [
            (QUESTION_ID_FIELD.to_string(), json!(question_id)),
            ("_requester".to_string(), json!("0xrequester")),
            ("_answer".to_string(), json!("0x01")),
        ]
        .into_iter()
        .collect(),
    }
}

#[derive(Default)]
pub struct FakeChain {
    chain_id: u64,
    head: Mutex<u64>,
    events: Mutex<Vec<RawEvent>>,
    scripted: Mutex<VecDeque<AppResult<Vec<RawEvent>>>>,
    home_requests: Mutex<HashMap<QuestionId, HomeRequest>>,
    questions: Mutex<HashMap<QuestionId, Question>>,
    foreign_requests: Mutex<HashMap<QuestionId, ForeignRequest>>,
    failing: Mutex<HashSet<QuestionId>>,
    calls: Mutex<Vec<(&'static str, QuestionId)>>,
    event_queries: AtomicUsize,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock() = head;
    }

    pub fn push_event(&self, event: RawEvent) {
        self.events.lock().push(event);
    }

    /// Queue a canned response for the next `past_events` call
    pub fn script_events(&self, response: AppResult<Vec<RawEvent>>) {
        self.scripted.lock().push_back(response);
    }

    pub fn set_home(&self, question_id: &QuestionId, request: HomeRequest, question: Question) {
        self.home_requests.lock().insert(question_id.clone(), request);
        self.questions.lock().insert(question_id.clone(), question);
    }

    pub fn set_foreign(&self, question_id: &QuestionId, request: ForeignRequest) {
        self.foreign_requests
            .lock()
            .insert(question_id.clone(), request);
    }

    /// Make every read and write for `question_id` fail
    pub fn fail_for(&self, question_id: &QuestionId) {
        self.failing.lock().insert(question_id.clone());
    }

    pub fn calls(&self) -> Vec<(&'static str, QuestionId)> {
        self.calls.lock().clone()
    }

    pub fn event_queries(&self) -> usize {
        self.event_queries.load(Ordering::SeqCst)
    }

    pub fn home_status(&self, question_id: &QuestionId) -> HomeStatus {
        self.home_requests
            .lock()
            .get(question_id)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    fn check(&self, question_id: &QuestionId) -> AppResult<()> {
        if self.failing.lock().contains(question_id) {
            return Err(ChainError::Transport {
                method: "fake".to_string(),
                message: format!("node unreachable for {}", question_id),
            }
            .into());
        }
        Ok(())
    }

    fn transition_home(
        &self,
        call: &'static str,
        question_id: &QuestionId,
        status: HomeStatus,
    ) -> AppResult<HomeRequest> {
        self.check(question_id)?;
        self.calls.lock().push((call, question_id.clone()));
        let mut requests = self.home_requests.lock();
        let request = requests.entry(question_id.clone()).or_default();
        request.status = status;
        Ok(request.clone())
    }
}

#[async_trait]
impl ChainApi for FakeChain {
    async fn chain_id(&self) -> AppResult<ChainId> {
        Ok(ChainId(self.chain_id))
    }

    async fn block_number(&self) -> AppResult<u64> {
        Ok(*self.head.lock())
    }

    async fn past_events(&self, event: &str, query: &EventQuery) -> AppResult<Vec<RawEvent>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.scripted.lock().pop_front() {
            return response;
        }

        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.event.as_deref() == Some(event))
            .filter(|e| {
                e.block_number
                    .map(|b| b >= query.from_block && b <= query.to_block)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HomeChainApi for FakeChain {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.check(question_id)?;
        Ok(self
            .home_requests
            .lock()
            .get(question_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_question(&self, question_id: &QuestionId) -> AppResult<Question> {
        self.check(question_id)?;
        Ok(self
            .questions
            .lock()
            .get(question_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn handle_notified_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.transition_home(
            "handle_notified_request",
            question_id,
            HomeStatus::AwaitingRuling,
        )
    }

    async fn handle_finalized_question(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<HomeRequest> {
        self.transition_home("handle_finalized_question", question_id, HomeStatus::None)
    }

    async fn handle_changed_answer(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.transition_home("handle_changed_answer", question_id, HomeStatus::None)
    }

    async fn report_arbitration_answer(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<HomeRequest> {
        self.transition_home(
            "report_arbitration_answer",
            question_id,
            HomeStatus::Finished,
        )
    }
}

#[async_trait]
impl ForeignChainApi for FakeChain {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<ForeignRequest> {
        self.check(question_id)?;
        Ok(self
            .foreign_requests
            .lock()
            .get(question_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn handle_failed_dispute_creation(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<ForeignRequest> {
        self.check(question_id)?;
        self.calls
            .lock()
            .push(("handle_failed_dispute_creation", question_id.clone()));
        let mut requests = self.foreign_requests.lock();
        let request = requests.entry(question_id.clone()).or_default();
        request.status = ForeignStatus::None;
        Ok(request.clone())
    }
}
