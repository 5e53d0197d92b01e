use serde::{Serialize, Serializer};
use std::fmt;

use crate::store::models::RequestRecord;

/// Action a dispatch pass can take for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Mirror record deleted; on-chain request reached a terminal state
    Removed,
    /// Mirror record overwritten with on-chain status and answers
    StatusChanged,
    NotifiedRequestHandled,
    FinalizedQuestionHandled,
    ChangedAnswerHandled,
    ArbitrationAnswerReported,
    FailedDisputeCreationHandled,
    NoOp,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Removed => "REMOVED",
            Action::StatusChanged => "STATUS_CHANGED",
            Action::NotifiedRequestHandled => "NOTIFIED_REQUEST_HANDLED",
            Action::FinalizedQuestionHandled => "FINALIZED_QUESTION_HANDLED",
            Action::ChangedAnswerHandled => "CHANGED_ANSWER_HANDLED",
            Action::ArbitrationAnswerReported => "ARBITRATION_ANSWER_REPORTED",
            Action::FailedDisputeCreationHandled => "FAILED_DISPUTE_CREATION_HANDLED",
            Action::NoOp => "NO_OP",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of dispatching one record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied {
        action: Action,
        record: RequestRecord,
    },
    Failure(String),
}

impl Outcome {
    pub fn applied(action: Action, record: RequestRecord) -> Self {
        Outcome::Applied { action, record }
    }

    pub fn tag(&self) -> OutcomeTag {
        match self {
            Outcome::Applied { action, .. } => OutcomeTag::Applied(*action),
            Outcome::Failure(_) => OutcomeTag::Failure,
        }
    }

    pub fn record(&self) -> Option<&RequestRecord> {
        match self {
            Outcome::Applied { record, .. } => Some(record),
            Outcome::Failure(_) => None,
        }
    }
}

/// Grouping key for aggregated outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutcomeTag {
    Applied(Action),
    Failure,
}

impl OutcomeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::Applied(action) => action.as_str(),
            OutcomeTag::Failure => "FAILURE",
        }
    }
}

impl From<Action> for OutcomeTag {
    fn from(action: Action) -> Self {
        OutcomeTag::Applied(action)
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OutcomeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
