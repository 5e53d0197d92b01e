use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ChainError;

/// Numeric chain identifier (EIP-155 style)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-byte question identifier, kept as lowercase `0x`-prefixed hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QuestionId(String);

impl QuestionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for QuestionId {
    type Err = ChainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);

        match hex::decode(digits) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self(format!("0x{}", hex::encode(bytes)))),
            _ => Err(ChainError::InvalidQuestionId(value.to_string())),
        }
    }
}

impl TryFrom<String> for QuestionId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuestionId> for String {
    fn from(id: QuestionId) -> Self {
        id.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque answer value; only ever compared for equality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(pub String);

impl Answer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Request status as reported by the home proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HomeStatus {
    #[default]
    None,
    Pending,
    AwaitingRuling,
    Ruled,
    Finished,
}

impl HomeStatus {
    /// States the request never leaves again
    pub fn is_terminal(&self) -> bool {
        matches!(self, HomeStatus::None | HomeStatus::Finished)
    }
}

/// Request status as reported by the foreign proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForeignStatus {
    #[default]
    None,
    Requested,
    Created,
    Ruled,
    Failed,
}

impl ForeignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ForeignStatus::None | ForeignStatus::Ruled)
    }
}

/// Arbitration request as stored by the home proxy contract
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRequest {
    pub status: HomeStatus,
    #[serde(default)]
    pub requester: Option<String>,
    #[serde(default)]
    pub requester_answer: Option<Answer>,
    #[serde(default)]
    pub arbitrator_answer: Option<Answer>,
}

/// Oracle question backing a request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub best_answer: Option<Answer>,
    #[serde(default)]
    pub is_finalized: bool,
    #[serde(default)]
    pub finalize_ts: Option<u64>,
}

/// Arbitration request as stored by the foreign proxy contract
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignRequest {
    pub status: ForeignStatus,
    #[serde(default)]
    pub requester: Option<String>,
    #[serde(default)]
    pub requester_answer: Option<Answer>,
    #[serde(default)]
    pub arbitrator_answer: Option<Answer>,
    #[serde(default)]
    pub dispute_id: Option<String>,
    #[serde(default)]
    pub deposit: Option<String>,
}

/// Block range query for historical events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub filter: BTreeMap<String, serde_json::Value>,
    pub from_block: u64,
    pub to_block: u64,
}

impl EventQuery {
    pub fn range(from_block: u64, to_block: u64) -> Self {
        Self {
            filter: BTreeMap::new(),
            from_block,
            to_block,
        }
    }
}

/// Event log as returned by a chain provider. Providers occasionally hand back
/// partially decoded logs, so every field is optional here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub return_values: BTreeMap<String, serde_json::Value>,
}

/// Name and required fields of an event a feed consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

pub const QUESTION_ID_FIELD: &str = "_questionID";

pub const REQUEST_PENDING: EventSpec = EventSpec {
    name: "RequestPending",
    fields: &[QUESTION_ID_FIELD, "_requester"],
};

pub const ARBITRATOR_ANSWERED: EventSpec = EventSpec {
    name: "ArbitratorAnswered",
    fields: &[QUESTION_ID_FIELD, "_answer"],
};

pub const REQUEST_ACCEPTED: EventSpec = EventSpec {
    name: "RequestAccepted",
    fields: &[QUESTION_ID_FIELD],
};

/// Event that passed shape validation
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub name: String,
    pub block_number: u64,
    pub transaction_hash: Option<String>,
    pub return_values: BTreeMap<String, serde_json::Value>,
}

impl ChainEvent {
    pub fn question_id(&self) -> Result<QuestionId, ChainError> {
        match self.return_values.get(QUESTION_ID_FIELD) {
            Some(serde_json::Value::String(value)) => value.parse(),
            other => Err(ChainError::InvalidQuestionId(format!("{:?}", other))),
        }
    }
}
