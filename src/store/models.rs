use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;

use crate::chain::models::{Answer, ChainId, ForeignStatus, HomeStatus, QuestionId};
use crate::error::{AppError, StoreError};

/// Mirror-side status. Home and foreign status sets share one column; the
/// record's chain id tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
pub enum RequestStatus {
    None,
    Pending,
    AwaitingRuling,
    Ruled,
    Finished,
    Requested,
    Created,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::None => "None",
            RequestStatus::Pending => "Pending",
            RequestStatus::AwaitingRuling => "AwaitingRuling",
            RequestStatus::Ruled => "Ruled",
            RequestStatus::Finished => "Finished",
            RequestStatus::Requested => "Requested",
            RequestStatus::Created => "Created",
            RequestStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HomeStatus> for RequestStatus {
    fn from(status: HomeStatus) -> Self {
        match status {
            HomeStatus::None => RequestStatus::None,
            HomeStatus::Pending => RequestStatus::Pending,
            HomeStatus::AwaitingRuling => RequestStatus::AwaitingRuling,
            HomeStatus::Ruled => RequestStatus::Ruled,
            HomeStatus::Finished => RequestStatus::Finished,
        }
    }
}

impl From<ForeignStatus> for RequestStatus {
    fn from(status: ForeignStatus) -> Self {
        match status {
            ForeignStatus::None => RequestStatus::None,
            ForeignStatus::Requested => RequestStatus::Requested,
            ForeignStatus::Created => RequestStatus::Created,
            ForeignStatus::Ruled => RequestStatus::Ruled,
            ForeignStatus::Failed => RequestStatus::Failed,
        }
    }
}

/// Primary key of a mirror record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub question_id: QuestionId,
    pub chain_id: ChainId,
}

/// Mirror-side snapshot of one arbitration request.
///
/// This struct is the storage projection: anything not listed here never
/// reaches the store. Deserializing drops unknown attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub question_id: QuestionId,
    pub chain_id: ChainId,
    pub status: RequestStatus,
    #[serde(default)]
    pub requester_answer: Option<Answer>,
    #[serde(default)]
    pub arbitrator_answer: Option<Answer>,
    #[serde(default)]
    pub latest_answer: Option<Answer>,
}

impl RequestRecord {
    pub fn new(question_id: QuestionId, chain_id: ChainId, status: RequestStatus) -> Self {
        Self {
            question_id,
            chain_id,
            status,
            requester_answer: None,
            arbitrator_answer: None,
            latest_answer: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            question_id: self.question_id.clone(),
            chain_id: self.chain_id,
        }
    }
}

/// Partial update over the projection attributes. `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub requester_answer: Option<Answer>,
    #[serde(default)]
    pub arbitrator_answer: Option<Answer>,
    #[serde(default)]
    pub latest_answer: Option<Answer>,
}

impl RecordPatch {
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Fields of `target` that differ from `current`
    pub fn diff(current: &RequestRecord, target: &RequestRecord) -> Self {
        fn changed<T: Clone + PartialEq>(current: &T, target: &T) -> Option<T> {
            (current != target).then(|| target.clone())
        }

        Self {
            status: changed(&current.status, &target.status),
            requester_answer: changed(&current.requester_answer, &target.requester_answer)
                .flatten(),
            arbitrator_answer: changed(&current.arbitrator_answer, &target.arbitrator_answer)
                .flatten(),
            latest_answer: changed(&current.latest_answer, &target.latest_answer).flatten(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.requester_answer.is_none()
            && self.arbitrator_answer.is_none()
            && self.latest_answer.is_none()
    }

    pub fn apply_to(&self, record: &mut RequestRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(answer) = &self.requester_answer {
            record.requester_answer = Some(answer.clone());
        }
        if let Some(answer) = &self.arbitrator_answer {
            record.arbitrator_answer = Some(answer.clone());
        }
        if let Some(answer) = &self.latest_answer {
            record.latest_answer = Some(answer.clone());
        }
    }
}

/// Ingestion feeds, one checkpoint row each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedKey {
    PendingRequests,
    AnsweredRequests,
    AcceptedRequests,
}

impl FeedKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKey::PendingRequests => "PENDING_REQUESTS",
            FeedKey::AnsweredRequests => "ANSWERED_REQUESTS",
            FeedKey::AcceptedRequests => "ACCEPTED_REQUESTS",
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row shape of the `requests` table
#[derive(Debug, Clone, FromRow)]
pub struct MirrorRow {
    pub question_id: String,
    pub chain_id: i64,
    pub status: RequestStatus,
    pub requester_answer: Option<String>,
    pub arbitrator_answer: Option<String>,
    pub latest_answer: Option<String>,
}

impl TryFrom<MirrorRow> for RequestRecord {
    type Error = AppError;

    fn try_from(row: MirrorRow) -> Result<Self, Self::Error> {
        let question_id: QuestionId = row.question_id.parse().map_err(|_| StoreError::Corrupt {
            field: "question_id",
            value: row.question_id.clone(),
        })?;
        let chain_id = u64::try_from(row.chain_id).map_err(|_| StoreError::Corrupt {
            field: "chain_id",
            value: row.chain_id.to_string(),
        })?;

        Ok(Self {
            question_id,
            chain_id: ChainId(chain_id),
            status: row.status,
            requester_answer: row.requester_answer.map(Answer),
            arbitrator_answer: row.arbitrator_answer.map(Answer),
            latest_answer: row.latest_answer.map(Answer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qid() -> QuestionId {
        "22".repeat(32).parse().unwrap()
    }

    #[test]
    fn test_record_projection_drops_extraneous_fields() {
        let record: RequestRecord = serde_json::from_value(json!({
            "questionId": qid(),
            "chainId": 100,
            "status": "Pending",
            "requesterAnswer": "0x01",
            "requester": "0xdead",
            "disputeId": "42",
            "arbitrationCost": "1000000",
        }))
        .unwrap();

        let stored = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<&str> = stored
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();

        assert_eq!(
            keys,
            vec![
                "arbitratorAnswer",
                "chainId",
                "latestAnswer",
                "questionId",
                "requesterAnswer",
                "status"
            ]
        );
        assert_eq!(record.requester_answer, Some(Answer("0x01".to_string())));
    }

    #[test]
    fn test_patch_diff_only_changed_fields() {
        let mut current = RequestRecord::new(qid(), ChainId(100), RequestStatus::Pending);
        current.requester_answer = Some(Answer("0x01".to_string()));

        let mut target = current.clone();
        target.status = RequestStatus::Ruled;
        target.latest_answer = Some(Answer("0x02".to_string()));

        let patch = RecordPatch::diff(&current, &target);
        assert_eq!(patch.status, Some(RequestStatus::Ruled));
        assert_eq!(patch.requester_answer, None);
        assert_eq!(patch.latest_answer, Some(Answer("0x02".to_string())));

        patch.apply_to(&mut current);
        assert_eq!(current, target);
    }

    #[test]
    fn test_patch_diff_of_equal_records_is_empty() {
        let record = RequestRecord::new(qid(), ChainId(1), RequestStatus::Created);
        assert!(RecordPatch::diff(&record, &record).is_empty());
    }

    #[test]
    fn test_status_conversions() {
        assert_eq!(RequestStatus::from(HomeStatus::Ruled), RequestStatus::Ruled);
        assert_eq!(RequestStatus::from(ForeignStatus::Failed), RequestStatus::Failed);
        assert_eq!(FeedKey::PendingRequests.as_str(), "PENDING_REQUESTS");
    }

    #[test]
    fn test_row_with_bad_question_id_is_corrupt() {
        let row = MirrorRow {
            question_id: "0x12".to_string(),
            chain_id: 1,
            status: RequestStatus::Pending,
            requester_answer: None,
            arbitrator_answer: None,
            latest_answer: None,
        };

        assert!(matches!(
            RequestRecord::try_from(row),
            Err(AppError::Store(StoreError::Corrupt { field: "question_id", .. }))
        ));
    }
}
