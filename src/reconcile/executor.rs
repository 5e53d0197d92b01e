use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;

use super::outcome::{Outcome, OutcomeTag};
use crate::chain::models::{ChainId, QuestionId};
use crate::error::AppResult;

/// One line of a reconciliation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Record {
        #[serde(rename = "questionId")]
        question_id: QuestionId,
        #[serde(rename = "chainId")]
        chain_id: ChainId,
    },
    Error(String),
}

impl From<&Outcome> for ReportEntry {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Applied { record, .. } => ReportEntry::Record {
                question_id: record.question_id.clone(),
                chain_id: record.chain_id,
            },
            Outcome::Failure(message) => ReportEntry::Error(message.clone()),
        }
    }
}

/// Outcomes of one dispatch pass grouped by tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReconciliationReport {
    entries: BTreeMap<OutcomeTag, Vec<ReportEntry>>,
}

impl ReconciliationReport {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            report
                .entries
                .entry(outcome.tag())
                .or_default()
                .push(ReportEntry::from(outcome));
        }
        report
    }

    pub fn count(&self, tag: impl Into<OutcomeTag>) -> usize {
        self.entries.get(&tag.into()).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn entries(&self, tag: impl Into<OutcomeTag>) -> &[ReportEntry] {
        self.entries
            .get(&tag.into())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Error messages of every failed record
    pub fn failures(&self) -> Vec<&str> {
        self.entries(OutcomeTag::Failure)
            .iter()
            .filter_map(|entry| match entry {
                ReportEntry::Error(message) => Some(message.as_str()),
                ReportEntry::Record { .. } => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `f` for every item concurrently. An `Err` from one item becomes a
/// `Failure` outcome for that item only; siblings always run to completion.
pub async fn run_isolated<T, F, Fut>(items: impl IntoIterator<Item = T>, f: F) -> Vec<Outcome>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = AppResult<Outcome>>,
{
    join_all(items.into_iter().map(|item| {
        let fut = f(item);
        async move {
            match fut.await {
                Ok(outcome) => outcome,
                Err(err) => Outcome::Failure(err.to_string()),
            }
        }
    }))
    .await
}
