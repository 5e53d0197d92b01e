// Ingestion and per-record dispatch for the three request feeds
pub mod counterpart;
pub mod executor;
pub mod fetcher;
pub mod foreign_accepted;
pub mod home_answered;
pub mod home_pending;
pub mod outcome;
pub mod pipeline;
pub mod table;

pub use counterpart::{ForeignCounterpart, HomeCounterpart, OnChainRecord};
pub use executor::{run_isolated, ReconciliationReport, ReportEntry};
pub use fetcher::{EventFetcher, RetryPolicy};
pub use foreign_accepted::ForeignAcceptedFeed;
pub use home_answered::HomeAnsweredFeed;
pub use home_pending::HomePendingFeed;
pub use outcome::{Action, Outcome, OutcomeTag};
pub use pipeline::{Feed, IngestionStats, PassSummary, Pipeline};
pub use table::{ConditionTable, Rule};
