// Reconciliation scheduler - runs every feed on a fixed interval
//
// - One background task per feed
// - A pass is awaited before the next tick, so passes of one feed never overlap
// - Failed passes are logged and retried on the next tick

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::error::AppResult;
use crate::reconcile::{Feed, PassSummary, Pipeline};
use crate::store::models::FeedKey;

/// A pipeline the scheduler can drive
#[async_trait]
pub trait ScheduledPipeline: Send + Sync {
    fn name(&self) -> FeedKey;

    async fn run_pass(&self) -> AppResult<PassSummary>;
}

#[async_trait]
impl<F> ScheduledPipeline for Pipeline<F>
where
    F: Feed + 'static,
{
    fn name(&self) -> FeedKey {
        self.feed().key()
    }

    async fn run_pass(&self) -> AppResult<PassSummary> {
        self.run().await
    }
}

pub struct Scheduler {
    pipelines: Vec<Arc<dyn ScheduledPipeline>>,
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            pipelines: Vec::new(),
            period,
        }
    }

    pub fn register(&mut self, pipeline: Arc<dyn ScheduledPipeline>) {
        self.pipelines.push(pipeline);
    }

    pub fn feeds(&self) -> Vec<FeedKey> {
        self.pipelines.iter().map(|p| p.name()).collect()
    }

    /// Start the scheduler (one background task per feed)
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.pipelines
            .iter()
            .cloned()
            .map(|pipeline| {
                let period = self.period;
                tokio::spawn(async move {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    info!("⏰ Scheduling {} every {:?}", pipeline.name(), period);

                    loop {
                        ticker.tick().await;
                        run_logged(pipeline.as_ref()).await;
                    }
                })
            })
            .collect()
    }

    /// Run one pass of every feed concurrently
    pub async fn run_once(&self) -> Vec<AppResult<PassSummary>> {
        join_all(self.pipelines.iter().map(|pipeline| async move {
            let result = pipeline.run_pass().await;
            log_pass(pipeline.name(), &result);
            result
        }))
        .await
    }
}

async fn run_logged(pipeline: &dyn ScheduledPipeline) {
    info!("🔄 Starting {} pass", pipeline.name());
    let result = pipeline.run_pass().await;
    log_pass(pipeline.name(), &result);
}

fn log_pass(feed: FeedKey, result: &AppResult<PassSummary>) {
    match result {
        Ok(summary) => info!(
            pass_id = %summary.pass_id,
            data = summary.ingestion.data,
            from_block = summary.ingestion.from_block,
            to_block = summary.ingestion.to_block,
            records = summary.report.total(),
            failures = summary.report.failures().len(),
            "✓ {} pass completed",
            feed
        ),
        Err(e) => error!("❌ {} pass failed: {}", feed, e),
    }
}
