use config::{Environment, Source};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::error::AppResult;
use crate::reconcile::RetryPolicy;
use crate::store::MAX_BATCH_WRITE;

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct Config {
    pub database_url: String,
    #[validate(url)]
    pub home_rpc_url: String,
    #[validate(url)]
    pub foreign_rpc_url: String,
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    /// Items per batch write; the store never exceeds 25
    #[validate(range(min = 1, max = 25))]
    pub batch_write_limit: usize,
    #[validate(range(min = 1))]
    pub fetch_max_attempts: usize,
    pub fetch_base_delay_ms: u64,
    pub fetch_step_delay_ms: u64,
    #[validate(range(min = 1))]
    pub rpc_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub db_max_connections: u32,
    /// Run a single pass of every feed and exit
    pub run_once: bool,
}

impl Config {
    /// Read `DATABASE_URL`, `HOME_RPC_URL`, ... from the process environment
    pub fn from_env() -> AppResult<Self> {
        Self::load(Environment::default().try_parsing(true))
    }

    fn load<S>(source: S) -> AppResult<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let config: Config = config::Config::builder()
            .set_default("database_url", "postgresql://localhost/reconciler")?
            .set_default("home_rpc_url", "http://localhost:8545")?
            .set_default("foreign_rpc_url", "http://localhost:8546")?
            .set_default("poll_interval_secs", 60_i64)?
            .set_default("batch_write_limit", MAX_BATCH_WRITE as i64)?
            .set_default("fetch_max_attempts", 5_i64)?
            .set_default("fetch_base_delay_ms", 500_i64)?
            .set_default("fetch_step_delay_ms", 1000_i64)?
            .set_default("rpc_timeout_secs", 30_i64)?
            .set_default("db_max_connections", 10_i64)?
            .set_default("run_once", false)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_max_attempts,
            Duration::from_millis(self.fetch_base_delay_ms),
            Duration::from_millis(self.fetch_step_delay_ms),
        )
    }
}
