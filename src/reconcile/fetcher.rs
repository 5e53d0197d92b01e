//! Event retrieval that tolerates providers returning partially decoded logs.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::chain::models::{ChainEvent, EventQuery, EventSpec, RawEvent};
use crate::chain::ChainApi;
use crate::error::{AppResult, FetchError};

/// Linear backoff: after failed attempt `n` wait `base + n * step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub step_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, step_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            step_delay,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn delay_after(&self, attempt: usize) -> Duration {
        let attempt = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_add(self.step_delay.saturating_mul(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), Duration::from_millis(1000))
    }
}

/// Range query plus shape validation, retried only on incomplete events
#[derive(Debug, Clone, Default)]
pub struct EventFetcher {
    policy: RetryPolicy,
}

impl EventFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Fetch `spec` events in `query`'s block range.
    ///
    /// Provider errors propagate on the first occurrence. Only a result with an
    /// incomplete event is retried; running out of attempts yields
    /// [`FetchError::RetryExhausted`] carrying every incomplete-shape error seen.
    #[instrument(
        skip(self, chain, spec, query),
        fields(event = spec.name, from_block = query.from_block, to_block = query.to_block)
    )]
    pub async fn fetch_events<C>(
        &self,
        chain: &C,
        spec: &EventSpec,
        query: &EventQuery,
    ) -> AppResult<Vec<ChainEvent>>
    where
        C: ChainApi + ?Sized,
    {
        let mut causes = Vec::new();

        for attempt in 1..=self.policy.max_attempts {
            let raw = chain.past_events(spec.name, query).await?;

            match validate(spec, raw) {
                Ok(events) => return Ok(events),
                Err(err) => {
                    if attempt < self.policy.max_attempts {
                        let backoff = self.policy.delay_after(attempt);
                        warn!(
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "incomplete event batch; retrying"
                        );
                        causes.push(err);
                        sleep(backoff).await;
                    } else {
                        causes.push(err);
                    }
                }
            }
        }

        let exhausted = FetchError::RetryExhausted {
            event: spec.name.to_string(),
            attempts: self.policy.max_attempts,
            causes,
        };
        error!(error = %exhausted, "event fetch exhausted retries");
        Err(exhausted.into())
    }
}

fn validate(spec: &EventSpec, raw: Vec<RawEvent>) -> Result<Vec<ChainEvent>, FetchError> {
    raw.into_iter()
        .map(|event| {
            let incomplete = |missing: &str| FetchError::IncompleteEvent {
                event: spec.name.to_string(),
                block: event.block_number,
                missing: missing.to_string(),
            };

            if event.event.as_deref() != Some(spec.name) {
                return Err(incomplete("event name"));
            }
            let block_number = event.block_number.ok_or_else(|| incomplete("blockNumber"))?;
            if let Some(field) = spec
                .fields
                .iter()
                .find(|f| event.return_values.get(**f).map_or(true, |v| v.is_null()))
            {
                return Err(incomplete(*field));
            }

            Ok(ChainEvent {
                name: spec.name.to_string(),
                block_number,
                transaction_hash: event.transaction_hash,
                return_values: event.return_values,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::{event, question_id, FakeChain};
    use crate::chain::models::{REQUEST_ACCEPTED, REQUEST_PENDING};
    use crate::error::{AppError, ChainError};

    fn fetcher() -> EventFetcher {
        EventFetcher::new(RetryPolicy::immediate(5))
    }

    fn without(mut event: RawEvent, field: &str) -> RawEvent {
        event.return_values.remove(field);
        event
    }

    fn nameless(block: u64) -> RawEvent {
        RawEvent {
            event: None,
            block_number: Some(block),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_after(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_after(4), Duration::from_millis(4500));
    }

    #[tokio::test]
    async fn test_complete_events_returned_first_try() {
        let chain = FakeChain::new(100);
        chain.push_event(event("RequestPending", 3, &question_id(1)));
        chain.push_event(event("RequestPending", 12, &question_id(2)));

        let events = fetcher()
            .fetch_events(&chain, &REQUEST_PENDING, &EventQuery::range(0, 10))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 3);
        assert_eq!(chain.event_queries(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_batch_retried_until_complete() {
        let chain = FakeChain::new(100);
        chain.script_events(Ok(vec![nameless(4)]));
        chain.script_events(Ok(vec![without(
            event("RequestAccepted", 4, &question_id(1)),
            "_questionID",
        )]));
        chain.script_events(Ok(vec![event("RequestAccepted", 4, &question_id(1))]));

        let events = fetcher()
            .fetch_events(&chain, &REQUEST_ACCEPTED, &EventQuery::range(0, 10))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(chain.event_queries(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_every_cause() {
        let chain = FakeChain::new(100);
        for block in 0..5 {
            chain.script_events(Ok(vec![nameless(block)]));
        }

        let result = fetcher()
            .fetch_events(&chain, &REQUEST_PENDING, &EventQuery::range(0, 10))
            .await;

        match result {
            Err(AppError::Fetch(FetchError::RetryExhausted {
                attempts, causes, ..
            })) => {
                assert_eq!(attempts, 5);
                assert_eq!(causes.len(), 5);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(chain.event_queries(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let chain = FakeChain::new(100);
        for block in 0..5 {
            chain.script_events(Ok(vec![nameless(block)]));
        }

        let started = tokio::time::Instant::now();
        let result = EventFetcher::new(RetryPolicy::default())
            .fetch_events(&chain, &REQUEST_PENDING, &EventQuery::range(0, 10))
            .await;

        assert!(result.is_err());
        assert_eq!(chain.event_queries(), 5);
        // 1.5s + 2.5s + 3.5s + 4.5s, nothing after the last attempt
        assert_eq!(started.elapsed(), Duration::from_millis(12_000));
    }

    #[tokio::test]
    async fn test_provider_error_not_retried() {
        let chain = FakeChain::new(100);
        chain.script_events(Err(ChainError::Transport {
            method: "get_past_events".to_string(),
            message: "connection reset".to_string(),
        }
        .into()));

        let result = fetcher()
            .fetch_events(&chain, &REQUEST_PENDING, &EventQuery::range(0, 10))
            .await;

        assert!(matches!(result, Err(AppError::Chain(ChainError::Transport { .. }))));
        assert_eq!(chain.event_queries(), 1);
    }

    #[tokio::test]
    async fn test_null_field_is_incomplete() {
        let mut partial = event("RequestPending", 2, &question_id(1));
        partial
            .return_values
            .insert("_requester".to_string(), serde_json::Value::Null);

        let err = validate(&REQUEST_PENDING, vec![partial]).unwrap_err();
        assert!(matches!(err, FetchError::IncompleteEvent { missing, .. } if missing == "_requester"));
    }
}
