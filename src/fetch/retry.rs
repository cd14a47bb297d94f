// src/fetch/retry.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

use super::{Fetch, Query};
use crate::error::PipelineError;
use crate::ingest::Payload;

/// Delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    /// `initial_ms * 2^(retry - 1)`, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least one is always made.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::Exponential {
                initial_ms: 500,
                max_ms: 8_000,
            },
        }
    }
}

impl RetryPolicy {
    /// Delay after the `retry`-th failure (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { initial_ms, max_ms } => {
                let factor = 2u64.saturating_pow(retry.saturating_sub(1));
                Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Where retries wait. Swapped for a recording fake in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Run `fetcher` until it succeeds or the policy is exhausted.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    query: &Query,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Payload, PipelineError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match fetcher.fetch(query).await {
            Ok(payload) => return Ok(payload),
            Err(e) if attempts < max_attempts => {
                let delay = policy.delay(attempts);
                warn!(query = %query.name, attempt = attempts, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                sleeper.sleep(delay).await;
            }
            Err(e) => {
                error!(query = %query.name, attempts, error = %e, "Exhausted retries");
                return Err(PipelineError::FetchFailure {
                    query: query.name.clone(),
                    attempts,
                    reason: format!("{:#}", e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::QueryKind;
    use crate::ingest::RawTable;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use url::Url;

    #[derive(Default)]
    struct FakeClock {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for FakeClock {
        async fn sleep(&self, delay: Duration) {
            self.slept.lock().unwrap().push(delay);
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, _query: &Query) -> anyhow::Result<Payload> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(anyhow!("503 Service Unavailable"))
            } else {
                Ok(Payload::Table(RawTable::default()))
            }
        }
    }

    fn query() -> Query {
        Query {
            name: "building_activity/current".into(),
            url: Url::parse("https://example.test/data").unwrap(),
            kind: QueryKind::SdmxCsv,
            required: true,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Exponential {
                initial_ms: 100,
                max_ms: 250,
            },
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let fetcher = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let clock = FakeClock::default();
        let payload = fetch_with_retry(&fetcher, &query(), &policy(4), &clock).await;
        assert!(payload.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *clock.slept.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn gives_up_with_fetch_failure() {
        let fetcher = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let clock = FakeClock::default();
        let err = fetch_with_retry(&fetcher, &query(), &policy(3), &clock)
            .await
            .unwrap_err();
        match err {
            PipelineError::FetchFailure { attempts, reason, .. } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected {:?}", other),
        }
        // capped at max_ms
        assert_eq!(
            *clock.slept.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(policy(9).delay(5), Duration::from_millis(250));
    }

    #[test]
    fn fixed_backoff_never_grows() {
        let p = RetryPolicy {
            max_attempts: 0,
            backoff: Backoff::Fixed { delay_ms: 42 },
        };
        assert_eq!(p.delay(1), p.delay(7));
    }
}
