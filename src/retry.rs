//! Bounded retries with exponential backoff around a single backend.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::RawResponse;
use crate::error::{Exhausted, ExhaustedReason, FetchError};

/// Statuses that mean "come back later": 202 is DuckDuckGo's anti-bot
/// holding page, 429 is plain rate limiting.
pub const RETRYABLE_STATUSES: &[u16] = &[202, 429];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Retryable(u16),
    Fatal(u16),
    Transport(String),
}

pub fn classify(result: Result<RawResponse, FetchError>) -> AttemptOutcome {
    match result {
        Ok(resp) if resp.status == 200 => AttemptOutcome::Success(resp.body),
        Ok(resp) if RETRYABLE_STATUSES.contains(&resp.status) => AttemptOutcome::Retryable(resp.status),
        Ok(resp) => AttemptOutcome::Fatal(resp.status),
        Err(e) => AttemptOutcome::Transport(e.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic `base * 2^n` schedule capped at `max_delay`.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_delay.max(self.base_delay))
            .with_max_elapsed_time(None)
            .build()
    }

    /// The sleeps taken between attempts when every attempt is retryable.
    pub fn delays(&self) -> Vec<Duration> {
        let mut schedule = self.schedule();
        (1..self.attempts())
            .map(|_| schedule.next_backoff().unwrap_or(self.max_delay))
            .collect()
    }

    /// Runs `attempt` until it succeeds, fails fatally, the attempt budget is
    /// spent, or `cancel` fires. `attempt` receives the 1-based attempt number
    /// so callers can rotate identity per try.
    ///
    /// Cancellation is only observed between attempts, never mid-request.
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<String, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<RawResponse, FetchError>>,
    {
        let max_attempts = self.attempts();
        let mut schedule = self.schedule();
        let mut attempts = 0;
        let mut last = ExhaustedReason::Cancelled;

        while attempts < max_attempts {
            if cancel.is_cancelled() {
                return Err(Exhausted {
                    attempts,
                    reason: ExhaustedReason::Cancelled,
                });
            }
            attempts += 1;

            match classify(attempt(attempts).await) {
                AttemptOutcome::Success(body) => {
                    debug!(attempts, "attempt succeeded");
                    return Ok(body);
                }
                AttemptOutcome::Fatal(status) => {
                    warn!(status, attempts, "non-retryable status");
                    return Err(Exhausted {
                        attempts,
                        reason: ExhaustedReason::Fatal(status),
                    });
                }
                AttemptOutcome::Retryable(status) => last = ExhaustedReason::Retryable(status),
                AttemptOutcome::Transport(msg) => last = ExhaustedReason::Transport(msg),
            }

            if attempts >= max_attempts {
                break;
            }
            let wait = schedule.next_backoff().unwrap_or(self.max_delay);
            warn!(attempts, ?wait, reason = %last, "retrying after backoff");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return Err(Exhausted {
                        attempts,
                        reason: ExhaustedReason::Cancelled,
                    });
                }
            }
        }

        Err(Exhausted {
            attempts,
            reason: last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn status(code: u16) -> Result<RawResponse, FetchError> {
        Ok(RawResponse {
            status: code,
            body: format!("body-{}", code),
        })
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(status(200)), AttemptOutcome::Success("body-200".into()));
        assert_eq!(classify(status(202)), AttemptOutcome::Retryable(202));
        assert_eq!(classify(status(429)), AttemptOutcome::Retryable(429));
        assert_eq!(classify(status(403)), AttemptOutcome::Fatal(403));
        assert_eq!(classify(status(503)), AttemptOutcome::Fatal(503));
        assert!(matches!(
            classify(Err(FetchError::Transport("reset".into()))),
            AttemptOutcome::Transport(_)
        ));
    }

    #[test]
    fn delay_schedule_doubles_then_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(3));
        let delays = policy.delays();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0].as_millis(), 1000);
        assert_eq!(delays[1].as_millis(), 2000);
        assert_eq!(delays[2].as_millis(), 3000);
        assert_eq!(delays[3].as_millis(), 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn always_throttled_uses_exact_attempt_budget() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_secs(10));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result = policy
            .execute(&CancellationToken::new(), |n| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push((n, Instant::now()));
                    status(429)
                }
            })
            .await;

        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 4,
                reason: ExhaustedReason::Retryable(429),
            })
        );
        let calls = calls.lock().unwrap();
        assert_eq!(calls.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(gaps.len(), 3);
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "gaps {:?}", gaps);
        assert!(gaps[0] >= Duration::from_millis(100));
        // No sleep after the final attempt.
        assert!(start.elapsed() < Duration::from_millis(100 + 200 + 400 + 50));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_then_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40));
        let result = policy
            .execute(&CancellationToken::new(), |n| async move {
                if n == 1 {
                    status(202)
                } else {
                    status(200)
                }
            })
            .await;
        assert_eq!(result, Ok("body-200".to_string()));
    }

    #[tokio::test]
    async fn fatal_status_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(1));
        let calls = Arc::new(Mutex::new(0u32));
        let result = policy
            .execute(&CancellationToken::new(), |_| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    status(403)
                }
            })
            .await;
        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 1,
                reason: ExhaustedReason::Fatal(403),
            })
        );
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(10));
        let result = policy
            .execute(&CancellationToken::new(), |_| async {
                Err(FetchError::Transport("connection reset".into()))
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.reason, ExhaustedReason::Transport(_)));
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = policy
            .execute(&cancel, |_| async { status(200) })
            .await;
        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 0,
                reason: ExhaustedReason::Cancelled,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff_sleep() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = policy.execute(&cancel, |_| async { status(429) }).await;
        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 1,
                reason: ExhaustedReason::Cancelled,
            })
        );
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert!(policy.delays().is_empty());
        let result = tokio_test::block_on(
            policy.execute(&CancellationToken::new(), |_| async { status(200) }),
        );
        assert_eq!(result, Ok("body-200".to_string()));
    }
}
