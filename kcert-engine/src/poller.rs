//! Convergence Poller: bounded, fixed-interval re-evaluation of a condition.
//!
//! The condition is evaluated, and if it does not hold the poller checks the
//! deadline and then sleeps one interval. There is no backoff and no jitter.
//! Every evaluation re-reads the cluster; nothing is cached between attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;

/// Why a single condition check did not yield a boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Treated as "not yet converged"; the wait continues.
    Transient(String),
    /// Ends the wait immediately.
    Fatal(String),
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Converged {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
        attempts: u32,
    },
    TimedOut {
        #[serde(with = "duration_secs")]
        elapsed: Duration,
        attempts: u32,
        /// Last transient error seen, if any attempt failed to read.
        last_error: Option<String>,
    },
    Aborted {
        reason: String,
    },
}

impl PollOutcome {
    pub fn converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Fixed-interval poller over an injectable clock.
#[derive(Clone)]
pub struct Poller {
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Poller {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { clock, interval }
    }

    /// Evaluate `check` every interval until it holds, fails fatally, or
    /// `timeout` has elapsed.
    ///
    /// If the condition first holds at elapsed time `t <= timeout`, this returns
    /// by `t + interval`. If it never holds, this returns once elapsed time
    /// reaches `timeout`.
    pub async fn wait_for<F, Fut>(&self, timeout: Duration, mut check: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, CheckError>>,
    {
        let start = self.clock.now();
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            attempts += 1;
            match check().await {
                Ok(true) => {
                    let elapsed = self.clock.now() - start;
                    debug!(attempts, elapsed_ms = elapsed.as_millis() as u64, "Condition converged");
                    return PollOutcome::Converged { elapsed, attempts };
                }
                Ok(false) => {
                    debug!(attempts, "Condition not yet converged");
                }
                Err(CheckError::Transient(msg)) => {
                    debug!(attempts, error = %msg, "Condition read failed, retrying");
                    last_error = Some(msg);
                }
                Err(CheckError::Fatal(reason)) => {
                    info!(attempts, reason = %reason, "Condition aborted wait");
                    return PollOutcome::Aborted { reason };
                }
            }

            let elapsed = self.clock.now() - start;
            if elapsed >= timeout {
                debug!(
                    attempts,
                    timeout_secs = timeout.as_secs(),
                    "Wait deadline reached"
                );
                return PollOutcome::TimedOut {
                    elapsed,
                    attempts,
                    last_error,
                };
            }

            self.clock.sleep(self.interval).await;
        }
    }

    /// Boolean form: read failures count as "not yet".
    pub async fn wait_until<F, Fut>(&self, timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        self.wait_for(timeout, || {
            let fut = check();
            async move { Ok(fut.await) }
        })
        .await
        .converged()
    }
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use kcert_common::test_guard;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller(clock: &Arc<ManualClock>, interval_secs: u64) -> Poller {
        Poller::new(clock.clone(), Duration::from_secs(interval_secs))
    }

    #[tokio::test]
    async fn test_converges_on_first_true() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let outcome = poller(&clock, 1)
            .wait_for(Duration::from_secs(10), move || {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n >= 3) }
            })
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Converged {
                elapsed: Duration::from_secs(2),
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_within_one_interval_of_truth() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());
        let start = clock.now();
        let check_clock = clock.clone();
        let becomes_true = Duration::from_secs(7);

        let outcome = poller(&clock, 5)
            .wait_for(Duration::from_secs(60), move || {
                let elapsed = check_clock.now() - start;
                async move { Ok(elapsed >= becomes_true) }
            })
            .await;

        let PollOutcome::Converged { elapsed, .. } = outcome else {
            panic!("expected convergence, got {outcome:?}");
        };
        assert!(elapsed >= becomes_true);
        assert!(elapsed <= becomes_true + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_times_out_at_or_after_deadline() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());

        let outcome = poller(&clock, 1)
            .wait_for(Duration::from_secs(30), || async { Ok(false) })
            .await;

        let PollOutcome::TimedOut {
            elapsed,
            attempts,
            last_error,
        } = outcome
        else {
            panic!("expected timeout");
        };
        assert!(elapsed >= Duration::from_secs(30));
        assert_eq!(attempts, 31);
        assert_eq!(last_error, None);
        assert_eq!(clock.sleep_count(), 30);
    }

    #[tokio::test]
    async fn test_transient_errors_are_not_converged() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let outcome = poller(&clock, 1)
            .wait_for(Duration::from_secs(10), move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CheckError::Transient("connection refused".into()))
                    } else {
                        Ok(true)
                    }
                }
            })
            .await;

        assert!(outcome.converged());
    }

    #[tokio::test]
    async fn test_timeout_carries_last_transient_error() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());

        let outcome = poller(&clock, 2)
            .wait_for(Duration::from_secs(4), || async {
                Err(CheckError::Transient("503".into()))
            })
            .await;

        assert!(matches!(
            outcome,
            PollOutcome::TimedOut { last_error: Some(ref e), .. } if e == "503"
        ));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());

        let outcome = poller(&clock, 1)
            .wait_for(Duration::from_secs(60), || async {
                Err(CheckError::Fatal("2 engine instances".into()))
            })
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Aborted {
                reason: "2 engine instances".into()
            }
        );
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_until_bool_contract() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());
        let p = poller(&clock, 1);

        assert!(p.wait_until(Duration::from_secs(5), || async { true }).await);
        assert!(!p.wait_until(Duration::from_secs(5), || async { false }).await);
    }

    #[tokio::test]
    async fn test_zero_timeout_evaluates_once() {
        let _guard = test_guard!();
        let clock = Arc::new(ManualClock::new());

        let outcome = poller(&clock, 1)
            .wait_for(Duration::ZERO, || async { Ok(false) })
            .await;

        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 1, .. }));
    }
}
