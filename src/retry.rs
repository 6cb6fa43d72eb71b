//! One retry loop for every unreliable call in the pipeline.
//!
//! Speech synthesis and object-storage uploads both go through
//! [`RetryPolicy::run_validated`]: attempt, sleep `base * 2^(n-1)` on failure,
//! and optionally reject a *successful* result that fails a corruption check
//! (e.g. a speech response of 200 bytes).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Attempt budget plus exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each further failure.
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display + fmt::Debug> {
    /// The last attempt returned an error.
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// Every attempt "succeeded" but the result was rejected as corrupt.
    #[error("rejected {attempts} corrupt results")]
    Corrupt { attempts: u32 },
}

impl<E: fmt::Display + fmt::Debug> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Corrupt { attempts } => *attempts,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, RetryError<E>>
    where
        E: fmt::Display + fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_validated(label, op, |_| false).await
    }

    /// Like [`run`](Self::run), but an `Ok` value for which `is_corrupt`
    /// returns `true` counts as a failed attempt.
    pub async fn run_validated<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_corrupt: P,
    ) -> Result<T, RetryError<E>>
    where
        E: fmt::Display + fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        let max = self.max_attempts.max(1);
        let mut last_err: Option<E> = None;

        for attempt in 1..=max {
            if attempt > 1 {
                let backoff = self.backoff_for(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    label,
                    attempt - 1,
                    max - 1,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match op(attempt).await {
                Ok(value) if is_corrupt(&value) => {
                    warn!("{}: attempt {} returned a corrupt result", label, attempt);
                    last_err = None;
                }
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", label, attempt, e);
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(last) => RetryError::Exhausted {
                attempts: max,
                last,
            },
            None => RetryError::Corrupt { attempts: max },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::new(4, 500);
        assert_eq!(p.backoff_for(1), Duration::from_millis(500));
        assert_eq!(p.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, 10).max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let p = RetryPolicy::new(3, 0);
        let out: Result<u32, RetryError<String>> = p
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_keeps_last_error() {
        let p = RetryPolicy::new(2, 0);
        let out: Result<(), RetryError<String>> =
            p.run("test", |n| async move { Err(format!("fail {n}")) }).await;
        match out {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "fail 2");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn corrupt_results_are_retried() {
        let p = RetryPolicy::new(3, 0);
        let out: Result<usize, RetryError<String>> = p
            .run_validated(
                "test",
                |n| async move { Ok(if n == 2 { 4096 } else { 10 }) },
                |len| *len < 1024,
            )
            .await;
        assert_eq!(out.unwrap(), 4096);

        let out: Result<usize, RetryError<String>> = p
            .run_validated("test", |_| async { Ok(10) }, |len| *len < 1024)
            .await;
        assert!(matches!(out, Err(RetryError::Corrupt { attempts: 3 })));
    }
}
