//! Bounded retry for transient bus faults

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{TransportError, TransportStats};

/// How transient faults are retried.
///
/// `max_attempts` counts every attempt including the first; 0 retries
/// forever. Delays grow exponentially from `initial_delay_ms` up to
/// `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts (0 = unlimited)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound on any delay
    pub max_delay_ms: u64,
    /// Delay multiplier (exponential backoff)
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 2,
            max_delay_ms: 250,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry forever without delay
    pub fn unbounded() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// At most `max_attempts` attempts, back to back
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate delay before retry number `retry` (0-based)
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let multiplier = f64::from(self.backoff_multiplier).powi(retry.min(64) as i32);
        let delay_ms = self.initial_delay_ms as f64 * multiplier;
        let capped = delay_ms.min(self.max_delay_ms as f64);

        Duration::from_millis(capped as u64)
    }

    /// Check whether another attempt is allowed after `attempts_made`
    pub fn should_attempt(&self, attempts_made: u32) -> bool {
        self.max_attempts == 0 || attempts_made < self.max_attempts
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// Every failure is counted in `stats.faults`, every retry in
    /// `stats.retries`. When `cancel` is set the loop stops before the next
    /// retry with [`TransportError::Cancelled`].
    pub fn run<T, E, F>(
        &self,
        operation: &'static str,
        stats: &mut TransportStats,
        cancel: Option<&AtomicBool>,
        mut op: F,
    ) -> Result<T, TransportError>
    where
        E: fmt::Debug,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempts: u32 = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempts = attempts.saturating_add(1);
                    stats.faults += 1;

                    if !self.should_attempt(attempts) {
                        tracing::warn!("{} failed after {} attempts: {:?}", operation, attempts, e);
                        return Err(TransportError::RetriesExhausted {
                            operation,
                            attempts,
                            last_error: format!("{:?}", e),
                        });
                    }

                    let delay = self.delay_for_attempt(attempts - 1);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                        tracing::debug!("{} cancelled after {} attempts", operation, attempts);
                        return Err(TransportError::Cancelled(operation));
                    }

                    tracing::debug!("{} fault ({:?}), retry {} after {:?}", operation, e, attempts, delay);
                    stats.retries += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_backoff_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_millis(50));
    }

    #[test]
    fn test_should_attempt() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.should_attempt(2));
        assert!(!policy.should_attempt(3));
        assert!(RetryPolicy::unbounded().should_attempt(u32::MAX));
    }

    #[test]
    fn test_run_recovers_from_transient_faults() {
        let mut stats = TransportStats::default();
        let mut failures = 2;
        let result: Result<u8, _> = RetryPolicy::immediate(5).run("bus read", &mut stats, None, || {
            if failures > 0 {
                failures -= 1;
                Err("busy")
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.faults, 2);
        assert_eq!(stats.retries, 2);
    }

    #[test]
    fn test_run_gives_up() {
        let mut stats = TransportStats::default();
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(4).run("bus read", &mut stats, None, || {
            calls += 1;
            Err::<(), _>("nack")
        });
        match result {
            Err(TransportError::RetriesExhausted { operation, attempts, .. }) => {
                assert_eq!(operation, "bus read");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls, 4);
        assert_eq!(stats.retries, 3);
    }

    #[test]
    fn test_unbounded_keeps_going() {
        let mut stats = TransportStats::default();
        let mut failures = 1000;
        let result: Result<(), _> = RetryPolicy::unbounded().run("bus read", &mut stats, None, || {
            if failures > 0 {
                failures -= 1;
                Err("nack")
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(stats.faults, 1000);
    }

    #[test]
    fn test_cancel_stops_unbounded_retry() {
        let cancel = AtomicBool::new(false);
        let mut stats = TransportStats::default();
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::unbounded().run("i2c read", &mut stats, Some(&cancel), || {
            calls += 1;
            if calls == 50 {
                cancel.store(true, Ordering::Relaxed);
            }
            Err::<(), _>("nack")
        });
        assert!(matches!(result, Err(TransportError::Cancelled("i2c read"))));
        assert_eq!(calls, 50);
        assert_eq!(stats.faults, 50);
        assert_eq!(stats.retries, 49);
    }

    #[test]
    fn test_cancel_does_not_affect_success() {
        let cancel = AtomicBool::new(true);
        let mut stats = TransportStats::default();
        let result = RetryPolicy::unbounded().run("serial write", &mut stats, Some(&cancel), || Ok::<_, ()>(3));
        assert_eq!(result.unwrap(), 3);
        assert_eq!(stats.faults, 0);
    }
}
