// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{retry_with_backoff, RetryPolicy};
    use crate::errors::{ReplicaError, Retryable, SourceError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Policy defaults match the documented schedule
    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(policy.backoff_factor, 2.0);
        }
        assert!(policy.jitter);
    }

    /// The first attempt never sleeps
    #[test]
    fn test_no_delay_before_first_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before_attempt(1), Duration::ZERO);
    }

    /// Without jitter the schedule is base * factor^(n-1)
    #[test]
    fn test_delay_schedule_without_jitter() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_before_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_before_attempt(4), Duration::from_secs(8));
    }

    /// Jitter scales the capped delay into [0.5x, 1.0x]
    #[test]
    fn test_delay_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_before_attempt(2);
            assert!(delay >= Duration::from_secs(1), "jitter below 0.5x: {delay:?}");
            assert!(delay <= Duration::from_secs(2), "jitter above 1.0x: {delay:?}");
        }
    }

    /// Large attempt numbers cap at max_delay
    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_before_attempt(30), Duration::from_secs(60));
    }

    /// A transient failure followed by success makes exactly two attempts
    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<&str, ReplicaError> =
            retry_with_backoff(&policy, "patch zone", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ReplicaError::Unavailable {
                            reason: "503 Service Unavailable".to_string(),
                        })
                    } else {
                        Ok("patched")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "patched");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Attempts are bounded by max_attempts even under persistent failure
    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), SourceError> = retry_with_backoff(&policy, "list zones", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SourceError::Unavailable {
                    reason: "connection reset".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Non-retryable errors short-circuit after a single attempt
    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), ReplicaError> = retry_with_backoff(&policy, "create zone", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ReplicaError::Rejected {
                    status: 422,
                    reason: "bad rrset".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ReplicaError::Rejected { status: 422, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!result.unwrap_err().is_retryable());
    }
}
