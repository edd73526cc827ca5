//! Bounded exponential-backoff retry around a single network call.
//!
//! Retry state lives on the caller's stack, so independent calls can run
//! concurrently without sharing counters.

use crate::config::{RetryConfig, RetrySection};
use crate::integrations::ApiError;
use std::future::Future;
use std::time::Duration;

/// Decides whether an error is worth another attempt
pub type Classifier = fn(&ApiError) -> bool;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub classifier: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            classifier: ApiError::is_transient,
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// The two call-site presets: metadata and mutations use `default`, item
/// listing uses the shorter-delay `items` policy.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicies {
    pub default: RetryPolicy,
    pub items: RetryPolicy,
}

impl RetryPolicies {
    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            default: RetryPolicy::from_config(&section.default),
            items: RetryPolicy::from_config(&section.items),
        }
    }

    /// Same policy for every call site
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            default: policy.clone(),
            items: policy,
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, or the attempt budget
/// runs out. Exhaustion wraps the last error in `ApiError::ExhaustedRetries`.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !(policy.classifier)(&err) {
            tracing::debug!("{} failed with non-retryable error: {}", label, err);
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::warn!("{} exhausted {} attempts: {}", label, attempt, err);
            return Err(ApiError::ExhaustedRetries {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            "{} attempt {}/{} failed ({}), retrying in {:?}",
            label,
            attempt,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            classifier: ApiError::is_transient,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = RetryPolicy {
            max_delay: Duration::from_millis(3000),
            ..policy(5)
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
        assert_eq!(p.delay_after(4), Duration::from_millis(3000));
        assert_eq!(p.delay_after(200), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result = execute(&policy(4), "test", || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ApiError::graphql("Rate Limit Exceeded"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff on the paused clock
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let calls = Arc::new(AtomicU32::new(0));
        let never_retry = policy(5).with_classifier(|_| false);

        let result: Result<(), _> = execute(&never_retry, "test", || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::graphql("Rate Limit Exceeded"))
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::GraphQl { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
