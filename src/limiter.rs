//! Sliding-window admission control per caller identity.

use crate::config::RateLimitConfig;
use crate::error::StoreError;
use crate::store::FastStore;
use std::sync::Arc;

/// Result of an admission check.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,
    /// Seconds until a slot frees up. Zero when allowed.
    pub retry_after_secs: u64,
}

/// Admits at most `max_requests` requests per identity per sliding window.
///
/// Window state lives in the fast store so that all instances sharing a
/// Redis backend enforce one combined limit.
pub struct RateLimiter {
    store: Arc<dyn FastStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn FastStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Check and record one request for `identity`.
    ///
    /// Backend failures propagate: silently allowing traffic when the
    /// limiter store is down would disable rate limiting fleet-wide.
    pub async fn admit(&self, identity: &str) -> Result<Admission, StoreError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = self.config.window_secs as i64 * 1000;
        let decision = self
            .store
            .admit_window(
                &format!("rate:{identity}"),
                now_ms,
                window_ms,
                self.config.max_requests,
            )
            .await?;

        if !decision.allowed {
            tracing::debug!(
                identity,
                retry_after_secs = decision.retry_after.as_secs(),
                "request rejected by rate limiter"
            );
        }

        let retry_after_secs = if decision.allowed {
            0
        } else {
            decision.retry_after.as_secs().max(1)
        };

        Ok(Admission { allowed: decision.allowed, retry_after_secs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(LocalStore::new()),
            RateLimitConfig { window_secs, max_requests },
        )
    }

    #[tokio::test]
    async fn admits_up_to_max_then_denies_with_retry_hint() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            let admission = limiter.admit("user-1").await.expect("admit");
            assert!(admission.allowed);
            assert_eq!(admission.retry_after_secs, 0);
        }

        let admission = limiter.admit("user-1").await.expect("admit");
        assert!(!admission.allowed);
        assert!(admission.retry_after_secs >= 1);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let limiter = limiter(1, 60);
        assert!(limiter.admit("a").await.expect("admit").allowed);
        assert!(!limiter.admit("a").await.expect("admit").allowed);
        assert!(limiter.admit("b").await.expect("admit").allowed);
    }

    #[tokio::test]
    async fn admission_resumes_after_window_slides() {
        let limiter = limiter(1, 1);
        assert!(limiter.admit("user-1").await.expect("admit").allowed);
        assert!(!limiter.admit("user-1").await.expect("admit").allowed);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(limiter.admit("user-1").await.expect("admit").allowed);
    }
}
