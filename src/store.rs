//! Fast-store seam: the shared key/value backend behind rate windows,
//! the response cache, and recent-turn buffers.

pub mod local;
pub mod redis;

pub use self::local::LocalStore;
pub use self::redis::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of an atomic sliding-window admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Hint for how long the caller should wait before retrying.
    /// Zero when allowed.
    pub retry_after: Duration,
}

/// Operations the components need from the fast tier.
///
/// The Redis implementation is the production backend; [`LocalStore`] exists
/// for development and tests and is not safe across instances.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Fetch a string value, honoring expiry.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a string value with a TTL in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Delete every key whose name contains `pattern`. Returns the number
    /// of keys removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError>;

    /// Push values onto the head of a list (last value ends up newest),
    /// then trim the list to its `keep` newest entries.
    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
    ) -> Result<(), StoreError>;

    /// Read a whole list, newest first.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically purge entries older than the window, then either admit
    /// (recording `now_ms`) or reject with a retry hint. Two concurrent
    /// calls for the same key must never both be admitted into the last
    /// remaining slot.
    async fn admit_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max: u32,
    ) -> Result<WindowDecision, StoreError>;
}
