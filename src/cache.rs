//! Content-addressed memoization of chat replies.

use crate::ChatReply;
use crate::error::StoreError;
use crate::store::FastStore;
use sha2::{Digest as _, Sha256};
use std::sync::Arc;

const KEY_PREFIX: &str = "chat:cache";

/// Caches full reply payloads keyed by a fingerprint of the request.
///
/// The cache is a performance layer, not a correctness requirement: read
/// and write failures are logged and swallowed so a flaky backend never
/// breaks the reply path.
pub struct ResponseCache {
    store: Arc<dyn FastStore>,
    default_ttl_secs: u64,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn FastStore>, default_ttl_secs: u64) -> Self {
        Self { store, default_ttl_secs }
    }

    /// Look up a cached reply for the request triple.
    pub async fn lookup(&self, user_id: &str, message: &str, platform: &str) -> Option<ChatReply> {
        let key = fingerprint_key(user_id, message, platform);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(reply) => Some(reply),
                Err(error) => {
                    tracing::warn!(%error, key, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(%error, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Store a reply for the request triple. Re-storing an identical reply
    /// under the same key is a no-op from the reader's perspective.
    pub async fn store(
        &self,
        user_id: &str,
        message: &str,
        platform: &str,
        reply: &ChatReply,
        ttl_secs: Option<u64>,
    ) {
        let key = fingerprint_key(user_id, message, platform);
        let payload = match serde_json::to_string(reply) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize reply for caching");
                return;
            }
        };

        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        if let Err(error) = self.store.set_ex(&key, &payload, ttl).await {
            tracing::warn!(%error, "cache store failed, reply served uncached");
        }
    }

    /// Remove every cache entry whose key contains `pattern`. Operator
    /// cache-busting only; the pattern is matched against key names, not
    /// fingerprint preimages.
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, StoreError> {
        self.store.delete_matching(pattern).await
    }
}

/// Stable fingerprint of the request-defining fields.
///
/// serde_json maps serialize with sorted keys, so the document layout does
/// not depend on insertion order and the same triple always hashes to the
/// same key.
fn fingerprint_key(user_id: &str, message: &str, platform: &str) -> String {
    let canonical = serde_json::json!({
        "message": message,
        "platform": platform,
        "user_id": user_id,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    format!("{KEY_PREFIX}:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(LocalStore::new()), 3600)
    }

    fn reply(text: &str) -> ChatReply {
        ChatReply { response: text.into(), decree: None }
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let a = fingerprint_key("u", "hello", "api");
        assert_eq!(a, fingerprint_key("u", "hello", "api"));
        assert_ne!(a, fingerprint_key("u", "hello", "discord"));
        assert_ne!(a, fingerprint_key("u2", "hello", "api"));
        assert_ne!(a, fingerprint_key("u", "hello!", "api"));
    }

    #[tokio::test]
    async fn lookup_returns_stored_reply() {
        let cache = cache();
        assert!(cache.lookup("u", "hi", "api").await.is_none());

        cache.store("u", "hi", "api", &reply("bonjour"), None).await;
        let hit = cache.lookup("u", "hi", "api").await.expect("hit");
        assert_eq!(hit.response, "bonjour");
    }

    #[tokio::test]
    async fn double_store_is_idempotent() {
        let cache = cache();
        cache.store("u", "hi", "api", &reply("bonjour"), None).await;
        cache.store("u", "hi", "api", &reply("bonjour"), None).await;

        let first = cache.lookup("u", "hi", "api").await.expect("hit");
        let second = cache.lookup("u", "hi", "api").await.expect("hit");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = cache();
        cache.store("u", "hi", "api", &reply("bonjour"), Some(1)).await;
        assert!(cache.lookup("u", "hi", "api").await.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(cache.lookup("u", "hi", "api").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_clears_matching_entries() {
        let cache = cache();
        cache.store("u", "hi", "api", &reply("bonjour"), None).await;

        let removed = cache.invalidate(KEY_PREFIX).await.expect("invalidate");
        assert_eq!(removed, 1);
        assert!(cache.lookup("u", "hi", "api").await.is_none());
    }
}
