//! Process-local fast store for development and tests.
//!
//! Holds the same data shapes as the Redis backend behind in-process
//! mutexes. Not safe across instances: rate windows and cache entries are
//! only visible to this process, so production startup refuses to use it.

use super::{FastStore, WindowDecision};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    values: HashMap<String, (String, Instant)>,
    lists: HashMap<String, Vec<String>>,
    windows: HashMap<String, Vec<i64>>,
}

/// In-process stand-in for the shared store.
#[derive(Default)]
pub struct LocalStore {
    inner: Mutex<Inner>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutex poisoning only happens if a holder panicked; the maps are
        // still structurally sound, so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FastStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.lock();
        match inner.values.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                inner.values.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.lock()
            .values
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.values.len();
        inner.values.retain(|key, _| !key.contains(pattern));
        Ok((before - inner.values.len()) as u64)
    }

    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        for value in values {
            list.insert(0, value.clone());
        }
        list.truncate(keep);
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().lists.get(key).cloned().unwrap_or_default())
    }

    async fn admit_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max: u32,
    ) -> Result<WindowDecision, StoreError> {
        let mut inner = self.lock();
        let window = inner.windows.entry(key.to_string()).or_default();
        window.retain(|ts| *ts > now_ms - window_ms);

        if window.len() >= max as usize {
            let oldest = window.iter().copied().min().unwrap_or(now_ms);
            let retry_ms = (oldest + window_ms - now_ms).max(1000);
            return Ok(WindowDecision {
                allowed: false,
                retry_after: Duration::from_millis(retry_ms as u64),
            });
        }

        window.push(now_ms);
        Ok(WindowDecision { allowed: true, retry_after: Duration::ZERO })
    }
}
