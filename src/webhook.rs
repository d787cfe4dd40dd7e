//! Webhook subscription registry and event fan-out.

use crate::tasks::{Job, TaskQueue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A registered webhook subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub url: String,
    pub events: HashSet<String>,
    pub secret: String,
}

/// Fans domain events out to registered subscriber URLs.
///
/// Registration is rare relative to publishing, so the registry sits
/// behind a read-mostly lock. Deliveries are handed to the task queue and
/// never awaited on the request path.
pub struct WebhookNotifier {
    registry: RwLock<HashMap<String, WebhookSubscription>>,
    tasks: TaskQueue,
}

impl WebhookNotifier {
    pub fn new(tasks: TaskQueue) -> Self {
        Self { registry: RwLock::new(HashMap::new()), tasks }
    }

    /// Register a subscriber. Last write wins on the URL key.
    pub fn register(&self, subscription: WebhookSubscription) {
        tracing::info!(url = %subscription.url, events = ?subscription.events, "webhook registered");
        self.write()
            .insert(subscription.url.clone(), subscription);
    }

    /// Remove a subscriber by URL. Unknown URLs are a no-op.
    pub fn unregister(&self, url: &str) {
        if self.write().remove(url).is_some() {
            tracing::info!(url, "webhook unregistered");
        }
    }

    /// Publish an event to every subscriber listening for its type.
    /// Enqueues one best-effort delivery per subscriber and returns how
    /// many were enqueued.
    pub fn publish(&self, event_type: &str, data: serde_json::Value) -> usize {
        let subscribers: Vec<WebhookSubscription> = self
            .read()
            .values()
            .filter(|sub| sub.events.contains(event_type))
            .cloned()
            .collect();

        let body = serde_json::json!({
            "event_type": event_type,
            "data": data,
            "timestamp": chrono::Utc::now().timestamp(),
        });

        let enqueued = subscribers.len();
        for subscription in subscribers {
            self.tasks.enqueue(Job::DeliverWebhook {
                url: subscription.url,
                secret: subscription.secret,
                body: body.clone(),
            });
        }
        enqueued
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, WebhookSubscription>> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, WebhookSubscription>> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }
}
