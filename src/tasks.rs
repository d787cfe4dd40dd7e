//! Background task queue for work detached from the request path.
//!
//! The orchestrator and notifier enqueue and move on; a single worker loop
//! drains the queue. Worker failures are logged and never reach a caller.

use crate::memory::analysis;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 256;

/// A unit of detached background work.
#[derive(Debug, Clone)]
pub enum Job {
    /// One best-effort delivery attempt to a subscriber URL.
    DeliverWebhook {
        url: String,
        secret: String,
        body: serde_json::Value,
    },
    /// Advisory topic/sentiment analysis of a user's conversation.
    AnalyzeConversation { user_id: String },
}

/// Handle for enqueueing background jobs.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Job>,
}

impl TaskQueue {
    /// Spawn the worker loop and return the enqueue handle.
    pub fn start(pool: SqlitePool, http: reqwest::Client, webhook_timeout_secs: u64) -> Self {
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
        let timeout = Duration::from_secs(webhook_timeout_secs);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::DeliverWebhook { url, secret, body } => {
                        deliver_webhook(&http, timeout, &url, &secret, &body).await;
                    }
                    Job::AnalyzeConversation { user_id } => {
                        if let Err(error) = analysis::analyze_user(&pool, &user_id).await {
                            tracing::warn!(%error, user_id, "conversation analysis failed");
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueue a job without blocking. A full queue drops the job: every
    /// job here is advisory or best-effort, so shedding beats stalling the
    /// request path.
    pub fn enqueue(&self, job: Job) {
        if let Err(error) = self.tx.try_send(job) {
            tracing::warn!(%error, "task queue full, dropping background job");
        }
    }
}

/// One delivery attempt. Non-2xx, timeouts, and connection errors are
/// recorded and dropped; there is no retry.
async fn deliver_webhook(
    http: &reqwest::Client,
    timeout: Duration,
    url: &str,
    secret: &str,
    body: &serde_json::Value,
) {
    let result = http
        .post(url)
        .timeout(timeout)
        .header("X-Webhook-Token", secret)
        .json(body)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(url, status = response.status().as_u16(), "webhook delivered");
        }
        Ok(response) => {
            tracing::warn!(url, status = response.status().as_u16(), "webhook delivery rejected");
        }
        Err(error) => {
            tracing::warn!(%error, url, "webhook delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect")
    }

    #[tokio::test]
    async fn delivers_exactly_one_webhook_post() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/hook",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "ok" }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        let queue = TaskQueue::start(test_pool().await, reqwest::Client::new(), 2);
        queue.enqueue(Job::DeliverWebhook {
            url: format!("http://{addr}/hook"),
            secret: "s3cret".into(),
            body: serde_json::json!({"event_type": "chat.response"}),
        });

        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // No retries follow the single attempt.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_crash_the_worker() {
        let pool = test_pool().await;
        let queue = TaskQueue::start(pool.clone(), reqwest::Client::new(), 1);
        queue.enqueue(Job::DeliverWebhook {
            url: "http://127.0.0.1:1/unreachable".into(),
            secret: String::new(),
            body: serde_json::json!({}),
        });

        // The worker must still be alive to process further jobs.
        tokio::time::sleep(Duration::from_millis(300)).await;
        queue.enqueue(Job::AnalyzeConversation { user_id: "nobody".into() });
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}
