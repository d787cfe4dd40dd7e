//! Conversation memory storage: Redis recent-turn buffer over a durable
//! SQLite log.

use crate::error::Result;
use crate::store::FastStore;
use crate::tasks::{Job, TaskQueue};
use crate::{ConversationTurn, Role};
use anyhow::Context as _;
use sqlx::{Row as _, SqlitePool};
use std::sync::Arc;

/// How many turns the fast tier keeps per user.
pub const RECENT_TURNS: usize = 10;

/// Two-tier conversation memory.
///
/// The durable log is the source of truth; the fast tier is a rebuildable
/// view of it. Durable writes propagate failures, fast-tier writes are
/// logged and swallowed.
pub struct ConversationMemory {
    pool: SqlitePool,
    fast: Arc<dyn FastStore>,
    tasks: TaskQueue,
}

impl ConversationMemory {
    pub fn new(pool: SqlitePool, fast: Arc<dyn FastStore>, tasks: TaskQueue) -> Self {
        Self { pool, fast, tasks }
    }

    /// Create the conversation tables if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                message TEXT NOT NULL,
                response TEXT NOT NULL,
                platform TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create chat_log table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_log_user_time ON chat_log(user_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_insights (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                topics TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                turn_count INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create conversation_insights table")?;

        Ok(())
    }

    /// Load the recent turns for a user, oldest first.
    ///
    /// Checks the fast tier first; when it is empty (cold start, eviction,
    /// or a flushed Redis) the last turns are reconstructed from the
    /// durable log.
    pub async fn fetch_recent(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        let key = buffer_key(user_id);
        match self.fast.list_range(&key).await {
            Ok(raw) if !raw.is_empty() => {
                // Newest-first in the buffer; callers want chronological order.
                let mut turns: Vec<ConversationTurn> = raw
                    .iter()
                    .filter_map(|entry| match serde_json::from_str(entry) {
                        Ok(turn) => Some(turn),
                        Err(error) => {
                            tracing::warn!(%error, user_id, "skipping undecodable buffered turn");
                            None
                        }
                    })
                    .collect();
                turns.reverse();
                return Ok(turns);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, "fast tier unavailable, serving from durable log");
            }
        }

        self.fetch_recent_durable(user_id).await
    }

    /// Record one exchange: durable log first, then the fast tier.
    pub async fn append(
        &self,
        user_id: &str,
        message: &str,
        response: &str,
        platform: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_log (id, user_id, timestamp, message, response, platform) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(message)
        .bind(response)
        .bind(platform)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to append chat log for {user_id}"))?;

        let turns = vec![
            serde_json::to_string(&ConversationTurn::user(message))?,
            serde_json::to_string(&ConversationTurn::assistant(response))?,
        ];
        if let Err(error) = self
            .fast
            .list_push_trim(&buffer_key(user_id), &turns, RECENT_TURNS)
            .await
        {
            tracing::warn!(%error, user_id, "fast tier write failed, buffer will rebuild on read");
        }

        self.maybe_enqueue_analysis(user_id).await;
        Ok(())
    }

    async fn fetch_recent_durable(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            "SELECT message, response FROM chat_log \
             WHERE user_id = ? \
             ORDER BY timestamp DESC, rowid DESC \
             LIMIT ?",
        )
        .bind(user_id)
        .bind((RECENT_TURNS / 2) as i64)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load chat log for {user_id}"))?;

        let mut turns = Vec::with_capacity(rows.len() * 2);
        for row in rows.iter().rev() {
            turns.push(ConversationTurn {
                role: Role::User,
                content: row.try_get("message")?,
            });
            turns.push(ConversationTurn {
                role: Role::Assistant,
                content: row.try_get("response")?,
            });
        }
        Ok(turns)
    }

    /// Long conversations get an advisory background analysis pass. The
    /// reply path never depends on it.
    async fn maybe_enqueue_analysis(&self, user_id: &str) {
        let count: std::result::Result<i64, sqlx::Error> =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_log WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await;

        match count {
            Ok(exchanges) if exchanges * 2 > RECENT_TURNS as i64 => {
                self.tasks.enqueue(Job::AnalyzeConversation { user_id: user_id.to_string() });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, "skipping conversation analysis check");
            }
        }
    }
}

fn buffer_key(user_id: &str) -> String {
    format!("chat:history:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (ConversationMemory, SqlitePool) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");

        let tasks = TaskQueue::start(pool.clone(), reqwest::Client::new(), 1);
        let memory = ConversationMemory::new(pool.clone(), Arc::new(LocalStore::new()), tasks);
        memory.initialize().await.expect("schema should be created");
        (memory, pool)
    }

    #[tokio::test]
    async fn append_then_fetch_round_trips_in_role_order() {
        let (memory, _pool) = setup().await;
        memory
            .append("u1", "Hello!", "Bonjour, mon ami.", "test")
            .await
            .expect("append");

        let turns = memory.fetch_recent("u1").await.expect("fetch");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "Hello!");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "Bonjour, mon ami.");
    }

    #[tokio::test]
    async fn long_conversations_return_exactly_the_newest_turns() {
        let (memory, _pool) = setup().await;
        for i in 0..8 {
            memory
                .append("u1", &format!("q{i}"), &format!("a{i}"), "test")
                .await
                .expect("append");
        }

        let turns = memory.fetch_recent("u1").await.expect("fetch");
        assert_eq!(turns.len(), RECENT_TURNS);
        assert_eq!(turns[0].content, "q3");
        assert_eq!(turns[9].content, "a7");
    }

    #[tokio::test]
    async fn empty_fast_tier_falls_back_to_durable_log() {
        let (memory, pool) = setup().await;
        for i in 0..8 {
            memory
                .append("u1", &format!("q{i}"), &format!("a{i}"), "test")
                .await
                .expect("append");
        }

        // A fresh memory over the same pool simulates a flushed fast tier.
        let tasks = TaskQueue::start(pool.clone(), reqwest::Client::new(), 1);
        let rebuilt = ConversationMemory::new(pool, Arc::new(LocalStore::new()), tasks);

        let turns = rebuilt.fetch_recent("u1").await.expect("fetch");
        assert_eq!(turns.len(), RECENT_TURNS);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "q3");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[9].content, "a7");
    }

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let (memory, _pool) = setup().await;
        let turns = memory.fetch_recent("nobody").await.expect("fetch");
        assert!(turns.is_empty());
    }
}
