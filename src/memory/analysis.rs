//! Advisory analysis of long conversations (topics and sentiment).
//!
//! Runs off the request path; results land in `conversation_insights` and
//! are never read while serving a reply.

use crate::ConversationTurn;
use crate::error::Result;
use anyhow::Context as _;
use sqlx::{Row as _, SqlitePool};
use std::collections::HashMap;

/// How many recent exchanges the analysis pass looks at.
const ANALYSIS_WINDOW: i64 = 50;

/// Words too common to count as topics.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "have", "i", "in",
    "is", "it", "me", "my", "not", "of", "on", "or", "so", "that", "the", "this", "to", "was",
    "we", "what", "with", "you", "your",
];

const POSITIVE_WORDS: &[&str] = &[
    "delightful", "excellent", "good", "great", "happy", "love", "lovely", "magnifique",
    "perfect", "splendid", "thanks", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "awful", "bad", "hate", "horrible", "problem", "sad", "terrible", "unhappy",
    "wrong",
];

/// Summary of a conversation's dominant topics and overall sentiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationInsight {
    pub topics: Vec<String>,
    pub sentiment: String,
    pub turn_count: usize,
}

/// Summarize a conversation. Pure: same turns, same insight.
pub fn summarize(turns: &[ConversationTurn]) -> ConversationInsight {
    let mut frequencies: HashMap<String, usize> = HashMap::new();
    let mut score: i64 = 0;

    for turn in turns {
        for word in turn
            .content
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let word = word.to_lowercase();
            if STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            if POSITIVE_WORDS.contains(&word.as_str()) {
                score += 1;
            } else if NEGATIVE_WORDS.contains(&word.as_str()) {
                score -= 1;
            }
            *frequencies.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
    // Alphabetical tie-break keeps the output deterministic.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let sentiment = match score {
        s if s > 0 => "positive",
        s if s < 0 => "negative",
        _ => "neutral",
    };

    ConversationInsight {
        topics: ranked.into_iter().take(3).map(|(word, _)| word).collect(),
        sentiment: sentiment.to_string(),
        turn_count: turns.len(),
    }
}

/// Analyze a user's recent history and persist the insight.
pub async fn analyze_user(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let rows = sqlx::query(
        "SELECT message, response FROM chat_log \
         WHERE user_id = ? \
         ORDER BY timestamp DESC, rowid DESC \
         LIMIT ?",
    )
    .bind(user_id)
    .bind(ANALYSIS_WINDOW)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load history for analysis of {user_id}"))?;

    let mut turns = Vec::with_capacity(rows.len() * 2);
    for row in rows.iter().rev() {
        turns.push(ConversationTurn::user(row.try_get::<String, _>("message")?));
        turns.push(ConversationTurn::assistant(row.try_get::<String, _>("response")?));
    }

    let insight = summarize(&turns);
    sqlx::query(
        "INSERT INTO conversation_insights (id, user_id, topics, sentiment, turn_count, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(serde_json::to_string(&insight.topics)?)
    .bind(&insight.sentiment)
    .bind(insight.turn_count as i64)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("failed to record insight for {user_id}"))?;

    tracing::debug!(
        user_id,
        sentiment = %insight.sentiment,
        topics = ?insight.topics,
        "conversation insight recorded"
    );
    Ok(())
}
