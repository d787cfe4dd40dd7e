//! Brulee: a persona-driven conversational-agent backend.
//!
//! Serves a bearer-token HTTP chat API and Discord interaction webhooks,
//! forwards messages to an OpenAI-compatible model provider with an injected
//! persona, and layers response caching, sliding-window rate limiting,
//! two-tier conversation memory, and webhook notification around the call.

pub mod api;
pub mod auth;
pub mod cache;
pub mod chat;
pub mod config;
pub mod discord;
pub mod error;
pub mod limiter;
pub mod llm;
pub mod memory;
pub mod persona;
pub mod store;
pub mod tasks;
pub mod webhook;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Speaker role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ordered turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Inbound chat request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub platform: String,
}

/// A finished chat reply, as cached and returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decree: Option<String>,
}
