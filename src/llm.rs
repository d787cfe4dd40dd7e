//! Model provider seam.

pub mod openai;

pub use openai::OpenAiClient;

use crate::ConversationTurn;
use crate::error::LlmError;
use async_trait::async_trait;

/// An opaque `generate(messages) -> text` capability. May fail or be slow;
/// the orchestrator treats every failure the same way.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, messages: &[ConversationTurn]) -> Result<String, LlmError>;
}
