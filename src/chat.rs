//! Request orchestration: the pipeline around one model call.

use crate::cache::ResponseCache;
use crate::error::{ChatError, Result};
use crate::limiter::RateLimiter;
use crate::llm::ModelClient;
use crate::memory::ConversationMemory;
use crate::persona::{self, Persona};
use crate::webhook::WebhookNotifier;
use crate::{ChatReply, ConversationTurn};
use std::sync::Arc;

/// Stateless coordinator for one chat exchange.
///
/// Owns no conversation state itself; every stage lives in an injected
/// component. Per request: admit, consult the cache, assemble the prompt
/// from persona and history, call the model, then persist, cache, and
/// notify.
pub struct ChatService {
    limiter: RateLimiter,
    cache: ResponseCache,
    memory: ConversationMemory,
    notifier: Arc<WebhookNotifier>,
    model: Arc<dyn ModelClient>,
    persona: Persona,
}

impl ChatService {
    pub fn new(
        limiter: RateLimiter,
        cache: ResponseCache,
        memory: ConversationMemory,
        notifier: Arc<WebhookNotifier>,
        model: Arc<dyn ModelClient>,
        persona: Persona,
    ) -> Self {
        Self { limiter, cache, memory, notifier, model, persona }
    }

    /// Run one message through the pipeline.
    ///
    /// The rate check always runs first, so cached replies still consume
    /// admission slots. A cache hit short-circuits everything after the
    /// lookup: no memory mutation, no notification. A model failure aborts
    /// before any write happens.
    pub async fn respond(&self, user_id: &str, message: &str, platform: &str) -> Result<ChatReply> {
        let admission = self.limiter.admit(user_id).await?;
        if !admission.allowed {
            return Err(ChatError::RateLimited {
                retry_after_secs: admission.retry_after_secs,
            }
            .into());
        }

        if let Some(reply) = self.cache.lookup(user_id, message, platform).await {
            tracing::debug!(user_id, platform, "serving cached reply");
            return Ok(reply);
        }

        let history = self.memory.fetch_recent(user_id).await?;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ConversationTurn::system(self.persona.base_prompt()));
        messages.extend(history);
        messages.push(ConversationTurn::user(message));

        let generated = self.model.generate(&messages).await?;
        let response = self.persona.format_response(&generated);
        let decree = persona::extract_decree(&response);

        self.memory.append(user_id, message, &response, platform).await?;

        let reply = ChatReply { response, decree };
        self.cache.store(user_id, message, platform, &reply, None).await;

        self.notifier.publish(
            "chat.response",
            serde_json::json!({
                "user_id": user_id,
                "platform": platform,
                "message": message,
                "response": reply.response,
            }),
        );

        Ok(reply)
    }
}
