//! Discord interaction webhooks: signature verification and command
//! routing.

use crate::chat::ChatService;
use crate::error::{AuthError, ConfigError, Result};
use crate::persona;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;
use serde_json::json;

/// Interaction request types.
const INTERACTION_PING: u8 = 1;
const INTERACTION_APPLICATION_COMMAND: u8 = 2;

/// Interaction response types.
const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;

/// What Discord users see when the pipeline fails. Internals stay in the
/// logs.
const FRIENDLY_ERROR: &str = "Meow? Something went wrong. One shall look into it.";
const FRIENDLY_RATE_LIMIT: &str =
    "One is being positively swarmed with requests. Do try again shortly, mon ami.";

/// Verifies interaction signatures against the application public key.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Build a verifier from the hex public key Discord shows in the
    /// developer portal.
    pub fn from_hex(public_key_hex: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(public_key_hex)
            .map_err(|e| ConfigError::Invalid(format!("DISCORD_PUBLIC_KEY: {e}")))?
            .try_into()
            .map_err(|_| ConfigError::Invalid("DISCORD_PUBLIC_KEY: wrong length".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ConfigError::Invalid(format!("DISCORD_PUBLIC_KEY: {e}")))?;
        Ok(Self { key })
    }

    /// Verify a signature over `timestamp + raw body`.
    pub fn verify(
        &self,
        timestamp: &str,
        body: &[u8],
        signature_hex: &str,
    ) -> std::result::Result<(), AuthError> {
        let bytes: [u8; 64] = hex::decode(signature_hex)
            .map_err(|_| AuthError::InvalidSignature)?
            .try_into()
            .map_err(|_| AuthError::InvalidSignature)?;
        let signature = Signature::from_bytes(&bytes);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify_strict(&message, &signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}

/// An inbound interaction, as much of it as routing needs.
#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<CommandData>,
    #[serde(default)]
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub user: Option<DiscordUser>,
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct GuildMember {
    pub user: DiscordUser,
}

#[derive(Debug, Deserialize)]
pub struct DiscordUser {
    pub id: String,
}

impl Interaction {
    /// The invoking user's id: guild interactions carry it on `member`,
    /// DMs on `user`.
    fn user_id(&self) -> Option<&str> {
        self.member
            .as_ref()
            .map(|m| m.user.id.as_str())
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }

    fn option_str(&self, name: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .options
            .iter()
            .find(|o| o.name == name)?
            .value
            .as_str()
    }
}

/// Route a verified interaction and build its response body.
///
/// PING answers PONG without touching the pipeline. Command failures
/// always degrade to a friendly static string.
pub async fn handle_interaction(chat: &ChatService, interaction: Interaction) -> serde_json::Value {
    match interaction.kind {
        INTERACTION_PING => json!({ "type": RESPONSE_PONG }),
        INTERACTION_APPLICATION_COMMAND => {
            let content = run_command(chat, &interaction).await;
            message_response(content)
        }
        other => {
            tracing::debug!(kind = other, "ignoring unsupported interaction type");
            json!({ "type": RESPONSE_PONG })
        }
    }
}

async fn run_command(chat: &ChatService, interaction: &Interaction) -> CommandReply {
    let Some(user_id) = interaction.user_id() else {
        tracing::warn!("interaction carried no user id");
        return CommandReply::plain(FRIENDLY_ERROR);
    };

    let command = interaction.data.as_ref().map(|d| d.name.as_str()).unwrap_or_default();
    let message = match command {
        "chat" => match interaction.option_str("message") {
            Some(message) => message.to_string(),
            None => return CommandReply::plain("Meow? One heard no message to answer."),
        },
        "decree" => persona::DECREE_REQUEST.to_string(),
        unknown => {
            tracing::debug!(command = unknown, "unknown interaction command");
            return CommandReply::plain("Meow? One does not understand that command.");
        }
    };

    match chat.respond(user_id, &message, "discord").await {
        Ok(reply) => CommandReply { content: reply.response, decree: reply.decree },
        Err(crate::Error::Chat(crate::error::ChatError::RateLimited { .. })) => {
            CommandReply::plain(FRIENDLY_RATE_LIMIT)
        }
        Err(error) => {
            tracing::error!(%error, user_id, command, "interaction pipeline failed");
            CommandReply::plain(FRIENDLY_ERROR)
        }
    }
}

struct CommandReply {
    content: String,
    decree: Option<String>,
}

impl CommandReply {
    fn plain(content: &str) -> Self {
        Self { content: content.to_string(), decree: None }
    }
}

fn message_response(reply: CommandReply) -> serde_json::Value {
    let mut data = json!({ "content": reply.content });
    if let Some(decree) = reply.decree {
        data["embeds"] = json!([{ "title": "Royal Decree", "description": decree }]);
    }
    json!({ "type": RESPONSE_CHANNEL_MESSAGE, "data": data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::config::RateLimitConfig;
    use crate::error::LlmError;
    use crate::limiter::RateLimiter;
    use crate::llm::ModelClient;
    use crate::memory::ConversationMemory;
    use crate::persona::Persona;
    use crate::store::{FastStore, LocalStore};
    use crate::tasks::TaskQueue;
    use crate::webhook::WebhookNotifier;
    use crate::ConversationTurn;
    use async_trait::async_trait;
    use ed25519_dalek::{Signer as _, SigningKey};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for CountingModel {
        async fn generate(
            &self,
            _messages: &[ConversationTurn],
        ) -> std::result::Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("C'est magnifique! At your service.".into())
        }
    }

    async fn chat_service(model: Arc<CountingModel>) -> ChatService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");

        let store: Arc<dyn FastStore> = Arc::new(LocalStore::new());
        let tasks = TaskQueue::start(pool.clone(), reqwest::Client::new(), 1);
        let memory = ConversationMemory::new(pool, store.clone(), tasks.clone());
        memory.initialize().await.expect("schema");

        ChatService::new(
            RateLimiter::new(store.clone(), RateLimitConfig::default()),
            ResponseCache::new(store, 3600),
            memory,
            Arc::new(WebhookNotifier::new(tasks)),
            model,
            Persona::new(),
        )
    }

    #[tokio::test]
    async fn ping_answers_pong_without_invoking_the_pipeline() {
        let model = Arc::new(CountingModel { calls: AtomicUsize::new(0) });
        let chat = chat_service(model.clone()).await;

        let interaction: Interaction =
            serde_json::from_str(r#"{"type": 1}"#).expect("ping parses");
        let response = handle_interaction(&chat, interaction).await;

        assert_eq!(response, json!({ "type": 1 }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chat_command_routes_into_the_pipeline() {
        let model = Arc::new(CountingModel { calls: AtomicUsize::new(0) });
        let chat = chat_service(model.clone()).await;

        let interaction: Interaction = serde_json::from_value(json!({
            "type": 2,
            "data": { "name": "chat", "options": [{ "name": "message", "value": "Hello!" }] },
            "member": { "user": { "id": "discord-user-1" } },
        }))
        .expect("command parses");

        let response = handle_interaction(&chat, interaction).await;
        assert_eq!(response["type"], RESPONSE_CHANNEL_MESSAGE);
        assert!(
            response["data"]["content"]
                .as_str()
                .is_some_and(|c| !c.is_empty())
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_command_degrades_to_a_friendly_reply() {
        let model = Arc::new(CountingModel { calls: AtomicUsize::new(0) });
        let chat = chat_service(model.clone()).await;

        let interaction: Interaction = serde_json::from_value(json!({
            "type": 2,
            "data": { "name": "juggle" },
            "user": { "id": "discord-user-1" },
        }))
        .expect("command parses");

        let response = handle_interaction(&chat, interaction).await;
        assert_eq!(response["type"], RESPONSE_CHANNEL_MESSAGE);
        assert!(
            response["data"]["content"]
                .as_str()
                .is_some_and(|c| c.starts_with("Meow?"))
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signatures_verify_and_reject() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifier = SignatureVerifier {
            key: signing_key.verifying_key(),
        };

        let timestamp = "1700000000";
        let body = br#"{"type":1}"#;
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        let signature = hex::encode(signing_key.sign(&message).to_bytes());

        assert!(verifier.verify(timestamp, body, &signature).is_ok());
        assert!(verifier.verify("1700000001", body, &signature).is_err());
        assert!(verifier.verify(timestamp, b"{}", &signature).is_err());
        assert!(verifier.verify(timestamp, body, "deadbeef").is_err());
    }

    #[test]
    fn verifier_rejects_malformed_public_keys() {
        assert!(SignatureVerifier::from_hex("not hex").is_err());
        assert!(SignatureVerifier::from_hex("abcd").is_err());
    }
}
