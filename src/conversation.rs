//! The session's message log and its single-request loading guard.

use crate::error::PolarisError;
use crate::mode::Mode;
use crate::response::{GeneratedResponse, GroundingSource, ResponseClient, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub role: MessageRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_sources: Vec<GroundingSource>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub deep_think: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    #[default]
    Idle,
    Thinking,
}

/// A submitted turn waiting for its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub prompt: String,
    pub image: Option<String>,
    pub mode: Mode,
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    loading_state: LoadingState,
    mode: Mode,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn loading_state(&self) -> LoadingState {
        self.loading_state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!("[Conversation] Mode {} -> {}.", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Appends the user's message and enters `Thinking`.
    ///
    /// Returns `None` without touching the log when there is nothing to send
    /// or a request is already in flight.
    pub fn begin_submit(&mut self, text: &str, image: Option<String>) -> Option<PendingTurn> {
        if text.trim().is_empty() && image.is_none() {
            debug!("[Conversation] Ignoring empty submit.");
            return None;
        }
        if self.loading_state != LoadingState::Idle {
            debug!("[Conversation] Ignoring submit while {:?}.", self.loading_state);
            return None;
        }

        let mode = self.mode;
        let user = Message {
            id: self.allocate_id(),
            role: MessageRole::User,
            text: text.to_string(),
            image: image.clone(),
            grounding_sources: Vec::new(),
            is_error: false,
            deep_think: mode.marks_user_deep_think(),
            timestamp: Utc::now(),
        };
        self.messages.push(user);
        self.loading_state = LoadingState::Thinking;

        Some(PendingTurn {
            prompt: text.to_string(),
            image,
            mode,
        })
    }

    /// Appends exactly one model message for `turn` and returns to `Idle`.
    pub fn complete_submit(
        &mut self,
        turn: PendingTurn,
        result: Result<GeneratedResponse, PolarisError>,
    ) -> &Message {
        let model = match result {
            Ok(answer) => Message {
                id: self.allocate_id(),
                role: MessageRole::Model,
                text: answer.text,
                image: None,
                grounding_sources: answer.grounding_sources,
                is_error: false,
                deep_think: turn.mode.marks_model_deep_think(),
                timestamp: Utc::now(),
            },
            Err(e) => Message {
                id: self.allocate_id(),
                role: MessageRole::Model,
                text: e.user_message(),
                image: None,
                grounding_sources: Vec::new(),
                is_error: true,
                deep_think: false,
                timestamp: Utc::now(),
            },
        };
        self.messages.push(model);
        self.loading_state = LoadingState::Idle;
        &self.messages[self.messages.len() - 1]
    }

    /// Sends one turn through `client` and records the answer or the error.
    /// Returns the model message, or `None` if the submit was a no-op.
    pub async fn submit<T: Transport>(
        &mut self,
        client: &ResponseClient<T>,
        text: &str,
        image: Option<String>,
    ) -> Option<&Message> {
        let turn = self.begin_submit(text, image)?;
        let result = client
            .generate_response(&turn.prompt, turn.image.as_deref(), turn.mode)
            .await;
        Some(self.complete_submit(turn, result))
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolarisConfig;
    use crate::credential::CredentialCell;
    use crate::types::{GenerateContentRequest, GenerateContentResponse};
    use serde_json::json;
    use std::collections::HashSet;

    struct FixedReply(serde_json::Value);

    impl Transport for FixedReply {
        async fn generate_content(
            &self,
            _api_key: &str,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> crate::error::Result<GenerateContentResponse> {
            Ok(serde_json::from_value(self.0.clone())?)
        }
    }

    struct Failing(&'static str);

    impl Transport for Failing {
        async fn generate_content(
            &self,
            _api_key: &str,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> crate::error::Result<GenerateContentResponse> {
            Err(PolarisError::Api(self.0.to_string()))
        }
    }

    fn answer(text: &str) -> GeneratedResponse {
        GeneratedResponse {
            text: text.to_string(),
            grounding_sources: Vec::new(),
            usage: None,
        }
    }

    #[test]
    fn test_empty_submit_is_noop() {
        let mut conversation = Conversation::new();
        assert!(conversation.begin_submit("   \n", None).is_none());
        assert!(conversation.messages().is_empty());
        assert_eq!(conversation.loading_state(), LoadingState::Idle);
    }

    #[test]
    fn test_image_only_submit_is_accepted() {
        let mut conversation = Conversation::new();
        let turn = conversation
            .begin_submit("", Some("data:image/png;base64,AAAA".into()))
            .unwrap();
        assert_eq!(turn.image.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_submit_while_thinking_is_noop() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_submit("first", None).unwrap();
        assert_eq!(conversation.loading_state(), LoadingState::Thinking);

        assert!(conversation.begin_submit("second", None).is_none());
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.loading_state(), LoadingState::Thinking);

        conversation.complete_submit(turn, Ok(answer("done")));
        assert_eq!(conversation.loading_state(), LoadingState::Idle);
        assert!(conversation.begin_submit("second", None).is_some());
    }

    #[test]
    fn test_ids_are_unique_and_log_is_ordered() {
        let mut conversation = Conversation::new();
        for i in 0..5 {
            let turn = conversation.begin_submit(&format!("q{i}"), None).unwrap();
            conversation.complete_submit(turn, Ok(answer("a")));
        }
        let ids: HashSet<u64> = conversation.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 10);
        let roles: Vec<MessageRole> = conversation.messages().iter().map(|m| m.role).collect();
        assert!(roles.chunks(2).all(|pair| pair == [MessageRole::User, MessageRole::Model]));
    }

    #[test]
    fn test_deep_think_flags_follow_mode() {
        let mut conversation = Conversation::with_mode(Mode::Turbo);
        let turn = conversation.begin_submit("fast but careful", None).unwrap();
        let model = conversation.complete_submit(turn, Ok(answer("ok")));
        assert!(!model.deep_think);
        assert!(conversation.messages()[0].deep_think);

        conversation.set_mode(Mode::Deep);
        let turn = conversation.begin_submit("think hard", None).unwrap();
        assert!(conversation.complete_submit(turn, Ok(answer("ok"))).deep_think);
    }

    #[tokio::test]
    async fn test_submit_records_answer_with_sources() {
        let client = ResponseClient::with_transport(
            PolarisConfig::default(),
            CredentialCell::with_key("k"),
            FixedReply(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Nine are left." }] },
                    "groundingMetadata": { "groundingChunks": [
                        { "web": { "uri": "https://example.com", "title": "Ex" } }
                    ]}
                }]
            })),
        );
        let mut conversation = Conversation::new();
        let reply = conversation
            .submit(&client, "17 sheep, all but 9 die?", None)
            .await
            .unwrap();
        assert_eq!(reply.role, MessageRole::Model);
        assert_eq!(reply.text, "Nine are left.");
        assert_eq!(reply.grounding_sources.len(), 1);
        assert!(!reply.is_error);
        assert_eq!(conversation.loading_state(), LoadingState::Idle);
    }

    #[tokio::test]
    async fn test_failure_becomes_error_message() {
        let client = ResponseClient::with_transport(
            PolarisConfig::default(),
            CredentialCell::with_key("k"),
            Failing("429 Too Many Requests: RESOURCE_EXHAUSTED"),
        );
        let mut conversation = Conversation::new();
        let reply = conversation.submit(&client, "hello", None).await.unwrap();
        assert!(reply.is_error);
        assert!(!reply.text.contains("RESOURCE_EXHAUSTED"));
        assert!(reply.text.contains("rate limit"));
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.loading_state(), LoadingState::Idle);
    }

    #[tokio::test]
    async fn test_missing_key_becomes_error_message() {
        let client = ResponseClient::with_transport(
            PolarisConfig::default(),
            CredentialCell::new(),
            Failing("unreachable"),
        );
        let mut conversation = Conversation::new();
        let reply = conversation.submit(&client, "hello", None).await.unwrap();
        assert!(reply.is_error);
        assert!(reply.text.contains("API key is not configured"));
    }

    #[tokio::test]
    async fn test_noop_submit_does_not_call_client() {
        let client = ResponseClient::with_transport(
            PolarisConfig::default(),
            CredentialCell::with_key("k"),
            Failing("should not be called"),
        );
        let mut conversation = Conversation::new();
        assert!(conversation.submit(&client, "  ", None).await.is_none());
        assert!(conversation.messages().is_empty());
    }
}
