//! # API Module
//!
//! The contract between the conversation controller and the chat-completion
//! provider, plus the `async-openai` backed implementation.
//!
//! The controller only ever sees [`CompletionRequest`] → `String`; wire format,
//! retries and transport live behind [`CompletionClient`].
//!
//! # Example
//!
//! ```no_run
//! use mdchat::api::{ChatTurn, CompletionClient, CompletionRequest, OpenAiClient, Role};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenAiClient::new("https://api.openai.com/v1", None);
//! let request = CompletionRequest {
//!     credential: "sk-...".to_string(),
//!     model: "gpt-4o".to_string(),
//!     messages: vec![ChatTurn::new(Role::User, "Hello")],
//! };
//! let reply = client.complete(&request).await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```

use std::{fmt, str::FromStr};

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    config::ChatConfig,
    error::{ChatError, Result},
};

/// Who authored a turn.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The string stored in the `chats.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ChatError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// One message of the outbound history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub credential: String,
    pub model: String,
    pub messages: Vec<ChatTurn>,
}

/// A chat-completion backend.
///
/// Implementations turn the request into assistant text. Any failure (transport,
/// provider error payload, empty response) must come back as
/// [`ChatError::RequestFailure`] so callers can report it uniformly.
#[allow(async_fn_in_trait)]
pub trait CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// [`CompletionClient`] for OpenAI-compatible endpoints via `async-openai`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_base: String,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(api_base: impl Into<String>, max_tokens: Option<u32>) -> Self {
        Self {
            api_base: api_base.into(),
            max_tokens,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.api_base.clone(), config.max_tokens)
    }

    /// The credential is per request, so a client is built per request as well.
    fn create_client(&self, credential: &str) -> Client<OpenAIConfig> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(credential)
            .with_api_base(self.api_base.clone());
        Client::with_config(openai_config)
    }
}

impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let client = self.create_client(&request.credential);
        let messages = to_openai_messages(&request.messages).map_err(request_failure)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.clone()).messages(messages);
        if let Some(max_tokens) = self.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let chat_request = args.build().map_err(request_failure)?;

        debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            self.api_base,
            request.model
        );

        let response = client.chat().create(chat_request).await.map_err(|err| {
            error!("Completion request failed: {}", err);
            request_failure(err)
        })?;

        let content: String = response
            .choices
            .iter()
            .filter_map(|choice| choice.message.content.as_deref())
            .collect();

        if content.is_empty() {
            return Err(ChatError::RequestFailure(
                "the response contained no message content".into(),
            ));
        }

        Ok(content)
    }
}

/// Convert the history into `async-openai` request messages, preserving order.
pub fn to_openai_messages(
    turns: &[ChatTurn],
) -> std::result::Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    turns
        .iter()
        .map(|turn| -> std::result::Result<ChatCompletionRequestMessage, OpenAIError> {
            Ok(match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
            })
        })
        .collect()
}

fn request_failure(err: OpenAIError) -> ChatError {
    match err {
        OpenAIError::ApiError(api_error) => ChatError::RequestFailure(api_error.message),
        other => ChatError::RequestFailure(other.to_string()),
    }
}
