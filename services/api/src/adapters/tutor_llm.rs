//! services/api/src/adapters/tutor_llm.rs
//!
//! This module contains the adapter for the tutoring LLM.
//! It implements the `CompletionService` port from the `core` crate by streaming
//! an OpenAI chat completion constrained to a single JSON object.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::error;
use vocab_tutor_core::gateway::{open_upstream, ErrorFragment};
use vocab_tutor_core::ports::{CompletionService, FragmentStream, PortError, PortResult};
use vocab_tutor_core::{ChatMessage, Role};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTutorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiTutorAdapter {
    /// Creates a new `OpenAiTutorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.as_str();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

/// Names an upstream failure the way the learner-facing error fragment reports it.
fn describe_error(e: OpenAIError) -> ErrorFragment {
    error!(error = %e, "OpenAI streaming call failed.");
    let class = match &e {
        OpenAIError::ApiError(api) => {
            let kind = api
                .code
                .as_deref()
                .or(api.r#type.as_deref())
                .unwrap_or_default();
            if kind.contains("rate_limit") || kind.contains("insufficient_quota") {
                Some("RateLimitError")
            } else if kind.contains("invalid_request") || api.param.is_some() {
                Some("BadRequestError")
            } else {
                Some("APIError")
            }
        }
        OpenAIError::Reqwest(inner) if inner.is_timeout() => Some("APITimeoutError"),
        OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => Some("APIError"),
        _ => None,
    };

    match class {
        Some(class) => ErrorFragment::new(format!("OpenAI API Error: {}", class), e.to_string()),
        None => ErrorFragment::new("Internal Server Error", e.to_string()),
    }
}

/// An upstream call that failed before its first chunk; surfaces as HTTP 500.
fn refused(fragment: ErrorFragment) -> PortError {
    PortError::Unexpected(format!("{}: {}", fragment.error, fragment.detail))
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiTutorAdapter {
    async fn stream_completion(&self, history: &[ChatMessage]) -> PortResult<FragmentStream> {
        let messages = history
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .response_format(ResponseFormat::JsonObject)
            .stream(true)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| refused(describe_error(e)))?
            .map(|chunk| {
                chunk.map(|response| {
                    response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .unwrap_or_default()
                })
            });

        // Connection, auth and rate-limit failures arrive as the first item.
        open_upstream(upstream, describe_error).await.map_err(refused)
    }
}
