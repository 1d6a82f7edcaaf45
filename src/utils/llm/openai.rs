use std::time::Duration;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, ChatCompletionResponseFormat, ChatCompletionResponseFormatType, CreateChatCompletionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use log::{debug, warn};
use serde_json::{json, Value};
use crate::config::ClientConfig;
use crate::utils::llm::{Complete, CompletionError, CompletionReply, ReplyChoice};

/// Completion client for any OpenAI-compatible endpoint, Groq by default.
///
/// Built from a [ClientConfig]; construct a new one when the credential changes. Requests are never retried.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    has_key: bool,
}

impl OpenAiClient {
    pub fn new(config: &ClientConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(config.api_base.as_str().trim_end_matches('/'))
            .with_api_key(config.api_key());
        // a single attempt: the first rate-limit reply ends the request
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Self {
            client: Client::with_config(openai_config).with_backoff(no_retry),
            model: config.model.clone(),
            has_key: config.has_api_key(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn classify(err: OpenAIError) -> CompletionError {
    match err {
        OpenAIError::ApiError(api_error) => {
            let code = api_error.code.as_ref().and_then(Value::as_str).unwrap_or_default();
            let kind = api_error.r#type.as_deref().unwrap_or_default();
            if code.contains("rate_limit") || kind.contains("rate_limit") || kind == "requests" || kind == "tokens" {
                let fields = json!({ "message": api_error.message, "type": api_error.r#type, "code": api_error.code });
                CompletionError::RateLimited { detail: json!({ "error": fields }).to_string() }
            } else if code == "invalid_api_key" || kind == "authentication_error" {
                CompletionError::Auth { message: api_error.message }
            } else {
                CompletionError::Transport { message: api_error.message }
            }
        }
        OpenAIError::Reqwest(e) => CompletionError::Transport { message: e.to_string() },
        other => CompletionError::Transport { message: other.to_string() },
    }
}

#[async_trait]
impl Complete for OpenAiClient {
    async fn validate_credential(&self) -> bool {
        if !self.has_key {
            return false;
        }
        match self.client.models().list().await {
            Ok(_) => true,
            Err(e) => {
                debug!("credential validation failed: {}", e);
                false
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<CompletionReply, CompletionError> {
        if !self.has_key {
            return Err(CompletionError::Auth { message: "no API key configured".to_string() });
        }
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(classify)?;
        let messages: Vec<ChatCompletionRequestMessage> = vec![message.into()];
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .response_format(ChatCompletionResponseFormat { r#type: ChatCompletionResponseFormatType::JsonObject })
            .build()
            .map_err(classify)?;
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("completion request to {} failed: {}", self.model, e);
            classify(e)
        })?;
        Ok(CompletionReply {
            choices: response.choices
                .into_iter()
                .map(|choice| ReplyChoice { content: choice.message.content })
                .collect(),
        })
    }
}
