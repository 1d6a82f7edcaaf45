//! The completion capability: anything that turns a rendered prompt into a structured (JSON mode) reply.

use std::error::Error;
use std::fmt;
use std::fmt::Formatter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod openai;

/// One choice of a completion reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyChoice {
    pub content: Option<String>,
}

/// Reply of a completion request, reduced to what the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReply {
    pub choices: Vec<ReplyChoice>,
}

impl CompletionReply {
    /// Reply with a single choice.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self { choices: vec![ReplyChoice { content: Some(content.into()) }] }
    }

    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.content.as_deref())
    }
}

/// Failures of the completion capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The provider throttled the request. `detail` is either a structured error payload or plain text.
    RateLimited { detail: String },
    /// The credential is missing or rejected.
    Auth { message: String },
    /// Anything else: network failures, unexpected statuses, undecodable responses.
    Transport { message: String },
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::RateLimited { detail } => write!(f, "RateLimited: {}", detail),
            CompletionError::Auth { message } => write!(f, "AuthError: {}", message),
            CompletionError::Transport { message } => write!(f, "TransportError: {}", message),
        }
    }
}

impl Error for CompletionError {}

/// Async completion capability.
#[async_trait]
pub trait Complete: Send + Sync {
    /// Whether the configured credential is accepted. Any failure is `false`.
    async fn validate_credential(&self) -> bool;

    /// Send `prompt` as a single user message, requesting a JSON object reply.
    async fn complete(&self, prompt: &str) -> Result<CompletionReply, CompletionError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use async_trait::async_trait;
    use super::{Complete, CompletionError, CompletionReply};

    /// Plays back scripted replies in order, optionally after a delay, and records the prompts it was sent.
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        script: Mutex<VecDeque<(Duration, Result<CompletionReply, CompletionError>)>>,
        pub prompts: Mutex<Vec<String>>,
        pub credential_ok: bool,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self { credential_ok: true, ..Self::default() }
        }

        pub fn then(self, reply: Result<CompletionReply, CompletionError>) -> Self {
            self.then_after(Duration::ZERO, reply)
        }

        pub fn then_content(self, content: &str) -> Self {
            self.then(Ok(CompletionReply::with_content(content)))
        }

        pub fn then_after(self, delay: Duration, reply: Result<CompletionReply, CompletionError>) -> Self {
            self.script.lock().unwrap().push_back((delay, reply));
            self
        }

        pub fn sent(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Complete for ScriptedClient {
        async fn validate_credential(&self) -> bool {
            self.credential_ok
        }

        async fn complete(&self, prompt: &str) -> Result<CompletionReply, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self.script.lock().unwrap().pop_front();
            let (delay, reply) = next.unwrap_or_else(|| (Duration::ZERO, Err(CompletionError::Transport {
                message: "script exhausted".to_string(),
            })));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
        }
    }
}

#[cfg(test)]
mod test_llm {
    use super::{CompletionReply, ReplyChoice};

    #[test]
    fn test_first_content() {
        assert_eq!(CompletionReply::default().first_content(), None);
        let reply = CompletionReply { choices: vec![ReplyChoice { content: None }, ReplyChoice::default()] };
        assert_eq!(reply.first_content(), None);
        let reply: CompletionReply = serde_json::from_str(r#"{"choices":[{"content":"{}"},{"content":"x"}]}"#).unwrap();
        assert_eq!(reply.first_content(), Some("{}"));
    }
}
