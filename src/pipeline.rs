//! # Render/Invoke Pipeline
//!
//! One generation request moves through
//! `Idle -> Rendering -> Invoking -> Parsing -> Sanitizing -> Done`, or ends in `Failed`.
//!
//! * **Rendering** fills the template body with the Input values of a [Fill]er. Unresolved placeholders render empty.
//! * **Invoking** sends the rendered prompt to the [Complete] capability, asking for a JSON object.
//! * **Parsing** reads the first choice as a JSON object. A malformed reply is an empty object, not a failure.
//! * **Sanitizing** looks up every declared Output parameter in that object and [sanitize]s its value.
//!
//! The outcome is published on a [ResultBoard]: either a complete fresh [GenerationResult] or a single error message,
//! never a mix of old and new. Every request takes a token from a monotonically increasing counter; a request that is
//! no longer the latest when it finishes publishes nothing and reports [Outcome::Stale].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use log::{debug, info, warn};
use serde_json::Value;
use crate::filler::Fill;
use crate::pipeline::errors::GenerationError;
use crate::prompt::Template;
use crate::utils::JsonMap;
use crate::utils::llm::{Complete, CompletionError};
use crate::utils::postprocess::json::parse_reply_object;
use crate::utils::sanitize::sanitize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationState {
    #[default]
    Idle,
    Rendering,
    Invoking,
    Parsing,
    Sanitizing,
    Done,
    Failed,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sanitized value of one Output parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputValue {
    pub name: String,
    pub html: String,
}

/// Output values in the order the template declares its Output parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub outputs: Vec<OutputValue>,
}

impl GenerationResult {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.outputs.iter().find(|o| o.name == name).map(|o| o.html.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// What a display layer shows: the state of the latest request, its results and at most one error message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultBoard {
    pub state: GenerationState,
    pub in_progress: bool,
    pub result: GenerationResult,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published(GenerationResult),
    /// A later request started before this one finished; nothing was published.
    Stale,
}

/// Build the result set for `template` from a parsed reply. Every Output parameter gets an entry.
fn distribute(template: &Template, reply: &JsonMap) -> GenerationResult {
    let outputs = template.outputs()
        .map(|param| {
            let html = match reply.get(&param.name) {
                Some(Value::String(text)) => sanitize(text),
                Some(Value::Null) | None => String::new(),
                Some(other) => sanitize(&other.to_string()),
            };
            OutputValue { name: param.name.clone(), html }
        })
        .collect();
    GenerationResult { outputs }
}

pub struct Generator {
    client: Arc<dyn Complete>,
    latest: AtomicU64,
    blocked: AtomicBool,
    board: Mutex<ResultBoard>,
}

impl Generator {
    pub fn new(client: Arc<dyn Complete>) -> Self {
        Self {
            client,
            latest: AtomicU64::new(0),
            blocked: AtomicBool::new(false),
            board: Mutex::new(ResultBoard::default()),
        }
    }

    fn lock_board(&self) -> MutexGuard<'_, ResultBoard> {
        self.board.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in a client built for a new credential. Lifts the block left by a rejected credential.
    pub fn replace_client(&mut self, client: Arc<dyn Complete>) {
        self.client = client;
        self.blocked.store(false, Ordering::SeqCst);
    }

    /// Whether generation is refused until the client is replaced.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Ask the client whether its credential is accepted. A rejected credential blocks generation.
    pub async fn validate_credential(&self) -> bool {
        let valid = self.client.validate_credential().await;
        self.blocked.store(!valid, Ordering::SeqCst);
        if !valid {
            self.lock_board().error = Some(GenerationError::Auth.user_message());
        }
        valid
    }

    /// A copy of the current board.
    pub fn board(&self) -> ResultBoard {
        self.lock_board().clone()
    }

    pub fn dismiss_error(&self) {
        self.lock_board().error = None;
    }

    /// Supersede any request in flight and clear the board, e.g. because another template was selected.
    pub fn invalidate(&self) {
        let mut board = self.lock_board();
        self.latest.fetch_add(1, Ordering::SeqCst);
        *board = ResultBoard::default();
    }

    fn is_current(&self, token: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == token
    }

    fn begin(&self) -> u64 {
        let mut board = self.lock_board();
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        *board = ResultBoard {
            state: GenerationState::Rendering,
            in_progress: true,
            ..ResultBoard::default()
        };
        token
    }

    fn advance(&self, token: u64, state: GenerationState) {
        let mut board = self.lock_board();
        if self.is_current(token) {
            debug!("generation {} -> {}", token, state);
            board.state = state;
        }
    }

    fn fail(&self, token: u64, error: GenerationError) -> Result<Outcome, GenerationError> {
        let mut board = self.lock_board();
        if !self.is_current(token) {
            debug!("dropping failure of superseded generation {}: {}", token, error);
            return Ok(Outcome::Stale);
        }
        warn!("generation {} failed: {}", token, error);
        *board = ResultBoard {
            state: GenerationState::Failed,
            in_progress: false,
            result: GenerationResult::default(),
            error: Some(error.user_message()),
        };
        Err(error)
    }

    fn publish(&self, token: u64, result: GenerationResult) -> Outcome {
        let mut board = self.lock_board();
        if !self.is_current(token) {
            debug!("dropping result of superseded generation {}", token);
            return Outcome::Stale;
        }
        info!("generation {} done with {} outputs", token, result.outputs.len());
        *board = ResultBoard {
            state: GenerationState::Done,
            in_progress: false,
            result: result.clone(),
            error: None,
        };
        Outcome::Published(result)
    }

    /// Run one generation request for `template` with Input values from `filler`.
    ///
    /// Starting a request clears the previous results and error. Failures are both returned and shown on the board;
    /// a superseded request returns `Ok(Outcome::Stale)` whatever happened to it.
    pub async fn generate<F: Fill + ?Sized>(&self, template: &Template, filler: &F) -> Result<Outcome, GenerationError> {
        let token = self.begin();
        info!("generation {} started for template {}", token, template.name);
        if self.is_blocked() {
            return self.fail(token, GenerationError::Auth);
        }

        let mut partial_prompt = template.construct_prompt();
        if let Err(e) = filler.fill(&mut partial_prompt) {
            return self.fail(token, GenerationError::Render { message: format!("{:#}", e) });
        }
        let prompt = partial_prompt.render();

        self.advance(token, GenerationState::Invoking);
        let client = self.client.clone();
        let reply = match client.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, CompletionError::Auth { .. }) {
                    self.blocked.store(true, Ordering::SeqCst);
                }
                return self.fail(token, e.into());
            }
        };
        if !self.is_current(token) {
            debug!("generation {} superseded while invoking", token);
            return Ok(Outcome::Stale);
        }

        self.advance(token, GenerationState::Parsing);
        let parsed = parse_reply_object(reply.first_content());
        self.advance(token, GenerationState::Sanitizing);
        let result = distribute(template, &parsed);
        Ok(self.publish(token, result))
    }
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;
    use crate::utils::llm::CompletionError;
    use crate::utils::postprocess::json::extract_error_message;

    const RATE_LIMITED_FALLBACK: &str = "Rate limit reached, please try again later";

    /// Failures of a generation request. A malformed reply is not among them.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GenerationError {
        /// Credential missing or rejected. Generation stays blocked until the client is replaced.
        Auth,
        RateLimited { message: String },
        Transport { message: String },
        /// A filler failed to provide values.
        Render { message: String },
    }

    impl GenerationError {
        /// The text for the error slot.
        pub fn user_message(&self) -> String {
            match self {
                GenerationError::Auth => "Invalid API key".to_string(),
                GenerationError::RateLimited { message }
                | GenerationError::Transport { message }
                | GenerationError::Render { message } => message.clone(),
            }
        }
    }

    impl From<CompletionError> for GenerationError {
        fn from(error: CompletionError) -> Self {
            match error {
                CompletionError::Auth { .. } => GenerationError::Auth,
                CompletionError::RateLimited { detail } => {
                    let message = extract_error_message(&detail).unwrap_or_else(|| {
                        let detail = detail.trim();
                        if detail.is_empty() { RATE_LIMITED_FALLBACK.to_string() } else { detail.to_string() }
                    });
                    GenerationError::RateLimited { message }
                }
                CompletionError::Transport { message } => GenerationError::Transport { message },
            }
        }
    }

    impl fmt::Display for GenerationError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                GenerationError::Auth => write!(f, "AuthError: invalid or missing API key"),
                GenerationError::RateLimited { message } => write!(f, "RateLimited: {}", message),
                GenerationError::Transport { message } => write!(f, "TransportError: {}", message),
                GenerationError::Render { message } => write!(f, "RenderError: {}", message),
            }
        }
    }

    impl Error for GenerationError {}
}
