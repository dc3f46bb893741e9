use thiserror::Error;

use crate::services::wizard::{WizardAction, WizardStep};

/// Incomplete or invalid user input. Blocks forward navigation; the UI
/// recovers by keeping the action disabled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown theme: {0}")]
    UnknownTheme(String),
    #[error("unknown style: {0}")]
    UnknownStyle(String),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("topic is {len} characters, at most {max} allowed")]
    TopicTooLong { len: usize, max: usize },
    #[error("a theme must be selected first")]
    MissingTheme,
    #[error("a style must be selected first")]
    MissingStyle,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("cannot {action} from the {from} step")]
    InvalidTransition { from: WizardStep, action: WizardAction },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure talking to the generation backend. Never shown as a hard error:
/// the orchestrator substitutes fallback content and keeps this as a notice.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("generation backend unreachable: {0}")]
    Unreachable(String),
    #[error("generation backend failed ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Whether the user should be offered a retry prompt.
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Timeout | GenerationError::Unreachable(_))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_decode() {
            GenerationError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            GenerationError::Backend {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            GenerationError::Unreachable(e.to_string())
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GenerationError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            GenerationError::Backend {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            GenerationError::Unreachable(e.to_string())
        }
    }
}

/// The media element refused to start, usually an autoplay policy. The
/// player stays paused until the user presses play.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("playback blocked: {reason}")]
pub struct PlaybackBlocked {
    pub reason: String,
}

impl PlaybackBlocked {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("sign in to save stories")]
    NotSignedIn,
    #[error("story store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("story store unreachable: {0}")]
    Transport(String),
    #[error("local story storage failed: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => PersistenceError::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => PersistenceError::Transport(e.to_string()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("please enter a valid email address")]
    InvalidEmail,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("name must not be empty")]
    MissingName,
    #[error("{0}")]
    Rejected(String),
    #[error("auth service unreachable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Transport(e.to_string())
    }
}
