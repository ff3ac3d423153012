//! Error taxonomy for everything that crosses the engine boundary.
//!
//! The load orchestrator and the action dispatcher never propagate these past
//! their own task; they are turned into messages and [`TableEvent`]s instead.
//!
//! [`TableEvent`]: crate::table::TableEvent

use thiserror::Error;

/// Errors produced by the remote backend and the detail/action collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Transport failure or an unmapped non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// The session token was rejected; the host should send the user back to login.
    #[error("authentication expired")]
    AuthExpired,

    /// A business error code reported by the backend.
    #[error("backend error {code}: {message}")]
    Domain {
        /// Numeric code as sent by the backend (`errorCode`).
        code: u16,
        /// Backend-provided description.
        message: String,
    },

    /// Anything else: undecodable payloads, unexpected shapes.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl EngineError {
    /// Generic message suitable for the message channel.
    ///
    /// Domain errors carry their own text because the caller maps them to a
    /// contextual message; everything else gets a fixed fallback.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "The backend could not be reached, please try again".to_owned(),
            Self::AuthExpired => "Your session has expired, please log in again".to_owned(),
            Self::Domain { message, .. } => message.clone(),
            Self::Unexpected(_) => "An unexpected error occurred".to_owned(),
        }
    }

    /// Transient failures are expected to clear up on the next poll tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Unexpected(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}

/// Result alias used by the backend seams.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
