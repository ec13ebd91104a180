use std::time::Duration;
use thiserror::Error;

use crate::session::CallState;

/// Error types for call routing and session control
///
/// The variants follow the engine's recovery policy:
///
/// | variant | policy |
/// |---------|--------|
/// | `PatternNoMatch` | recovered locally by the dialplan default route |
/// | `Action { terminal: false }` | logged, the sequence continues |
/// | `Action { terminal: true }` | the action's destination is unreachable, the sequence falls through |
/// | `ExternalTimeout` / `ExternalNetwork` | failed-open, the caller applies its fallback route |
/// | `ExternalParse` | recovered locally by the caller's fallback route |
/// | `SessionGone` | ends the sequence and unwinds to teardown, not reported as a failure |
///
/// # Examples
///
/// ```
/// use callflow_call_engine::CallFlowError;
///
/// let err = CallFlowError::session_gone("call-1");
/// assert!(err.is_session_gone());
/// assert!(!err.is_recoverable());
/// ```
#[derive(Error, Debug)]
pub enum CallFlowError {
    /// No routing rule matched and no default route applies
    #[error("No route for destination '{0}'")]
    PatternNoMatch(String),

    /// A call-control action failed
    ///
    /// `terminal` is set when the action's destination is unreachable
    /// (bridge/transfer); transient failures leave the session intact.
    #[error("Action '{action}' failed: {message}")]
    Action {
        action: String,
        message: String,
        terminal: bool,
    },

    /// External service did not answer within the request timeout
    #[error("External service timed out after {0:?}")]
    ExternalTimeout(Duration),

    /// External service could not be reached or returned an error status
    #[error("External service error: {0}")]
    ExternalNetwork(String),

    /// External service answered with something that could not be interpreted
    #[error("External service response could not be parsed: {0}")]
    ExternalParse(String),

    /// The session (or its peer) hung up; the current sequence must unwind
    #[error("Session {0} is no longer usable")]
    SessionGone(String),

    /// A session state change that the lifecycle does not allow
    #[error("Invalid state transition for session {session}: {from:?} -> {to:?}")]
    InvalidTransition {
        session: String,
        from: CallState,
        to: CallState,
    },

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller-supplied input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Named menu, wizard, context or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallFlowError {
    pub fn action_transient<A: Into<String>, M: Into<String>>(action: A, message: M) -> Self {
        Self::Action {
            action: action.into(),
            message: message.into(),
            terminal: false,
        }
    }

    pub fn action_terminal<A: Into<String>, M: Into<String>>(action: A, message: M) -> Self {
        Self::Action {
            action: action.into(),
            message: message.into(),
            terminal: true,
        }
    }

    pub fn session_gone<S: Into<String>>(session: S) -> Self {
        Self::SessionGone(session.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// The session hung up; this is an expected end state, not a failure.
    pub fn is_session_gone(&self) -> bool {
        matches!(self, Self::SessionGone(_))
    }

    /// Whether a declared fallback can absorb this error without ending the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PatternNoMatch(_)
                | Self::ExternalTimeout(_)
                | Self::ExternalNetwork(_)
                | Self::ExternalParse(_)
                | Self::Action { .. }
        )
    }

    /// Failure of an action whose destination is unreachable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Action { terminal: true, .. })
    }

    /// Errors coming from an external service call.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::ExternalTimeout(_) | Self::ExternalNetwork(_) | Self::ExternalParse(_)
        )
    }
}

impl From<callflow_infra_common::Error> for CallFlowError {
    fn from(err: callflow_infra_common::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<regex::Error> for CallFlowError {
    fn from(err: regex::Error) -> Self {
        Self::Configuration(format!("invalid pattern: {}", err))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CallFlowError>;
