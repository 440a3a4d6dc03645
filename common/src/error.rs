use thiserror::Error;

use crate::event::Event;

/// Malformed scenario text. `offset` is the byte offset of the offending
/// character; for an unterminated group it points at the opening delimiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Every failure the interpreter can surface.
///
/// Binding and resolution errors are local to a single command invocation.
/// Invariant and expectation failures abort the remaining checks for the
/// current event but leave the event's side effects in place. The event
/// pipeline wraps whatever bubbles up in [`ScenarioError::EventProcessing`]
/// together with the offending event.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unable to bind argument `{arg}` from `{event}`: {reason}")]
    ArgumentBinding {
        arg: String,
        event: String,
        reason: String,
    },

    #[error("no handler in family `{family}` matched `{head}`")]
    CommandNotFound { family: String, head: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("expectation failed: {0}")]
    ExpectationFailure(String),

    #[error("`{source}` when processing `{event}`")]
    EventProcessing {
        source: Box<ScenarioError>,
        event: Event,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("{what} depth exceeded (limit {limit})")]
    DepthExceeded { what: &'static str, limit: u32 },

    /// Raised explicitly from a script via `Throw`.
    #[error("{0}")]
    Raised(String),
}

impl ScenarioError {
    /// Wrap an error with the event that was being processed.
    pub fn while_processing(self, event: Event) -> Self {
        ScenarioError::EventProcessing {
            source: Box::new(self),
            event,
        }
    }

    pub fn binding(arg: &str, event: &Event, reason: impl Into<String>) -> Self {
        ScenarioError::ArgumentBinding {
            arg: arg.to_owned(),
            event: event.to_line(),
            reason: reason.into(),
        }
    }

    /// The root cause of a (possibly nested) processing error.
    pub fn root_cause(&self) -> &ScenarioError {
        match self {
            ScenarioError::EventProcessing { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
