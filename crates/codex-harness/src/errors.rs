/// Failure raised when a turn's structured response is accessed.
///
/// These never surface during normal turn execution; they are produced lazily
/// by `Turn::structured_response` and cached with the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuredResponseError {
    /// Neither an output schema nor an output type was configured for the turn.
    #[error("no output schema or output type was configured for this turn")]
    NotConfigured,
    /// The final response is not valid JSON.
    #[error("final response is not valid JSON: {message}")]
    InvalidJson { message: String },
    /// The final response is JSON but does not match the declared output type.
    #[error("final response does not match the declared output type: {message}")]
    Validation { message: String },
}

/// Top-level error type for the public harness API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodexError {
    /// Invalid client or config-override configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The turn's output schema is not a JSON object or could not be written.
    #[error("output schema error: {0}")]
    OutputSchema(String),
    /// The `codex` executable could not be located.
    #[error("codex executable not found: {message}")]
    ExecutableNotFound { message: String },
    /// The process could not be started.
    #[error("failed to spawn codex: {0}")]
    Spawn(String),
    /// The process exited unsuccessfully or its pipes failed.
    #[error("{message}")]
    Exec { message: String, stderr: String },
    /// An output line could not be decoded into a known event shape.
    #[error("failed to decode event ({message}): {line}")]
    Decode { message: String, line: String },
    /// The event stream broke an ordering or identity invariant.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Output ended before `turn.completed` or `turn.failed` arrived.
    #[error("process exited without a terminal event{}", last_error_suffix(.last_error))]
    MissingTerminalEvent {
        last_error: Option<String>,
        stderr: String,
    },
    /// The process reported the turn as failed.
    #[error("turn failed: {message}")]
    TurnFailed { message: String },
    /// The turn was cancelled through its `CancelSignal`.
    #[error("turn cancelled")]
    Cancelled,
    /// `result` was requested before the event stream was drained.
    #[error("streamed turn result requested before the event stream was fully consumed")]
    StreamNotConsumed,
    /// Another turn is still outstanding on the same thread.
    #[error("a turn is already in flight on this thread")]
    TurnInFlight,
    /// Structured response access failed.
    #[error(transparent)]
    StructuredResponse(#[from] StructuredResponseError),
}

impl CodexError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn decode(message: impl std::fmt::Display, line: &str) -> Self {
        Self::Decode {
            message: message.to_string(),
            line: line.to_string(),
        }
    }

    /// Returns captured stderr for process-level failures.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Exec { stderr, .. } | Self::MissingTerminalEvent { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }

    /// True when the error is the distinguished cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(message) => format!(" (last stream error: {message})"),
        None => String::new(),
    }
}
