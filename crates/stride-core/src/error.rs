//! Error types for the agent core.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single tool call.
///
/// These never abort the run: the executor renders them as `ERROR: <msg>`
/// in the call's result slot so the model can see and react to the failure
/// on its next turn.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ToolCallError {
    /// Error the model should correct (bad path, missing file, I/O failure).
    #[error("{0}")]
    RespondToModel(String),

    /// The command policy refused to execute (denylist or missing permission).
    #[error("{0}")]
    Denied(String),
}

/// Fatal errors that end the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("openai call: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("openai call timed out after {0:?}")]
    ApiTimeout(Duration),

    #[error("empty completion")]
    EmptyCompletion,

    #[error("stopped: exceeded max steps")]
    MaxSteps,

    /// A tool task died for infrastructural reasons (panic, abort), as
    /// opposed to returning a tool error.
    #[error("tool task failed: {0}")]
    TaskJoin(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the agent core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_error_displays_bare_message() {
        let err = ToolCallError::RespondToModel("no such file".to_string());
        assert_eq!(format!("{err}"), "no such file");

        let err = ToolCallError::Denied("write permissions required".to_string());
        assert_eq!(format!("{err}"), "write permissions required");
    }

    #[test]
    fn fatal_errors_carry_context() {
        assert_eq!(
            format!("{}", Error::MaxSteps),
            "stopped: exceeded max steps"
        );
        assert_eq!(format!("{}", Error::EmptyCompletion), "empty completion");
        assert!(
            format!("{}", Error::TaskJoin("panicked".to_string())).contains("panicked")
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
