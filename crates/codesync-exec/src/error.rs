//! Error types for the execution layer.

use std::time::Duration;

use codesync_protocol::LanguageTag;

/// Why a run produced no regular output.
///
/// These never reach room state; the executor turns them into `error`
/// output lines for the requester.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// No interpreter is configured for the language.
    #[error("Execution not supported for {0}")]
    Unsupported(LanguageTag),

    /// Too many runs are already in progress.
    #[error("Too many executions running (limit {0}), try again shortly")]
    Busy(usize),

    /// The interpreter could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The interpreter ran longer than allowed and was killed.
    #[error("Execution timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Talking to the child process failed.
    #[error("execution I/O failed: {0}")]
    Io(#[source] std::io::Error),
}
