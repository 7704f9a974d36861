//! The execution capability.

use std::future::Future;

use codesync_protocol::{LanguageTag, OutputLine, ServerMessage};

use crate::ExecError;

/// Output of one run: ordered lines plus whether the run succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    pub outputs: Vec<OutputLine>,
    pub success: bool,
}

impl ExecutionResult {
    /// A failed run with a single error line.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            outputs: vec![OutputLine::error(message)],
            success: false,
        }
    }

    pub fn into_message(self) -> ServerMessage {
        ServerMessage::ExecutionResult {
            outputs: self.outputs,
            success: self.success,
        }
    }
}

impl From<ExecError> for ExecutionResult {
    fn from(err: ExecError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Runs source code and reports what it printed.
///
/// `Send + Sync + 'static` because one executor is shared by every
/// execution task the gateway spawns. Implementations must always return
/// (no panics on bad input) and must bound how long a run can take.
///
/// # Example
///
/// ```rust
/// use codesync_exec::{ExecutionResult, Executor};
/// use codesync_protocol::{LanguageTag, OutputLine};
///
/// /// Echoes the source back instead of running it.
/// struct EchoExecutor;
///
/// impl Executor for EchoExecutor {
///     async fn execute(&self, _language: LanguageTag, source: String) -> ExecutionResult {
///         ExecutionResult {
///             outputs: vec![OutputLine::log(source)],
///             success: true,
///         }
///     }
/// }
/// ```
pub trait Executor: Send + Sync + 'static {
    fn execute(
        &self,
        language: LanguageTag,
        source: String,
    ) -> impl Future<Output = ExecutionResult> + Send;
}
