//! Code execution for CodeSync.
//!
//! The gateway never runs code itself. It hands a room's buffer to an
//! [`Executor`] and forwards the resulting output lines to whoever asked.
//! [`ProcessExecutor`] is the backend the server ships with: one child
//! interpreter process per run, fed the source on stdin and killed if it
//! outlives its timeout or prints past its output limits.

#![allow(async_fn_in_trait)]

mod error;
mod executor;
mod process;

pub use error::ExecError;
pub use executor::{ExecutionResult, Executor};
pub use process::{
    DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_OUTPUT_LINES,
    DEFAULT_TIMEOUT, InterpreterCommand, OutputLimits, ProcessExecutor,
};
