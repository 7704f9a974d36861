//! Runs code in a child interpreter process.
//!
//! stdout and stderr are read concurrently and merged into one sequence in
//! the order lines arrive. Collection stops at [`OutputLimits`]; a run that
//! hits a limit is killed and its output ends with a truncation line.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use codesync_protocol::{LanguageTag, OutputKind, OutputLine};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{Semaphore, mpsc};

use crate::{ExecError, ExecutionResult, Executor};

/// How long a run may take before the child is killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Most output lines kept from one run.
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 1_000;

/// Most output bytes kept from one run, stdout and stderr combined.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Runs allowed at the same time per executor.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Lines buffered between the pipe readers and the collector.
const LINE_CHANNEL_SIZE: usize = 64;

/// An interpreter invocation that reads a program from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl InterpreterCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
        }
    }
}

/// Caps on what one run may print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub max_lines: usize,
    /// Counted over line contents, so line endings and blank lines are
    /// free. Each pipe is also cut off after this many raw bytes.
    pub max_bytes: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_OUTPUT_LINES,
            max_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// An [`Executor`] that runs each language in its own child process.
///
/// Defaults: `node -` for JavaScript and `python3 -` for Python, with the
/// source written to the child's stdin. HTML has no interpreter.
///
/// stdout lines become `log` output and stderr lines become `error`
/// output; blank lines are dropped. A child process cannot tell this
/// backend which console method produced a line, so `warn`, `info` and
/// `result` lines never appear here. `console.warn` in node, for one,
/// arrives as `error`.
///
/// At most [`DEFAULT_MAX_CONCURRENT_RUNS`] runs proceed at once; further
/// requests fail straight away with [`ExecError::Busy`]. Clones share the
/// same limit.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    commands: HashMap<LanguageTag, InterpreterCommand>,
    timeout: Duration,
    limits: OutputLimits,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        let mut commands = HashMap::new();
        commands.insert(
            LanguageTag::JavaScript,
            InterpreterCommand::new("node", &["-"]),
        );
        commands.insert(
            LanguageTag::Python,
            InterpreterCommand::new("python3", &["-"]),
        );
        Self {
            commands,
            timeout: DEFAULT_TIMEOUT,
            limits: OutputLimits::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT_RUNS,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_RUNS)),
        }
    }

    /// Sets how long a run may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the interpreter used for `language`.
    pub fn with_command(mut self, language: LanguageTag, command: InterpreterCommand) -> Self {
        self.commands.insert(language, command);
        self
    }

    /// Stops running `language` at all.
    pub fn without_language(mut self, language: LanguageTag) -> Self {
        self.commands.remove(&language);
        self
    }

    pub fn with_output_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets how many runs may proceed at once (at least one).
    pub fn with_max_concurrent(mut self, runs: usize) -> Self {
        let runs = runs.max(1);
        self.max_concurrent = runs;
        self.permits = Arc::new(Semaphore::new(runs));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn output_limits(&self) -> OutputLimits {
        self.limits
    }

    /// Runs `source` and collects its output.
    ///
    /// # Errors
    /// - [`ExecError::Unsupported`] if no interpreter is configured
    /// - [`ExecError::Busy`] if the concurrency limit is reached
    /// - [`ExecError::Spawn`] if the interpreter cannot be started
    /// - [`ExecError::Timeout`] if the run exceeds the timeout (the child
    ///   is killed)
    /// - [`ExecError::Io`] if waiting on the child fails
    pub async fn run(
        &self,
        language: LanguageTag,
        source: &str,
    ) -> Result<ExecutionResult, ExecError> {
        let command = self
            .commands
            .get(&language)
            .ok_or(ExecError::Unsupported(language))?;
        let _permit = self
            .permits
            .try_acquire()
            .map_err(|_| ExecError::Busy(self.max_concurrent))?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return;
            };
            // The child may exit without reading everything.
            if let Err(e) = stdin.write_all(source.as_bytes()).await {
                tracing::debug!(error = %e, "child closed stdin early");
            }
        };

        let limits = self.limits;
        // On timeout this future is dropped with the child in it, which
        // kills the child.
        let finish = async move {
            let (_, collected) = tokio::join!(feed, collect_output(stdout, stderr, limits));
            if collected.truncated {
                // Nothing reads its pipes any more.
                if let Err(e) = child.start_kill() {
                    tracing::debug!(error = %e, "child already gone");
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((collected, status))
        };
        let (collected, status) = tokio::time::timeout(self.timeout, finish)
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))?
            .map_err(ExecError::Io)?;

        tracing::debug!(
            %language,
            %status,
            lines = collected.outputs.len(),
            truncated = collected.truncated,
            "execution finished"
        );

        Ok(ExecutionResult {
            success: status.success() && !collected.truncated,
            outputs: collected.outputs,
        })
    }
}

impl Executor for ProcessExecutor {
    async fn execute(&self, language: LanguageTag, source: String) -> ExecutionResult {
        match self.run(language, &source).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(%language, error = %e, "execution failed");
                e.into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output collection
// ---------------------------------------------------------------------------

/// What a pipe reader hands the collector.
#[derive(Debug)]
enum PipeEvent {
    Line(OutputLine),
    /// The pipe hit its byte cap; the rest of its output is discarded.
    Overflow,
}

#[derive(Debug, Default)]
struct Collected {
    outputs: Vec<OutputLine>,
    bytes: usize,
    truncated: bool,
}

impl Collected {
    /// Keeps `line` unless it would break a limit.
    fn push(&mut self, line: OutputLine, limits: OutputLimits) -> bool {
        let bytes = self.bytes + line.content.len();
        if self.outputs.len() >= limits.max_lines || bytes > limits.max_bytes {
            return false;
        }
        self.bytes = bytes;
        self.outputs.push(line);
        true
    }
}

/// Merges both pipes into one ordered list, stopping early at a limit.
async fn collect_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    limits: OutputLimits,
) -> Collected {
    let (tx, mut rx) = mpsc::channel(LINE_CHANNEL_SIZE);
    let cap = u64::try_from(limits.max_bytes).unwrap_or(u64::MAX);
    let readers = async move {
        tokio::join!(
            read_lines(stdout, OutputKind::Log, tx.clone(), cap),
            read_lines(stderr, OutputKind::Error, tx, cap),
        )
    };
    tokio::pin!(readers);

    let mut collected = Collected::default();
    let mut readers_done = false;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PipeEvent::Line(line)) => {
                    if !collected.push(line, limits) {
                        collected.truncated = true;
                        break;
                    }
                }
                Some(PipeEvent::Overflow) => {
                    collected.truncated = true;
                    break;
                }
                None => break,
            },
            _ = &mut readers, if !readers_done => readers_done = true,
        }
    }

    if collected.truncated {
        let kept = collected.outputs.len();
        collected
            .outputs
            .push(OutputLine::error(format!("Output truncated after {kept} lines")));
    }
    collected
}

/// Forwards the non-blank lines of one pipe, reading at most `max_bytes`.
async fn read_lines<R>(
    pipe: Option<R>,
    kind: OutputKind,
    tx: mpsc::Sender<PipeEvent>,
    max_bytes: u64,
) where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe.take(max_bytes));
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "reading child output failed");
                return;
            }
        }
        let Some(content) = line_content(&buf) else {
            continue;
        };
        if tx.send(PipeEvent::Line(OutputLine::new(kind, content))).await.is_err() {
            return;
        }
    }

    if reader.get_ref().limit() == 0 {
        let _ = tx.send(PipeEvent::Overflow).await;
    }
}

/// The text of one raw output line, or `None` if it is blank.
fn line_content(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\n', '\r']);
    (!text.trim().is_empty()).then(|| text.to_owned())
}
