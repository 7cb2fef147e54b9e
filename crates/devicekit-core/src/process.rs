//! Asynchronous execution of external SDK tools.
//!
//! This module provides the [`ProcessRunner`] type, which spawns one external
//! tool invocation, captures stdout and stderr line by line, and normalizes
//! the exit code into a typed result. Every device-lifecycle manager in this
//! crate funnels its tool calls through here.
//!
//! Output lines are read by two independent per-stream tasks, tagged with
//! their origin and elapsed time, and drained through a channel by the
//! invocation task itself. An optional observer sees every line synchronously
//! before it is appended to the captured buffer, and may stop the invocation
//! by cancelling the [`CancellationToken`] it was given; cancellation kills
//! the child process immediately while preserving everything captured so far.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use devicekit_core::process::ProcessRunner;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = ProcessRunner::new();
//!     let cancel = CancellationToken::new();
//!     let result = runner
//!         .run(Path::new("adb"), &["devices"], &cancel)
//!         .await
//!         .unwrap();
//!     println!("{}", result.combined_output());
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Win32 reports this exit code (`STILL_ACTIVE`) while a process is still
/// finalizing. It is a documented platform race, not a failure.
const STILL_ACTIVE_EXIT_CODE: i32 = 259;
const STILL_ACTIVE_RETRIES: u32 = 3;
const STILL_ACTIVE_DELAY: Duration = Duration::from_millis(200);

/// Which stream a captured line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One captured line of tool output.
#[derive(Debug, Clone)]
pub struct OutputLine {
    /// The line text, without the trailing newline.
    pub data: String,
    /// Time since the process was started.
    pub elapsed: Duration,
    /// The stream the line arrived on.
    pub source: OutputSource,
}

impl OutputLine {
    /// Returns true when the line arrived on stderr.
    pub fn is_error(&self) -> bool {
        self.source == OutputSource::Stderr
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Immutable record of one finished (or killed) tool invocation.
///
/// Lines within one stream preserve emission order; interleaving between
/// stdout and stderr is whatever arrival order the drain loop observed.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    lines: Vec<OutputLine>,
    /// Normalized exit code of the process.
    pub exit_code: i32,
    /// Wall-clock instant the process was started.
    pub started_at: DateTime<Utc>,
    /// Total time from start to finalization.
    pub elapsed: Duration,
}

impl ProcessResult {
    /// Assembles a result from already-captured parts. The runner is the
    /// normal producer; this exists for tests and tooling that replay
    /// captured output.
    pub fn from_parts(
        lines: Vec<OutputLine>,
        exit_code: i32,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            lines,
            exit_code,
            started_at,
            elapsed,
        }
    }

    /// All captured lines, in arrival order.
    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    /// Number of captured lines across both streams.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The stdout lines only, in order.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| !line.is_error())
            .map(|line| line.data.as_str())
    }

    /// The stdout text joined with newlines.
    pub fn stdout(&self) -> String {
        self.stdout_lines().collect::<Vec<_>>().join("\n")
    }

    /// Every captured line (stdout and stderr) joined with newlines.
    pub fn combined_output(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.data.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns true when any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.data.contains(needle))
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed with exit code {} in {:?}",
            self.exit_code, self.elapsed
        )
    }
}

/// Errors produced by [`ProcessRunner`].
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The process could not be started at all.
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a nonzero code. Carries the full captured
    /// result for diagnostics and for callers that reclassify known
    /// benign failures by inspecting the output text.
    #[error("failed to execute {command} - exit code: {}\n{}", result.exit_code, result.combined_output())]
    Failed {
        command: String,
        result: ProcessResult,
    },

    /// The invocation was canceled and the child killed. Carries exactly the
    /// lines emitted before cancellation.
    #[error("canceled {command} after {} line(s)", result.line_count())]
    Canceled {
        command: String,
        result: ProcessResult,
    },

    /// An I/O error occurred while driving the process.
    #[error("i/o error while running process: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// The captured result, when this error carries one.
    pub fn result(&self) -> Option<&ProcessResult> {
        match self {
            ProcessError::Failed { result, .. } | ProcessError::Canceled { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }

    /// Consumes the error, returning the captured result when present.
    pub fn into_result(self) -> Option<ProcessResult> {
        match self {
            ProcessError::Failed { result, .. } | ProcessError::Canceled { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }
}

/// Spawns external tools and captures their output.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs a tool to completion, capturing all output.
    ///
    /// Fails with [`ProcessError::Failed`] on a nonzero exit code and
    /// [`ProcessError::Canceled`] when `cancel` fires mid-run; both carry
    /// the captured result.
    pub async fn run(
        &self,
        path: &Path,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ProcessError> {
        self.run_inner(path, args, None, None, cancel).await
    }

    /// Like [`run`](Self::run), but writes a single line to the tool's stdin
    /// first (used for tools that ask an interactive question).
    pub async fn run_with_input(
        &self,
        path: &Path,
        args: &[&str],
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ProcessError> {
        self.run_inner(path, args, Some(input), None, cancel).await
    }

    /// Like [`run`](Self::run), but offers every line to `observer` before it
    /// is appended to the captured buffer.
    ///
    /// The observer runs synchronously in stream-arrival order and must not
    /// block. To stop the invocation early, cancel the token that was passed
    /// in; the child is killed and the `Canceled` error carries everything
    /// captured up to that point.
    pub async fn run_observed(
        &self,
        path: &Path,
        args: &[&str],
        mut observer: impl FnMut(&OutputLine) + Send,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ProcessError> {
        self.run_inner(path, args, None, Some(&mut observer), cancel)
            .await
    }

    async fn run_inner(
        &self,
        path: &Path,
        args: &[&str],
        input: Option<&str>,
        mut observer: Option<&mut (dyn FnMut(&OutputLine) + Send)>,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, ProcessError> {
        let resolved = find_command(path);
        let command_line = render_command(&resolved, args);
        debug!(command = %command_line, "starting process");

        let mut command = Command::new(&resolved);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                // A child that fails fast may exit without ever reading
                // stdin; the resulting broken pipe is not the interesting
                // error here.
                let written = async {
                    stdin.write_all(input.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.shutdown().await
                }
                .await;
                if let Err(err) = written {
                    if err.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(err.into());
                    }
                }
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_reader(child.stdout.take(), OutputSource::Stdout, clock, tx.clone());
        spawn_reader(child.stderr.take(), OutputSource::Stderr, clock, tx);

        let mut lines: Vec<OutputLine> = Vec::new();
        let mut canceled = false;

        // Drain until both stream readers have finished; the result is not
        // final before then, so no trailing output is lost. On cancellation
        // the child is killed, the lines already in the channel are
        // collected, and the wait for end-of-stream is skipped - detached
        // grandchildren (the emulator proper) may hold the pipes open
        // indefinitely.
        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !canceled => {
                    canceled = true;
                    let _ = child.start_kill();
                    while let Ok(line) = rx.try_recv() {
                        if let Some(observer) = observer.as_deref_mut() {
                            observer(&line);
                        }
                        lines.push(line);
                    }
                    break;
                }
                line = rx.recv() => match line {
                    Some(line) => {
                        if let Some(observer) = observer.as_deref_mut() {
                            observer(&line);
                        }
                        lines.push(line);
                    }
                    None => break,
                }
            }
        }

        let status = child.wait().await?;
        let mut exit_code = status.code().unwrap_or(-1);
        if exit_code == STILL_ACTIVE_EXIT_CODE {
            // Re-poll while the sentinel persists; a stuck sentinel is the
            // platform race and counts as a clean exit.
            for _ in 0..STILL_ACTIVE_RETRIES {
                tokio::time::sleep(STILL_ACTIVE_DELAY).await;
                if let Ok(Some(status)) = child.try_wait() {
                    exit_code = status.code().unwrap_or(-1);
                }
                if exit_code != STILL_ACTIVE_EXIT_CODE {
                    break;
                }
            }
            if exit_code == STILL_ACTIVE_EXIT_CODE {
                exit_code = 0;
            }
        }

        let result = ProcessResult {
            lines,
            exit_code,
            started_at,
            elapsed: clock.elapsed(),
        };

        if canceled {
            return Err(ProcessError::Canceled {
                command: command_line,
                result,
            });
        }
        if result.exit_code != 0 {
            return Err(ProcessError::Failed {
                command: command_line,
                result,
            });
        }

        debug!(exit_code = result.exit_code, elapsed_ms = result.elapsed.as_millis() as u64, "process completed");
        trace!(output = %result.combined_output());
        Ok(result)
    }
}

/// Resolves a command path, probing sibling paths with platform-typical
/// executable suffixes before falling back to PATH lookup.
fn find_command(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    for candidate in [
        path.with_extension("exe"),
        path.with_extension(""),
        path.with_extension("bat"),
    ] {
        if candidate.exists() {
            return candidate;
        }
    }
    path.to_path_buf()
}

fn render_command(path: &Path, args: &[&str]) -> String {
    let mut command = path.display().to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

fn spawn_reader<R>(
    stream: Option<R>,
    source: OutputSource,
    clock: Instant,
    tx: mpsc::UnboundedSender<OutputLine>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(data)) = lines.next_line().await {
            let line = OutputLine {
                data,
                elapsed: clock.elapsed(),
                source,
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
