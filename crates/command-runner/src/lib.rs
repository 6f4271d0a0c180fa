//! External process execution for extraction tools.
//!
//! Runs a command to completion, captures stdout as one text blob, and
//! delivers stderr lines to a caller-supplied sink as they arrive. The
//! worker-termination convention lives here: a process killed by an external
//! signal reports [`WORKER_TERM_EXIT_CODE`], which every consumer translates
//! to a recoverable interrupt rather than a failure.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

pub mod progress;

pub use progress::{Clock, ProgressThrottle, SystemClock};

/// Conventional exit code of a worker process killed by its supervisor
/// (128 + SIGKILL). Signal-death without an exit code is normalized to this
/// value so consumers only ever see one "terminated externally" code.
pub const WORKER_TERM_EXIT_CODE: i32 = 137;

/// Captured result of a completed process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
}

impl CommandOutput {
    /// True if the process was terminated externally rather than exiting on
    /// its own terms.
    pub fn was_terminated(&self) -> bool {
        self.exit_code == WORKER_TERM_EXIT_CODE
    }
}

/// Receives stderr lines as the child produces them.
pub trait StderrSink: Send {
    fn line(&mut self, line: &str);
}

/// Sink that discards lines; for tools whose stderr is uninteresting.
#[derive(Debug, Default)]
pub struct NullSink;

impl StderrSink for NullSink {
    fn line(&mut self, _line: &str) {}
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion.
///
/// Blocks the calling task for the duration of the run; cancellation happens
/// only through OS-level signals delivered to the child, which surface as
/// [`WORKER_TERM_EXIT_CODE`].
pub async fn run_command(
    program: impl AsRef<Path>,
    args: &[&OsStr],
    envs: &[(&str, &str)],
    sink: &mut dyn StderrSink,
) -> Result<CommandOutput, CommandError> {
    let program = program.as_ref();
    let label = program.display().to_string();

    let mut child = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: label.clone(),
            source,
        })?;

    // Both pipes were requested above; take() can only be None if we are
    // called twice on the same child, which we never are.
    let mut stdout_pipe = child.stdout.take().ok_or_else(|| CommandError::Io {
        program: label.clone(),
        source: std::io::Error::other("stdout pipe missing"),
    })?;
    let stderr_pipe = child.stderr.take().ok_or_else(|| CommandError::Io {
        program: label.clone(),
        source: std::io::Error::other("stderr pipe missing"),
    })?;

    // Drain both pipes concurrently so a chatty tool can never deadlock on
    // a full pipe.
    let stdout_task = async {
        let mut buf = String::new();
        stdout_pipe.read_to_string(&mut buf).await.map(|_| buf)
    };
    let stderr_task = async {
        let mut lines = BufReader::new(stderr_pipe).lines();
        while let Some(line) = lines.next_line().await? {
            sink.line(&line);
        }
        Ok::<(), std::io::Error>(())
    };
    let (stdout_res, stderr_res) = tokio::join!(stdout_task, stderr_task);
    let stdout = stdout_res.map_err(|source| CommandError::Io {
        program: label.clone(),
        source,
    })?;
    stderr_res.map_err(|source| CommandError::Io {
        program: label.clone(),
        source,
    })?;

    let status = child.wait().await.map_err(|source| CommandError::Io {
        program: label.clone(),
        source,
    })?;
    let exit_code = status.code().unwrap_or(WORKER_TERM_EXIT_CODE);

    tracing::debug!(program = %label, exit_code, "command finished");
    Ok(CommandOutput { exit_code, stdout })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectSink(Vec<String>);

    impl StderrSink for CollectSink {
        fn line(&mut self, line: &str) {
            self.0.push(line.to_string());
        }
    }

    fn os(args: &[&str]) -> Vec<std::ffi::OsString> {
        args.iter().map(|&a| a.into()).collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_streams_stderr() {
        let args = os(&["-c", "printf 'out'; echo e1 >&2; echo e2 >&2"]);
        let argrefs: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        let mut sink = CollectSink(Vec::new());
        let out = run_command("sh", &argrefs, &[], &mut sink).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "out");
        assert_eq!(sink.0, vec!["e1", "e2"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_normalizes_to_worker_term_code() {
        let args = os(&["-c", "kill -9 $$"]);
        let argrefs: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        let mut sink = NullSink;
        let out = run_command("sh", &argrefs, &[], &mut sink).await.unwrap();
        assert_eq!(out.exit_code, WORKER_TERM_EXIT_CODE);
        assert!(out.was_terminated());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn plain_exit_codes_pass_through() {
        let args = os(&["-c", "exit 6"]);
        let argrefs: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        let mut sink = NullSink;
        let out = run_command("sh", &argrefs, &[], &mut sink).await.unwrap();
        assert_eq!(out.exit_code, 6);
        assert!(!out.was_terminated());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let mut sink = NullSink;
        let err = run_command("omniextract-no-such-tool", &[], &[], &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
