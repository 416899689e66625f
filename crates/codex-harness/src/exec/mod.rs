//! Process seam for the cooperative (async) discipline.
//!
//! [`ExecRunner`] starts one `codex exec` process per turn and hands back a
//! [`LineSource`]. Tests substitute scripted runners; production code uses
//! [`ProcessRunner`].

mod process;

use std::process::ExitStatus;
use std::time::Duration;

pub use process::ProcessRunner;

use crate::cancel::CancelSignal;
use crate::codec::ExecCommand;
use crate::errors::CodexError;

/// Grace period between the polite termination request and a forced kill.
pub(crate) const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// One observation from the process's standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLine {
    /// A line with its trailing newline removed.
    Line(String),
    /// Output ended and the process exited successfully.
    Closed { stderr: String },
}

/// Starts processes for turns.
#[async_trait::async_trait]
pub trait ExecRunner: Send + Sync {
    /// Spawns the process, writes `command.stdin` and closes it.
    ///
    /// When `signal` is provided the returned source must observe it while
    /// waiting for output and answer [`CodexError::Cancelled`] once set.
    async fn start(
        &self,
        command: ExecCommand,
        signal: Option<CancelSignal>,
    ) -> Result<Box<dyn LineSource>, CodexError>;
}

/// Output lines of one running process.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// Waits for the next line or the end of output.
    ///
    /// A non-zero exit is reported as [`CodexError::Exec`] carrying stderr.
    async fn next_line(&mut self) -> Result<ProcessLine, CodexError>;

    /// Stops the process (graceful signal, then forced) and releases it.
    ///
    /// Safe to call more than once and after the process exited on its own.
    async fn terminate(&mut self);
}

pub(crate) fn exit_failure(status: ExitStatus, stderr: String) -> CodexError {
    let message = match status.code() {
        Some(code) => format!("codex exec exited with code {code}"),
        None => "codex exec was terminated by a signal".to_string(),
    };
    CodexError::Exec { message, stderr }
}

pub(crate) fn spawn_failure(executable: &std::path::Path, err: std::io::Error) -> CodexError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return CodexError::ExecutableNotFound {
            message: format!("{}: {err}", executable.display()),
        };
    }
    CodexError::Spawn(format!("{}: {err}", executable.display()))
}

/// Sends SIGTERM so the CLI can flush and exit on its own.
#[cfg(unix)]
pub(crate) fn request_terminate(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: `kill` has no memory-safety preconditions; the pid belongs to a
    // child we have not reaped yet.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
pub(crate) fn request_terminate(_pid: Option<u32>) {}

/// Trims the line terminator and decodes lossily.
pub(crate) fn decode_line_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
