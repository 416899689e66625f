use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};
use tracing::{debug, warn};

use super::{ExecRunner, LineSource};
use crate::cancel::{BlockingWaiter, CancelSignal};
use crate::codec::ExecCommand;
use crate::errors::CodexError;
use crate::exec::{
    ProcessLine, TERMINATE_GRACE, decode_line_bytes, exit_failure, request_terminate,
    spawn_failure,
};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `codex exec` as a std child process with reader threads.
#[derive(Clone, Debug)]
pub struct BlockingProcessRunner {
    executable: PathBuf,
    launcher_args: Vec<String>,
}

impl BlockingProcessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            launcher_args: Vec::new(),
        }
    }

    /// Arguments placed between the executable and the `exec` arguments.
    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl ExecRunner for BlockingProcessRunner {
    fn start(
        &self,
        command: ExecCommand,
        signal: Option<CancelSignal>,
    ) -> Result<Box<dyn LineSource>, CodexError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.launcher_args)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !command.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&command.env);

        let mut child = cmd
            .spawn()
            .map_err(|err| spawn_failure(&self.executable, err))?;
        debug!(
            pid = child.id(),
            executable = %self.executable.display(),
            "spawned codex exec (blocking)"
        );

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CodexError::Spawn("child process is missing stdio pipes".into()));
        };

        let (line_tx, lines) = channel::unbounded::<std::io::Result<Vec<u8>>>();
        let stdout_reader = std::thread::Builder::new()
            .name("codex-stdout".into())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                loop {
                    let mut buf = Vec::new();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            if line_tx.send(Ok(buf)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            let _ = line_tx.send(Err(err));
                            break;
                        }
                    }
                }
            });
        let stderr_thread = std::thread::Builder::new()
            .name("codex-stderr".into())
            .spawn(move || {
                let mut buf = Vec::new();
                let mut stderr = stderr;
                if let Err(err) = stderr.read_to_end(&mut buf) {
                    warn!(error = %err, "failed to read codex stderr");
                }
                String::from_utf8_lossy(&buf).into_owned()
            });

        // The stdout reader is detached; the channel disconnecting marks EOF.
        let stderr_thread = match (stdout_reader, stderr_thread) {
            (Ok(_), Ok(stderr_thread)) => stderr_thread,
            (Err(err), _) | (_, Err(err)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CodexError::Spawn(format!("failed to start reader thread: {err}")));
            }
        };

        let cancel = signal
            .as_ref()
            .map(CancelSignal::blocking_waiter)
            .unwrap_or_else(BlockingWaiter::never);
        let mut source = BlockingLines {
            child,
            lines,
            stderr_thread: Some(stderr_thread),
            signal,
            cancel,
            finished: false,
        };

        let written = stdin
            .write_all(command.stdin.as_bytes())
            .and_then(|()| stdin.flush());
        drop(stdin);
        if let Err(err) = written
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            source.terminate();
            let stderr = source.collect_stderr();
            return Err(CodexError::Exec {
                message: format!("failed to write prompt to codex stdin: {err}"),
                stderr,
            });
        }

        Ok(Box::new(source))
    }
}

struct BlockingLines {
    child: Child,
    lines: Receiver<std::io::Result<Vec<u8>>>,
    stderr_thread: Option<JoinHandle<String>>,
    signal: Option<CancelSignal>,
    cancel: BlockingWaiter,
    finished: bool,
}

impl BlockingLines {
    fn collect_stderr(&mut self) -> String {
        match self.stderr_thread.take() {
            Some(thread) => thread.join().unwrap_or_default(),
            None => String::new(),
        }
    }

    fn cancelled(&mut self) -> Result<ProcessLine, CodexError> {
        debug!(pid = self.child.id(), "turn cancelled while awaiting output");
        self.terminate();
        Err(CodexError::Cancelled)
    }
}

impl LineSource for BlockingLines {
    fn next_line(&mut self) -> Result<ProcessLine, CodexError> {
        if self.finished {
            return Ok(ProcessLine::Closed {
                stderr: String::new(),
            });
        }
        if self.signal.as_ref().is_some_and(CancelSignal::is_cancelled) {
            return self.cancelled();
        }

        let received = channel::select! {
            recv(self.cancel.receiver()) -> _ => None,
            recv(self.lines) -> line => Some(line),
        };

        match received {
            None => self.cancelled(),
            Some(Ok(Ok(bytes))) => Ok(ProcessLine::Line(decode_line_bytes(&bytes))),
            Some(Ok(Err(err))) => {
                self.terminate();
                let stderr = self.collect_stderr();
                Err(CodexError::Exec {
                    message: format!("failed to read codex stdout: {err}"),
                    stderr,
                })
            }
            Some(Err(_disconnected)) => {
                let status = self.child.wait();
                let stderr = self.collect_stderr();
                self.finished = true;
                match status {
                    Ok(status) if status.success() => Ok(ProcessLine::Closed { stderr }),
                    Ok(status) => Err(exit_failure(status, stderr)),
                    Err(err) => Err(CodexError::Exec {
                        message: format!("failed to wait for codex exec: {err}"),
                        stderr,
                    }),
                }
            }
        }
    }

    fn terminate(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        request_terminate(Some(self.child.id()));
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if matches!(self.child.try_wait(), Ok(Some(_))) {
                return;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
        debug!(pid = self.child.id(), "codex exec ignored SIGTERM, killing");
        if let Err(err) = self.child.kill() {
            warn!(error = %err, "failed to kill codex exec");
        }
        let _ = self.child.wait();
    }
}

impl Drop for BlockingLines {
    fn drop(&mut self) {
        self.terminate();
    }
}
