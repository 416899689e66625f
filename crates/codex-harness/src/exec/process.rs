use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    ExecRunner, LineSource, ProcessLine, TERMINATE_GRACE, decode_line_bytes, exit_failure,
    request_terminate, spawn_failure,
};
use crate::cancel::CancelSignal;
use crate::codec::ExecCommand;
use crate::errors::CodexError;

/// Runs `codex exec` as a tokio child process.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    executable: PathBuf,
    launcher_args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            launcher_args: Vec::new(),
        }
    }

    /// Arguments placed between the executable and the `exec` arguments,
    /// for example a script path when `executable` is an interpreter.
    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }
}

#[async_trait::async_trait]
impl ExecRunner for ProcessRunner {
    async fn start(
        &self,
        command: ExecCommand,
        signal: Option<CancelSignal>,
    ) -> Result<Box<dyn LineSource>, CodexError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.launcher_args)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
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
            args = command.args.len(),
            "spawned codex exec"
        );

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(CodexError::Spawn("child process is missing stdio pipes".into()));
        };

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut stderr = stderr;
            if let Err(err) = stderr.read_to_end(&mut buf).await {
                warn!(error = %err, "failed to read codex stderr");
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut source = ProcessLines {
            child,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            signal,
            buf: Vec::new(),
            finished: false,
        };

        let written = async {
            stdin.write_all(command.stdin.as_bytes()).await?;
            stdin.shutdown().await
        }
        .await;
        drop(stdin);
        if let Err(err) = written
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            source.terminate().await;
            let stderr = source.collect_stderr().await;
            return Err(CodexError::Exec {
                message: format!("failed to write prompt to codex stdin: {err}"),
                stderr,
            });
        }

        Ok(Box::new(source))
    }
}

struct ProcessLines {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    signal: Option<CancelSignal>,
    buf: Vec<u8>,
    finished: bool,
}

enum ReadOutcome {
    Cancelled,
    Read(std::io::Result<usize>),
}

impl ProcessLines {
    async fn collect_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait::async_trait]
impl LineSource for ProcessLines {
    async fn next_line(&mut self) -> Result<ProcessLine, CodexError> {
        if self.finished {
            return Ok(ProcessLine::Closed {
                stderr: String::new(),
            });
        }

        self.buf.clear();
        let outcome = match &self.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => ReadOutcome::Cancelled,
                    read = self.stdout.read_until(b'\n', &mut self.buf) => ReadOutcome::Read(read),
                }
            }
            None => ReadOutcome::Read(self.stdout.read_until(b'\n', &mut self.buf).await),
        };

        match outcome {
            ReadOutcome::Cancelled => {
                debug!(pid = self.child.id(), "turn cancelled while awaiting output");
                self.terminate().await;
                Err(CodexError::Cancelled)
            }
            ReadOutcome::Read(Ok(0)) => {
                let status = self.child.wait().await;
                let stderr = self.collect_stderr().await;
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
            ReadOutcome::Read(Ok(_)) => Ok(ProcessLine::Line(decode_line_bytes(&self.buf))),
            ReadOutcome::Read(Err(err)) => {
                self.terminate().await;
                let stderr = self.collect_stderr().await;
                Err(CodexError::Exec {
                    message: format!("failed to read codex stdout: {err}"),
                    stderr,
                })
            }
        }
    }

    async fn terminate(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        request_terminate(self.child.id());
        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
            .await
            .is_err()
        {
            debug!(pid = self.child.id(), "codex exec ignored SIGTERM, killing");
            if let Err(err) = self.child.kill().await {
                warn!(error = %err, "failed to kill codex exec");
            }
        }
    }
}

impl Drop for ProcessLines {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
