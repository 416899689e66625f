use std::sync::Arc;

use crate::codec::EventDecoder;
use crate::errors::CodexError;
use crate::exec::{ExecRunner, ProcessRunner};
use crate::locator::find_codex_path;
use crate::options::{CodexOptions, ThreadOptions};
use crate::thread::{Thread, ThreadIdentity};
use crate::turn_core::ThreadState;

/// Entry point for starting and resuming threads with async I/O.
///
/// For the blocking discipline see [`crate::blocking::Codex`].
#[derive(Clone)]
pub struct Codex {
    options: Arc<CodexOptions>,
    runner: Arc<dyn ExecRunner>,
    decoder: EventDecoder,
}

impl Codex {
    /// Creates a client that runs the `codex` executable resolved from
    /// `options` (override first, then `PATH`).
    pub fn new(options: CodexOptions) -> Result<Self, CodexError> {
        Self::builder().options(options).build()
    }

    pub fn builder() -> CodexBuilder {
        CodexBuilder::default()
    }

    pub fn options(&self) -> &CodexOptions {
        &self.options
    }

    /// Starts a new conversation. No process is spawned until the first turn.
    pub fn start_thread(&self, options: ThreadOptions) -> Thread {
        self.thread(options, ThreadIdentity::default())
    }

    /// Continues a conversation by id. The id is validated by the CLI when the
    /// first turn runs, not here.
    pub fn resume_thread(&self, id: impl Into<String>, options: ThreadOptions) -> Thread {
        self.thread(options, ThreadIdentity::resumed(id))
    }

    fn thread(&self, options: ThreadOptions, identity: ThreadIdentity) -> Thread {
        let state = ThreadState::new(self.options.clone(), options, identity, self.decoder);
        Thread::new(state, self.runner.clone())
    }
}

impl std::fmt::Debug for Codex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codex")
            .field("options", &self.options)
            .field("decoder", &self.decoder)
            .finish()
    }
}

/// Builder for [`Codex`].
#[derive(Default)]
pub struct CodexBuilder {
    options: CodexOptions,
    runner: Option<Arc<dyn ExecRunner>>,
    strict_protocol: bool,
}

impl CodexBuilder {
    pub fn options(mut self, options: CodexOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the process runner, e.g. with a launcher or a scripted fake.
    ///
    /// Executable discovery is skipped when a runner is supplied.
    pub fn runner(mut self, runner: Arc<dyn ExecRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Treats unknown event and item types as decode failures instead of
    /// skipping them.
    pub fn strict_protocol(mut self, strict: bool) -> Self {
        self.strict_protocol = strict;
        self
    }

    pub fn build(self) -> Result<Codex, CodexError> {
        let runner = match self.runner {
            Some(runner) => runner,
            None => {
                let path = find_codex_path(self.options.codex_path_override.as_ref())?;
                Arc::new(ProcessRunner::new(path)) as Arc<dyn ExecRunner>
            }
        };
        Ok(Codex {
            options: Arc::new(self.options),
            runner,
            decoder: EventDecoder::new(self.strict_protocol),
        })
    }
}
