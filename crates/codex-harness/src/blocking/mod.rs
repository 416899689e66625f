//! Blocking discipline.
//!
//! Same semantics as the async API, with the calling thread parked while it
//! waits for output. Cancellation from another thread wakes the waiter.

mod process;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use process::BlockingProcessRunner;

use crate::cancel::CancelSignal;
use crate::codec::{EventDecoder, ExecCommand};
use crate::errors::CodexError;
use crate::events::ThreadEvent;
use crate::exec::ProcessLine;
use crate::input::Input;
use crate::locator::find_codex_path;
use crate::options::{CodexOptions, ThreadOptions, TurnOptions};
use crate::thread::ThreadIdentity;
use crate::turn::Turn;
use crate::turn_core::{LineStep, ThreadState, TurnCore};

/// Starts processes for turns, blocking the caller while doing so.
pub trait ExecRunner: Send + Sync {
    fn start(
        &self,
        command: ExecCommand,
        signal: Option<CancelSignal>,
    ) -> Result<Box<dyn LineSource>, CodexError>;
}

/// Output lines of one running process, read by blocking.
pub trait LineSource: Send {
    fn next_line(&mut self) -> Result<ProcessLine, CodexError>;

    fn terminate(&mut self);
}

/// Blocking counterpart of [`crate::Codex`].
#[derive(Clone)]
pub struct Codex {
    options: Arc<CodexOptions>,
    runner: Arc<dyn ExecRunner>,
    decoder: EventDecoder,
}

impl Codex {
    pub fn new(options: CodexOptions) -> Result<Self, CodexError> {
        Self::builder().options(options).build()
    }

    pub fn builder() -> CodexBuilder {
        CodexBuilder::default()
    }

    pub fn options(&self) -> &CodexOptions {
        &self.options
    }

    pub fn start_thread(&self, options: ThreadOptions) -> Thread {
        self.thread(options, ThreadIdentity::default())
    }

    pub fn resume_thread(&self, id: impl Into<String>, options: ThreadOptions) -> Thread {
        self.thread(options, ThreadIdentity::resumed(id))
    }

    fn thread(&self, options: ThreadOptions, identity: ThreadIdentity) -> Thread {
        Thread {
            state: Arc::new(ThreadState::new(
                self.options.clone(),
                options,
                identity,
                self.decoder,
            )),
            runner: self.runner.clone(),
        }
    }
}

impl fmt::Debug for Codex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::Codex")
            .field("options", &self.options)
            .field("decoder", &self.decoder)
            .finish()
    }
}

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

    pub fn runner(mut self, runner: Arc<dyn ExecRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn strict_protocol(mut self, strict: bool) -> Self {
        self.strict_protocol = strict;
        self
    }

    pub fn build(self) -> Result<Codex, CodexError> {
        let runner = match self.runner {
            Some(runner) => runner,
            None => {
                let path = find_codex_path(self.options.codex_path_override.as_ref())?;
                Arc::new(BlockingProcessRunner::new(path)) as Arc<dyn ExecRunner>
            }
        };
        Ok(Codex {
            options: Arc::new(self.options),
            runner,
            decoder: EventDecoder::new(self.strict_protocol),
        })
    }
}

/// Blocking counterpart of [`crate::Thread`].
#[derive(Clone)]
pub struct Thread {
    state: Arc<ThreadState>,
    runner: Arc<dyn ExecRunner>,
}

impl Thread {
    pub fn id(&self) -> Option<&str> {
        self.state.identity.get()
    }

    /// Runs a turn to completion on the calling thread.
    pub fn run<T>(
        &self,
        input: impl Into<Input>,
        options: TurnOptions<T>,
    ) -> Result<Turn<T>, CodexError> {
        let mut streamed = self.run_streamed(input, options)?;
        while let Some(event) = streamed.next_event() {
            match event {
                Ok(ThreadEvent::TurnFailed { .. }) => {
                    streamed.stop();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        streamed.into_result()
    }

    pub fn run_streamed<T>(
        &self,
        input: impl Into<Input>,
        options: TurnOptions<T>,
    ) -> Result<StreamedTurn<T>, CodexError> {
        let prepared = self.state.prepare_turn(input.into(), options)?;
        let mut core = prepared.core;
        let source = self.runner.start(prepared.command, prepared.signal)?;
        core.begin();
        Ok(StreamedTurn {
            source: Some(source),
            core,
        })
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::Thread")
            .field("id", &self.id())
            .field("options", &self.state.options)
            .finish()
    }
}

/// Live handle over one running turn. Iterate it to pull events.
pub struct StreamedTurn<T = Value> {
    source: Option<Box<dyn LineSource>>,
    core: TurnCore<T>,
}

impl<T> StreamedTurn<T> {
    pub fn next_event(&mut self) -> Option<Result<ThreadEvent, CodexError>> {
        loop {
            if self.core.is_exhausted() {
                return None;
            }
            let Some(source) = self.source.as_mut() else {
                self.core.on_stopped();
                return None;
            };

            match source.next_line() {
                Ok(ProcessLine::Line(line)) => match self.core.on_line(&line) {
                    LineStep::Event(event) => return Some(Ok(event)),
                    LineStep::Skip => continue,
                    LineStep::Fail(err) => {
                        source.terminate();
                        self.source = None;
                        return Some(Err(err));
                    }
                },
                Ok(ProcessLine::Closed { stderr }) => {
                    self.source = None;
                    return self.core.on_closed(&stderr).map(Err);
                }
                Err(err) => {
                    source.terminate();
                    self.source = None;
                    return self.core.on_error(err).map(Err);
                }
            }
        }
    }

    /// Returns [`CodexError::StreamNotConsumed`] until iteration has ended.
    pub fn result(&self) -> Result<&Turn<T>, CodexError> {
        self.core.result()
    }

    pub fn into_result(self) -> Result<Turn<T>, CodexError> {
        self.core.into_result()
    }

    fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.terminate();
        }
        self.core.on_stopped();
    }
}

impl<T> Iterator for StreamedTurn<T> {
    type Item = Result<ThreadEvent, CodexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

impl<T> fmt::Debug for StreamedTurn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::StreamedTurn")
            .field("running", &self.source.is_some())
            .field("exhausted", &self.core.is_exhausted())
            .finish()
    }
}
