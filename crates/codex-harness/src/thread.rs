use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::CodexError;
use crate::events::ThreadEvent;
use crate::exec::{ExecRunner, LineSource, ProcessLine};
use crate::input::Input;
use crate::options::TurnOptions;
use crate::turn::Turn;
use crate::turn_core::{LineStep, ThreadState, TurnCore};

/// Write-once holder for the conversation id reported by `thread.started`.
#[derive(Default)]
pub struct ThreadIdentity {
    id: OnceLock<String>,
}

impl ThreadIdentity {
    /// Identity of a conversation that already exists.
    pub fn resumed(id: impl Into<String>) -> Self {
        let identity = Self::default();
        let _ = identity.id.set(id.into());
        identity
    }

    pub fn get(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    /// Records the id announced by the process. Later, different ids are
    /// ignored so the thread keeps a stable identity.
    pub(crate) fn observe(&self, id: &str) {
        match self.id.get() {
            Some(existing) if existing != id => {
                warn!(existing = %existing, announced = %id, "ignoring thread id change");
            }
            Some(_) => {}
            None => {
                if self.id.set(id.to_string()).is_ok() {
                    debug!(thread_id = %id, "thread id assigned");
                }
            }
        }
    }
}

impl fmt::Debug for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadIdentity").field(&self.get()).finish()
    }
}

/// A conversation with the agent, driven with async I/O.
///
/// Clones share identity and the one-turn-at-a-time guard.
#[derive(Clone)]
pub struct Thread {
    state: Arc<ThreadState>,
    runner: Arc<dyn ExecRunner>,
}

impl Thread {
    pub(crate) fn new(state: ThreadState, runner: Arc<dyn ExecRunner>) -> Self {
        Self {
            state: Arc::new(state),
            runner,
        }
    }

    /// Conversation id; `None` until the first turn reports one.
    pub fn id(&self) -> Option<&str> {
        self.state.identity.get()
    }

    /// Runs a turn to completion and returns the finalized [`Turn`].
    ///
    /// An in-band `turn.failed` stops reading immediately and is returned as
    /// [`CodexError::TurnFailed`].
    pub async fn run<T>(
        &self,
        input: impl Into<Input>,
        options: TurnOptions<T>,
    ) -> Result<Turn<T>, CodexError> {
        let mut streamed = self.run_streamed(input, options).await?;
        while let Some(event) = streamed.next_event().await {
            match event {
                Ok(ThreadEvent::TurnFailed { .. }) => {
                    streamed.stop().await;
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        streamed.into_result()
    }

    /// Starts a turn and returns a handle yielding its events as they arrive.
    ///
    /// Fails without spawning anything when the turn's signal is already set
    /// or another turn is in flight on this thread.
    pub async fn run_streamed<T>(
        &self,
        input: impl Into<Input>,
        options: TurnOptions<T>,
    ) -> Result<StreamedTurn<T>, CodexError> {
        let prepared = self.state.prepare_turn(input.into(), options)?;
        let mut core = prepared.core;
        let source = self.runner.start(prepared.command, prepared.signal).await?;
        core.begin();
        Ok(StreamedTurn {
            source: Some(source),
            core,
        })
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id())
            .field("options", &self.state.options)
            .finish()
    }
}

/// Live handle over one running turn.
///
/// Events are pulled one at a time; [`StreamedTurn::result`] only succeeds
/// once [`StreamedTurn::next_event`] has returned `None`. Dropping the handle
/// early kills the process.
pub struct StreamedTurn<T = Value> {
    source: Option<Box<dyn LineSource>>,
    core: TurnCore<T>,
}

impl<T> StreamedTurn<T> {
    /// Waits for the next event.
    ///
    /// Stream-level failures (decode errors, protocol violations, process
    /// failures, cancellation) are yielded once as `Err`, after which the
    /// stream is exhausted.
    pub async fn next_event(&mut self) -> Option<Result<ThreadEvent, CodexError>> {
        loop {
            if self.core.is_exhausted() {
                return None;
            }
            let Some(source) = self.source.as_mut() else {
                self.core.on_stopped();
                return None;
            };

            match source.next_line().await {
                Ok(ProcessLine::Line(line)) => match self.core.on_line(&line) {
                    LineStep::Event(event) => return Some(Ok(event)),
                    LineStep::Skip => continue,
                    LineStep::Fail(err) => {
                        source.terminate().await;
                        self.source = None;
                        return Some(Err(err));
                    }
                },
                Ok(ProcessLine::Closed { stderr }) => {
                    self.source = None;
                    return self.core.on_closed(&stderr).map(Err);
                }
                Err(err) => {
                    source.terminate().await;
                    self.source = None;
                    return self.core.on_error(err).map(Err);
                }
            }
        }
    }

    /// Consumes the handle into a [`Stream`] of events.
    pub fn events(self) -> impl Stream<Item = Result<ThreadEvent, CodexError>> {
        futures::stream::unfold(self, |mut turn| async move {
            let event = turn.next_event().await?;
            Some((event, turn))
        })
    }

    /// The finalized turn.
    ///
    /// Returns [`CodexError::StreamNotConsumed`] until the event stream is
    /// exhausted, then the turn or the error that ended it.
    pub fn result(&self) -> Result<&Turn<T>, CodexError> {
        self.core.result()
    }

    pub fn into_result(self) -> Result<Turn<T>, CodexError> {
        self.core.into_result()
    }

    pub(crate) async fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.terminate().await;
        }
        self.core.on_stopped();
    }
}

impl<T> fmt::Debug for StreamedTurn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedTurn")
            .field("running", &self.source.is_some())
            .field("exhausted", &self.core.is_exhausted())
            .finish()
    }
}
