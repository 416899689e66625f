//! Scheduling-agnostic per-turn driver.
//!
//! Both the async and the blocking façades own a line source and forward every
//! observation here; only the way they wait for the next line differs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::cancel::CancelSignal;
use crate::codec::{EventDecoder, ExecCommand, TurnRequest, encode_request};
use crate::errors::CodexError;
use crate::events::ThreadEvent;
use crate::input::Input;
use crate::options::{CodexOptions, ThreadOptions, TurnOptions};
use crate::reducer::TurnReducer;
use crate::schema_file::OutputSchemaFile;
use crate::thread::ThreadIdentity;
use crate::turn::{StructuredMode, Turn};

/// State shared by every turn of one thread, in either discipline.
pub(crate) struct ThreadState {
    pub codex: Arc<CodexOptions>,
    pub options: ThreadOptions,
    pub identity: ThreadIdentity,
    pub decoder: EventDecoder,
    in_flight: AtomicBool,
}

impl ThreadState {
    pub(crate) fn new(
        codex: Arc<CodexOptions>,
        options: ThreadOptions,
        identity: ThreadIdentity,
        decoder: EventDecoder,
    ) -> Self {
        Self {
            codex,
            options,
            identity,
            decoder,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Validates and encodes a turn without starting any process.
    ///
    /// Fails with [`CodexError::Cancelled`] when the signal is already set and
    /// with [`CodexError::TurnInFlight`] when another turn is outstanding.
    pub(crate) fn prepare_turn<T>(
        self: &Arc<Self>,
        input: Input,
        options: TurnOptions<T>,
    ) -> Result<PreparedTurn<T>, CodexError> {
        if let Some(signal) = &options.signal
            && signal.is_cancelled()
        {
            debug!(thread_id = ?self.identity.get(), "signal already set, not spawning");
            return Err(CodexError::Cancelled);
        }
        let guard = TurnGuard::acquire(self)?;

        let schema_file = options
            .effective_schema()
            .map(|schema| OutputSchemaFile::create(&schema))
            .transpose()?;
        let mode = if options.has_output_type() {
            StructuredMode::Typed
        } else if options.output_schema.is_some() {
            StructuredMode::Schema
        } else {
            StructuredMode::Unconfigured
        };

        let command = encode_request(TurnRequest {
            codex: &self.codex,
            thread: &self.options,
            thread_id: self.identity.get(),
            input: input.normalize(),
            output_schema: schema_file.as_ref().map(OutputSchemaFile::path),
        })?;
        debug!(
            thread_id = ?self.identity.get(),
            ?mode,
            resume = self.identity.get().is_some(),
            "prepared turn"
        );

        Ok(PreparedTurn {
            command,
            signal: options.signal,
            core: TurnCore {
                reducer: TurnReducer::new(),
                state: Arc::clone(self),
                mode,
                result: None,
                exhausted: false,
                guard: Some(guard),
                schema_file,
            },
        })
    }
}

/// Marks a thread busy for the lifetime of one turn.
pub(crate) struct TurnGuard {
    state: Arc<ThreadState>,
}

impl TurnGuard {
    fn acquire(state: &Arc<ThreadState>) -> Result<Self, CodexError> {
        state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CodexError::TurnInFlight)?;
        Ok(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}

pub(crate) struct PreparedTurn<T> {
    pub command: ExecCommand,
    pub signal: Option<CancelSignal>,
    pub core: TurnCore<T>,
}

/// What the façade should do with one decoded line.
pub(crate) enum LineStep {
    /// Forward the event to the caller.
    Event(ThreadEvent),
    /// Nothing to forward (blank line or skipped record).
    Skip,
    /// The turn failed; terminate the process and surface the error.
    Fail(CodexError),
}

/// Reducer plus everything that must live exactly as long as one turn.
pub(crate) struct TurnCore<T> {
    reducer: TurnReducer,
    state: Arc<ThreadState>,
    mode: StructuredMode,
    result: Option<Result<Turn<T>, CodexError>>,
    exhausted: bool,
    guard: Option<TurnGuard>,
    schema_file: Option<OutputSchemaFile>,
}

impl<T> TurnCore<T> {
    pub(crate) fn begin(&mut self) {
        self.reducer.begin();
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn on_line(&mut self, line: &str) -> LineStep {
        let event = match self.state.decoder.decode_line(line) {
            Ok(Some(event)) => event,
            Ok(None) => return LineStep::Skip,
            Err(err) => {
                self.reducer.fail(err.clone());
                self.finish();
                return LineStep::Fail(err);
            }
        };

        if let ThreadEvent::ThreadStarted { thread_id } = &event {
            self.state.identity.observe(thread_id);
        }
        match self.reducer.apply(&event) {
            Ok(()) => LineStep::Event(event),
            Err(err) => {
                self.finish();
                LineStep::Fail(err)
            }
        }
    }

    /// Output ended cleanly. Returns the error to surface, if the end of the
    /// stream itself decided the outcome.
    pub(crate) fn on_closed(&mut self, stderr: &str) -> Option<CodexError> {
        let was_terminal = self.reducer.phase().is_terminal();
        self.reducer.end_of_stream(stderr);
        let emitted = if was_terminal {
            None
        } else {
            self.reducer.error().cloned()
        };
        self.finish();
        emitted
    }

    /// The line source failed or observed cancellation. Returns the error to
    /// surface when it became the turn's outcome.
    pub(crate) fn on_error(&mut self, error: CodexError) -> Option<CodexError> {
        if error.is_cancelled() {
            if !self.reducer.cancel() {
                debug!("cancellation arrived after the turn was finalized, ignoring");
            }
        } else {
            self.reducer.fail(error.clone());
        }
        let emitted = (self.reducer.error() == Some(&error)).then_some(error);
        self.finish();
        emitted
    }

    /// Stops reading. Used when the façade terminates the process itself.
    pub(crate) fn on_stopped(&mut self) {
        self.reducer.end_of_stream("");
        self.finish();
    }

    fn finish(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;
        let phase = self.reducer.phase();
        let result = match self.reducer.take_result() {
            Some(outcome) => outcome.map(|outcome| Turn::new(outcome, self.mode)),
            None => Err(CodexError::protocol("turn ended without an outcome")),
        };
        debug!(
            thread_id = ?self.state.identity.get(),
            ?phase,
            ok = result.is_ok(),
            "turn finalized"
        );
        self.result = Some(result);
        self.schema_file = None;
        self.guard = None;
    }

    pub(crate) fn result(&self) -> Result<&Turn<T>, CodexError> {
        if !self.exhausted {
            return Err(CodexError::StreamNotConsumed);
        }
        match &self.result {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(err)) => Err(err.clone()),
            None => Err(CodexError::StreamNotConsumed),
        }
    }

    pub(crate) fn into_result(mut self) -> Result<Turn<T>, CodexError> {
        if !self.exhausted {
            return Err(CodexError::StreamNotConsumed);
        }
        self.result
            .take()
            .unwrap_or(Err(CodexError::StreamNotConsumed))
    }
}
