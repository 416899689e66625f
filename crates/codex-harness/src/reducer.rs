use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::errors::CodexError;
use crate::events::{ThreadEvent, Usage};
use crate::items::{ItemKind, ThreadItem};

/// Lifecycle of one turn as seen by the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingEvents,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Aggregated result of a successfully completed turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnOutcome {
    /// Items in completion order.
    pub items: Vec<ThreadItem>,
    /// Text of the last completed `agent_message`.
    pub final_response: String,
    pub usage: Option<Usage>,
}

/// Folds the ordered event stream of one turn into a [`TurnOutcome`].
///
/// The reducer is pure: it never touches the process. Callers feed it events
/// and stream-level facts (end of output, cancellation, process failures) and
/// read the outcome once `phase().is_terminal()`.
#[derive(Debug)]
pub struct TurnReducer {
    phase: TurnPhase,
    open: HashMap<String, ItemKind>,
    closed: HashSet<String>,
    items: Vec<ThreadItem>,
    final_response: String,
    usage: Option<Usage>,
    last_stream_error: Option<String>,
    result: Option<Result<TurnOutcome, CodexError>>,
}

impl Default for TurnReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnReducer {
    pub fn new() -> Self {
        Self {
            phase: TurnPhase::Idle,
            open: HashMap::new(),
            closed: HashSet::new(),
            items: Vec::new(),
            final_response: String::new(),
            usage: None,
            last_stream_error: None,
            result: None,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Marks the process as started.
    pub fn begin(&mut self) {
        if self.phase == TurnPhase::Idle {
            self.phase = TurnPhase::AwaitingEvents;
        }
    }

    /// Folds one event.
    ///
    /// Returns an error for protocol violations. Any event after the terminal
    /// event is one, and it replaces the previously finalized outcome.
    pub fn apply(&mut self, event: &ThreadEvent) -> Result<(), CodexError> {
        self.begin();
        if self.phase.is_terminal() {
            let err = CodexError::protocol(format!(
                "received {} after the turn ended",
                event.event_type()
            ));
            if self.phase != TurnPhase::Cancelled {
                self.settle(TurnPhase::Failed, Err(err.clone()));
            }
            return Err(err);
        }

        let result = self.fold(event);
        if let Err(err) = &result {
            self.settle(TurnPhase::Failed, Err(err.clone()));
        }
        result
    }

    fn fold(&mut self, event: &ThreadEvent) -> Result<(), CodexError> {
        match event {
            ThreadEvent::ThreadStarted { .. } | ThreadEvent::TurnStarted => Ok(()),
            ThreadEvent::ItemStarted { item } => {
                if self.closed.contains(&item.id) || self.open.contains_key(&item.id) {
                    return Err(CodexError::protocol(format!(
                        "item {} started more than once",
                        item.id
                    )));
                }
                self.open.insert(item.id.clone(), item.kind());
                Ok(())
            }
            ThreadEvent::ItemUpdated { item } => {
                self.check_not_closed(item, "updated")?;
                self.check_kind(item)?;
                self.open.entry(item.id.clone()).or_insert(item.kind());
                Ok(())
            }
            ThreadEvent::ItemCompleted { item } => {
                self.check_not_closed(item, "completed")?;
                self.check_kind(item)?;
                self.open.remove(&item.id);
                self.closed.insert(item.id.clone());
                if let Some(text) = item.agent_text() {
                    self.final_response = text.to_string();
                }
                self.items.push(item.clone());
                Ok(())
            }
            ThreadEvent::Error { message } => {
                debug!(message = %message, "stream error event");
                self.last_stream_error = Some(message.clone());
                Ok(())
            }
            ThreadEvent::TurnCompleted { usage } => {
                self.phase = TurnPhase::Finalizing;
                self.usage = Some(*usage);
                let outcome = TurnOutcome {
                    items: std::mem::take(&mut self.items),
                    final_response: std::mem::take(&mut self.final_response),
                    usage: self.usage,
                };
                self.settle(TurnPhase::Completed, Ok(outcome));
                Ok(())
            }
            ThreadEvent::TurnFailed { error } => {
                self.phase = TurnPhase::Finalizing;
                self.settle(
                    TurnPhase::Failed,
                    Err(CodexError::TurnFailed {
                        message: error.message.clone(),
                    }),
                );
                Ok(())
            }
        }
    }

    fn check_not_closed(&self, item: &ThreadItem, verb: &str) -> Result<(), CodexError> {
        if self.closed.contains(&item.id) {
            return Err(CodexError::protocol(format!(
                "item {} {verb} after it was already completed",
                item.id
            )));
        }
        Ok(())
    }

    fn check_kind(&self, item: &ThreadItem) -> Result<(), CodexError> {
        match self.open.get(&item.id) {
            Some(kind) if *kind != item.kind() => Err(CodexError::protocol(format!(
                "item {} changed type from {kind} to {}",
                item.id,
                item.kind()
            ))),
            _ => Ok(()),
        }
    }

    /// Records cancellation unless the turn already ended.
    ///
    /// Returns `false` when the signal arrived too late to matter.
    pub fn cancel(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.settle(TurnPhase::Cancelled, Err(CodexError::Cancelled));
        true
    }

    /// Records a stream-level failure (decode error, broken pipe, bad exit).
    ///
    /// A completed turn is overridden; an in-band failure or cancellation is kept.
    pub fn fail(&mut self, error: CodexError) {
        if matches!(self.phase, TurnPhase::Failed | TurnPhase::Cancelled) {
            return;
        }
        self.settle(TurnPhase::Failed, Err(error));
    }

    /// Output ended. Synthesizes a failure when no terminal event was seen.
    pub fn end_of_stream(&mut self, stderr: &str) {
        if self.phase.is_terminal() {
            return;
        }
        self.settle(
            TurnPhase::Failed,
            Err(CodexError::MissingTerminalEvent {
                last_error: self.last_stream_error.clone(),
                stderr: stderr.to_string(),
            }),
        );
    }

    /// Error of a failed or cancelled turn, if any.
    pub fn error(&self) -> Option<&CodexError> {
        match &self.result {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    /// Takes the final outcome; `None` until the turn reached a terminal phase.
    pub fn take_result(&mut self) -> Option<Result<TurnOutcome, CodexError>> {
        self.result.take()
    }

    fn settle(&mut self, phase: TurnPhase, result: Result<TurnOutcome, CodexError>) {
        debug!(?phase, ok = result.is_ok(), "turn reducer settled");
        self.phase = phase;
        self.result = Some(result);
    }
}
