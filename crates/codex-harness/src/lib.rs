//! Drive `codex exec --experimental-json` turns as typed event streams.
//!
//! Each turn spawns one process, feeds the prompt on stdin, decodes the
//! newline-delimited JSON events on stdout and folds them into a [`Turn`].
//! Turns run eagerly ([`Thread::run`]) or lazily ([`Thread::run_streamed`]),
//! with async I/O or, through [`blocking`], on the calling thread.
//!
//! ```no_run
//! use codex_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CodexError> {
//! let codex = Codex::new(CodexOptions::from_env())?;
//! let thread = codex.start_thread(
//!     ThreadOptions::new()
//!         .model("gpt-5-codex")
//!         .sandbox_mode(SandboxMode::ReadOnly),
//! );
//!
//! let turn = thread.run("Summarize the README", TurnOptions::new()).await?;
//! println!("{}", turn.final_response());
//!
//! let mut streamed = thread
//!     .run_streamed("Now list the open TODOs", TurnOptions::new())
//!     .await?;
//! while let Some(event) = streamed.next_event().await {
//!     println!("{}", event?.event_type());
//! }
//! println!("{:?}", streamed.result()?.usage());
//! # Ok(())
//! # }
//! ```

/// Blocking façade over the same turn semantics.
pub mod blocking;
/// Cancellation signal shared by both disciplines.
pub mod cancel;
/// Turn request encoding and NDJSON event decoding.
pub mod codec;
/// Async entry point and builder.
pub mod codex;
/// `--config key=value` rendering.
pub mod config;
/// Public error types.
pub mod errors;
/// Stream events emitted by `codex exec`.
pub mod events;
/// Process seam for the async discipline.
pub mod exec;
/// Prompt input shapes.
pub mod input;
/// Thread items carried by item events.
pub mod items;
/// Executable discovery.
pub mod locator;
/// Opt-in tracing subscriber setup.
pub mod observability;
/// Client, thread and turn options.
pub mod options;
/// Common imports for typical usage.
pub mod prelude;
/// Turn state machine.
pub mod reducer;
/// Async thread and streamed turn handles.
pub mod thread;
/// Finalized turn results.
pub mod turn;

mod schema_file;
mod turn_core;

pub use cancel::CancelSignal;
pub use codec::{EventDecoder, ExecCommand};
pub use codex::{Codex, CodexBuilder};
pub use config::{serialize_config_overrides, to_config_value};
pub use errors::{CodexError, StructuredResponseError};
pub use events::{ThreadError, ThreadEvent, Usage};
pub use exec::{ExecRunner, LineSource, ProcessLine, ProcessRunner};
pub use input::{Input, UserInput};
pub use items::{
    AgentMessageItem, CommandExecutionItem, CommandExecutionStatus, ErrorItem, FileChangeItem,
    FileUpdateChange, ItemKind, ItemStatus, McpToolCallError, McpToolCallItem, McpToolCallResult,
    McpToolCallStatus, PatchApplyStatus, PatchChangeKind, ReasoningItem, ThreadItem,
    ThreadItemDetails, TodoItem, TodoListItem, WebSearchItem,
};
pub use locator::find_codex_path;
pub use observability::init_observability;
pub use options::{
    ApprovalMode, CodexOptions, ModelReasoningEffort, SandboxMode, ThreadOptions, TurnOptions,
    WebSearchMode,
};
pub use reducer::{TurnOutcome, TurnPhase, TurnReducer};
pub use thread::{StreamedTurn, Thread, ThreadIdentity};
pub use turn::Turn;
