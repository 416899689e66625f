//! Common imports for typical usage.
pub use crate::{
    ApprovalMode, CancelSignal, Codex, CodexError, CodexOptions, Input, ModelReasoningEffort,
    SandboxMode, StreamedTurn, StructuredResponseError, Thread, ThreadEvent, ThreadItem,
    ThreadItemDetails, ThreadOptions, Turn, TurnOptions, UserInput, WebSearchMode,
};
