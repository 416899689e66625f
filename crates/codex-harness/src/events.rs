use serde::{Deserialize, Serialize};

use crate::items::ThreadItem;

/// One decoded record from the `codex exec --experimental-json` output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    /// First event of a new thread; carries the id used to resume it later.
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    /// The prompt was accepted and the agent started working.
    #[serde(rename = "turn.started")]
    TurnStarted,
    /// Terminal success event.
    #[serde(rename = "turn.completed")]
    TurnCompleted { usage: Usage },
    /// Terminal failure event.
    #[serde(rename = "turn.failed")]
    TurnFailed { error: ThreadError },
    #[serde(rename = "item.started")]
    ItemStarted { item: ThreadItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: ThreadItem },
    /// The item reached a terminal state (success or failure, per its payload).
    #[serde(rename = "item.completed")]
    ItemCompleted { item: ThreadItem },
    /// Stream-level error reported by the process. Not terminal on its own.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ThreadEvent {
    /// Every discriminator this crate understands.
    pub const KNOWN_TYPES: [&'static str; 8] = [
        "thread.started",
        "turn.started",
        "turn.completed",
        "turn.failed",
        "item.started",
        "item.updated",
        "item.completed",
        "error",
    ];

    /// Wire discriminator of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ThreadStarted { .. } => "thread.started",
            Self::TurnStarted => "turn.started",
            Self::TurnCompleted { .. } => "turn.completed",
            Self::TurnFailed { .. } => "turn.failed",
            Self::ItemStarted { .. } => "item.started",
            Self::ItemUpdated { .. } => "item.updated",
            Self::ItemCompleted { .. } => "item.completed",
            Self::Error { .. } => "error",
        }
    }

    /// True for events that end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnCompleted { .. } | Self::TurnFailed { .. })
    }

    pub fn item(&self) -> Option<&ThreadItem> {
        match self {
            Self::ItemStarted { item } | Self::ItemUpdated { item } | Self::ItemCompleted { item } => {
                Some(item)
            }
            _ => None,
        }
    }
}

/// Token usage reported with `turn.completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Error payload of `turn.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadError {
    pub message: String,
}
