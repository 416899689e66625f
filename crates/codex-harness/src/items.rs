use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work tracked across `item.*` events.
///
/// The `id` is stable for the lifetime of the turn; the payload type never
/// changes between the events that reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: String,
    #[serde(flatten)]
    pub details: ThreadItemDetails,
}

impl ThreadItem {
    pub fn new(id: impl Into<String>, details: ThreadItemDetails) -> Self {
        Self {
            id: id.into(),
            details,
        }
    }

    /// Returns the item's type discriminator.
    pub fn kind(&self) -> ItemKind {
        self.details.kind()
    }

    /// Returns the item's status when its payload carries one.
    pub fn status(&self) -> Option<ItemStatus> {
        match &self.details {
            ThreadItemDetails::CommandExecution(item) => Some(item.status.into()),
            ThreadItemDetails::FileChange(item) => Some(item.status.into()),
            ThreadItemDetails::McpToolCall(item) => Some(item.status.into()),
            ThreadItemDetails::AgentMessage(_)
            | ThreadItemDetails::Reasoning(_)
            | ThreadItemDetails::WebSearch(_)
            | ThreadItemDetails::TodoList(_)
            | ThreadItemDetails::Error(_) => None,
        }
    }

    /// Returns the message text for `agent_message` items.
    pub fn agent_text(&self) -> Option<&str> {
        match &self.details {
            ThreadItemDetails::AgentMessage(item) => Some(&item.text),
            _ => None,
        }
    }
}

/// Typed payloads for each supported item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadItemDetails {
    /// Response text from the agent.
    AgentMessage(AgentMessageItem),
    /// Reasoning summary.
    Reasoning(ReasoningItem),
    /// A command executed by the agent.
    CommandExecution(CommandExecutionItem),
    /// A patch applied by the agent.
    FileChange(FileChangeItem),
    /// A call to an MCP tool.
    McpToolCall(McpToolCallItem),
    /// A web search request.
    WebSearch(WebSearchItem),
    /// The agent's to-do list.
    TodoList(TodoListItem),
    /// A non-fatal error surfaced as an item.
    Error(ErrorItem),
}

impl ThreadItemDetails {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::AgentMessage(_) => ItemKind::AgentMessage,
            Self::Reasoning(_) => ItemKind::Reasoning,
            Self::CommandExecution(_) => ItemKind::CommandExecution,
            Self::FileChange(_) => ItemKind::FileChange,
            Self::McpToolCall(_) => ItemKind::McpToolCall,
            Self::WebSearch(_) => ItemKind::WebSearch,
            Self::TodoList(_) => ItemKind::TodoList,
            Self::Error(_) => ItemKind::Error,
        }
    }
}

/// Item type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    AgentMessage,
    Reasoning,
    CommandExecution,
    FileChange,
    McpToolCall,
    WebSearch,
    TodoList,
    Error,
}

impl ItemKind {
    pub const ALL: [ItemKind; 8] = [
        ItemKind::AgentMessage,
        ItemKind::Reasoning,
        ItemKind::CommandExecution,
        ItemKind::FileChange,
        ItemKind::McpToolCall,
        ItemKind::WebSearch,
        ItemKind::TodoList,
        ItemKind::Error,
    ];

    /// Wire name of the discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::AgentMessage => "agent_message",
            ItemKind::Reasoning => "reasoning",
            ItemKind::CommandExecution => "command_execution",
            ItemKind::FileChange => "file_change",
            ItemKind::McpToolCall => "mcp_tool_call",
            ItemKind::WebSearch => "web_search",
            ItemKind::TodoList => "todo_list",
            ItemKind::Error => "error",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse status shared by item payloads that carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessageItem {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandExecutionStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
    Declined,
}

impl From<CommandExecutionStatus> for ItemStatus {
    fn from(value: CommandExecutionStatus) -> Self {
        match value {
            CommandExecutionStatus::InProgress => ItemStatus::InProgress,
            CommandExecutionStatus::Completed => ItemStatus::Completed,
            CommandExecutionStatus::Failed => ItemStatus::Failed,
            CommandExecutionStatus::Declined => ItemStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecutionItem {
    pub command: String,
    /// Combined stdout and stderr captured while the command ran.
    pub aggregated_output: String,
    /// `None` while the command is still running.
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub status: CommandExecutionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchChangeKind {
    Add,
    Delete,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdateChange {
    pub path: String,
    pub kind: PatchChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchApplyStatus {
    InProgress,
    Completed,
    Failed,
}

impl From<PatchApplyStatus> for ItemStatus {
    fn from(value: PatchApplyStatus) -> Self {
        match value {
            PatchApplyStatus::InProgress => ItemStatus::InProgress,
            PatchApplyStatus::Completed => ItemStatus::Completed,
            PatchApplyStatus::Failed => ItemStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeItem {
    pub changes: Vec<FileUpdateChange>,
    pub status: PatchApplyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpToolCallStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl From<McpToolCallStatus> for ItemStatus {
    fn from(value: McpToolCallStatus) -> Self {
        match value {
            McpToolCallStatus::InProgress => ItemStatus::InProgress,
            McpToolCallStatus::Completed => ItemStatus::Completed,
            McpToolCallStatus::Failed => ItemStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolCallResult {
    pub content: Vec<Value>,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolCallError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolCallItem {
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub result: Option<McpToolCallResult>,
    #[serde(default)]
    pub error: Option<McpToolCallError>,
    pub status: McpToolCallStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchItem {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoListItem {
    pub items: Vec<TodoItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub message: String,
}
