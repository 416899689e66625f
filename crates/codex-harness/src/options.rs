use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::cancel::CancelSignal;
use crate::errors::CodexError;

/// Client-level options shared by every thread created from one `Codex`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodexOptions {
    /// Explicit path to the `codex` executable. `PATH` is searched when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_path_override: Option<PathBuf>,
    /// Exported to the child as `OPENAI_BASE_URL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Exported to the child as `CODEX_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Extra `--config` overrides, flattened into dotted keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    /// Full child environment. When set, the parent environment is not inherited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl CodexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from `CODEX_PATH`, `OPENAI_BASE_URL` and `CODEX_API_KEY`.
    ///
    /// Missing or blank variables are left unset.
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        };
        Self {
            codex_path_override: read("CODEX_PATH").map(PathBuf::from),
            base_url: read("OPENAI_BASE_URL"),
            api_key: read("CODEX_API_KEY"),
            config: None,
            env: None,
        }
    }

    pub fn codex_path_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.codex_path_override = Some(path.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets `--config` overrides from a JSON object.
    ///
    /// Returns `CodexError::Config` when `config` is not an object.
    pub fn config(mut self, config: Value) -> Result<Self, CodexError> {
        match config {
            Value::Object(map) => {
                self.config = Some(map);
                Ok(self)
            }
            other => Err(CodexError::config(format!(
                "config overrides must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Replaces the child environment.
    pub fn env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            /// Value passed to the CLI.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Sandbox applied to commands the agent runs.
    SandboxMode {
        ReadOnly => "read-only",
        WorkspaceWrite => "workspace-write",
        DangerFullAccess => "danger-full-access",
    }
);

wire_enum!(
    /// When the agent must ask before running commands.
    ApprovalMode {
        Never => "never",
        OnRequest => "on-request",
        OnFailure => "on-failure",
        Untrusted => "untrusted",
    }
);

wire_enum!(
    ModelReasoningEffort {
        Minimal => "minimal",
        Low => "low",
        Medium => "medium",
        High => "high",
        XHigh => "xhigh",
    }
);

wire_enum!(
    WebSearchMode {
        Disabled => "disabled",
        Cached => "cached",
        Live => "live",
    }
);

/// Per-thread options forwarded on every turn of the thread.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThreadOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_mode: Option<SandboxMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub skip_git_repo_check: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_reasoning_effort: Option<ModelReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_access_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_mode: Option<WebSearchMode>,
    /// Legacy switch; ignored when `web_search_mode` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_policy: Option<ApprovalMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_directories: Vec<PathBuf>,
}

impl ThreadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn sandbox_mode(mut self, mode: SandboxMode) -> Self {
        self.sandbox_mode = Some(mode);
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn skip_git_repo_check(mut self, skip: bool) -> Self {
        self.skip_git_repo_check = skip;
        self
    }

    pub fn model_reasoning_effort(mut self, effort: ModelReasoningEffort) -> Self {
        self.model_reasoning_effort = Some(effort);
        self
    }

    pub fn network_access_enabled(mut self, enabled: bool) -> Self {
        self.network_access_enabled = Some(enabled);
        self
    }

    pub fn web_search_mode(mut self, mode: WebSearchMode) -> Self {
        self.web_search_mode = Some(mode);
        self
    }

    pub fn web_search_enabled(mut self, enabled: bool) -> Self {
        self.web_search_enabled = Some(enabled);
        self
    }

    pub fn approval_policy(mut self, policy: ApprovalMode) -> Self {
        self.approval_policy = Some(policy);
        self
    }

    pub fn additional_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.additional_directories.push(dir.into());
        self
    }

    /// Resolves the web search setting, preferring the explicit mode.
    pub(crate) fn effective_web_search(&self) -> Option<WebSearchMode> {
        self.web_search_mode.or(match self.web_search_enabled {
            Some(true) => Some(WebSearchMode::Live),
            Some(false) => Some(WebSearchMode::Disabled),
            None => None,
        })
    }
}

/// Per-turn options.
///
/// `T` is the type produced by `Turn::structured_response`. It stays
/// `serde_json::Value` unless [`TurnOptions::output_type`] selects a declared type.
pub struct TurnOptions<T = Value> {
    pub(crate) output_schema: Option<Value>,
    pub(crate) output_type_schema: Option<fn() -> Value>,
    pub(crate) signal: Option<CancelSignal>,
    _output: PhantomData<fn() -> T>,
}

impl TurnOptions<Value> {
    pub fn new() -> Self {
        Self {
            output_schema: None,
            output_type_schema: None,
            signal: None,
            _output: PhantomData,
        }
    }
}

impl Default for TurnOptions<Value> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TurnOptions<T> {
    /// Sets the JSON Schema handed to the CLI via `--output-schema`.
    ///
    /// The final response is parsed as JSON on access but not validated
    /// against this schema.
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Declares the type the final response must deserialize into.
    ///
    /// Takes precedence over `output_schema` when both are set.
    pub fn output_type<U>(self) -> TurnOptions<U>
    where
        U: DeserializeOwned + JsonSchema,
    {
        TurnOptions {
            output_schema: self.output_schema,
            output_type_schema: Some(output_type_schema::<U>),
            signal: self.signal,
            _output: PhantomData,
        }
    }

    /// Attaches a cancellation signal to the turn.
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn has_output_type(&self) -> bool {
        self.output_type_schema.is_some()
    }

    /// Schema written for `--output-schema`, if any.
    pub(crate) fn effective_schema(&self) -> Option<Value> {
        self.output_schema
            .clone()
            .or_else(|| self.output_type_schema.map(|generate| generate()))
    }
}

impl<T> Clone for TurnOptions<T> {
    fn clone(&self) -> Self {
        Self {
            output_schema: self.output_schema.clone(),
            output_type_schema: self.output_type_schema,
            signal: self.signal.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TurnOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnOptions")
            .field("output_schema", &self.output_schema)
            .field("output_type", &self.output_type_schema.is_some())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Generates the schema for a declared output type.
///
/// `additionalProperties: false` is defaulted on the root so the CLI enforces a
/// closed object.
fn output_type_schema<U: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(U))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object
            .entry("additionalProperties")
            .or_insert(Value::Bool(false));
    }
    schema
}
