use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::config::serialize_config_overrides;
use crate::errors::CodexError;
use crate::events::ThreadEvent;
use crate::input::NormalizedInput;
use crate::items::ItemKind;
use crate::options::{CodexOptions, ThreadOptions};

const ORIGINATOR_ENV: &str = "CODEX_INTERNAL_ORIGINATOR_OVERRIDE";
const ORIGINATOR: &str = "codex_sdk_rs";

/// One fully-encoded `codex exec` invocation, minus the executable itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecCommand {
    /// Arguments following the executable (and any launcher arguments).
    pub args: Vec<String>,
    /// Variables set on the child. With `inherit_env == false` this is the
    /// complete environment.
    pub env: BTreeMap<String, String>,
    pub inherit_env: bool,
    /// Prompt written to standard input before it is closed.
    pub stdin: String,
}

/// Everything needed to encode one turn request.
#[derive(Debug)]
pub(crate) struct TurnRequest<'a> {
    pub codex: &'a CodexOptions,
    pub thread: &'a ThreadOptions,
    pub thread_id: Option<&'a str>,
    pub input: NormalizedInput,
    pub output_schema: Option<&'a Path>,
}

/// Encodes a turn request into process arguments, environment and stdin.
pub(crate) fn encode_request(request: TurnRequest<'_>) -> Result<ExecCommand, CodexError> {
    let TurnRequest {
        codex,
        thread,
        thread_id,
        input,
        output_schema,
    } = request;

    let mut args: Vec<String> = vec!["exec".into(), "--experimental-json".into()];

    if let Some(config) = &codex.config {
        for override_ in serialize_config_overrides(config)? {
            push_flag(&mut args, "--config", override_);
        }
    }
    if let Some(model) = &thread.model {
        push_flag(&mut args, "--model", model.clone());
    }
    if let Some(mode) = thread.sandbox_mode {
        push_flag(&mut args, "--sandbox", mode.to_string());
    }
    if let Some(dir) = &thread.working_directory {
        push_flag(&mut args, "--cd", path_arg(dir));
    }
    for dir in &thread.additional_directories {
        push_flag(&mut args, "--add-dir", path_arg(dir));
    }
    if thread.skip_git_repo_check {
        args.push("--skip-git-repo-check".into());
    }
    if let Some(schema) = output_schema {
        push_flag(&mut args, "--output-schema", path_arg(schema));
    }
    if let Some(effort) = thread.model_reasoning_effort {
        push_flag(&mut args, "--config", format!("model_reasoning_effort=\"{effort}\""));
    }
    if let Some(enabled) = thread.network_access_enabled {
        push_flag(
            &mut args,
            "--config",
            format!("sandbox_workspace_write.network_access={enabled}"),
        );
    }
    if let Some(mode) = thread.effective_web_search() {
        push_flag(&mut args, "--config", format!("web_search=\"{mode}\""));
    }
    if let Some(policy) = thread.approval_policy {
        push_flag(&mut args, "--config", format!("approval_policy=\"{policy}\""));
    }
    if let Some(id) = thread_id {
        push_flag(&mut args, "resume", id.to_string());
    }
    for image in &input.images {
        push_flag(&mut args, "--image", path_arg(image));
    }

    let (env, inherit_env) = encode_env(codex);
    Ok(ExecCommand {
        args,
        env,
        inherit_env,
        stdin: input.prompt,
    })
}

fn encode_env(codex: &CodexOptions) -> (BTreeMap<String, String>, bool) {
    let (mut env, inherit_env) = match &codex.env {
        Some(env) => (env.clone(), false),
        None => (BTreeMap::new(), true),
    };
    if let Some(base_url) = codex.base_url.as_deref().filter(|url| !url.is_empty()) {
        env.insert("OPENAI_BASE_URL".into(), base_url.to_string());
    }
    if let Some(api_key) = codex.api_key.as_deref().filter(|key| !key.is_empty()) {
        env.insert("CODEX_API_KEY".into(), api_key.to_string());
    }
    let already_set = env.contains_key(ORIGINATOR_ENV)
        || (inherit_env && std::env::var_os(ORIGINATOR_ENV).is_some());
    if !already_set {
        env.insert(ORIGINATOR_ENV.into(), ORIGINATOR.into());
    }
    (env, inherit_env)
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: String) {
    args.push(flag.to_string());
    args.push(value);
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Decodes stdout lines into [`ThreadEvent`]s.
///
/// Stateless apart from its policy, so one decoder may be shared freely.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventDecoder {
    strict: bool,
}

impl EventDecoder {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Decodes one line.
    ///
    /// Returns `Ok(None)` for blank lines and, in lenient mode, for records
    /// with an unknown event or item discriminator.
    pub fn decode_line(&self, line: &str) -> Result<Option<ThreadEvent>, CodexError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| CodexError::decode(format!("invalid JSON: {err}"), line))?;
        let Some(event_type) = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            return Err(CodexError::decode("missing \"type\" discriminator", line));
        };

        if !ThreadEvent::KNOWN_TYPES.contains(&event_type.as_str()) {
            return self.unknown("event", &event_type, line);
        }
        if event_type.starts_with("item.")
            && let Some(item_type) = value
                .get("item")
                .and_then(|item| item.get("type"))
                .and_then(Value::as_str)
            && ItemKind::from_wire(item_type).is_none()
        {
            return self.unknown("item", item_type, line);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| CodexError::decode(format!("invalid {event_type} event: {err}"), line))
    }

    fn unknown(
        &self,
        what: &str,
        discriminator: &str,
        line: &str,
    ) -> Result<Option<ThreadEvent>, CodexError> {
        if self.strict {
            return Err(CodexError::decode(
                format!("unknown {what} type \"{discriminator}\""),
                line,
            ));
        }
        warn!(kind = what, discriminator, "skipping unrecognized record");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::events::{ThreadError, Usage};
    use crate::input::{Input, UserInput};
    use crate::items::*;
    use crate::options::{ApprovalMode, ModelReasoningEffort, SandboxMode, WebSearchMode};
    use serde_json::json;

    fn encode(
        codex: &CodexOptions,
        thread: &ThreadOptions,
        thread_id: Option<&str>,
        input: Input,
        schema: Option<&Path>,
    ) -> ExecCommand {
        encode_request(TurnRequest {
            codex,
            thread,
            thread_id,
            input: input.normalize(),
            output_schema: schema,
        })
        .expect("encode")
    }

    #[test]
    fn encodes_arguments_in_cli_order() {
        let codex = CodexOptions::new()
            .config(json!({"show_raw_agent_reasoning": true}))
            .expect("config");
        let thread = ThreadOptions::new()
            .model("gpt-test")
            .sandbox_mode(SandboxMode::WorkspaceWrite)
            .working_directory("/work")
            .additional_directory("/extra")
            .skip_git_repo_check(true)
            .model_reasoning_effort(ModelReasoningEffort::High)
            .network_access_enabled(true)
            .web_search_mode(WebSearchMode::Cached)
            .approval_policy(ApprovalMode::OnRequest);
        let schema = PathBuf::from("/tmp/schema.json");
        let command = encode(
            &codex,
            &thread,
            Some("thread-1"),
            Input::from(vec![
                UserInput::text("describe"),
                UserInput::local_image("/img/a.png"),
                UserInput::text("briefly"),
            ]),
            Some(&schema),
        );

        assert_eq!(
            command.args,
            vec![
                "exec",
                "--experimental-json",
                "--config",
                "show_raw_agent_reasoning=true",
                "--model",
                "gpt-test",
                "--sandbox",
                "workspace-write",
                "--cd",
                "/work",
                "--add-dir",
                "/extra",
                "--skip-git-repo-check",
                "--output-schema",
                "/tmp/schema.json",
                "--config",
                "model_reasoning_effort=\"high\"",
                "--config",
                "sandbox_workspace_write.network_access=true",
                "--config",
                "web_search=\"cached\"",
                "--config",
                "approval_policy=\"on-request\"",
                "resume",
                "thread-1",
                "--image",
                "/img/a.png",
            ]
        );
        assert_eq!(command.stdin, "describe\n\nbriefly");
    }

    #[test]
    fn explicit_env_replaces_parent_environment() {
        let codex = CodexOptions::new()
            .env([("PATH", "/bin")])
            .base_url("http://localhost:1234")
            .api_key("secret");
        let command = encode(&codex, &ThreadOptions::new(), None, "hi".into(), None);

        assert!(!command.inherit_env);
        assert_eq!(command.env.get("PATH").map(String::as_str), Some("/bin"));
        assert_eq!(
            command.env.get("OPENAI_BASE_URL").map(String::as_str),
            Some("http://localhost:1234")
        );
        assert_eq!(
            command.env.get("CODEX_API_KEY").map(String::as_str),
            Some("secret")
        );
        assert_eq!(
            command.env.get(ORIGINATOR_ENV).map(String::as_str),
            Some(ORIGINATOR)
        );
        assert_eq!(command.args, vec!["exec", "--experimental-json"]);
    }

    #[test]
    fn caller_supplied_originator_is_kept() {
        let codex = CodexOptions::new().env([(ORIGINATOR_ENV, "custom")]);
        let command = encode(&codex, &ThreadOptions::new(), None, "hi".into(), None);
        assert_eq!(
            command.env.get(ORIGINATOR_ENV).map(String::as_str),
            Some("custom")
        );
    }

    #[test]
    fn decoded_events_round_trip_for_every_variant() {
        let events = vec![
            ThreadEvent::ThreadStarted {
                thread_id: "t-1".into(),
            },
            ThreadEvent::TurnStarted,
            ThreadEvent::ItemStarted {
                item: ThreadItem::new(
                    "cmd",
                    ThreadItemDetails::CommandExecution(CommandExecutionItem {
                        command: "ls".into(),
                        aggregated_output: String::new(),
                        exit_code: None,
                        status: CommandExecutionStatus::InProgress,
                    }),
                ),
            },
            ThreadEvent::ItemUpdated {
                item: ThreadItem::new(
                    "todo",
                    ThreadItemDetails::TodoList(TodoListItem {
                        items: vec![TodoItem {
                            text: "write tests".into(),
                            completed: false,
                        }],
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "patch",
                    ThreadItemDetails::FileChange(FileChangeItem {
                        changes: vec![FileUpdateChange {
                            path: "src/lib.rs".into(),
                            kind: PatchChangeKind::Update,
                        }],
                        status: PatchApplyStatus::Completed,
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "mcp",
                    ThreadItemDetails::McpToolCall(McpToolCallItem {
                        server: "docs".into(),
                        tool: "search".into(),
                        arguments: json!({"q": "rust"}),
                        result: Some(McpToolCallResult {
                            content: vec![json!({"type": "text", "text": "hit"})],
                            structured_content: None,
                        }),
                        error: None,
                        status: McpToolCallStatus::Completed,
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "search",
                    ThreadItemDetails::WebSearch(WebSearchItem {
                        query: "tokio watch".into(),
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "think",
                    ThreadItemDetails::Reasoning(ReasoningItem {
                        text: "hmm".into(),
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "oops",
                    ThreadItemDetails::Error(ErrorItem {
                        message: "tool crashed".into(),
                    }),
                ),
            },
            ThreadEvent::ItemCompleted {
                item: ThreadItem::new(
                    "msg",
                    ThreadItemDetails::AgentMessage(AgentMessageItem {
                        text: "done".into(),
                    }),
                ),
            },
            ThreadEvent::TurnCompleted {
                usage: Usage {
                    input_tokens: 10,
                    cached_input_tokens: 2,
                    output_tokens: 5,
                },
            },
            ThreadEvent::TurnFailed {
                error: ThreadError {
                    message: "boom".into(),
                },
            },
            ThreadEvent::Error {
                message: "stream hiccup".into(),
            },
        ];

        let decoder = EventDecoder::default();
        for event in events {
            let line = serde_json::to_string(&event).expect("serialize");
            let decoded = decoder.decode_line(&line).expect("decode");
            assert_eq!(decoded, Some(event));
        }
    }

    #[test]
    fn unknown_discriminators_are_skipped_unless_strict() {
        let unknown_event = r#"{"type":"turn.paused"}"#;
        let unknown_item = r#"{"type":"item.completed","item":{"id":"x","type":"hologram"}}"#;

        let lenient = EventDecoder::new(false);
        assert_eq!(lenient.decode_line(unknown_event).expect("skip"), None);
        assert_eq!(lenient.decode_line(unknown_item).expect("skip"), None);
        assert_eq!(lenient.decode_line("   ").expect("blank"), None);

        let strict = EventDecoder::new(true);
        let err = strict.decode_line(unknown_event).expect_err("strict event");
        assert!(matches!(err, CodexError::Decode { message, line } if message.contains("turn.paused") && line == unknown_event));
        assert!(strict.decode_line(unknown_item).is_err());
    }

    #[test]
    fn malformed_lines_carry_the_raw_content() {
        let decoder = EventDecoder::default();
        for line in [
            "not json",
            r#"{"thread_id":"t"}"#,
            r#"{"type":"turn.completed"}"#,
            r#"{"type":"item.started","item":{"type":"agent_message","text":"x"}}"#,
        ] {
            match decoder.decode_line(line) {
                Err(CodexError::Decode { line: raw, .. }) => assert_eq!(raw, line),
                other => panic!("expected decode error for {line}, got {other:?}"),
            }
        }
    }

    #[test]
    fn shape_errors_name_the_event_type() {
        let line = r#"{"type":"turn.failed","error":{}}"#;
        match EventDecoder::default().decode_line(line) {
            Err(CodexError::Decode { message, line: raw }) => {
                assert!(message.starts_with("invalid turn.failed event"), "{message}");
                assert_eq!(raw, line);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
