#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use codex_harness::blocking::{self, BlockingProcessRunner};
use codex_harness::{
    CancelSignal, Codex, CodexError, CodexOptions, ProcessRunner, ThreadEvent, ThreadOptions,
    TurnOptions,
};
use serde_json::json;
use tempfile::TempDir;

const HAPPY_EVENTS: &str = r#"printf '%s\n' '{"type":"thread.started","thread_id":"th-int"}'
printf '%s\n' '{"type":"turn.started"}'
printf '%s\n' '{"type":"item.completed","item":{"id":"item_0","type":"agent_message","text":"all done"}}'
printf '%s\n' '{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":2,"output_tokens":5}}'
"#;

struct FakeCodex {
    dir: TempDir,
    script: PathBuf,
}

impl FakeCodex {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("codex.sh");
        let body = body.replace("$DIR", &dir.path().display().to_string());
        std::fs::write(&script, format!("#!/bin/sh\n{body}")).expect("write script");
        Self { dir, script }
    }

    fn file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).unwrap_or_default()
    }

    fn script(&self) -> String {
        self.script.display().to_string()
    }

    fn codex(&self, options: CodexOptions) -> Codex {
        let runner = ProcessRunner::new("/bin/sh").with_launcher_args([self.script()]);
        Codex::builder()
            .options(options)
            .runner(Arc::new(runner))
            .build()
            .expect("build")
    }

    fn blocking_codex(&self) -> blocking::Codex {
        let runner = BlockingProcessRunner::new("/bin/sh").with_launcher_args([self.script()]);
        blocking::Codex::builder()
            .runner(Arc::new(runner))
            .build()
            .expect("build")
    }
}

/// Checks through procfs that the pid recorded by the script was reaped.
fn assert_process_gone(fake: &FakeCodex) {
    let pid = fake.file("pid.txt");
    let pid = pid.trim();
    if pid.is_empty() || !Path::new("/proc/self").exists() {
        return;
    }
    assert!(
        !Path::new("/proc").join(pid).exists(),
        "codex process {pid} is still running"
    );
}

fn recorded_args(fake: &FakeCodex) -> Vec<String> {
    fake.file("args.txt").lines().map(String::from).collect()
}

#[tokio::test]
async fn completed_turn_reports_items_usage_and_thread_id() {
    let fake = FakeCodex::new(&format!(
        "cat > \"$DIR/stdin.txt\"\nprintf '%s\\n' \"$@\" > \"$DIR/args.txt\"\n{HAPPY_EVENTS}"
    ));
    let thread = fake
        .codex(CodexOptions::new())
        .start_thread(ThreadOptions::new().model("gpt-test"));

    let turn = thread.run("hello there", TurnOptions::new()).await.expect("turn");
    assert_eq!(turn.final_response(), "all done");
    assert_eq!(turn.items().len(), 1);
    let usage = turn.usage().expect("usage");
    assert_eq!(
        (usage.input_tokens, usage.cached_input_tokens, usage.output_tokens),
        (10, 2, 5)
    );
    assert_eq!(thread.id(), Some("th-int"));

    assert_eq!(fake.file("stdin.txt"), "hello there");
    let args = recorded_args(&fake);
    assert_eq!(&args[..2], ["exec", "--experimental-json"]);
    assert!(args.windows(2).any(|pair| pair == ["--model", "gpt-test"]));
}

#[tokio::test]
async fn second_turn_resumes_the_reported_thread() {
    let fake = FakeCodex::new(&format!(
        "cat > /dev/null\nprintf '%s\\n' \"$@\" > \"$DIR/args.txt\"\n{HAPPY_EVENTS}"
    ));
    let thread = fake.codex(CodexOptions::new()).start_thread(ThreadOptions::new());
    thread.run("one", TurnOptions::new()).await.expect("first");
    thread.run("two", TurnOptions::new()).await.expect("second");

    let args = recorded_args(&fake);
    let resume = args.iter().position(|arg| arg == "resume").expect("resume");
    assert_eq!(args[resume + 1], "th-int");
}

#[tokio::test]
async fn schema_file_exists_while_the_process_runs() {
    let fake = FakeCodex::new(&format!(
        r#"cat > /dev/null
while [ $# -gt 0 ]; do
  if [ "$1" = "--output-schema" ]; then cat "$2" > "$DIR/schema.json"; echo "$2" > "$DIR/schema_path.txt"; fi
  shift
done
printf '%s\n' '{{"type":"item.completed","item":{{"id":"m","type":"agent_message","text":"{{\"ok\":true}}"}}}}'
printf '%s\n' '{{"type":"turn.completed","usage":{{"input_tokens":1,"cached_input_tokens":0,"output_tokens":1}}}}'
"#
    ));
    let schema = json!({"type": "object", "properties": {"ok": {"type": "boolean"}}});
    let turn = fake
        .codex(CodexOptions::new())
        .start_thread(ThreadOptions::new())
        .run("structured", TurnOptions::new().output_schema(schema.clone()))
        .await
        .expect("turn");

    let written: serde_json::Value =
        serde_json::from_str(&fake.file("schema.json")).expect("schema copied by process");
    assert_eq!(written, schema);
    assert_eq!(turn.structured_response(), Ok(&json!({"ok": true})));

    let schema_path = fake.file("schema_path.txt");
    assert!(!Path::new(schema_path.trim()).exists());
}

#[tokio::test]
async fn non_zero_exit_carries_stderr() {
    let fake = FakeCodex::new("cat > /dev/null\necho 'model exploded' >&2\nexit 3\n");
    let err = fake
        .codex(CodexOptions::new())
        .start_thread(ThreadOptions::new())
        .run("hello", TurnOptions::new())
        .await
        .expect_err("exit 3");
    match err {
        CodexError::Exec { message, stderr } => {
            assert_eq!(message, "codex exec exited with code 3");
            assert!(stderr.contains("model exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn replaced_environment_reaches_the_process() {
    // PATH is cleared along with everything else, so only builtins are used.
    let fake = FakeCodex::new(
        "printf '%s|%s|%s\\n' \"$FOO\" \"$CODEX_API_KEY\" \"$CODEX_INTERNAL_ORIGINATOR_OVERRIDE\" > \"$DIR/env.txt\"\nprintf '%s\\n' '{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":0,\"cached_input_tokens\":0,\"output_tokens\":0}}'\n",
    );
    let options = CodexOptions::new()
        .api_key("sk-test")
        .env([("FOO", "bar")]);
    fake.codex(options)
        .start_thread(ThreadOptions::new())
        .run("hello", TurnOptions::new())
        .await
        .expect("turn");
    assert_eq!(fake.file("env.txt").trim(), "bar|sk-test|codex_sdk_rs");
}

#[tokio::test]
async fn cancelling_a_streamed_turn_stops_the_process() {
    let fake = FakeCodex::new(
        "echo $$ > \"$DIR/pid.txt\"\ncat > /dev/null\nprintf '%s\\n' '{\"type\":\"turn.started\"}'\nexec sleep 30\n",
    );
    let signal = CancelSignal::new();
    let mut streamed = fake
        .codex(CodexOptions::new())
        .start_thread(ThreadOptions::new())
        .run_streamed("hello", TurnOptions::new().signal(signal.clone()))
        .await
        .expect("start");

    let first = streamed.next_event().await.expect("event").expect("ok");
    assert_eq!(first, ThreadEvent::TurnStarted);

    let remote = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        remote.cancel();
    });
    let next = tokio::time::timeout(Duration::from_secs(10), streamed.next_event())
        .await
        .expect("cancellation is prompt");
    assert_eq!(next.map(|event| event.err()), Some(Some(CodexError::Cancelled)));
    assert!(streamed.next_event().await.is_none());
    assert_eq!(streamed.result().err(), Some(CodexError::Cancelled));
    assert!(!fake.file("pid.txt").trim().is_empty());
    assert_process_gone(&fake);
}

#[tokio::test]
async fn missing_executable_is_reported() {
    let runner = ProcessRunner::new("/definitely/not/here/codex");
    let err = Codex::builder()
        .runner(Arc::new(runner))
        .build()
        .expect("build")
        .start_thread(ThreadOptions::new())
        .run("hello", TurnOptions::new())
        .await
        .expect_err("spawn fails");
    assert!(matches!(err, CodexError::ExecutableNotFound { .. }));
}

#[test]
fn blocking_turn_matches_async_semantics() {
    let fake = FakeCodex::new(&format!("cat > \"$DIR/stdin.txt\"\n{HAPPY_EVENTS}"));
    let thread = fake.blocking_codex().start_thread(ThreadOptions::new());

    let mut streamed = thread.run_streamed("blocking hello", TurnOptions::new()).expect("start");
    let types: Vec<_> = streamed
        .by_ref()
        .map(|event| event.expect("event").event_type())
        .collect();
    assert_eq!(
        types,
        ["thread.started", "turn.started", "item.completed", "turn.completed"]
    );
    let turn = streamed.into_result().expect("turn");
    assert_eq!(turn.final_response(), "all done");
    assert_eq!(thread.id(), Some("th-int"));
    assert_eq!(fake.file("stdin.txt"), "blocking hello");
}

#[test]
fn blocking_cancellation_from_another_thread() {
    let fake = FakeCodex::new("echo $$ > \"$DIR/pid.txt\"\ncat > /dev/null\nexec sleep 30\n");
    let thread = fake.blocking_codex().start_thread(ThreadOptions::new());
    let signal = CancelSignal::new();
    let remote = signal.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        remote.cancel();
    });

    let started = std::time::Instant::now();
    let err = thread
        .run("hello", TurnOptions::new().signal(signal))
        .expect_err("cancelled");
    assert_eq!(err, CodexError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    canceller.join().expect("join");
    assert_process_gone(&fake);
}

#[test]
fn blocking_non_zero_exit() {
    let fake = FakeCodex::new("cat > /dev/null\necho 'nope' >&2\nexit 2\n");
    let err = fake
        .blocking_codex()
        .start_thread(ThreadOptions::new())
        .run("hello", TurnOptions::new())
        .expect_err("exit 2");
    assert_eq!(
        err,
        CodexError::Exec {
            message: "codex exec exited with code 2".into(),
            stderr: "nope\n".into(),
        }
    );
}
