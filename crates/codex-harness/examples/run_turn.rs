use codex_harness::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RepoSummary {
    language: String,
    purpose: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CodexError> {
    codex_harness::init_observability();

    let codex = Codex::new(CodexOptions::from_env())?;
    let thread = codex.start_thread(
        ThreadOptions::new()
            .sandbox_mode(SandboxMode::ReadOnly)
            .skip_git_repo_check(true),
    );

    let turn = thread
        .run(
            "Describe this repository in one sentence.",
            TurnOptions::new().output_type::<RepoSummary>(),
        )
        .await?;

    match turn.structured_response() {
        Ok(summary) => println!("{} project: {}", summary.language, summary.purpose),
        Err(err) => eprintln!("unstructured reply ({err}): {}", turn.final_response()),
    }
    if let Some(usage) = turn.usage() {
        println!("tokens used: {}", usage.total_tokens());
    }
    println!("thread: {:?}", thread.id());
    Ok(())
}
