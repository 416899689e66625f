use std::time::Duration;

use codex_harness::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CodexError> {
    codex_harness::init_observability();

    let codex = Codex::new(CodexOptions::from_env())?;
    let thread = codex.start_thread(ThreadOptions::new().skip_git_repo_check(true));

    let signal = CancelSignal::new();
    let timeout = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        timeout.cancel();
    });

    let mut streamed = thread
        .run_streamed(
            "List the files in the current directory.",
            TurnOptions::new().signal(signal),
        )
        .await?;

    while let Some(event) = streamed.next_event().await {
        match event? {
            ThreadEvent::ItemCompleted { item } => match &item.details {
                ThreadItemDetails::AgentMessage(message) => println!("{}", message.text),
                ThreadItemDetails::CommandExecution(command) => {
                    println!("$ {} -> {:?}", command.command, command.exit_code)
                }
                _ => println!("[{}] {}", item.kind(), item.id),
            },
            ThreadEvent::TurnCompleted { usage } => {
                println!("done ({} tokens)", usage.total_tokens())
            }
            other => println!("{}", other.event_type()),
        }
    }

    let turn = streamed.into_result()?;
    println!("{} items", turn.items().len());
    Ok(())
}
