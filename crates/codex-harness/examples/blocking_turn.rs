use codex_harness::blocking::Codex;
use codex_harness::{CodexError, CodexOptions, ThreadOptions, TurnOptions};

fn main() -> Result<(), CodexError> {
    codex_harness::init_observability();

    let codex = Codex::new(CodexOptions::from_env())?;
    let thread = codex.start_thread(ThreadOptions::new().skip_git_repo_check(true));

    for event in thread.run_streamed("Say hello.", TurnOptions::new())? {
        println!("{}", event?.event_type());
    }

    let turn = thread.run("And now goodbye.", TurnOptions::new())?;
    println!("{}", turn.final_response());
    Ok(())
}
