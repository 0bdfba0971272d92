//! Agent command handlers (single-message and interactive mode).

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use taskclaw::agent::{AgentLoop, RunRequest, RunResult};
use taskclaw::config::Config;
use taskclaw::queue::{EnqueueOptions, SessionQueue};
use taskclaw::utils::string::preview;

use super::common::create_agent;

/// Run one message, or read messages from stdin until `quit`.
pub(crate) async fn cmd_agent(config: Config, message: Option<String>, session: String) -> Result<()> {
    let queue = SessionQueue::from_config(&config.queue);
    let max_idle = config.session.max_idle_secs.map(Duration::from_secs);
    let agent = create_agent(config).await?;

    if let Some(msg) = message {
        match submit(&queue, &agent, &session, &msg).await {
            Ok(result) => print_result(&result),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    println!("TaskClaw Interactive Agent (session {})", session);
    println!("Type your message and press Enter. Type 'quit' or 'exit' to stop.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "quit" || input == "exit" {
                    println!("Goodbye!");
                    break;
                }

                match submit(&queue, &agent, &session, input).await {
                    Ok(result) => {
                        println!();
                        print_result(&result);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        eprintln!();
                    }
                }

                if let Some(max_idle) = max_idle {
                    agent.store().evict_idle(max_idle).await;
                    queue.prune_idle();
                }
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Run a message through the session's lane.
async fn submit(
    queue: &SessionQueue,
    agent: &Arc<AgentLoop>,
    session: &str,
    text: &str,
) -> taskclaw::Result<RunResult> {
    let agent = Arc::clone(agent);
    let request = RunRequest::new(session, text);
    queue
        .enqueue(
            session,
            move || async move { agent.run(request).await },
            EnqueueOptions::new(),
        )
        .await
}

fn print_result(result: &RunResult) {
    for tool_result in &result.tool_results {
        println!("  {}", preview(&tool_result.render(), 100));
    }
    println!("{}", result.content);
    if let Some(ref error) = result.error {
        eprintln!("Warning: {} (after {} iterations)", error, result.iterations);
    }
}
