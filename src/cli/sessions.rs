//! Session CLI command handlers.

use anyhow::{bail, Result};
use taskclaw::agent::ContextAccountant;
use taskclaw::config::Config;
use taskclaw::utils::string::preview;

use super::common::open_store;
use super::SessionsAction;

pub(crate) async fn cmd_sessions(config: Config, action: SessionsAction) -> Result<()> {
    match action {
        SessionsAction::List => cmd_sessions_list(&config).await,
        SessionsAction::Show { key } => cmd_sessions_show(&config, &key).await,
        SessionsAction::Clear { key } => cmd_sessions_clear(&config, &key).await,
        SessionsAction::Delete { key } => cmd_sessions_delete(&config, &key).await,
    }
}

async fn cmd_sessions_list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let accountant = ContextAccountant::from_config(config);
    let mut sessions = store.list().await?;

    if sessions.is_empty() {
        println!("No sessions stored yet.");
        println!("Start one: taskclaw agent -m \"Hello\"");
        return Ok(());
    }

    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    println!("Sessions ({})", sessions.len());
    println!("{}", "-".repeat(60));
    for session in &sessions {
        let stats = accountant.stats(session, config.context.context_limit);
        println!(
            "  {}  {} messages, ~{} tokens ({:.1}% of {})",
            stats.key,
            stats.message_count,
            stats.estimated_tokens,
            stats.usage_percent,
            stats.context_limit
        );
        if let Some(last) = session.last_message() {
            println!("    {}", preview(&last.content, 70));
        }
    }
    Ok(())
}

async fn cmd_sessions_show(config: &Config, key: &str) -> Result<()> {
    let store = open_store(config)?;
    let Some(session) = store.get(key).await? else {
        bail!("Session '{}' not found", key);
    };

    println!("Session {} (id {})", session.key, session.id);
    println!(
        "Created {}, updated {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S"),
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", "-".repeat(60));
    for message in &session.messages {
        println!("[{}] {}", message.role, preview(&message.content, 200));
        for call in message.tool_calls.iter().flatten() {
            println!("    -> {}({})", call.name, preview(&call.arguments.to_string(), 80));
        }
    }
    Ok(())
}

async fn cmd_sessions_clear(config: &Config, key: &str) -> Result<()> {
    let store = open_store(config)?;
    store.clear(key).await?;
    println!("Cleared session '{}'.", key);
    Ok(())
}

async fn cmd_sessions_delete(config: &Config, key: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.delete(key).await? {
        println!("Deleted session '{}'.", key);
    } else {
        println!("Session '{}' not found.", key);
    }
    Ok(())
}
