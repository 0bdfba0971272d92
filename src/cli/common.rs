//! Shared CLI helpers: config resolution and agent construction.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskclaw::config::{Config, ConfigOverrides};
use taskclaw::providers::OpenAIProvider;
use taskclaw::session::SessionStore;
use taskclaw::tools::filesystem::{EditFileTool, ReadFileTool, WriteFileTool};
use taskclaw::tools::EchoTool;
use taskclaw::utils::logging::init_logging;
use taskclaw::AgentLoop;

/// Resolve config (file, env, flags), then install the tracing subscriber.
pub(crate) fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let config = Config::resolve(path, overrides).with_context(|| "Failed to load configuration")?;
    init_logging(&config.logging).with_context(|| "Failed to initialize logging")?;
    Ok(config)
}

/// Open the configured session store.
pub(crate) fn open_store(config: &Config) -> Result<SessionStore> {
    SessionStore::new(config).with_context(|| "Failed to open session store")
}

/// Create an agent with the built-in tools, rooted at the current directory.
pub(crate) async fn create_agent(config: Config) -> Result<Arc<AgentLoop>> {
    let store = open_store(&config)?;
    let provider =
        OpenAIProvider::from_config(&config).with_context(|| "Failed to create provider")?;
    let workspace = std::env::current_dir().with_context(|| "Failed to resolve workspace")?;

    let agent = AgentLoop::new(config, store, Arc::new(provider)).with_workspace(workspace);
    agent.register_tool(Box::new(EchoTool)).await;
    agent.register_tool(Box::new(ReadFileTool)).await;
    agent.register_tool(Box::new(WriteFileTool)).await;
    agent.register_tool(Box::new(EditFileTool)).await;

    Ok(Arc::new(agent))
}
