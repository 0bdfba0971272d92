//! Agent loop implementation
//!
//! This module provides the core agent loop: it resolves the session, keeps
//! it inside the context window, calls the LLM provider and executes the
//! tool calls the model requests until it produces a final answer or the
//! iteration ceiling is reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{Config, ThinkLevel};
use crate::error::{Result, TaskClawError};
use crate::providers::{collect_stream, CompletionRequest, CompletionResponse, LLMProvider};
use crate::session::history::provider_view;
use crate::session::{Message, SessionStore, ToolCall, ToolResult};
use crate::tools::{Tool, ToolContext, ToolRegistry};

use super::compaction::Compactor;
use super::context::ContextBuilder;
use super::events::{AgentEvent, EventEmitter, EventListener};
use super::parser::{parse_tool_calls, strip_tool_calls};
use super::tokens::ContextAccountant;

/// Input of one agent run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Session to run against; created on first use
    pub session_key: String,
    /// The user's message
    pub user_text: String,
    /// Provider-call ceiling (config default if None)
    pub max_iterations: Option<u32>,
    /// Think level (config default if None)
    pub think_level: Option<ThinkLevel>,
    /// Image references attached to the user message
    pub images: Vec<String>,
}

impl RunRequest {
    /// Create a request with config defaults.
    pub fn new(session_key: &str, user_text: &str) -> Self {
        Self {
            session_key: session_key.to_string(),
            user_text: user_text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_think_level(mut self, think_level: ThinkLevel) -> Self {
        self.think_level = Some(think_level);
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// Outcome of a run that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// The model produced a final answer
    pub success: bool,
    /// Final answer, or the last partial text when the run was cut off
    pub content: String,
    /// Every tool result produced during the run, in order
    pub tool_results: Vec<ToolResult>,
    /// Human-readable failure reason
    pub error: Option<String>,
    /// Provider calls made
    pub iterations: u32,
}

impl RunResult {
    fn done(content: String, tool_results: Vec<ToolResult>, iterations: u32) -> Self {
        Self {
            success: true,
            content,
            tool_results,
            error: None,
            iterations,
        }
    }

    fn max_iterations_exceeded(
        content: String,
        tool_results: Vec<ToolResult>,
        max_iterations: u32,
        iterations: u32,
    ) -> Self {
        Self {
            success: false,
            content,
            tool_results,
            error: Some(TaskClawError::MaxIterationsExceeded(max_iterations).to_string()),
            iterations,
        }
    }
}

/// The main agent loop that runs requests against sessions.
///
/// One `AgentLoop` owns its tool registry and event listeners, so several
/// independent agents can live in one process. Concurrent runs on the same
/// session key must be serialized by the caller, normally through
/// [`SessionQueue`](crate::queue::SessionQueue).
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use taskclaw::agent::{AgentLoop, RunRequest};
/// use taskclaw::config::Config;
/// use taskclaw::providers::OpenAIProvider;
/// use taskclaw::session::SessionStore;
/// use taskclaw::tools::EchoTool;
///
/// let config = Config::default();
/// let provider = Arc::new(OpenAIProvider::from_config(&config)?);
/// let agent = AgentLoop::new(config, SessionStore::new_memory(), provider);
/// agent.register_tool(Box::new(EchoTool)).await;
///
/// let result = agent.run(RunRequest::new("cli:default", "2+2?")).await?;
/// println!("{}", result.content);
/// ```
pub struct AgentLoop {
    /// Agent configuration
    config: Arc<Config>,
    /// Session store for conversation state
    store: SessionStore,
    /// The LLM provider, shared read-only across runs
    provider: Arc<dyn LLMProvider>,
    /// Registered tools
    tools: Arc<RwLock<ToolRegistry>>,
    /// Token estimator shared with the compactor
    accountant: ContextAccountant,
    /// Shrinks overflowing sessions
    compactor: Compactor,
    /// Renders the identity prompt and the tool catalogue
    context_builder: ContextBuilder,
    /// Lifecycle event listeners
    events: RwLock<EventEmitter>,
    /// Directory filesystem tools are confined to
    workspace: Option<PathBuf>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(config: Config, store: SessionStore, provider: Arc<dyn LLMProvider>) -> Self {
        let mut context_builder = ContextBuilder::new();
        if let Some(ref prompt) = config.agent.system_prompt {
            context_builder = context_builder.with_system_prompt(prompt);
        }
        let tools = ToolRegistry::with_policy(config.tools.clone());
        Self {
            accountant: ContextAccountant::from_config(&config),
            compactor: Compactor::from_config(&config),
            config: Arc::new(config),
            store,
            provider,
            tools: Arc::new(RwLock::new(tools)),
            context_builder,
            events: RwLock::new(EventEmitter::new()),
            workspace: None,
        }
    }

    /// Replace the context builder.
    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    /// Confine filesystem tools to `workspace` and mention it in the catalogue.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        self.context_builder = self
            .context_builder
            .with_workspace(&workspace.to_string_lossy());
        self.workspace = Some(workspace);
        self
    }

    /// Get the agent configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Get the token accountant.
    pub fn accountant(&self) -> &ContextAccountant {
        &self.accountant
    }

    /// Register a tool with the agent.
    ///
    /// Tools registered after a session was seeded are callable but do not
    /// appear in that session's catalogue.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.register(tool);
    }

    /// Get the number of registered tools.
    pub async fn tool_count(&self) -> usize {
        let tools = self.tools.read().await;
        tools.len()
    }

    /// Check if a tool is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        let tools = self.tools.read().await;
        tools.has(name)
    }

    /// Register a lifecycle event listener.
    pub async fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.events.write().await.add_listener(listener);
    }

    /// Run one request to a terminal state.
    ///
    /// # Returns
    /// `Ok` with `success: true` when the model answered, or `success: false`
    /// when the iteration ceiling was hit (partial content and every tool
    /// result are included).
    ///
    /// # Errors
    /// * Provider failures, which are never retried here.
    /// * `ContextOverflow` when compaction cannot fit the session. The
    ///   user message is not kept, so a shorter retry can succeed.
    /// * Session store I/O failures.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let span = info_span!(
            "agent_run",
            run_id = %uuid::Uuid::new_v4(),
            session = %request.session_key,
        );
        async {
            info!("Run started");
            let start = Instant::now();
            self.emit(AgentEvent::RunStart {
                session_key: request.session_key.clone(),
                user_text: request.user_text.clone(),
            })
            .await;

            let outcome = self.drive(&request).await;

            let (success, iterations, error) = match &outcome {
                Ok(result) => (result.success, result.iterations, result.error.clone()),
                Err(e) => (false, 0, Some(e.to_string())),
            };
            info!(
                success,
                iterations,
                duration_ms = start.elapsed().as_millis() as u64,
                "Run finished"
            );
            self.emit(AgentEvent::RunEnd {
                session_key: request.session_key.clone(),
                success,
                iterations,
                error,
            })
            .await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, request: &RunRequest) -> Result<RunResult> {
        let key = request.session_key.as_str();
        self.prepare_session(key).await?;

        let user_msg = Message::user(&request.user_text).with_images(request.images.clone());
        self.store.append(key, user_msg.clone()).await?;

        if let Err(e) = self.ensure_within_window(key).await {
            if matches!(e, TaskClawError::ContextOverflow { .. }) {
                self.retract_last_message(key, &user_msg).await?;
            }
            return Err(e);
        }

        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.agent.max_iterations);
        let think_level = request
            .think_level
            .unwrap_or(self.config.agent.think_level);

        let mut tool_ctx = ToolContext::new(key, Arc::clone(&self.config));
        if let Some(ref workspace) = self.workspace {
            tool_ctx = tool_ctx.with_workspace(workspace.clone());
        }

        let mut iteration = 0u32;
        let mut tool_results = Vec::new();
        let mut partial = String::new();

        while iteration < max_iterations {
            iteration += 1;
            debug!(iteration, max_iterations, "Calling provider");

            let history = self.store.get_messages(key).await?;
            let messages = provider_view(&history, self.config.agent.history_turn_limit);
            let response = self.call_provider(messages, think_level).await?;

            let calls = parse_tool_calls(&response.content);
            if calls.is_empty() {
                self.store
                    .append(key, Message::assistant(&response.content))
                    .await?;
                return Ok(RunResult::done(response.content, tool_results, iteration));
            }

            partial = strip_tool_calls(&response.content);
            self.store
                .append(
                    key,
                    Message::assistant_with_tools(&response.content, calls.clone()),
                )
                .await?;

            for call in &calls {
                let result = self.execute_call(call, &tool_ctx).await;
                self.store
                    .append(key, Message::tool_result(result.clone()))
                    .await?;
                tool_results.push(result);
            }
        }

        warn!(
            max_iterations,
            tool_results = tool_results.len(),
            "Max iterations exceeded, returning partial response"
        );
        Ok(RunResult::max_iterations_exceeded(
            partial,
            tool_results,
            max_iterations,
            iteration,
        ))
    }

    /// Resolve the session, seeding new ones with the tool catalogue.
    async fn prepare_session(&self, key: &str) -> Result<()> {
        let (_, created) = self.store.get_or_create(key).await?;
        if created {
            let definitions = {
                let tools = self.tools.read().await;
                tools.definitions()
            };
            info!(tools = definitions.len(), "Seeding new session with tool catalogue");
            self.store
                .append(key, self.context_builder.build_seed_message(&definitions))
                .await?;
        }
        Ok(())
    }

    /// Compact the session if it overflows; fail if it still does.
    async fn ensure_within_window(&self, key: &str) -> Result<()> {
        let limit = self.config.context.context_limit;
        let session = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| TaskClawError::SessionNotFound(key.to_string()))?;

        let status = self.accountant.check_window(&session, limit);
        if !status.is_overflow {
            if status.warning {
                warn!(
                    estimated_tokens = status.estimated_tokens,
                    limit,
                    usage_percent = status.usage_percent,
                    "Context window nearly full"
                );
            }
            return Ok(());
        }

        if !self.config.compaction.enabled {
            return Err(TaskClawError::ContextOverflow {
                estimated: status.estimated_tokens,
                limit,
            });
        }

        info!(
            estimated_tokens = status.estimated_tokens,
            limit, "Context overflow, compacting"
        );
        let result = self
            .compactor
            .compact(
                &self.store,
                &session,
                self.config.compaction.target_budget(limit),
                self.provider.as_ref(),
                self.config.compaction.recent_turns_to_keep,
            )
            .await;
        debug!(?result, "Compaction finished");

        let session = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| TaskClawError::SessionNotFound(key.to_string()))?;
        let status = self.accountant.check_window(&session, limit);
        if status.is_overflow {
            return Err(TaskClawError::ContextOverflow {
                estimated: status.estimated_tokens,
                limit,
            });
        }
        Ok(())
    }

    /// Drop `msg` from the end of the log if it is still the newest entry.
    async fn retract_last_message(&self, key: &str, msg: &Message) -> Result<()> {
        let mut history = self.store.get_messages(key).await?;
        let is_last = history
            .last()
            .is_some_and(|last| last.role == msg.role && last.content == msg.content);
        if is_last {
            history.pop();
            self.store.replace_history(key, history).await?;
            warn!("Context overflow, user message not kept in session");
        }
        Ok(())
    }

    async fn call_provider(
        &self,
        messages: Vec<Message>,
        think_level: ThinkLevel,
    ) -> Result<CompletionResponse> {
        let request = CompletionRequest::new(messages)
            .with_system_prompt(self.context_builder.system_prompt(think_level))
            .with_model(&self.config.agent.model)
            .with_temperature(self.config.agent.temperature)
            .with_max_tokens(self.config.agent.max_tokens);

        let response = match think_level {
            ThinkLevel::Stream => {
                let rx = self.provider.stream(request).await?;
                collect_stream(rx).await?
            }
            ThinkLevel::Off | ThinkLevel::On => self.provider.complete(request).await?,
        };

        if let Some(usage) = response.usage {
            debug!(
                provider = self.provider.name(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Provider usage"
            );
        }
        Ok(response)
    }

    /// Execute one tool call. Every failure becomes a failed result.
    async fn execute_call(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        info!(tool = %call.name, id = %call.id, "Executing tool");
        self.emit(AgentEvent::ToolStart {
            session_key: ctx.session_key.clone(),
            call_id: call.id.clone(),
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
        })
        .await;

        let start = Instant::now();
        let result = match call.parse_arguments() {
            Err(parse_error) => ToolResult::failed(&call.id, &call.name, &parse_error),
            Ok(args) => {
                let tools = self.tools.read().await;
                match tools.execute(&call.name, args, ctx).await {
                    Ok(output) => output.into_result(&call.id, &call.name),
                    Err(e) => ToolResult::failed(&call.id, &call.name, &e.to_string()),
                }
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let event = if result.success {
            AgentEvent::ToolEnd {
                session_key: ctx.session_key.clone(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                duration_ms,
            }
        } else {
            warn!(
                tool = %call.name,
                duration_ms,
                error = result.error.as_deref().unwrap_or(""),
                "Tool call failed"
            );
            AgentEvent::ToolError {
                session_key: ctx.session_key.clone(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                error: result.error.clone().unwrap_or_default(),
            }
        };
        self.emit(event).await;
        result
    }

    async fn emit(&self, event: AgentEvent) {
        self.events.read().await.emit(&event);
    }
}
