//! Configuration management for TaskClaw
//!
//! Configuration is resolved once at startup with a fixed precedence:
//! explicit overrides > environment (`TASKCLAW_SECTION_KEY`) > JSON file
//! (`~/.taskclaw/config.json`) > built-in defaults. The result is validated
//! before anything else reads it.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{Result, TaskClawError};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Values supplied explicitly by the caller (CLI flags, embedding code).
///
/// These win over every other configuration source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub think_level: Option<ThinkLevel>,
    pub context_limit: Option<usize>,
    pub api_base: Option<String>,
    pub session_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Returns the TaskClaw configuration directory path (~/.taskclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskclaw")
    }

    /// Returns the path to the config file (~/.taskclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let raw: serde_json::Value = serde_json::from_str(&content)
                .map_err(|e| TaskClawError::Config(format!("{}: {}", path.display(), e)))?;
            for diagnostic in validate::validate_config(&raw) {
                warn!(path = %path.display(), "{}", diagnostic);
            }
            serde_json::from_value(raw)
                .map_err(|e| TaskClawError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Resolve the full configuration: file, environment, explicit overrides,
    /// then validation.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_path(p)?,
            None => Self::load()?,
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply explicit overrides on top of the current values.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref model) = overrides.model {
            self.agent.model = model.clone();
        }
        if let Some(n) = overrides.max_iterations {
            self.agent.max_iterations = n;
        }
        if let Some(level) = overrides.think_level {
            self.agent.think_level = level;
        }
        if let Some(limit) = overrides.context_limit {
            self.context.context_limit = limit;
        }
        if let Some(ref base) = overrides.api_base {
            self.provider.api_base = base.clone();
        }
        if let Some(ref dir) = overrides.session_dir {
            self.session.dir = Some(dir.clone());
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: TASKCLAW_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Unparseable numeric values are ignored, leaving the previous value.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Agent
        if let Some(val) = var("TASKCLAW_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Some(val) = var("TASKCLAW_AGENT_MAX_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.agent.max_iterations = v;
            }
        }
        if let Some(val) = var("TASKCLAW_AGENT_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.agent.temperature = v;
            }
        }
        if let Some(val) = var("TASKCLAW_AGENT_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tokens = v;
            }
        }
        if let Some(val) = var("TASKCLAW_AGENT_THINK_LEVEL") {
            if let Ok(v) = val.parse() {
                self.agent.think_level = v;
            }
        }
        if let Some(val) = var("TASKCLAW_AGENT_HISTORY_TURN_LIMIT") {
            if let Ok(v) = val.parse() {
                self.agent.history_turn_limit = v;
            }
        }

        // Context and compaction
        if let Some(val) = var("TASKCLAW_CONTEXT_CONTEXT_LIMIT") {
            if let Ok(v) = val.parse() {
                self.context.context_limit = v;
            }
        }
        if let Some(val) = var("TASKCLAW_COMPACTION_ENABLED") {
            if let Ok(v) = val.parse() {
                self.compaction.enabled = v;
            }
        }
        if let Some(val) = var("TASKCLAW_COMPACTION_RECENT_TURNS_TO_KEEP") {
            if let Ok(v) = val.parse() {
                self.compaction.recent_turns_to_keep = v;
            }
        }

        // Queue
        if let Some(val) = var("TASKCLAW_QUEUE_WARN_AFTER_MS") {
            if let Ok(v) = val.parse() {
                self.queue.warn_after_ms = v;
            }
        }

        // Session
        if let Some(val) = var("TASKCLAW_SESSION_DIR") {
            self.session.dir = Some(PathBuf::from(val));
        }

        // Provider
        if let Some(val) = var("TASKCLAW_PROVIDER_API_BASE") {
            self.provider.api_base = val;
        }
        if let Some(val) = var("TASKCLAW_PROVIDER_API_KEY") {
            self.provider.api_key = Some(val);
        }

        // Logging
        if let Some(val) = var("TASKCLAW_LOGGING_LEVEL") {
            self.logging.level = val;
        }

        // Tools
        if let Some(val) = var("TASKCLAW_TOOLS_SECURITY") {
            if let Ok(v) = val.parse() {
                self.tools.security = v;
            }
        }
        if let Some(val) = var("TASKCLAW_TOOLS_ALLOW") {
            self.tools.allow = val
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Validate value ranges. Called once after resolution.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.agent.max_iterations == 0 {
            problems.push("agent.max_iterations must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            problems.push(format!(
                "agent.temperature must be within 0.0..=2.0 (got {})",
                self.agent.temperature
            ));
        }
        if self.context.context_limit == 0 {
            problems.push("context.context_limit must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.context.warn_percent) {
            problems.push("context.warn_percent must be within 0..=100".to_string());
        }
        if !(self.compaction.target_ratio > 0.0 && self.compaction.target_ratio <= 1.0) {
            problems.push(format!(
                "compaction.target_ratio must be within (0.0, 1.0] (got {})",
                self.compaction.target_ratio
            ));
        }
        if self.queue.max_concurrent == 0 {
            problems.push("queue.max_concurrent must be at least 1".to_string());
        }
        if self.queue.global_max_concurrent == Some(0) {
            problems.push("queue.global_max_concurrent must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TaskClawError::Config(problems.join("; ")))
        }
    }

    /// Directory used by the JSONL session medium.
    pub fn sessions_dir(&self) -> PathBuf {
        self.session
            .dir
            .clone()
            .unwrap_or_else(|| Self::dir().join("sessions"))
    }
}
