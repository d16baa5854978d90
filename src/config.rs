//! Configuration loading.
//!
//! Reads a YAML file with `${VAR}` / `${VAR:-default}` interpolation.
//! Lookup order:
//! 1. `--config <path>`
//! 2. `TOOLCHAT_CONFIG` env var
//! 3. `toolchat.yaml` in the working directory
//! 4. `{config_dir}/toolchat/config.yaml`
//!
//! When none exists, built-in defaults are used.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::ChatSettings;
use crate::inference::CompletionOptions;
use crate::mcp_client::{RetryPolicy, ServerConfig, TransportConfig};

/// Env var naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TOOLCHAT_CONFIG";

/// Config file name looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = "toolchat.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    /// Ordered; the order is routing precedence.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            servers: vec![ServerConfig {
                name: "Demo".into(),
                transport: TransportConfig::Sse {
                    url: "http://localhost:8000/sse".into(),
                },
            }],
            chat: ChatConfig::default(),
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Temperature for the request that may produce a tool call.
    pub tool_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let options = CompletionOptions::default();
        Self {
            base_url: "http://localhost:1234/v1".into(),
            model: options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            tool_temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub tool_retries: u32,
    pub retry_delay_ms: u64,
    /// Template with a `{tools_description}` placeholder.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            tool_retries: policy.retries,
            retry_delay_ms: policy.delay.as_millis() as u64,
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Find and load the config, falling back to defaults.
    ///
    /// Returns the config and the file it came from, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let cwd = std::env::current_dir().unwrap_or_default();
        let found = find_config_path(
            explicit,
            std::env::var(CONFIG_ENV_VAR).ok().as_deref(),
            &cwd,
            dirs::config_dir().as_deref(),
        )?;

        match found {
            Some(path) => {
                let config = load_config(&path)?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.llm.base_url.trim().is_empty() {
            return invalid("llm.base_url must not be empty".into());
        }
        if self.chat.tool_retries < 1 {
            return invalid("chat.tool_retries must be at least 1".into());
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return invalid("server names must not be empty".into());
            }
            if !seen.insert(server.name.as_str()) {
                return invalid(format!("duplicate server name '{}'", server.name));
            }
            match &server.transport {
                TransportConfig::Sse { url } if url.trim().is_empty() => {
                    return invalid(format!("server '{}' has an empty url", server.name));
                }
                TransportConfig::Stdio { command, .. } if command.trim().is_empty() => {
                    return invalid(format!("server '{}' has an empty command", server.name));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            model: self.llm.model.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.chat.tool_retries,
            delay: Duration::from_millis(self.chat.retry_delay_ms),
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            options: self.completion_options(),
            tool_temperature: self.llm.tool_temperature,
            retry: self.retry_policy(),
            system_prompt: self.chat.system_prompt.clone(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve which config file to use, if any.
///
/// An explicit path or env var that points at a missing file is an error;
/// the implicit locations are simply skipped.
pub fn find_config_path(
    explicit: Option<&Path>,
    env_value: Option<&str>,
    cwd: &Path,
    config_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    let require = |path: PathBuf| {
        if path.is_file() {
            Ok(Some(path))
        } else {
            Err(ConfigError::ReadFailed {
                path: path.display().to_string(),
                reason: "file not found".into(),
            })
        }
    };

    if let Some(path) = explicit {
        return require(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        return require(PathBuf::from(expand_tilde(value)));
    }

    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(dir) = config_dir {
        let user = dir.join("toolchat").join("config.yaml");
        if user.is_file() {
            return Ok(Some(user));
        }
    }

    Ok(None)
}

/// Read, interpolate, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config = parse_config(&raw).map_err(|reason| ConfigError::ParseFailed {
        path: path.display().to_string(),
        reason,
    })?;

    for server in &mut config.servers {
        if let TransportConfig::Stdio { command, cwd, .. } = &mut server.transport {
            *command = expand_tilde(command);
            if let Some(dir) = cwd {
                *dir = expand_tilde(dir);
            }
        }
    }

    config.validate()?;
    tracing::debug!(path = %path.display(), servers = config.servers.len(), "loaded config");
    Ok(config)
}

/// Parse YAML text after env-var interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, String> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AppConfig {
            servers: Vec::new(),
            ..AppConfig::default()
        });
    }
    serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
