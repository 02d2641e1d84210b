//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The system prompt used when neither an override nor a file is configured.
///
/// The `<tools></tools>` region is replaced with the registered operation
/// definitions before every generation call.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous agent working towards the goal given in the user prompt.
You act by calling functions. Each response must contain at least one function call.

The functions available to you are:
<tools></tools>

To call functions, end your response with a block in this exact format:
<function_calls>
<function_call>
<function_name>Tool.operation</function_name>
<parameters>
<parameter_name>value</parameter_name>
</parameters>
</function_call>
</function_calls>

Before calling functions, reason step by step about what you know, what you still need, and which calls move you closer to the goal.
Previous calls and their outputs are listed in <function_call_history>. Values you saved are listed in <memory>.
Use Agent.saveMemory to keep information you will need later.
Call Agent.requestFeedback when you need a decision or information only a human can provide.
Call Agent.completed once the goal is achieved, with a note summarizing the outcome.
"#;

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key used by providers that don't set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Human-in-loop budget settings
    #[serde(default)]
    pub human_in_loop: HumanInLoopConfig,

    /// Ordered provider fallback chain
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Which providers back each difficulty tier
    #[serde(default)]
    pub tiers: TierConfig,

    /// Run record persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Agent identity and system prompt
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("human_in_loop", &self.human_in_loop)
            .field("providers", &self.providers)
            .field("tiers", &self.tiers)
            .field("store", &self.store)
            .field("agent", &self.agent)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("input_per_m", &self.input_per_m)
            .field("output_per_m", &self.output_per_m)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// When a run pauses for human confirmation.
///
/// A value of `0` disables the corresponding check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanInLoopConfig {
    /// Steps allowed between confirmations
    #[serde(default)]
    pub iteration_threshold: u32,

    /// Spend (USD) allowed between confirmations
    #[serde(default)]
    pub cost_ceiling: f64,
}

impl HumanInLoopConfig {
    /// Cost ceiling applied when neither limit is configured.
    pub const DEFAULT_COST_CEILING: f64 = 1.0;

    /// Apply the default-ceiling rule: with both limits unset, spend is
    /// capped at [`Self::DEFAULT_COST_CEILING`].
    pub fn normalized(self) -> Self {
        if self.iteration_threshold == 0 && self.cost_ceiling == 0.0 {
            Self {
                cost_ceiling: Self::DEFAULT_COST_CEILING,
                ..self
            }
        } else {
            self
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in tier lists and error messages
    pub name: String,

    /// Base URL of an OpenAI-compatible API (e.g. `https://api.together.xyz/v1`)
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model: String,

    /// Price per 1M input tokens in USD
    #[serde(default)]
    pub input_per_m: f64,

    /// Price per 1M output tokens in USD
    #[serde(default)]
    pub output_per_m: f64,

    /// Give up on this provider after this many seconds and try the next one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Provider names per difficulty tier. An empty list means the full chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default)]
    pub easy: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub hard: Vec<String>,
    #[serde(default)]
    pub xhard: Vec<String>,
}

impl TierConfig {
    fn all(&self) -> impl Iterator<Item = (&'static str, &Vec<String>)> {
        [
            ("easy", &self.easy),
            ("medium", &self.medium),
            ("hard", &self.hard),
            ("xhard", &self.xhard),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for run records (default `~/.stepwise/runs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Directory the FileStore tool writes into (default `~/.stepwise/files`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn runs_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("runs"))
    }

    pub fn files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("files"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Label given to new runs
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Load the system prompt from this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<PathBuf>,

    /// Override the system prompt entirely (skips file loading)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_agent_name() -> String {
    "stepwise".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt_file: None,
            system_prompt_override: None,
        }
    }
}

impl AgentConfig {
    /// Resolve the system prompt: override, then file, then the built-in default.
    pub fn system_prompt(&self) -> Result<String, ConfigError> {
        if let Some(prompt) = &self.system_prompt_override {
            return Ok(prompt.clone());
        }
        match &self.system_prompt_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            }),
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides:
    /// - `STEPWISE_API_KEY` fills in a missing API key
    /// - `HIL_COUNT` sets the iteration threshold
    /// - `HIL_BUDGET` sets the cost ceiling
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("STEPWISE_API_KEY");
        }

        if let Some(count) = lookup("HIL_COUNT") {
            self.human_in_loop.iteration_threshold =
                count.trim().parse().map_err(|_| {
                    ConfigError::ValidationError(format!("HIL_COUNT must be a whole number, got {count:?}"))
                })?;
        }

        if let Some(budget) = lookup("HIL_BUDGET") {
            self.human_in_loop.cost_ceiling = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("HIL_BUDGET must be a number, got {budget:?}"))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// The API key for a provider: its own, else the global one.
    pub fn api_key_for<'a>(&'a self, provider: &'a ProviderConfig) -> Option<&'a str> {
        provider.api_key.as_deref().or(self.api_key.as_deref())
    }

    /// Providers backing `tier`, in chain order.
    pub fn tier_providers(&self, tier: &str) -> Vec<&ProviderConfig> {
        let names = self
            .tiers
            .all()
            .find(|(name, _)| *name == tier)
            .map(|(_, names)| names.as_slice())
            .unwrap_or_default();
        if names.is_empty() {
            return self.providers.iter().collect();
        }
        names
            .iter()
            .filter_map(|name| self.providers.iter().find(|p| p.name == *name))
            .collect()
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let ceiling = self.human_in_loop.cost_ceiling;
        if !ceiling.is_finite() || ceiling < 0.0 {
            return Err(ConfigError::ValidationError(
                "human_in_loop.cost_ceiling must be a non-negative number".into(),
            ));
        }

        for (i, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "providers[{i}] has an empty name"
                )));
            }
            if self.providers[..i].iter().any(|p| p.name == provider.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.input_per_m < 0.0 || provider.output_per_m < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' has negative pricing",
                    provider.name
                )));
            }
        }

        for (tier, names) in self.tiers.all() {
            if let Some(unknown) = names
                .iter()
                .find(|name| !self.providers.iter().any(|p| p.name == **name))
            {
                return Err(ConfigError::ValidationError(format!(
                    "tier '{tier}' references unknown provider '{unknown}'"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
