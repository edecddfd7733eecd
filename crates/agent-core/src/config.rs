//! Configuration
//!
//! Typed setup for the agent and its provider. Violations surface as
//! `Config` errors at construction, before anything talks to the network.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::provider::GenerationOptions;

/// Supported provider backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI or any API-compatible endpoint
    OpenAi,
    /// Zhipu GLM models (OpenAI-compatible surface)
    Zai,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Zai => write!(f, "zai"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "zai" => Ok(ProviderKind::Zai),
            other => Err(AgentError::Config(format!(
                "Unsupported provider: {other}. Supported providers: openai, zai"
            ))),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Provider connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,

    pub api_key: String,

    pub model: String,

    /// Overrides the provider's default endpoint when set
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn new(
        provider: ProviderKind,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AgentError::Config("api_key cannot be empty".into()));
        }
        if self.model.is_empty() {
            return Err(AgentError::Config("model cannot be empty".into()));
        }
        if self.timeout_secs < 1 {
            return Err(AgentError::Config("timeout must be >= 1".into()));
        }
        Ok(())
    }
}

fn default_max_iterations() -> usize {
    10
}

/// Full agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub llm: LlmConfig,

    /// Reasoning-loop iteration budget
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Injected as the first message of a fresh session when set
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub generation: GenerationOptions,
}

impl AgentConfig {
    pub fn new(llm: LlmConfig) -> Self {
        Self {
            llm,
            max_iterations: default_max_iterations(),
            system_prompt: None,
            generation: GenerationOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        if self.max_iterations < 1 {
            return Err(AgentError::Config("max_iterations must be >= 1".into()));
        }
        Ok(())
    }
}
