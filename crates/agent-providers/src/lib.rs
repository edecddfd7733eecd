//! # agent-providers
//!
//! Concrete LLM provider clients for the agent core.
//!
//! ## Providers
//!
//! - **OpenAI**: any chat-completions-compatible endpoint
//! - **Zai**: Zhipu GLM models, delegating to the OpenAI client with
//!   Zhipu defaults pre-filled
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::{AgentConfig, LlmConfig, ProviderKind};
//! use agent_providers::agent_from_config;
//!
//! let config = AgentConfig::new(LlmConfig::new(
//!     ProviderKind::OpenAi,
//!     std::env::var("OPENAI_API_KEY")?,
//!     "gpt-4o-mini",
//! ));
//! let agent = agent_from_config(&config)?;
//!
//! let mut session = agent.create_session();
//! let response = agent.chat(&mut session, "What time is it in Tokyo?").await?;
//! ```

pub mod factory;
pub mod openai;
pub mod zai;

pub use factory::create_provider;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use zai::ZaiProvider;

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentConfig, AgentError, LlmConfig, LlmProvider, Message, ProviderKind, Response,
    Result, Role, Session, Tool, ToolRegistry,
};

/// Build a ready-to-use agent from a full configuration: validate it,
/// construct the configured provider, and wire both into the builder.
pub fn agent_from_config(config: &AgentConfig) -> Result<Agent> {
    config.validate()?;
    let provider = create_provider(&config.llm)?;
    Agent::builder().provider(provider).config(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_from_config_builds_with_valid_settings() {
        let mut config = AgentConfig::new(LlmConfig::new(
            ProviderKind::OpenAi,
            "test-key",
            "gpt-4o-mini",
        ));
        config.system_prompt = Some("You are helpful.".into());
        config.max_iterations = 5;

        assert!(agent_from_config(&config).is_ok());
    }

    #[test]
    fn agent_from_config_rejects_invalid_settings() {
        let mut config = AgentConfig::new(LlmConfig::new(ProviderKind::OpenAi, "k", "m"));
        config.max_iterations = 0;
        assert!(matches!(
            agent_from_config(&config),
            Err(AgentError::Config(_))
        ));
    }
}
