//! Provider Factory
//!
//! Maps the configured provider kind to a concrete client behind the
//! `LlmProvider` trait object the agent works with.

use std::sync::Arc;

use agent_core::config::{LlmConfig, ProviderKind};
use agent_core::error::Result;
use agent_core::provider::LlmProvider;

use crate::openai::OpenAiProvider;
use crate::zai::ZaiProvider;

/// Build the provider named by the configuration.
///
/// The configuration is validated first, so an empty api key or model
/// fails here rather than on the first request.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    config.validate()?;

    match config.provider {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::from_llm_config(config)?)),
        ProviderKind::Zai => Ok(Arc::new(ZaiProvider::from_llm_config(config)?)),
    }
}
