//! Zhipu GLM Provider
//!
//! GLM models expose an OpenAI-compatible API surface, so this provider is
//! a thin specialization: it pre-fills the Zhipu endpoint and default model,
//! then delegates the actual request/retry/parse work to `OpenAiProvider`.

use agent_core::config::LlmConfig;
use agent_core::error::Result;
use agent_core::provider::{ChatCompletion, ChatRequest, ChatStream, LlmProvider};
use async_trait::async_trait;

use crate::openai::{OpenAiConfig, OpenAiProvider};

pub const ZAI_DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const ZAI_DEFAULT_MODEL: &str = "glm-4.6v";

/// Provider for Zhipu GLM models (e.g. GLM-4.6V)
pub struct ZaiProvider {
    inner: OpenAiProvider,
}

impl ZaiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            inner: OpenAiProvider::new(config)?,
        })
    }

    /// Build from provider settings, filling Zhipu defaults where unset
    pub fn from_llm_config(config: &LlmConfig) -> Result<Self> {
        let mut openai = OpenAiConfig::from_llm_config(config);
        if config.base_url.is_none() {
            openai.base_url = ZAI_DEFAULT_BASE_URL.into();
        }
        Self::new(openai)
    }

    /// Minimal client: API key plus the GLM defaults for everything else
    pub fn with_defaults(api_key: impl Into<String>) -> Result<Self> {
        let mut config = OpenAiConfig::new(api_key, ZAI_DEFAULT_MODEL);
        config.base_url = ZAI_DEFAULT_BASE_URL.into();
        Self::new(config)
    }
}

#[async_trait]
impl LlmProvider for ZaiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion> {
        self.inner.chat(request).await
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChatStream> {
        self.inner.stream(request).await
    }

    /// Zhipu vision matching: default glm-4.6v, or any model whose name
    /// contains "4.6v" or "vision" (case-insensitive)
    fn supports_vision(&self) -> bool {
        let model = self.inner.model().to_lowercase();
        model.contains("4.6v") || model.contains("vision")
    }

    fn supports_function_calling(&self) -> bool {
        self.inner.supports_function_calling()
    }

    fn supports_json_mode(&self) -> bool {
        self.inner.supports_json_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::config::ProviderKind;

    #[test]
    fn vision_matches_model_name() {
        assert!(ZaiProvider::with_defaults("k").unwrap().supports_vision());

        let glm_text = ZaiProvider::new(OpenAiConfig::new("k", "glm-4-plus")).unwrap();
        assert!(!glm_text.supports_vision());

        let vision = ZaiProvider::new(OpenAiConfig::new("k", "GLM-Vision-Max")).unwrap();
        assert!(vision.supports_vision());
    }

    #[test]
    fn llm_config_defaults_to_zhipu_endpoint() {
        let llm = LlmConfig::new(ProviderKind::Zai, "k", "glm-4.6v");
        let provider = ZaiProvider::from_llm_config(&llm).unwrap();
        assert!(provider.supports_vision());
        assert!(provider.supports_function_calling());
        assert!(provider.supports_json_mode());
    }
}
