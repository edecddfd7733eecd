//! LLM Provider Abstraction
//!
//! Defines a common interface for all chat-completion providers, allowing
//! the reasoning loop to work with any backend without code changes.
//! Concrete clients live in the `agent-providers` crate; the loop sees only
//! the normalized request/response shapes below.

use std::ops::{Add, AddAssign};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Tool-choice policy forwarded to the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model must not call tools
    None,
    /// Model must call at least one tool
    Required,
}

/// Token usage counters.
///
/// A monoid under component-wise addition: the loop accumulates one of
/// these per iteration and never resets it mid-conversation. `Default` is
/// the all-zero identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        *self = *self + other;
    }
}

/// Why a generation turn ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// Loop short-circuited on a surfaced rate limit
    RateLimit,
    /// Any vendor-specific value we do not model
    #[serde(other)]
    Other,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::RateLimit => "rate_limit",
            FinishReason::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Pass-through generation options.
///
/// Unset fields are omitted from the wire payload rather than sent as null.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Response-format hint, e.g. `{"type": "json_object"}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

/// One vendor-neutral chat request
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    /// Full message history, oldest first
    pub messages: Vec<Message>,

    /// Wire-format tool specs from `ToolRegistry::to_specs`
    pub tools: Option<Vec<serde_json::Value>>,

    pub tool_choice: Option<ToolChoice>,

    /// Per-request model override
    pub model: Option<String>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    pub response_format: Option<serde_json::Value>,
}

/// Normalized response for one completion turn
#[derive(Clone, Debug)]
pub struct ChatCompletion {
    /// First choice's message, tool-call requests included
    pub message: Message,

    pub finish_reason: FinishReason,

    /// Token usage for this turn (zero if the vendor omitted it)
    pub usage: Usage,

    /// Vendor-reported model name
    pub model: Option<String>,
}

/// One event from a streaming completion.
///
/// Payloads that fail to parse are surfaced as `Malformed` instead of being
/// dropped, so consumers can detect data loss.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A decoded SSE data payload
    Chunk(serde_json::Value),
    /// A data payload that was not valid JSON
    Malformed { raw: String, error: String },
}

/// Stream type for completion streaming
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Strategy trait for LLM providers.
///
/// Implement this trait to add support for new backends. The reasoning
/// loop works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion turn with bounded retry on transient failures
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion>;

    /// Run one completion turn as a stream of SSE payloads
    async fn stream(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Whether the configured model accepts image input
    fn supports_vision(&self) -> bool;

    /// Whether the provider supports function/tool calling
    fn supports_function_calling(&self) -> bool;

    /// Whether the provider supports a JSON response format
    fn supports_json_mode(&self) -> bool;
}
