//! OpenAI-Compatible Provider
//!
//! Implementation of `LlmProvider` for the chat-completions wire protocol.
//! Handles payload construction (unset options are omitted, never sent as
//! null), bounded retry with rate-limit-aware backoff, response
//! normalization, and SSE streaming.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use agent_core::config::LlmConfig;
use agent_core::error::{AgentError, Result};
use agent_core::message::{Message, MessageContent, Role, ToolCallRequest};
use agent_core::provider::{
    ChatCompletion, ChatRequest, ChatStream, FinishReason, LlmProvider, StreamEvent, ToolChoice,
    Usage,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed backoff after a transient network failure
const NETWORK_BACKOFF_SECS: u64 = 1;

/// Exponential backoff for rate limits without a server hint, capped at 60s
fn backoff_secs(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt).min(60)
}

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,

    pub model: String,

    /// Endpoint base, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    pub timeout_secs: u64,

    pub max_retries: u32,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    pub fn from_llm_config(config: &LlmConfig) -> Self {
        let mut this = Self::new(config.api_key.clone(), config.model.clone());
        if let Some(base_url) = &config.base_url {
            this.base_url = base_url.clone();
        }
        this.timeout_secs = config.timeout_secs;
        this.max_retries = config.max_retries;
        this
    }
}

/// OpenAI-compatible chat client
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

/// Request body in chat-completions wire shape; optional fields are
/// skipped entirely when unset.
#[derive(Debug, Serialize)]
struct WirePayload {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AgentError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { config, client })
    }

    pub fn from_llm_config(config: &LlmConfig) -> Result<Self> {
        Self::new(OpenAiConfig::from_llm_config(config))
    }

    pub(crate) fn model(&self) -> &str {
        &self.config.model
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_payload(&self, request: &ChatRequest, stream: bool) -> WirePayload {
        WirePayload {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages.clone(),
            temperature: request.temperature.unwrap_or(0.7),
            max_tokens: request.max_tokens,
            tools: request.tools.clone(),
            tool_choice: request.tool_choice,
            response_format: request.response_format.clone(),
            stream,
        }
    }

    async fn send(&self, payload: &WirePayload) -> Result<WireResponse> {
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| AgentError::Network(format!("request failed: {err}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(rate_limit_error(response).await);
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        response.json().await.map_err(|err| {
            if err.is_decode() {
                AgentError::Provider(format!("failed to decode provider response: {err}"))
            } else {
                AgentError::Network(format!("failed to read provider response: {err}"))
            }
        })
    }

    fn normalize(wire: WireResponse) -> Result<ChatCompletion> {
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("provider returned no choices".into()))?;

        let message = Message {
            role: choice.message.role,
            content: choice.message.content.unwrap_or_default(),
            tool_call_id: None,
            tool_calls: choice.message.tool_calls,
        };

        Ok(ChatCompletion {
            message,
            finish_reason: choice.finish_reason.unwrap_or(FinishReason::Stop),
            usage: wire.usage.unwrap_or_default(),
            model: wire.model,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let payload = self.build_payload(&request, false);
        tracing::debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            tools = payload.tools.as_ref().map_or(0, Vec::len),
            "chat completion request"
        );

        let wire = with_retry(self.config.max_retries, |_| self.send(&payload)).await?;
        Self::normalize(wire)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let payload = self.build_payload(&request, true);
        tracing::debug!(model = %payload.model, "chat completion stream request");

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|err| AgentError::Network(format!("request failed: {err}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(rate_limit_error(response).await);
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        Ok(Box::pin(sse_event_stream(response.bytes_stream())))
    }

    fn supports_vision(&self) -> bool {
        matches!(
            self.config.model.as_str(),
            "gpt-4-vision-preview" | "gpt-4o" | "gpt-4o-mini"
        )
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supports_json_mode(&self) -> bool {
        true
    }
}

/// Build the rate-limit error, preferring the standard header hint and
/// falling back to the body fields some vendors use instead.
async fn rate_limit_error(response: reqwest::Response) -> AgentError {
    let header_hint = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let body_hint = body
        .pointer("/error/retry_after")
        .and_then(Value::as_u64)
        .or_else(|| body.get("retry_after").and_then(Value::as_u64));

    AgentError::RateLimited {
        message: "Rate limit exceeded".into(),
        retry_after: header_hint.or(body_hint).filter(|&secs| secs > 0),
    }
}

async fn api_error(response: reqwest::Response) -> AgentError {
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();

    AgentError::Api {
        status,
        message,
        details: if body.is_null() { None } else { Some(body) },
    }
}

/// Run `attempt_fn` up to `max_retries` times.
///
/// Rate limits honor the server hint or back off exponentially; network
/// failures wait a fixed beat; anything else fails immediately. When
/// attempts run out the last retryable error is re-raised so callers can
/// still tell rate-limit exhaustion from network exhaustion.
async fn with_retry<T, F, Fut>(max_retries: u32, mut attempt_fn: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_retryable = None;

    for attempt in 1..=max_retries {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                match &err {
                    AgentError::RateLimited { retry_after, .. } => {
                        let wait = retry_after.unwrap_or_else(|| backoff_secs(attempt));
                        tracing::warn!(attempt, wait_secs = wait, "rate limited, backing off");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                    AgentError::Network(reason) => {
                        tracing::warn!(attempt, error = %reason, "transient network failure");
                        tokio::time::sleep(Duration::from_secs(NETWORK_BACKOFF_SECS)).await;
                    }
                    _ => return Err(err),
                }
                last_retryable = Some(err);
            }
        }
    }

    Err(last_retryable.unwrap_or_else(|| {
        AgentError::Provider("retry budget exhausted before any attempt was made".into())
    }))
}

/// Line buffer for server-sent events.
///
/// Collects partial lines across byte chunks, extracts `data:` payloads,
/// and stops at the `[DONE]` sentinel. Payloads that are not valid JSON
/// become `Malformed` events instead of disappearing.
#[derive(Default)]
struct SseBuffer {
    pending: String,
    done: bool,
}

impl SseBuffer {
    fn push(&mut self, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.pending.push_str(data);

        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            if self.done {
                continue;
            }
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload == "[DONE]" {
                self.done = true;
                continue;
            }
            match serde_json::from_str(payload) {
                Ok(value) => events.push(StreamEvent::Chunk(value)),
                Err(err) => events.push(StreamEvent::Malformed {
                    raw: payload.to_string(),
                    error: err.to_string(),
                }),
            }
        }

        events
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self) {
        self.done = true;
    }
}

struct SseState<S> {
    inner: Pin<Box<S>>,
    buffer: SseBuffer,
    queued: VecDeque<StreamEvent>,
}

fn sse_event_stream<S, B, E>(stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = SseState {
        inner: Box::pin(stream),
        buffer: SseBuffer::default(),
        queued: VecDeque::new(),
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queued.pop_front() {
                return Some((Ok(event), state));
            }
            if state.buffer.is_done() {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(chunk.as_ref()).into_owned();
                    state.queued.extend(state.buffer.push(&text));
                }
                Some(Err(err)) => {
                    state.buffer.finish();
                    return Some((
                        Err(AgentError::Network(format!("stream error: {err}"))),
                        state,
                    ));
                }
                None => return None,
            }
        }
    })
}
