//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern: send the transcript to the
//! provider, execute any tool calls it requests, feed results back, and
//! repeat until the model answers in plain text or the iteration budget
//! runs out.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::config::AgentConfig;
use crate::contract::{NullSecurityPolicy, NullTelemetry, SecurityPolicy, Telemetry};
use crate::error::{AgentError, Result};
use crate::message::{Message, MessageContent, Role, ToolCallRequest};
use crate::provider::{
    ChatRequest, FinishReason, GenerationOptions, LlmProvider, ToolChoice, Usage,
};
use crate::session::{MemoryStore, Session, SessionManager, SessionStore};
use crate::tool::{ArgumentMap, Tool, ToolOutput, ToolRegistry};

/// Advisory content returned when the loop short-circuits on a rate limit
const RATE_LIMIT_ADVISORY: &str = "Rate limit exceeded. Please retry after a short wait.";

/// Return value of one chat call
#[derive(Clone, Debug)]
pub struct Response {
    /// Final assistant content
    pub content: String,

    pub role: Role,

    pub finish_reason: FinishReason,

    /// Token usage accumulated across all loop iterations
    pub usage: Usage,

    /// Number of provider turns the loop ran
    pub iterations: usize,

    /// Extra detail, e.g. rate-limit hints on early termination
    pub metadata: Option<serde_json::Value>,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn Telemetry>,
    policy: Arc<dyn SecurityPolicy>,
    system_prompt: Option<String>,
    max_iterations: usize,
    generation: GenerationOptions,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("system_prompt", &self.system_prompt)
            .field("max_iterations", &self.max_iterations)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Session facade bound to this agent's store
    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.store.clone())
    }

    /// Create a fresh session (not yet persisted)
    pub fn create_session(&self) -> Session {
        Session::new()
    }

    /// Load a stored session, or start a fresh one under that id
    pub fn session(&self, id: &str) -> Result<Session> {
        self.sessions().get(id)
    }

    /// Run one user turn against an explicit session.
    ///
    /// Injects the configured system prompt iff the session is empty,
    /// appends the user message, runs the reasoning loop, appends the final
    /// assistant message, and persists the session through the store. The
    /// intermediate tool traffic stays inside the loop and is not recorded
    /// in the transcript.
    pub async fn chat(
        &self,
        session: &mut Session,
        message: impl Into<MessageContent> + Send,
    ) -> Result<Response> {
        if session.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                session.push(Message::system(prompt.clone()));
            }
        }
        session.push(Message::user(message.into()));

        let mut messages = session.messages().to_vec();
        let response = self.run_loop(&mut messages).await?;

        session.push(Message::assistant(response.content.clone()));
        self.store.save(session)?;

        Ok(response)
    }

    async fn run_loop(&self, messages: &mut Vec<Message>) -> Result<Response> {
        let mut iteration = 0usize;
        let mut usage = Usage::default();

        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                return Err(AgentError::MaxIterations(self.max_iterations));
            }

            tracing::info!(iteration, "reasoning iteration started");
            self.telemetry.record_iteration(iteration);

            let completion = match self.provider.chat(self.build_request(messages)).await {
                Ok(completion) => completion,
                Err(AgentError::RateLimited {
                    message,
                    retry_after,
                }) => {
                    tracing::error!(error = %message, "LLM rate limit exceeded");
                    self.telemetry.record_error("rate_limit", &message, None);

                    return Ok(Response {
                        content: RATE_LIMIT_ADVISORY.into(),
                        role: Role::Assistant,
                        finish_reason: FinishReason::RateLimit,
                        usage,
                        iterations: iteration,
                        metadata: retry_after.map(|secs| json!({ "retry_after": secs })),
                    });
                }
                Err(err) => return Err(err),
            };

            usage += completion.usage;
            messages.push(completion.message.clone());

            if completion.message.has_tool_calls() {
                let calls = completion.message.tool_calls.clone().unwrap_or_default();
                // one result message per call, appended in original call order
                for call in &calls {
                    let content = self.dispatch_tool_call(call).await;
                    messages.push(Message::tool(content, call.id.clone()));
                }
                continue;
            }

            return Ok(Response {
                content: completion.message.content.as_text(),
                role: Role::Assistant,
                finish_reason: completion.finish_reason,
                usage,
                iterations: iteration,
                metadata: None,
            });
        }
    }

    fn build_request(&self, messages: &[Message]) -> ChatRequest {
        let has_tools = !self.tools.is_empty();
        ChatRequest {
            messages: messages.to_vec(),
            tools: has_tools.then(|| self.tools.to_specs()),
            tool_choice: has_tools
                .then(|| self.generation.tool_choice.unwrap_or(ToolChoice::Auto)),
            model: None,
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            response_format: self.generation.response_format.clone(),
        }
    }

    /// Resolve one requested call to tool-result content.
    ///
    /// Every failure mode here - undecodable arguments, a policy veto,
    /// validation, handler crash - is captured as `Error: ...` text visible
    /// to the model. The loop never aborts because one tool failed.
    async fn dispatch_tool_call(&self, call: &ToolCallRequest) -> String {
        let name = &call.function.name;
        tracing::info!(tool = %name, "calling tool");
        let started = Instant::now();

        let outcome = self.run_tool(call).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(output) => {
                tracing::info!(tool = %name, "tool call succeeded");
                self.telemetry.record_tool_call(name, duration_ms, true);
                output.render()
            }
            Err(message) => {
                tracing::error!(tool = %name, error = %message, "tool call failed");
                self.telemetry
                    .record_error("tool_call", &message, Some(json!({ "tool": name })));
                self.telemetry.record_tool_call(name, duration_ms, false);
                format!("Error: {message}")
            }
        }
    }

    async fn run_tool(&self, call: &ToolCallRequest) -> std::result::Result<ToolOutput, String> {
        let arguments: ArgumentMap = serde_json::from_str(&call.function.arguments)
            .map_err(|err| format!("Invalid tool arguments: {err}"))?;

        self.policy
            .validate_tool_call(&call.function.name, &arguments)
            .map_err(|veto| veto.to_string())?;

        self.tools
            .call(&call.function.name, arguments)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    store: Arc<dyn SessionStore>,
    telemetry: Arc<dyn Telemetry>,
    policy: Arc<dyn SecurityPolicy>,
    system_prompt: Option<String>,
    max_iterations: usize,
    generation: GenerationOptions,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            store: Arc::new(MemoryStore::new()),
            telemetry: Arc::new(NullTelemetry),
            policy: Arc::new(NullSecurityPolicy),
            system_prompt: None,
            max_iterations: 10,
            generation: GenerationOptions::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register a tool; fails on a duplicate name
    pub fn tool(mut self, tool: Tool) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn security_policy(mut self, policy: Arc<dyn SecurityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    /// Apply loop-relevant settings from a full configuration
    pub fn config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.system_prompt = config.system_prompt.clone();
        self.generation = config.generation.clone();
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        if self.max_iterations < 1 {
            return Err(AgentError::Config("max_iterations must be >= 1".into()));
        }

        Ok(Agent {
            provider,
            tools: Arc::new(self.tools),
            store: self.store,
            telemetry: self.telemetry,
            policy: self.policy,
            system_prompt: self.system_prompt,
            max_iterations: self.max_iterations,
            generation: self.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyViolation;
    use crate::provider::{ChatCompletion, ChatStream};
    use crate::tool::{tool_fn, Parameter};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum StubTurn {
        Completion(ChatCompletion),
        RateLimited { retry_after: Option<u64> },
    }

    /// Provider stub that replays a fixed script and records every request
    struct ScriptedProvider {
        script: Mutex<VecDeque<StubTurn>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<StubTurn>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion> {
            self.requests.lock().unwrap().push(request);
            let turn = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("provider stub script exhausted");
            match turn {
                StubTurn::Completion(completion) => Ok(completion),
                StubTurn::RateLimited { retry_after } => Err(AgentError::RateLimited {
                    message: "Rate limit exceeded".into(),
                    retry_after,
                }),
            }
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChatStream> {
            unimplemented!("stub does not stream")
        }

        fn supports_vision(&self) -> bool {
            false
        }

        fn supports_function_calling(&self) -> bool {
            true
        }

        fn supports_json_mode(&self) -> bool {
            true
        }
    }

    fn tool_call_turn(call_id: &str, tool: &str, arguments: &str) -> StubTurn {
        StubTurn::Completion(ChatCompletion {
            message: Message::assistant_with_calls(
                "",
                vec![ToolCallRequest::function(call_id, tool, arguments)],
            ),
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::new(10, 5, 15),
            model: Some("stub".into()),
        })
    }

    fn answer_turn(text: &str) -> StubTurn {
        StubTurn::Completion(ChatCompletion {
            message: Message::assistant(text),
            finish_reason: FinishReason::Stop,
            usage: Usage::new(20, 7, 27),
            model: Some("stub".into()),
        })
    }

    fn weather_tool() -> Tool {
        Tool::new(
            "get_weather",
            "Look up current weather for a city",
            vec![Parameter::string("city", "City name").required()],
            tool_fn(|_| async { Ok(ToolOutput::from("晴天 25°C")) }),
        )
    }

    fn agent_with(provider: Arc<ScriptedProvider>, tools: Vec<Tool>) -> Agent {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Agent::builder()
            .provider(provider)
            .tools(registry)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn loop_fails_at_budget_plus_one() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_turn("call_1", "get_weather", r#"{"city":"Tokyo"}"#),
            tool_call_turn("call_2", "get_weather", r#"{"city":"Tokyo"}"#),
            tool_call_turn("call_3", "get_weather", r#"{"city":"Tokyo"}"#),
        ]));
        let agent = Agent::builder()
            .provider(provider.clone())
            .tool(weather_tool())
            .unwrap()
            .max_iterations(3)
            .build()
            .unwrap();

        let mut session = Session::new();
        let err = agent.chat(&mut session, "weather forever").await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations(3)));
        // budget of 3 means exactly 3 provider turns, never a fourth
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn tool_turn_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_turn("call_abc", "get_weather", r#"{"city":"北京"}"#),
            answer_turn("北京今天晴，25°C。"),
        ]));
        let agent = agent_with(provider.clone(), vec![weather_tool()]);

        let mut session = Session::new();
        let response = agent.chat(&mut session, "北京天气怎么样？").await.unwrap();

        assert_eq!(response.iterations, 2);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.content, "北京今天晴，25°C。");
        // usage accumulates component-wise across both turns
        assert_eq!(response.usage, Usage::new(30, 12, 42));

        // the second request carries exactly one tool-result message between
        // the two assistant turns, tagged with the originating call id
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let history = &requests[1].messages;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert!(history[1].has_tool_calls());
        assert_eq!(history[2].role, Role::Tool);
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_abc"));
        assert_eq!(history[2].content.as_text(), "晴天 25°C");
    }

    #[tokio::test]
    async fn multiple_calls_answered_in_request_order() {
        let two_calls = StubTurn::Completion(ChatCompletion {
            message: Message::assistant_with_calls(
                "",
                vec![
                    ToolCallRequest::function("call_a", "get_weather", r#"{"city":"Oslo"}"#),
                    ToolCallRequest::function("call_b", "get_weather", r#"{"city":"Rome"}"#),
                ],
            ),
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::default(),
            model: None,
        });
        let provider = Arc::new(ScriptedProvider::new(vec![two_calls, answer_turn("done")]));
        let agent = agent_with(provider.clone(), vec![weather_tool()]);

        let mut session = Session::new();
        agent.chat(&mut session, "compare").await.unwrap();

        let history = &provider.requests()[1].messages;
        let tool_ids: Vec<_> = history
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(tool_ids, vec!["call_a", "call_b"]);
    }

    #[tokio::test]
    async fn rate_limit_short_circuits_to_degraded_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![StubTurn::RateLimited {
            retry_after: Some(30),
        }]));
        let agent = agent_with(provider, vec![]);

        let mut session = Session::new();
        let response = agent.chat(&mut session, "hello").await.unwrap();

        assert_eq!(response.finish_reason, FinishReason::RateLimit);
        assert_eq!(response.iterations, 1);
        assert_eq!(response.usage, Usage::default());
        assert_eq!(response.content, RATE_LIMIT_ADVISORY);
        assert_eq!(response.metadata, Some(json!({ "retry_after": 30 })));
    }

    #[tokio::test]
    async fn unknown_tool_is_captured_as_error_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_turn("call_1", "launch_missiles", "{}"),
            answer_turn("I could not do that."),
        ]));
        let agent = agent_with(provider.clone(), vec![weather_tool()]);

        let mut session = Session::new();
        let response = agent.chat(&mut session, "do it").await.unwrap();

        assert_eq!(response.iterations, 2);
        let history = &provider.requests()[1].messages;
        assert_eq!(
            history[2].content.as_text(),
            "Error: Tool not found: launch_missiles"
        );
    }

    #[tokio::test]
    async fn undecodable_arguments_are_captured_as_error_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_turn("call_1", "get_weather", "{not json"),
            answer_turn("sorry"),
        ]));
        let agent = agent_with(provider.clone(), vec![weather_tool()]);

        let mut session = Session::new();
        let response = agent.chat(&mut session, "weather").await.unwrap();

        assert_eq!(response.iterations, 2);
        let text = provider.requests()[1].messages[2].content.as_text();
        assert!(text.starts_with("Error: Invalid tool arguments:"), "{text}");
    }

    #[tokio::test]
    async fn policy_veto_is_captured_without_running_handler() {
        struct DenyAll;
        impl SecurityPolicy for DenyAll {
            fn validate_tool_call(
                &self,
                tool: &str,
                _arguments: &ArgumentMap,
            ) -> std::result::Result<(), PolicyViolation> {
                Err(PolicyViolation::new(tool, "not on the allowlist"))
            }
        }

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_turn("call_1", "get_weather", r#"{"city":"Oslo"}"#),
            answer_turn("blocked"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(weather_tool()).unwrap();
        let agent = Agent::builder()
            .provider(provider.clone())
            .tools(registry)
            .security_policy(Arc::new(DenyAll))
            .build()
            .unwrap();

        let mut session = Session::new();
        agent.chat(&mut session, "weather").await.unwrap();

        let text = provider.requests()[1].messages[2].content.as_text();
        assert_eq!(
            text,
            "Error: Tool call 'get_weather' rejected by security policy: not on the allowlist"
        );
    }

    #[tokio::test]
    async fn system_prompt_injected_once_and_session_persisted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            answer_turn("hi"),
            answer_turn("hi again"),
        ]));
        let store = Arc::new(MemoryStore::new());
        let agent = Agent::builder()
            .provider(provider.clone())
            .store(store.clone())
            .system_prompt("You are terse.")
            .build()
            .unwrap();

        let mut session = Session::new();
        agent.chat(&mut session, "hello").await.unwrap();
        agent.chat(&mut session, "hello again").await.unwrap();

        let system_count = session
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(session.messages()[0].content.as_text(), "You are terse.");
        // transcript: system, user, assistant, user, assistant
        assert_eq!(session.len(), 5);

        let persisted = store.load(session.id()).unwrap().unwrap();
        assert_eq!(persisted, session);
    }

    #[tokio::test]
    async fn tools_omitted_from_request_when_none_registered() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer_turn("ok")]));
        let agent = agent_with(provider.clone(), vec![]);

        let mut session = Session::new();
        agent.chat(&mut session, "hi").await.unwrap();

        let request = &provider.requests()[0];
        assert!(request.tools.is_none());
        assert!(request.tool_choice.is_none());
    }

    #[test]
    fn builder_requires_provider() {
        let err = Agent::builder().build().unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("Provider")));
    }

    #[test]
    fn builder_rejects_zero_iteration_budget() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let err = Agent::builder()
            .provider(provider)
            .max_iterations(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
