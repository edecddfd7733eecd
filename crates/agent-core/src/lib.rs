//! # agent-core
//!
//! Vendor-neutral core for tool-using conversational agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tool     │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                                                    │
//! │  ┌─────────────┐                                             │
//! │  │   Session   │── SessionStore (pluggable persistence)      │
//! │  └─────────────┘                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop drives a chat-completion model turn by turn: every tool call
//! the model requests is validated against the tool's schema, executed
//! locally, and fed back as a tool-result message until the model answers
//! in plain text or the iteration budget runs out. The `LlmProvider` trait
//! keeps the loop independent of any one vendor; concrete clients live in
//! the `agent-providers` crate.

pub mod builtin;
pub mod config;
pub mod contract;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use config::{AgentConfig, LlmConfig, ProviderKind};
pub use contract::{NullSecurityPolicy, NullTelemetry, SecurityPolicy, Telemetry};
pub use error::{
    AgentError, PolicyViolation, Result, ToolCallError, ToolError, ValidationError,
};
pub use message::{Message, MessageContent, Role, ToolCallRequest};
pub use provider::{
    ChatCompletion, ChatRequest, ChatStream, FinishReason, GenerationOptions, LlmProvider,
    StreamEvent, ToolChoice, Usage,
};
pub use reasoning::{Agent, AgentBuilder, Response};
pub use session::{MemoryStore, Session, SessionManager, SessionStore};
pub use tool::{tool_fn, ArgumentMap, Parameter, Tool, ToolHandler, ToolOutput, ToolRegistry};
