//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid configuration, surfaced at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Attempt to register a second tool under an existing name
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Provider signalled a rate limit (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-provided wait hint in seconds, if any
        retry_after: Option<u64>,
    },

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-retryable provider API failure (any other non-2xx status)
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Provider returned a response the client could not make sense of
    #[error("Provider error: {0}")]
    Provider(String),

    /// Session persistence failure
    #[error("Session error: {0}")]
    Session(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::RateLimited { .. } | AgentError::Network(_)
        )
    }
}

/// Schema violation found while checking tool arguments.
///
/// Reported before the handler runs; the first violation found wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingRequired(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("{path}: Expected {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path}: {reason}")]
    Constraint { path: String, reason: String },
}

/// Failure raised by a tool handler, wrapping the underlying cause.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ToolError(#[from] anyhow::Error);

impl ToolError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self(anyhow::anyhow!(message.into()))
    }
}

/// Outcome kind for a failed `ToolRegistry::call`.
///
/// The orchestrator branches on the variant: validation failures mean the
/// model supplied bad input, execution failures mean the tool itself crashed.
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Tool '{name}' execution failed: {source}")]
    Execution {
        name: String,
        #[source]
        source: ToolError,
    },
}

/// Veto raised by a security policy before tool dispatch
#[derive(Error, Debug, Clone)]
#[error("Tool call '{tool}' rejected by security policy: {reason}")]
pub struct PolicyViolation {
    pub tool: String,
    pub reason: String,
}

impl PolicyViolation {
    pub fn new(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(AgentError::Network("reset".into()).is_retryable());
        assert!(AgentError::RateLimited {
            message: "slow down".into(),
            retry_after: Some(5),
        }
        .is_retryable());
        assert!(!AgentError::Api {
            status: 500,
            message: "boom".into(),
            details: None,
        }
        .is_retryable());
        assert!(!AgentError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn tool_call_error_messages() {
        let err = ToolCallError::Invalid(ValidationError::MissingRequired("city".into()));
        assert_eq!(
            err.to_string(),
            "Invalid arguments: Missing required parameter: city"
        );

        let err = ToolCallError::Execution {
            name: "get_weather".into(),
            source: ToolError::msg("upstream down"),
        };
        assert_eq!(
            err.to_string(),
            "Tool 'get_weather' execution failed: upstream down"
        );
    }
}
