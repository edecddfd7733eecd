//! Collaborator Contracts
//!
//! Narrow interfaces the orchestrator depends on without caring about the
//! implementation: telemetry sinks and security policy hooks. The no-op
//! implementations here are the defaults; structured logging goes through
//! the `tracing` facade and needs no trait of its own.

use serde_json::Value;

use crate::error::PolicyViolation;
use crate::tool::ArgumentMap;

/// Telemetry sink for loop and tool-call metrics
pub trait Telemetry: Send + Sync {
    fn record_iteration(&self, iteration: usize);

    fn record_tool_call(&self, tool: &str, duration_ms: f64, success: bool);

    fn record_error(&self, category: &str, message: &str, context: Option<Value>);
}

/// Telemetry sink that discards everything
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn record_iteration(&self, _iteration: usize) {}

    fn record_tool_call(&self, _tool: &str, _duration_ms: f64, _success: bool) {}

    fn record_error(&self, _category: &str, _message: &str, _context: Option<Value>) {}
}

/// Hook consulted before every tool dispatch; a veto is captured as
/// tool-result error text, the same as a handler failure.
pub trait SecurityPolicy: Send + Sync {
    fn validate_tool_call(
        &self,
        tool: &str,
        arguments: &ArgumentMap,
    ) -> Result<(), PolicyViolation>;
}

/// Policy that allows every call
pub struct NullSecurityPolicy;

impl SecurityPolicy for NullSecurityPolicy {
    fn validate_tool_call(
        &self,
        _tool: &str,
        _arguments: &ArgumentMap,
    ) -> Result<(), PolicyViolation> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_policy_allows_everything() {
        let policy = NullSecurityPolicy;
        assert!(policy.validate_tool_call("anything", &ArgumentMap::new()).is_ok());
    }
}
