//! Gate vocabulary: triggers, lanes, providers, results, and escalation
//! policy shared by the gate runner and its callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When a gate fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateTrigger {
    EveryUserMessage,
    EveryAgentResponse,
    AfterStep,
    OnToolCall,
}

/// Which backend evaluates a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateProviderKind {
    Predicate,
    Script,
    Llm,
    Guardrails,
    Custom,
}

/// Whether a gate may block (policy) or only advise (quality).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLane {
    Policy,
    Quality,
}

/// What to do when a policy-lane gate blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Escalation {
    /// Sets `modified_context.response` to `message` (or the default) and
    /// keeps the action `block`.
    BlockWithMessage { message: Option<String> },
    /// Runs the response through the redaction regex set; action becomes `continue`.
    Redact,
    /// Action becomes `require_approval`; response becomes a fallback message.
    RequireApproval,
    /// Action becomes `continue`; adds flags `warn, logged_violation`.
    LogAndPass,
}

impl Default for Escalation {
    fn default() -> Self {
        Escalation::BlockWithMessage { message: None }
    }
}

/// A configured gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub trigger: GateTrigger,
    /// Required and only meaningful when `trigger == AfterStep`.
    pub after_step: Option<u32>,
    pub provider: GateProviderKind,
    /// Provider-specific check kind (e.g. `"taint_ceiling"`, `"length_limit"`).
    pub check_type: String,
    pub check: String,
    pub config: HashMap<String, serde_json::Value>,
    pub extract_key: Option<String>,
    pub allowed_values: Vec<String>,
    pub approval_values: Vec<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub on_block: Escalation,
    /// `true` forces the derived lane to `policy` even for an LLM provider.
    pub promote_to_policy: bool,
}

impl Gate {
    /// Derived lane: LLM gates default to `quality`; any gate with
    /// `promote_to_policy=true` or a non-LLM provider is `policy`.
    #[must_use]
    pub fn lane(&self) -> GateLane {
        if self.promote_to_policy || self.provider != GateProviderKind::Llm {
            GateLane::Policy
        } else {
            GateLane::Quality
        }
    }
}

/// The action a gate evaluation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Continue,
    Block,
    RequireApproval,
}

/// The outcome of evaluating a single gate against a single context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_name: String,
    pub lane: GateLane,
    pub action: GateAction,
    pub reason: String,
    pub score: Option<f64>,
    pub value: Option<serde_json::Value>,
    pub flags: Vec<String>,
    /// Sanitized policy mutations: only `response`, `message`, `tool_args` survive.
    pub modified_context: Option<HashMap<String, serde_json::Value>>,
}

impl GateResult {
    /// Build a passing result with no flags.
    #[must_use]
    pub fn pass(gate_name: impl Into<String>, lane: GateLane) -> Self {
        GateResult {
            gate_name: gate_name.into(),
            lane,
            action: GateAction::Continue,
            reason: String::new(),
            score: None,
            value: None,
            flags: Vec::new(),
            modified_context: None,
        }
    }
}

/// The keys mutation sanitization permits in a policy gate's `modified_context`.
pub const ALLOWED_MUTATION_KEYS: [&str; 3] = ["response", "message", "tool_args"];

/// A provider evaluates a gate against a context and returns a result. Any
/// panic/exception on the implementer's side must be caught by the caller
/// and converted to `action=block, flags=[provider_error]` — providers
/// themselves should return `Err` rather than panic.
pub trait GateProvider: Send + Sync {
    /// Evaluate `gate` against an arbitrary JSON-encoded context payload.
    ///
    /// # Errors
    /// Any evaluation failure (provider-side exception, invalid config).
    fn check(&self, gate: &Gate, context: &serde_json::Value) -> Result<GateResult, String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn gate(provider: GateProviderKind, promote: bool) -> Gate {
        Gate {
            name: "g".into(),
            trigger: GateTrigger::EveryAgentResponse,
            after_step: None,
            provider,
            check_type: "x".into(),
            check: String::new(),
            config: HashMap::new(),
            extract_key: None,
            allowed_values: Vec::new(),
            approval_values: Vec::new(),
            min_value: None,
            max_value: None,
            on_block: Escalation::default(),
            promote_to_policy: promote,
        }
    }

    #[test]
    fn llm_gate_defaults_to_quality() {
        assert_eq!(gate(GateProviderKind::Llm, false).lane(), GateLane::Quality);
    }

    #[test]
    fn promoted_llm_gate_is_policy() {
        assert_eq!(gate(GateProviderKind::Llm, true).lane(), GateLane::Policy);
    }

    #[test]
    fn non_llm_gate_is_always_policy() {
        assert_eq!(gate(GateProviderKind::Predicate, false).lane(), GateLane::Policy);
    }
}
