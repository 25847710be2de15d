//! A fake `GateProvider` for exercising gate wiring without a real
//! predicate/script/LLM backend.

use silas_core::{Gate, GateAction, GateLane, GateProvider, GateResult};

/// A gate provider that always returns a fixed, configurable action.
pub struct FakeGateProvider {
    action: GateAction,
    reason: String,
}

impl FakeGateProvider {
    #[must_use]
    pub fn always_continue() -> Self {
        FakeGateProvider { action: GateAction::Continue, reason: String::new() }
    }

    #[must_use]
    pub fn always_blocking(reason: impl Into<String>) -> Self {
        FakeGateProvider { action: GateAction::Block, reason: reason.into() }
    }
}

impl GateProvider for FakeGateProvider {
    fn check(&self, gate: &Gate, _context: &serde_json::Value) -> Result<GateResult, String> {
        let mut result = GateResult::pass(gate.name.clone(), GateLane::Policy);
        result.action = self.action;
        result.reason = self.reason.clone();
        Ok(result)
    }
}
