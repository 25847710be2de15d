//! Fake implementations of the `silas-executor::ports` traits.

use async_trait::async_trait;
use std::sync::Mutex;

use silas_core::VerificationCheck;
use silas_executor::envelope::{ExecutionEnvelope, ExecutionResult};
use silas_executor::ports::{
    ConsultPlannerManager, EphemeralExecutor, FailureEntry, ReplanManager, SkillExecutor, SkillInvocation, SkillResult,
    VerificationOutcome, VerificationReport, VerificationRunner,
};

/// A skill executor that always returns a fixed, configurable result.
pub struct FakeSkillExecutor {
    result: SkillResult,
}

impl FakeSkillExecutor {
    #[must_use]
    pub fn succeeding(output: impl Into<String>) -> Self {
        FakeSkillExecutor { result: SkillResult { success: true, output: Some(output.into()), error: None, duration_ms: 1 } }
    }

    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        FakeSkillExecutor { result: SkillResult { success: false, output: None, error: Some(error.into()), duration_ms: 1 } }
    }
}

#[async_trait]
impl SkillExecutor for FakeSkillExecutor {
    async fn execute(&self, _skill_name: &str, _invocation: &SkillInvocation) -> SkillResult {
        self.result.clone()
    }
}

/// A shell/python backend stand-in that records every envelope it receives
/// and returns a fixed, configurable result.
pub struct FakeEphemeralExecutor {
    result: Result<ExecutionResult, String>,
    calls: Mutex<Vec<ExecutionEnvelope>>,
}

impl FakeEphemeralExecutor {
    #[must_use]
    pub fn succeeding(return_value: impl Into<String>) -> Self {
        FakeEphemeralExecutor {
            result: Ok(ExecutionResult { success: true, return_value: Some(return_value.into()), error: None, duration_seconds: 0.01 }),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        FakeEphemeralExecutor {
            result: Ok(ExecutionResult { success: false, return_value: None, error: Some(error.into()), duration_seconds: 0.01 }),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn erroring(error: impl Into<String>) -> Self {
        FakeEphemeralExecutor { result: Err(error.into()), calls: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("fake ephemeral executor mutex poisoned").len()
    }
}

#[async_trait]
impl EphemeralExecutor for FakeEphemeralExecutor {
    async fn execute(&self, envelope: &ExecutionEnvelope) -> Result<ExecutionResult, String> {
        self.calls.lock().expect("fake ephemeral executor mutex poisoned").push(envelope.clone());
        self.result.clone()
    }
}

/// A verification runner that reports a fixed, configurable outcome for
/// every check passed to it, regardless of its content.
pub struct FakeVerificationRunner {
    report: Result<VerificationReport, String>,
}

impl FakeVerificationRunner {
    #[must_use]
    pub fn all_passing() -> Self {
        FakeVerificationRunner { report: Ok(VerificationReport { all_passed: true, results: Vec::new() }) }
    }

    #[must_use]
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        FakeVerificationRunner {
            report: Ok(VerificationReport {
                all_passed: false,
                results: vec![VerificationOutcome { name, passed: false, reason: reason.into() }],
            }),
        }
    }
}

#[async_trait]
impl VerificationRunner for FakeVerificationRunner {
    async fn run_checks(&self, _checks: &[VerificationCheck]) -> Result<VerificationReport, String> {
        self.report.clone()
    }
}

/// A planner-consult stand-in returning a fixed, configurable reply.
pub struct FakeConsultPlannerManager {
    reply: Result<Option<String>, String>,
}

impl FakeConsultPlannerManager {
    #[must_use]
    pub fn with_guidance(guidance: impl Into<String>) -> Self {
        FakeConsultPlannerManager { reply: Ok(Some(guidance.into())) }
    }

    #[must_use]
    pub fn no_guidance() -> Self {
        FakeConsultPlannerManager { reply: Ok(None) }
    }
}

#[async_trait]
impl ConsultPlannerManager for FakeConsultPlannerManager {
    async fn consult(&self, _work_item_id: &str, _failure_context: &str, _trace_id: &str) -> Result<Option<String>, String> {
        self.reply.clone()
    }
}

/// A replan trigger stand-in recording every call it receives.
pub struct FakeReplanManager {
    accept: bool,
    calls: Mutex<Vec<(String, u32)>>,
}

impl FakeReplanManager {
    #[must_use]
    pub fn accepting() -> Self {
        FakeReplanManager { accept: true, calls: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn rejecting() -> Self {
        FakeReplanManager { accept: false, calls: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().expect("fake replan manager mutex poisoned").clone()
    }
}

#[async_trait]
impl ReplanManager for FakeReplanManager {
    async fn trigger_replan(
        &self,
        work_item_id: &str,
        _original_goal: &str,
        _failure_history: &[FailureEntry],
        _trace_id: &str,
        current_depth: u32,
    ) -> Result<bool, String> {
        self.calls.lock().expect("fake replan manager mutex poisoned").push((work_item_id.to_string(), current_depth));
        Ok(self.accept)
    }
}
