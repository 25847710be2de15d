//! The execution envelope passed to shell/python backends, and their result.

use silas_sandbox::SandboxConfig;
use std::collections::HashMap;

/// A single dispatch to a backend's `execute`.
#[derive(Debug, Clone)]
pub struct ExecutionEnvelope {
    pub execution_id: String,
    pub step_index: u32,
    pub task_description: String,
    pub action: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub timeout_seconds: u64,
    pub sandbox_config: SandboxConfig,
    pub credential_refs: HashMap<String, String>,
    pub max_output_bytes: usize,
}

/// The outcome of one backend dispatch.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub return_value: Option<String>,
    pub error: Option<String>,
    pub duration_seconds: f64,
}
