//! Shell backend: runs `args.command` (a string, an argv list, or `{command:
//! ...}`) inside an isolated sandbox.

use crate::envelope::{ExecutionEnvelope, ExecutionResult};
use crate::ports::EphemeralExecutor;
use async_trait::async_trait;
use silas_sandbox::SandboxManager;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs shell commands via a shared [`SandboxManager`].
pub struct ShellBackend {
    sandbox: Arc<SandboxManager>,
}

impl ShellBackend {
    #[must_use]
    pub fn new(sandbox: Arc<SandboxManager>) -> Self {
        ShellBackend { sandbox }
    }

    fn parse_command(args: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<String>, String> {
        let raw = args.get("command").ok_or_else(|| "shell executor requires args.command as string or list".to_string())?;
        let parts: Vec<String> = match raw {
            serde_json::Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
            serde_json::Value::Array(items) => items.iter().map(value_to_string).collect(),
            _ => return Err("shell executor requires args.command as string or list".to_string()),
        };
        if parts.is_empty() {
            return Err("shell command must not be empty".to_string());
        }
        Ok(parts)
    }
}

fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl EphemeralExecutor for ShellBackend {
    async fn execute(&self, envelope: &ExecutionEnvelope) -> Result<ExecutionResult, String> {
        if envelope.action != "shell_exec" {
            return Ok(ExecutionResult {
                success: false,
                error: Some(format!("unsupported action for shell executor: {}", envelope.action)),
                ..ExecutionResult::default()
            });
        }

        let mut config = envelope.sandbox_config.clone();
        for (name, reference) in &envelope.credential_refs {
            config.env.insert(format!("CREDENTIAL_REF_{}", name.to_uppercase()), reference.clone());
        }

        let id = self.sandbox.create(config).await.map_err(|e| e.to_string())?;
        let started = Instant::now();
        let outcome = (|| async {
            let argv = Self::parse_command(&envelope.args)?;
            let result = self
                .sandbox
                .exec(
                    id,
                    &argv,
                    Duration::from_secs(envelope.timeout_seconds),
                    &std::collections::HashMap::new(),
                    &std::collections::HashMap::new(),
                    envelope.max_output_bytes,
                )
                .await
                .map_err(|e| e.to_string())?;

            let success = !result.timed_out && result.exit_code == Some(0);
            let error = if success {
                None
            } else if result.timed_out {
                Some(format!("command timed out after {}s", envelope.timeout_seconds))
            } else {
                let trimmed = result.stderr.trim();
                Some(if trimmed.is_empty() {
                    format!("command exited with status {:?}", result.exit_code)
                } else {
                    trimmed.to_string()
                })
            };
            let stdout = result.stdout.trim();
            let stderr = result.stderr.trim();
            let return_value = if !stdout.is_empty() { stdout.to_string() } else { stderr.to_string() };
            Ok::<ExecutionResult, String>(ExecutionResult {
                success,
                return_value: Some(return_value),
                error,
                duration_seconds: started.elapsed().as_secs_f64(),
            })
        })()
        .await;

        self.sandbox.destroy(id);
        outcome.or_else(|e| {
            Ok(ExecutionResult { success: false, error: Some(e), duration_seconds: started.elapsed().as_secs_f64(), ..ExecutionResult::default() })
        })
    }
}
