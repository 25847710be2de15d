//! Python backend: materializes `args.script` (or resolves `args.script_path`
//! inside the sandbox work dir) and runs it with the configured interpreter.

use crate::envelope::{ExecutionEnvelope, ExecutionResult};
use crate::ports::EphemeralExecutor;
use async_trait::async_trait;
use silas_sandbox::SandboxManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs Python scripts via a shared [`SandboxManager`].
pub struct PythonBackend {
    sandbox: Arc<SandboxManager>,
    python_bin: String,
}

impl PythonBackend {
    #[must_use]
    pub fn new(sandbox: Arc<SandboxManager>, python_bin: impl Into<String>) -> Self {
        PythonBackend { sandbox, python_bin: python_bin.into() }
    }

    fn materialize_script(
        &self,
        work_dir: &Path,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PathBuf, String> {
        if let Some(serde_json::Value::String(inline)) = args.get("script") {
            let target = work_dir.join(format!("script-{}.py", uuid::Uuid::new_v4().simple()));
            std::fs::write(&target, inline).map_err(|e| e.to_string())?;
            return Ok(target);
        }
        if let Some(serde_json::Value::String(path)) = args.get("script_path") {
            return Self::resolve_script_path(work_dir, path);
        }
        Err("python executor requires args.script or args.script_path".to_string())
    }

    fn resolve_script_path(work_dir: &Path, raw_path: &str) -> Result<PathBuf, String> {
        let candidate = Path::new(raw_path);
        if candidate.components().any(|c| c == std::path::Component::ParentDir) {
            return Err("script_path must not contain '..'".to_string());
        }
        let base = work_dir.canonicalize().map_err(|e| e.to_string())?;
        let resolved = if candidate.is_absolute() {
            candidate.canonicalize().map_err(|e| e.to_string())?
        } else {
            base.join(candidate).canonicalize().map_err(|e| e.to_string())?
        };
        if !resolved.starts_with(&base) {
            return Err("script_path must remain inside sandbox work_dir".to_string());
        }
        if !resolved.exists() {
            return Err(format!("script_path does not exist: {}", resolved.display()));
        }
        Ok(resolved)
    }

    fn extra_argv(args: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<String>, String> {
        match args.get("argv") {
            None => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => {
                Ok(items.iter().map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())).collect())
            }
            Some(_) => Err("args.argv must be a list of values".to_string()),
        }
    }
}

#[async_trait]
impl EphemeralExecutor for PythonBackend {
    async fn execute(&self, envelope: &ExecutionEnvelope) -> Result<ExecutionResult, String> {
        if envelope.action != "python_exec" {
            return Ok(ExecutionResult {
                success: false,
                error: Some(format!("unsupported action for python executor: {}", envelope.action)),
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
            let work_dir = self.sandbox.work_dir(id).ok_or_else(|| "sandbox vanished before script could be written".to_string())?;
            let script_path = self.materialize_script(&work_dir, &envelope.args)?;
            let mut argv = vec![self.python_bin.clone(), script_path.display().to_string()];
            argv.extend(Self::extra_argv(&envelope.args)?);

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
                Some(format!("python script timed out after {}s", envelope.timeout_seconds))
            } else {
                let trimmed = result.stderr.trim();
                Some(if trimmed.is_empty() { format!("script exited with status {:?}", result.exit_code) } else { trimmed.to_string() })
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
