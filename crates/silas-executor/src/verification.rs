//! Runs a work item's verification checks in a dedicated sandbox, each
//! result truncated and evaluated against its single expectation predicate.

use crate::ports::{VerificationOutcome, VerificationReport, VerificationRunner};
use async_trait::async_trait;
use silas_core::{VerificationCheck, VerificationExpectation};
use silas_sandbox::{SandboxConfig, SandboxManager};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MAX_OUTPUT_CHARS: usize = 1000;
const MAX_OUTPUT_BYTES: usize = 1 << 20;

/// Runs checks with `/bin/bash -lc <run>` in a sandbox rooted at `verify_dir`,
/// with `file_exists` checks resolved against an allowlist of that directory
/// plus any configured extra project directories.
pub struct SandboxVerificationRunner {
    sandbox: Arc<SandboxManager>,
    verify_dir: PathBuf,
    allowed_roots: Vec<PathBuf>,
}

impl SandboxVerificationRunner {
    /// # Errors
    /// Propagates any failure creating `verify_dir`.
    pub fn new(sandbox: Arc<SandboxManager>, verify_dir: impl Into<PathBuf>, project_dirs: &[PathBuf]) -> std::io::Result<Self> {
        let verify_dir = verify_dir.into();
        std::fs::create_dir_all(&verify_dir)?;
        let verify_dir = verify_dir.canonicalize()?;
        let mut allowed_roots = vec![verify_dir.clone()];
        for dir in project_dirs {
            allowed_roots.push(dir.canonicalize()?);
        }
        Ok(SandboxVerificationRunner { sandbox, verify_dir, allowed_roots })
    }

    async fn run_check(&self, check: &VerificationCheck) -> VerificationOutcome {
        let config = SandboxConfig {
            max_memory_mb: 256,
            max_cpu_seconds: check.timeout_seconds.max(1),
            network_access: check.network,
            env: HashMap::new(),
        };
        let id = match self.sandbox.create(config).await {
            Ok(id) => id,
            Err(e) => return VerificationOutcome { name: check.name.clone(), passed: false, reason: e.to_string() },
        };

        let argv = vec!["/bin/bash".to_string(), "-lc".to_string(), check.run.clone()];
        let result = self
            .sandbox
            .exec(id, &argv, Duration::from_secs(check.timeout_seconds), &HashMap::new(), &HashMap::new(), MAX_OUTPUT_BYTES)
            .await;
        self.sandbox.destroy(id);

        let result = match result {
            Ok(r) => r,
            Err(e) => return VerificationOutcome { name: check.name.clone(), passed: false, reason: e.to_string() },
        };

        let output = truncate(&merge_output(&result.stdout, &result.stderr));
        if result.timed_out {
            return VerificationOutcome {
                name: check.name.clone(),
                passed: false,
                reason: format!("timed out after {}s", check.timeout_seconds),
            };
        }

        let (passed, reason) = self.evaluate(&check.expectation, &output, result.exit_code);
        VerificationOutcome { name: check.name.clone(), passed, reason }
    }

    fn evaluate(&self, expectation: &VerificationExpectation, output: &str, exit_code: Option<i32>) -> (bool, String) {
        let normalized = output.trim();
        match expectation {
            VerificationExpectation::ExitCode(expected) => {
                let passed = exit_code == Some(*expected);
                (passed, reason(passed, &format!("expected exit_code={expected}, got {exit_code:?}")))
            }
            VerificationExpectation::Equals(expected) => {
                let passed = normalized == expected;
                (passed, reason(passed, "output mismatch"))
            }
            VerificationExpectation::Contains(substring) => {
                let passed = normalized.contains(substring.as_str());
                (passed, reason(passed, &format!("output missing substring '{substring}'")))
            }
            VerificationExpectation::Regex(pattern) => match regex_lite_match(pattern, normalized) {
                Ok(matched) => (matched, reason(matched, &format!("output does not match regex '{pattern}'"))),
                Err(e) => (false, format!("invalid regex: {e}")),
            },
            VerificationExpectation::OutputLt(bound) => match normalized.parse::<f64>() {
                Ok(value) => {
                    let passed = value < *bound;
                    (passed, reason(passed, &format!("expected output < {bound}, got {value}")))
                }
                Err(_) => (false, "output is not numeric".to_string()),
            },
            VerificationExpectation::OutputGt(bound) => match normalized.parse::<f64>() {
                Ok(value) => {
                    let passed = value > *bound;
                    (passed, reason(passed, &format!("expected output > {bound}, got {value}")))
                }
                Err(_) => (false, "output is not numeric".to_string()),
            },
            VerificationExpectation::FileExists(raw_path) => match self.resolve_permitted_path(raw_path) {
                Ok(path) => {
                    let passed = path.exists();
                    (passed, reason(passed, &format!("file does not exist: {}", path.display())))
                }
                Err(e) => (false, e),
            },
            VerificationExpectation::NotEmpty => {
                let passed = !normalized.is_empty();
                (passed, reason(passed, "output is empty"))
            }
        }
    }

    fn resolve_permitted_path(&self, raw_path: &str) -> Result<PathBuf, String> {
        let input = Path::new(raw_path);
        if input.components().any(|c| c == std::path::Component::ParentDir) {
            return Err("Path outside permitted directories".to_string());
        }
        let candidate = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.verify_dir.join(input)
        };
        let resolved = candidate.canonicalize().unwrap_or(candidate);
        if !self.allowed_roots.iter().any(|root| resolved.starts_with(root)) {
            return Err("Path outside permitted directories".to_string());
        }
        Ok(resolved)
    }
}

fn reason(passed: bool, fail_reason: &str) -> String {
    if passed { "passed".to_string() } else { fail_reason.to_string() }
}

fn merge_output(stdout: &str, stderr: &str) -> String {
    if !stdout.is_empty() && !stderr.is_empty() {
        format!("{stdout}\n{stderr}")
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        stderr.to_string()
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_OUTPUT_CHARS).collect()
}

fn regex_lite_match(pattern: &str, text: &str) -> Result<bool, regex::Error> {
    Ok(regex::RegexBuilder::new(pattern).multi_line(true).build()?.is_match(text))
}

#[async_trait]
impl VerificationRunner for SandboxVerificationRunner {
    async fn run_checks(&self, checks: &[VerificationCheck]) -> Result<VerificationReport, String> {
        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            results.push(self.run_check(check).await);
        }
        let all_passed = results.iter().all(|r| r.passed);
        Ok(VerificationReport { all_passed, results })
    }
}
