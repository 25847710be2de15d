//! The sandbox manager: `create` / `exec` / `destroy`.

use crate::error::{SandboxError, SandboxResult};
use crate::{netns, rlimits};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for a new sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub max_memory_mb: u64,
    pub max_cpu_seconds: u64,
    pub network_access: bool,
    pub env: HashMap<String, String>,
}

impl SandboxConfig {
    fn validate(&self) -> SandboxResult<()> {
        if self.max_memory_mb == 0 {
            return Err(SandboxError::InvalidConfig("max_memory_mb must be positive".into()));
        }
        if self.max_cpu_seconds == 0 {
            return Err(SandboxError::InvalidConfig("max_cpu_seconds must be positive".into()));
        }
        Ok(())
    }
}

/// The result of running a single command inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

struct SandboxHandle {
    work_dir: PathBuf,
    network_access: bool,
    max_memory_mb: u64,
    max_cpu_seconds: u64,
    last_pid: AtomicU32,
}

/// Creates, executes in, and destroys ephemeral process sandboxes.
///
/// Each sandbox's work directory is unique and exclusive; `destroy` is
/// idempotent and always removes the directory, even if a prior `exec`
/// errored.
pub struct SandboxManager {
    base_dir: PathBuf,
    sandboxes: DashMap<Uuid, SandboxHandle>,
}

/// Interpreters whose `-c` flag would let a caller smuggle an arbitrary
/// shell command line past argv-level validation.
const SHELL_INTERPRETERS: [&str; 3] = ["sh", "bash", "zsh"];

impl SandboxManager {
    /// Construct a manager rooted at `base_dir` (created if absent).
    ///
    /// # Errors
    /// [`SandboxError::Io`] if `base_dir` cannot be created.
    pub fn new(base_dir: impl Into<PathBuf>) -> SandboxResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| SandboxError::Io(e.to_string()))?;
        Ok(SandboxManager { base_dir, sandboxes: DashMap::new() })
    }

    /// Create a fresh sandbox; fails closed on network isolation if the
    /// host cannot provide it and `network_access=false` was requested.
    ///
    /// # Errors
    /// See [`SandboxError`].
    pub async fn create(&self, config: SandboxConfig) -> SandboxResult<Uuid> {
        config.validate()?;

        if !config.network_access && !netns::probe().await {
            return Err(SandboxError::NetworkIsolationUnavailable);
        }

        let id = Uuid::new_v4();
        let work_dir = tempfile_dir(&self.base_dir, &id)?;
        debug!(sandbox_id = %id, work_dir = %work_dir.display(), "sandbox created");

        self.sandboxes.insert(
            id,
            SandboxHandle {
                work_dir,
                network_access: config.network_access,
                max_memory_mb: config.max_memory_mb,
                max_cpu_seconds: config.max_cpu_seconds,
                last_pid: AtomicU32::new(0),
            },
        );
        Ok(id)
    }

    /// Run `argv` inside sandbox `id`. Environment is not inherited from the
    /// host: only `PATH`, `HOME=<work_dir>`, `config_env`, then `caller_env`
    /// (applied last, so the caller wins on key collision) are passed.
    ///
    /// # Errors
    /// [`SandboxError::NotFound`] for an unknown id, [`SandboxError::InvalidConfig`]
    /// for a rejected argv, [`SandboxError::Spawn`] if the process cannot start.
    pub async fn exec(
        &self,
        id: Uuid,
        argv: &[String],
        timeout: Duration,
        config_env: &HashMap<String, String>,
        caller_env: &HashMap<String, String>,
        max_output_bytes: usize,
    ) -> SandboxResult<ExecResult> {
        validate_argv(argv)?;

        let work_dir;
        let network_access;
        let max_memory_mb;
        let max_cpu_seconds;
        {
            let handle = self.sandboxes.get(&id).ok_or_else(|| SandboxError::NotFound(id.to_string()))?;
            work_dir = handle.work_dir.clone();
            network_access = handle.network_access;
            max_memory_mb = handle.max_memory_mb;
            max_cpu_seconds = handle.max_cpu_seconds;
        }

        let env = build_env(&work_dir, config_env, caller_env);

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&work_dir)
            .env_clear()
            .envs(&env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        if !network_access {
            netns::apply(&mut cmd);
        }
        rlimits::apply(&mut cmd, max_memory_mb, max_cpu_seconds);

        let started = std::time::Instant::now();
        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn(e.to_string()))?;
        if let (Some(pid), Some(handle)) = (child.id(), self.sandboxes.get(&id)) {
            handle.last_pid.store(pid, Ordering::SeqCst);
        }

        let result = tokio::time::timeout(timeout, child.wait_with_output()).await;
        let duration = started.elapsed();

        match result {
            Ok(Ok(output)) => Ok(ExecResult {
                exit_code: output.status.code(),
                stdout: decode_truncated(&output.stdout, max_output_bytes),
                stderr: decode_truncated(&output.stderr, max_output_bytes),
                timed_out: false,
                duration,
            }),
            Ok(Err(e)) => Err(SandboxError::Spawn(e.to_string())),
            Err(_elapsed) => {
                if let Some(handle) = self.sandboxes.get(&id) {
                    kill_process_group(handle.last_pid.load(Ordering::SeqCst));
                }
                Ok(ExecResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                    duration,
                })
            }
        }
    }

    /// Idempotent: kills any tracked pid, then removes the working
    /// directory. A second call on an already-destroyed id is a no-op.
    pub fn destroy(&self, id: Uuid) {
        if let Some((_, handle)) = self.sandboxes.remove(&id) {
            let pid = handle.last_pid.load(Ordering::SeqCst);
            if pid != 0 {
                kill_process_group(pid);
            }
            if let Err(e) = std::fs::remove_dir_all(&handle.work_dir) {
                warn!(sandbox_id = %id, error = %e, "failed to remove sandbox work dir");
            }
        }
    }

    /// `true` if `id` currently names a live sandbox.
    #[must_use]
    pub fn exists(&self, id: Uuid) -> bool {
        self.sandboxes.contains_key(&id)
    }

    /// The working directory sandbox `id` executes in, for callers that
    /// need to materialize a file before running a command there.
    #[must_use]
    pub fn work_dir(&self, id: Uuid) -> Option<PathBuf> {
        self.sandboxes.get(&id).map(|h| h.work_dir.clone())
    }
}

fn validate_argv(argv: &[String]) -> SandboxResult<()> {
    if argv.is_empty() {
        return Err(SandboxError::InvalidConfig("argv must not be empty".into()));
    }
    let program = Path::new(&argv[0])
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&argv[0]);
    if SHELL_INTERPRETERS.contains(&program) && argv.iter().any(|a| a == "-c") {
        return Err(SandboxError::InvalidConfig(format!(
            "shell interpreter invocation with -c is rejected: {program}"
        )));
    }
    Ok(())
}

fn build_env(
    work_dir: &Path,
    config_env: &HashMap<String, String>,
    caller_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(
        "PATH".to_string(),
        std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
    );
    env.insert("HOME".to_string(), work_dir.display().to_string());
    for (k, v) in config_env {
        env.insert(k.clone(), v.clone());
    }
    for (k, v) in caller_env {
        env.insert(k.clone(), v.clone());
    }
    env
}

/// Truncate to `max_bytes` (rounding down to a UTF-8 char boundary) before
/// lossily decoding, matching the reference implementation's
/// truncate-then-decode order.
fn decode_truncated(bytes: &[u8], max_bytes: usize) -> String {
    let cut = bytes.len().min(max_bytes);
    let mut boundary = cut;
    while boundary > 0 && !bytes.is_char_boundary(boundary) {
        boundary -= 1;
    }
    String::from_utf8_lossy(&bytes[..boundary]).into_owned()
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    if pid == 0 {
        return;
    }
    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn tempfile_dir(base_dir: &Path, id: &Uuid) -> SandboxResult<PathBuf> {
    let dir = base_dir.join(format!("silas-sandbox-{id}"));
    std::fs::create_dir_all(&dir).map_err(|e| SandboxError::Io(e.to_string()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SandboxConfig {
        SandboxConfig { max_memory_mb: 64, max_cpu_seconds: 5, network_access: true, env: HashMap::new() }
    }

    #[tokio::test]
    async fn create_rejects_zero_limits() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let mut bad = cfg();
        bad.max_memory_mb = 0;
        assert!(matches!(mgr.create(bad).await, Err(SandboxError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn exec_rejects_empty_argv() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let id = mgr.create(cfg()).await.unwrap();
        let result = mgr
            .exec(id, &[], Duration::from_secs(1), &HashMap::new(), &HashMap::new(), 4096)
            .await;
        assert!(matches!(result, Err(SandboxError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn exec_rejects_shell_dash_c() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let id = mgr.create(cfg()).await.unwrap();
        let argv = vec!["bash".to_string(), "-c".to_string(), "echo hi".to_string()];
        let result = mgr.exec(id, &argv, Duration::from_secs(1), &HashMap::new(), &HashMap::new(), 4096).await;
        assert!(matches!(result, Err(SandboxError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn exec_on_unknown_sandbox_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let argv = vec!["true".to_string()];
        let result = mgr
            .exec(Uuid::new_v4(), &argv, Duration::from_secs(1), &HashMap::new(), &HashMap::new(), 4096)
            .await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn destroy_then_exec_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let id = mgr.create(cfg()).await.unwrap();
        mgr.destroy(id);
        let argv = vec!["true".to_string()];
        let result = mgr.exec(id, &argv, Duration::from_secs(1), &HashMap::new(), &HashMap::new(), 4096).await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let id = mgr.create(cfg()).await.unwrap();
        mgr.destroy(id);
        mgr.destroy(id);
    }

    #[tokio::test]
    async fn exec_timeout_marks_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SandboxManager::new(dir.path()).unwrap();
        let id = mgr.create(cfg()).await.unwrap();
        let argv = vec!["sleep".to_string(), "10".to_string()];
        let result = mgr
            .exec(id, &argv, Duration::from_millis(200), &HashMap::new(), &HashMap::new(), 4096)
            .await
            .unwrap();
        assert!(result.timed_out);
    }
}
