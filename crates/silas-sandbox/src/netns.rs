//! Linux network-namespace isolation. When `network_access=false`, the
//! sandbox must run commands unable to reach the host network (I-8); when
//! the capability to do so is unavailable, `create` fails closed rather
//! than silently running with network access.

/// Probe whether this process can create a new network namespace, by
/// spawning a disposable child that attempts `unshare(CLONE_NEWNET)` before
/// exiting. Returns `false` on any failure (missing `CAP_SYS_ADMIN`,
/// unsupported kernel, sandboxed environment, etc.).
#[cfg(target_os = "linux")]
pub async fn probe() -> bool {
    use std::os::unix::process::ExitStatusExt;

    let mut cmd = tokio::process::Command::new("true");
    apply(&mut cmd);
    match cmd.status().await {
        Ok(status) => status.success() || status.signal().is_none(),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
/// Network-namespace isolation is Linux-only; other hosts always fail closed.
pub async fn probe() -> bool {
    false
}

/// Install a `pre_exec` hook that enters a fresh, unconnected network
/// namespace before the child execs.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn apply(cmd: &mut tokio::process::Command) {
    use nix::sched::{unshare, CloneFlags};
    use std::io;
    use std::os::unix::process::CommandExt;

    // SAFETY: the closure only calls `unshare`, an async-signal-safe libc
    // wrapper, satisfying `pre_exec`'s post-fork-pre-exec safety requirement.
    unsafe {
        cmd.pre_exec(|| {
            unshare(CloneFlags::CLONE_NEWNET).map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
/// No-op off Linux; callers must consult [`probe`] (always `false`) first.
pub fn apply(_cmd: &mut tokio::process::Command) {}
