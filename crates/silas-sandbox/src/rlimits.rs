//! Memory and CPU rlimits applied to a sandboxed child before `execve`.
//!
//! `RLIMIT_AS` bounds the process's virtual address space, not its
//! resident-set size; `RLIMIT_CPU` bounds cumulative CPU seconds, not wall
//! time (wall time is enforced separately by [`crate::manager`]'s timeout).

/// Install rlimit enforcement on `cmd`, applied before the child execs.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn apply(cmd: &mut tokio::process::Command, max_memory_mb: u64, max_cpu_seconds: u64) {
    use nix::sys::resource::{setrlimit, Resource};
    use std::io;
    use std::os::unix::process::CommandExt;

    let max_memory_bytes = max_memory_mb.saturating_mul(1024 * 1024);

    // SAFETY: the closure only calls `setrlimit`, an async-signal-safe libc
    // wrapper that does not allocate or touch Rust runtime state, satisfying
    // `pre_exec`'s post-fork-pre-exec safety requirement.
    unsafe {
        cmd.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, max_memory_bytes, max_memory_bytes)
                .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            setrlimit(Resource::RLIMIT_CPU, max_cpu_seconds, max_cpu_seconds)
                .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }
}

/// Rlimits are out of scope on non-unix hosts.
#[cfg(not(unix))]
pub fn apply(_cmd: &mut tokio::process::Command, _max_memory_mb: u64, _max_cpu_seconds: u64) {}
