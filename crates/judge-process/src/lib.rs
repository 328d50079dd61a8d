//! Sandboxed subprocess supervisor: spawns a submission's command under the
//! isolation envelope, enforces a wall-clock timeout against the whole
//! process group, and classifies how the process ended.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use judge_sandbox::cgroup::SandboxConfig;
use judge_sandbox::rlimit::RssWatcher;
use judge_sandbox::sandbox::{SandboxCapability, detect_sandbox_capability};

/// Grace period between SIGTERM and SIGKILL once the wall-clock timer fires.
pub const KILL_GRACE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const SUICIDE_SENTINEL: &str = "Suicide from timeout.";

/// Resources that must live as long as the child process.
///
/// - **`Cgroup`**: the child runs inside a systemd transient scope. On drop,
///   [`CgroupScopeGuard`] calls `systemctl --user stop <scope>`, which sends
///   `SIGTERM` to every process in the scope.
/// - **`Rlimit`**: `setrlimit` was applied in the child's `pre_exec`. The
///   optional [`RssWatcher`] monitors RSS from the parent and sends
///   `SIGTERM` to the child's process group if RSS exceeds the threshold.
/// - **`None`**: no sandbox active.
///
/// [`CgroupScopeGuard`]: judge_sandbox::cgroup::CgroupScopeGuard
pub enum SandboxHandle {
    Cgroup(judge_sandbox::cgroup::CgroupScopeGuard),
    Rlimit { watcher: Option<RssWatcher> },
    None,
}

/// Why the supervisor stopped waiting on the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process exited on its own, regardless of exit code.
    Normal,
    /// The wall-clock timer fired; the process group was killed.
    Timeout,
    /// Killed by `SIGKILL` that was attributable to a memory ceiling
    /// (the RSS watcher fired, or a cgroup OOM kill was observed).
    Oom,
    /// Killed by a signal not attributable to our own timeout or memory
    /// enforcement (e.g. the child segfaulted, or something external
    /// signaled it).
    Killed,
    /// The child could not even be spawned.
    SpawnError,
}

/// Outcome of running a sandboxed command to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub termination: Termination,
    pub wall_seconds: f64,
}

#[derive(Debug, Clone, Copy)]
enum PreExecPolicy {
    SetsidOnly,
    SetsidAndRlimits {
        memory_max_mb: u64,
        pids_max: Option<u64>,
    },
}

/// Single spawn chokepoint for every isolation tier. Applies the sanitized
/// environment (see [`sanitized_env`]) before anything else, so no caller
/// can accidentally let a submission inherit the judge process's own env.
async fn spawn_with_pre_exec(
    mut cmd: Command,
    stdin_data: Option<Vec<u8>>,
    pre_exec_policy: PreExecPolicy,
) -> Result<tokio::process::Child> {
    cmd.env_clear();
    cmd.envs(sanitized_env());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(if stdin_data.is_some() {
        std::process::Stdio::piped()
    } else {
        std::process::Stdio::null()
    });
    cmd.kill_on_drop(true);

    // SAFETY: setsid() and setrlimit() are async-signal-safe and run
    // between fork and exec, before any other thread can interfere.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(move || {
            libc::setsid();
            match pre_exec_policy {
                PreExecPolicy::SetsidOnly => Ok(()),
                PreExecPolicy::SetsidAndRlimits {
                    memory_max_mb,
                    pids_max,
                } => judge_sandbox::rlimit::apply_rlimits(memory_max_mb, pids_max)
                    .map_err(std::io::Error::other),
            }
        });
    }
    #[cfg(not(unix))]
    let _ = pre_exec_policy;

    let mut child = cmd.spawn().context("failed to spawn submission process")?;

    if let Some(data) = stdin_data {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = async {
                    stdin.write_all(&data).await?;
                    stdin.shutdown().await
                }
                .await
                {
                    warn!("stdin write error: {e}");
                }
            });
        }
    }

    Ok(child)
}

/// Spawn a submission under whatever isolation the host supports.
///
/// - **CgroupV2**: wraps the command in a systemd transient scope via
///   `systemd-run --user --scope`, carrying `MemoryMax`/`CPUQuota`.
/// - **Setrlimit**: applies `RLIMIT_AS`/`RLIMIT_NPROC` in `pre_exec` and
///   starts an [`RssWatcher`] as a secondary backstop.
/// - **None**: falls through with no memory/CPU isolation (process-group
///   control alone); logged as degraded.
pub async fn spawn_sandboxed(
    cmd: Command,
    stdin_data: Option<Vec<u8>>,
    sandbox: &SandboxConfig,
    language: &str,
    submission_id: &str,
) -> Result<(tokio::process::Child, SandboxHandle)> {
    match detect_sandbox_capability() {
        SandboxCapability::CgroupV2 => {
            spawn_with_cgroup(cmd, stdin_data, sandbox, language, submission_id).await
        }
        SandboxCapability::Setrlimit => spawn_with_rlimit(cmd, stdin_data, sandbox).await,
        SandboxCapability::None => {
            debug!("no sandbox capability detected; spawning without memory isolation");
            let child = spawn_with_pre_exec(cmd, stdin_data, PreExecPolicy::SetsidOnly).await?;
            Ok((child, SandboxHandle::None))
        }
    }
}

/// Spawn preferring the cgroup tier regardless of the cached capability
/// probe, falling back to an unsandboxed spawn only if the `systemd-run`
/// wrapper itself fails to launch.
///
/// Used by the Lean driver: Mathlib's memory footprint makes `RLIMIT_AS`
/// impractical, so the only isolation primitive worth enforcing is CPU
/// quota, and that's only available through the cgroup tier.
pub async fn spawn_cpu_quota_preferred(
    mut cmd_factory: impl FnMut() -> Command,
    stdin_data: Option<Vec<u8>>,
    sandbox: &SandboxConfig,
    language: &str,
    submission_id: &str,
) -> Result<(tokio::process::Child, SandboxHandle)> {
    match spawn_with_cgroup(cmd_factory(), stdin_data.clone(), sandbox, language, submission_id)
        .await
    {
        Ok(result) => Ok(result),
        Err(e) => {
            warn!("cgroup spawn failed ({e:#}), running Lean submission without CPU quota enforcement");
            let child =
                spawn_with_pre_exec(cmd_factory(), stdin_data, PreExecPolicy::SetsidOnly).await?;
            Ok((child, SandboxHandle::None))
        }
    }
}

async fn spawn_with_cgroup(
    original_cmd: Command,
    stdin_data: Option<Vec<u8>>,
    config: &SandboxConfig,
    language: &str,
    submission_id: &str,
) -> Result<(tokio::process::Child, SandboxHandle)> {
    let scope_cmd = judge_sandbox::cgroup::create_scope_command(language, submission_id, config);

    let mut tokio_cmd = Command::from(scope_cmd);
    tokio_cmd.arg(original_cmd.as_std().get_program());
    tokio_cmd.args(original_cmd.as_std().get_args());

    for (key, val) in original_cmd
        .as_std()
        .get_envs()
        .filter_map(|(k, v)| v.map(|val| (k.to_owned(), val.to_owned())))
    {
        tokio_cmd.env(key, val);
    }
    if let Some(dir) = original_cmd.as_std().get_current_dir() {
        tokio_cmd.current_dir(dir);
    }

    let child = spawn_with_pre_exec(tokio_cmd, stdin_data, PreExecPolicy::SetsidOnly).await?;
    let guard = judge_sandbox::cgroup::CgroupScopeGuard::new(language, submission_id);

    debug!(scope = %guard.scope_name(), pid = child.id(), "spawned submission inside cgroup scope");
    Ok((child, SandboxHandle::Cgroup(guard)))
}

async fn spawn_with_rlimit(
    cmd: Command,
    stdin_data: Option<Vec<u8>>,
    config: &SandboxConfig,
) -> Result<(tokio::process::Child, SandboxHandle)> {
    let pids_max = config.pids_max.map(u64::from);

    let Some(memory_max_mb) = config.memory_max_mb else {
        let child = spawn_with_pre_exec(cmd, stdin_data, PreExecPolicy::SetsidOnly).await?;
        return Ok((child, SandboxHandle::Rlimit { watcher: None }));
    };

    let child = spawn_with_pre_exec(
        cmd,
        stdin_data,
        PreExecPolicy::SetsidAndRlimits {
            memory_max_mb,
            pids_max,
        },
    )
    .await?;

    let watcher = child.id().and_then(|pid| {
        debug!(pid, memory_max_mb, "starting RSS watcher for sandboxed submission");
        match RssWatcher::start(pid, memory_max_mb, Duration::from_millis(500)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("failed to start RSS watcher: {e:#}");
                None
            }
        }
    });

    Ok((child, SandboxHandle::Rlimit { watcher }))
}

/// Wait for a sandboxed child, enforcing `timeout` as an absolute wall-clock
/// budget measured from this call, not from spawn time.
///
/// On timeout: SIGTERM to the process group, a [`KILL_GRACE`] grace period,
/// then SIGKILL; output is drained the whole time and the supervisor never
/// returns before the child is fully reaped. The literal line
/// [`SUICIDE_SENTINEL`] is appended to stdout when the timeout fires.
pub async fn wait_with_wall_timeout(
    mut child: tokio::process::Child,
    sandbox: &SandboxHandle,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let started = Instant::now();
    let stdout = child.stdout.take().context("child stdout not piped")?;
    let stderr = child.stderr.take().context("child stderr not piped")?;

    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);
    let mut stdout_buf = [0u8; 4096];
    let mut stderr_buf = [0u8; 4096];
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut timed_out = false;
    let mut sigterm_sent_at: Option<Instant> = None;

    while !stdout_done || !stderr_done {
        tokio::select! {
            result = stdout_reader.read(&mut stdout_buf), if !stdout_done => {
                match result {
                    Ok(0) => stdout_done = true,
                    Ok(n) => stdout.extend_from_slice(&stdout_buf[..n]),
                    Err(_) => stdout_done = true,
                }
            }
            result = stderr_reader.read(&mut stderr_buf), if !stderr_done => {
                match result {
                    Ok(0) => stderr_done = true,
                    Ok(n) => stderr.extend_from_slice(&stderr_buf[..n]),
                    Err(_) => stderr_done = true,
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let elapsed = started.elapsed();
                match sigterm_sent_at {
                    None if elapsed >= timeout => {
                        timed_out = true;
                        warn!(timeout_secs = timeout.as_secs_f64(), "wall-clock timeout, sending SIGTERM to process group");
                        send_signal_to_group(&child, libc::SIGTERM);
                        sigterm_sent_at = Some(Instant::now());
                    }
                    Some(sent_at) if sent_at.elapsed() >= KILL_GRACE => {
                        warn!("SIGTERM grace period elapsed, escalating to SIGKILL");
                        send_signal_to_group(&child, libc::SIGKILL);
                        // Stop waiting for further output once we've escalated;
                        // the streams will report EOF as the kernel tears the
                        // process down.
                    }
                    _ => {}
                }
            }
        }
    }

    let status = child.wait().await.context("failed to reap submission process")?;
    let wall_seconds = started.elapsed().as_secs_f64();

    let mut stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    let termination = if timed_out {
        if !stdout.is_empty() && !stdout.ends_with('\n') {
            stdout.push('\n');
        }
        stdout.push_str(SUICIDE_SENTINEL);
        Termination::Timeout
    } else {
        classify_signal_exit(&status, sandbox)
    };

    let exit_code = status.code().unwrap_or(-1);

    Ok(ExecutionResult {
        stdout,
        stderr,
        exit_code,
        termination,
        wall_seconds,
    })
}

fn classify_signal_exit(status: &std::process::ExitStatus, sandbox: &SandboxHandle) -> Termination {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let oom = match sandbox {
                SandboxHandle::Rlimit { watcher: Some(w) } => w.fired(),
                _ => signal == libc::SIGKILL,
            };
            return if oom { Termination::Oom } else { Termination::Killed };
        }
    }
    let _ = sandbox;
    Termination::Normal
}

fn send_signal_to_group(child: &tokio::process::Child, signal: i32) {
    if let Some(pid) = child.id() {
        // SAFETY: kill() is async-signal-safe; negative PID targets the
        // whole process group created by setsid() in pre_exec.
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
}

/// Check whether a submission toolchain binary is on `PATH`.
pub async fn check_tool_installed(executable: &str) -> Result<()> {
    let output = Command::new("which")
        .arg(executable)
        .output()
        .await
        .context("failed to execute 'which'")?;

    if !output.status.success() {
        anyhow::bail!("tool '{executable}' is not installed or not in PATH");
    }
    Ok(())
}

/// Build a minimal, sanitized environment for a submission's process:
/// only `PATH`, `HOME`, and locale variables pass through.
pub fn sanitized_env() -> Vec<(String, String)> {
    const ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "LC_CTYPE"];
    ALLOWLIST
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
