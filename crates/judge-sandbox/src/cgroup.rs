//! Cgroup v2 scope guard for systemd-based resource isolation.
//!
//! Wraps a submission's process group in a systemd transient scope via
//! `systemd-run --user --scope`, applying `MemoryMax`, `MemorySwapMax`,
//! `TasksMax`, and `CPUQuota` properties. The [`CgroupScopeGuard`] owns the
//! scope's lifecycle and stops it on [`Drop`].
//!
//! Each submission gets its own independent transient scope: `systemd-run
//! --scope` always creates a fresh unit, so concurrent submissions never
//! share limits even when driven from the same worker process.

use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// SandboxConfig
// ---------------------------------------------------------------------------

/// Resource limits to apply to a cgroup scope.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum physical memory in MB (`MemoryMax`). `None` keeps the
    /// systemd default (unlimited) — used for drivers whose memory
    /// footprint is too unpredictable to cap without false OOM kills
    /// (e.g. Lean/Mathlib), where only CPU quota is enforced.
    pub memory_max_mb: Option<u64>,
    /// Maximum swap in MB (`MemorySwapMax`). `None` keeps the systemd
    /// default (unlimited swap).
    pub memory_swap_max_mb: Option<u64>,
    /// Maximum number of tasks/PIDs (`TasksMax`). `None` keeps the systemd
    /// default (unlimited).
    pub pids_max: Option<u32>,
    /// CPU quota as a percentage of one core, e.g. `150` for 1.5 cores.
    /// `None` keeps the systemd default (unlimited).
    pub cpu_quota_percent: Option<u32>,
}

// ---------------------------------------------------------------------------
// Scope name helpers
// ---------------------------------------------------------------------------

/// Maximum length for a systemd unit name (bytes).
const MAX_SCOPE_NAME_LEN: usize = 256;

/// Build a deterministic scope unit name from language and submission id.
///
/// Format: `judge-{language}-{submission_id_prefix}.scope`
/// Truncates `submission_id` if the full name would exceed 256 bytes.
pub(crate) fn scope_unit_name(language: &str, submission_id: &str) -> String {
    let prefix = format!("judge-{language}-");
    let suffix = ".scope";
    let budget = MAX_SCOPE_NAME_LEN
        .saturating_sub(prefix.len())
        .saturating_sub(suffix.len());
    let truncated_id = &submission_id[..submission_id.len().min(budget)];
    format!("{prefix}{truncated_id}{suffix}")
}

// ---------------------------------------------------------------------------
// create_scope_command
// ---------------------------------------------------------------------------

/// Build a [`Command`] that launches a child process inside a systemd
/// transient scope with the given resource limits.
///
/// The returned `Command` targets `systemd-run` itself. The caller must
/// append the actual submission binary and its arguments via
/// [`Command::arg`]/[`Command::args`] **after** this function returns.
///
/// ```no_run
/// use judge_sandbox::cgroup::{SandboxConfig, create_scope_command};
///
/// let cfg = SandboxConfig {
///     memory_max_mb: Some(256),
///     memory_swap_max_mb: Some(0),
///     pids_max: Some(64),
///     cpu_quota_percent: Some(100),
/// };
/// let mut cmd = create_scope_command("python", "01JEXAMPLE", &cfg);
/// cmd.arg("python3").arg("sol.py");
/// // let child = cmd.spawn()?;
/// ```
pub fn create_scope_command(language: &str, submission_id: &str, config: &SandboxConfig) -> Command {
    let unit = scope_unit_name(language, submission_id);

    let mut cmd = Command::new("systemd-run");
    cmd.args(["--user", "--scope", "--unit", &unit]);

    if let Some(mb) = config.memory_max_mb {
        cmd.args(["-p", &format!("MemoryMax={mb}M")]);
    }

    if let Some(swap) = config.memory_swap_max_mb {
        cmd.args(["-p", &format!("MemorySwapMax={swap}M")]);
    }

    if let Some(pids) = config.pids_max {
        cmd.args(["-p", &format!("TasksMax={pids}")]);
    }

    if let Some(quota) = config.cpu_quota_percent {
        cmd.args(["-p", &format!("CPUQuota={quota}%")]);
    }

    // Everything after "--" is the actual command the scope runs.
    cmd.arg("--");

    cmd
}

// ---------------------------------------------------------------------------
// CgroupScopeGuard (RAII)
// ---------------------------------------------------------------------------

/// RAII guard that stops a systemd transient scope on [`Drop`].
///
/// The guard does **not** own the child process; it only owns the scope
/// cleanup. The caller spawns and manages the child via the [`Command`]
/// returned by [`create_scope_command`].
pub struct CgroupScopeGuard {
    scope_name: String,
}

impl CgroupScopeGuard {
    /// Create a guard for the given scope unit name.
    ///
    /// Call this *after* successfully spawning the child process inside the
    /// scope (i.e. after `cmd.spawn()` succeeds).
    pub fn new(language: &str, submission_id: &str) -> Self {
        let scope_name = scope_unit_name(language, submission_id);
        debug!(scope = %scope_name, "cgroup scope guard created");
        Self { scope_name }
    }

    /// The systemd unit name this guard will clean up.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Explicitly stop the scope. Consumes the guard.
    pub fn stop(self) {
        self.stop_scope();
    }

    fn stop_scope(&self) {
        debug!(scope = %self.scope_name, "stopping cgroup scope");
        let result = Command::new("systemctl")
            .args(["--user", "stop", &self.scope_name])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();

        match result {
            Ok(status) if status.success() => {
                debug!(scope = %self.scope_name, "scope stopped successfully");
            }
            Ok(status) => {
                debug!(
                    scope = %self.scope_name,
                    code = status.code(),
                    "scope stop returned non-zero (may already be gone)"
                );
            }
            Err(e) => {
                warn!(
                    scope = %self.scope_name,
                    error = %e,
                    "failed to run systemctl stop"
                );
            }
        }
    }
}

impl Drop for CgroupScopeGuard {
    fn drop(&mut self) {
        self.stop_scope();
    }
}

// ---------------------------------------------------------------------------
// Orphan scope cleanup
// ---------------------------------------------------------------------------

/// Discovered orphan scope with its process count.
#[derive(Debug)]
pub struct OrphanScope {
    pub unit_name: String,
    pub active_pids: u32,
}

/// Find and stop judge scopes that have no active processes.
///
/// Queries `systemctl --user list-units 'judge-*.scope'` and stops any whose
/// active PID count is zero. Returns the list of scopes that were stopped.
/// Intended for a periodic sweep alongside worker startup.
pub fn cleanup_orphan_scopes() -> Result<Vec<OrphanScope>> {
    let scopes = list_judge_scopes().context("failed to list judge scopes")?;
    let mut cleaned = Vec::new();

    for unit_name in scopes {
        let pids = scope_active_pids(&unit_name);
        if pids == Some(0) {
            debug!(scope = %unit_name, "stopping orphan scope (0 active PIDs)");
            let _ = Command::new("systemctl")
                .args(["--user", "stop", &unit_name])
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            cleaned.push(OrphanScope {
                unit_name,
                active_pids: 0,
            });
        }
    }

    Ok(cleaned)
}

fn list_judge_scopes() -> Result<Vec<String>> {
    let output = Command::new("systemctl")
        .args([
            "--user",
            "list-units",
            "judge-*.scope",
            "--no-legend",
            "--plain",
            "--no-pager",
        ])
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .context("systemctl not found or failed to execute")?;

    if !output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let units = stdout
        .lines()
        .filter_map(|line| {
            let unit = line.split_whitespace().next()?;
            if unit.starts_with("judge-") && unit.ends_with(".scope") {
                Some(unit.to_string())
            } else {
                None
            }
        })
        .collect();

    Ok(units)
}

/// Query active PID count for a scope via `systemctl show`.
///
/// Returns `None` if the query fails, distinguishing "unknown" from "zero
/// processes".
fn scope_active_pids(unit_name: &str) -> Option<u32> {
    let output = Command::new("systemctl")
        .args([
            "--user",
            "show",
            unit_name,
            "--property=TasksCurrent",
            "--value",
        ])
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let s = String::from_utf8_lossy(&output.stdout);
    s.trim().parse::<u32>().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_unit_name_basic() {
        let name = scope_unit_name("python", "01JABCDEF");
        assert_eq!(name, "judge-python-01JABCDEF.scope");
    }

    #[test]
    fn test_scope_unit_name_truncation() {
        let long_id = "A".repeat(300);
        let name = scope_unit_name("x", &long_id);
        assert!(
            name.len() <= MAX_SCOPE_NAME_LEN,
            "scope name {} exceeds limit {}",
            name.len(),
            MAX_SCOPE_NAME_LEN,
        );
        assert!(name.starts_with("judge-x-"));
        assert!(name.ends_with(".scope"));
    }

    #[test]
    fn test_create_scope_command_full() {
        let cfg = SandboxConfig {
            memory_max_mb: Some(256),
            memory_swap_max_mb: Some(0),
            pids_max: Some(64),
            cpu_quota_percent: Some(150),
        };
        let cmd = create_scope_command("cpp", "01JTEST", &cfg);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(cmd.get_program().to_string_lossy(), "systemd-run");
        assert!(args.contains(&"--user".to_string()));
        assert!(args.contains(&"--scope".to_string()));
        assert!(args.contains(&"judge-cpp-01JTEST.scope".to_string()));
        assert!(args.contains(&"MemoryMax=256M".to_string()));
        assert!(args.contains(&"MemorySwapMax=0M".to_string()));
        assert!(args.contains(&"TasksMax=64".to_string()));
        assert!(args.contains(&"CPUQuota=150%".to_string()));
        assert!(args.contains(&"--".to_string()));
    }

    #[test]
    fn test_create_scope_command_minimal() {
        let cfg = SandboxConfig {
            memory_max_mb: Some(4096),
            memory_swap_max_mb: None,
            pids_max: None,
            cpu_quota_percent: None,
        };
        let cmd = create_scope_command("cpp", "01JXY", &cfg);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.contains(&"MemoryMax=4096M".to_string()));
        assert!(!args.iter().any(|a| a.contains("MemorySwapMax")));
        assert!(!args.iter().any(|a| a.contains("TasksMax")));
        assert!(!args.iter().any(|a| a.contains("CPUQuota")));
    }

    #[test]
    fn test_create_scope_command_without_memory_cap_omits_memory_max() {
        let cfg = SandboxConfig {
            memory_max_mb: None,
            memory_swap_max_mb: None,
            pids_max: None,
            cpu_quota_percent: Some(100),
        };
        let cmd = create_scope_command("lean", "01JLEAN", &cfg);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(!args.iter().any(|a| a.contains("MemoryMax")));
        assert!(args.contains(&"CPUQuota=100%".to_string()));
    }

    #[test]
    fn test_create_scope_command_separator_at_end() {
        let cfg = SandboxConfig {
            memory_max_mb: Some(512),
            memory_swap_max_mb: None,
            pids_max: None,
            cpu_quota_percent: None,
        };
        let cmd = create_scope_command("t", "s", &cfg);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(args.last().unwrap(), "--");
    }

    #[test]
    fn test_cgroup_scope_guard_name() {
        let guard = CgroupScopeGuard::new("python", "01JGUARD");
        assert_eq!(guard.scope_name(), "judge-python-01JGUARD.scope");
        // Drop attempts `systemctl stop`, best-effort and silent outside a
        // systemd user session.
    }
}
