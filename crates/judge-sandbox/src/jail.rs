//! Filesystem jail: restrict a submission's process to read-write access
//! under its scratch directory and read-only access to the toolchain paths
//! it needs to run, via Landlock on Linux.
//!
//! Applied to the *current thread* before exec, so the restriction is
//! inherited by the child. Call [`apply_jail`] from inside a `pre_exec`
//! closure, after `setsid()` but before `execve`.

use std::path::Path;

use anyhow::Result;

/// Whether the jail was actually enforced or only attempted in degraded
/// best-effort mode (e.g. non-Linux host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailOutcome {
    Enforced,
    BestEffort,
}

#[cfg(target_os = "linux")]
pub fn apply_jail(scratch_dir: &Path, read_only_paths: &[&Path]) -> Result<JailOutcome> {
    use landlock::{
        ABI, Access, AccessFs, PathBeneath, PathFd, Ruleset, RulesetAttr, RulesetCreatedAttr,
        RulesetStatus,
    };

    let abi = ABI::V1;
    let read_write_access = AccessFs::from_all(abi);
    let read_only_access = AccessFs::from_read(abi);

    let mut ruleset = Ruleset::default()
        .handle_access(read_write_access)?
        .create()?;

    ruleset = ruleset.add_rule(PathBeneath::new(PathFd::new(scratch_dir)?, read_write_access))?;

    for path in read_only_paths {
        if path.exists() {
            ruleset = ruleset.add_rule(PathBeneath::new(PathFd::new(path)?, read_only_access))?;
        }
    }

    let status = ruleset.restrict_self()?;
    match status.ruleset {
        RulesetStatus::FullyEnforced => Ok(JailOutcome::Enforced),
        RulesetStatus::PartiallyEnforced | RulesetStatus::NotEnforced => {
            tracing::warn!("landlock ruleset not fully enforced by kernel");
            Ok(JailOutcome::BestEffort)
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn apply_jail(_scratch_dir: &Path, _read_only_paths: &[&Path]) -> Result<JailOutcome> {
    tracing::warn!("filesystem jail unavailable on this platform, running best-effort");
    Ok(JailOutcome::BestEffort)
}
