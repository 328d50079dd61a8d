//! OS-level isolation primitives for sandboxing a single submission's
//! process tree: cgroup v2 scopes, POSIX rlimits with an RSS watcher
//! fallback, a Landlock filesystem jail, and capability probing to pick
//! among them.

pub mod cgroup;
pub mod jail;
pub mod rlimit;
pub mod sandbox;

pub use cgroup::{
    CgroupScopeGuard, OrphanScope, SandboxConfig, cleanup_orphan_scopes, create_scope_command,
};
pub use jail::{JailOutcome, apply_jail};
pub use rlimit::{RssWatcher, apply_rlimits, current_rlimit_as, current_rlimit_nproc};
pub use sandbox::{SandboxCapability, detect_sandbox_capability, systemd_version};
