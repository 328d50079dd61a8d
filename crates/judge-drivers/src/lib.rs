//! Per-language submission drivers: materialize source into a scratch
//! directory, build the command the sandbox runner should execute, and
//! interpret the raw run output into the pieces of a [`Verdict`].

mod cpp;
mod lean;
mod python;
mod toolchain;

pub use toolchain::Toolchain;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use judge_core::{Language, Reason, Submission};
use judge_config::LanguageDefaults;
use judge_process::ExecutionResult;
use tokio::process::Command;

/// Outcome of [`Driver::prepare`]: either a command ready to run under the
/// sandbox, or a compile-time failure that short-circuits execution.
pub enum PrepareOutcome {
    Ready(Command),
    CompileError { stderr: String },
}

/// The language-specific interpretation of a completed, non-killed run.
/// Termination classification (timeout/oom/killed/spawn_error) is the
/// caller's responsibility; this only applies once a process has exited
/// on its own.
pub struct DriverOutput {
    pub stdout: String,
    pub stderr: String,
    pub reason: Option<Reason>,
    pub output_match: bool,
}

/// Grace added to the Python driver's effective memory ceiling to absorb
/// CPython's own interpreter baseline footprint. Not applied to C++ or
/// Lean — see DESIGN.md for why.
const PYTHON_MEMORY_GRACE_MB: u64 = 128;

/// Line-trim-equality: trailing whitespace on each line is stripped before
/// comparing, but line count and content otherwise must match exactly.
pub(crate) fn line_trim_eq(actual: &str, expected: &str) -> bool {
    actual
        .split('\n')
        .map(str::trim_end)
        .eq(expected.split('\n').map(str::trim_end))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Driver {
    Cpp,
    Python,
    Lean,
}

impl Driver {
    /// Resolve the driver for a submission's language tag. `None` for
    /// [`Language::Unknown`] — the caller must turn that into a
    /// `sandbox_error` verdict without spawning anything.
    pub fn for_language(language: Language) -> Option<Self> {
        match language {
            Language::Cpp => Some(Self::Cpp),
            Language::Python => Some(Self::Python),
            Language::Lean => Some(Self::Lean),
            Language::Unknown => None,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Cpp | Self::Python => Duration::from_secs(5),
            Self::Lean => Duration::from_secs(600),
        }
    }

    /// Resolve the wall-clock timeout for a submission: its own override,
    /// else the language's configured default, else the driver's built-in
    /// default.
    pub fn timeout(&self, submission: &Submission, defaults: &LanguageDefaults) -> Duration {
        match submission.timeout {
            Some(secs) if secs > 0.0 => Duration::from_secs_f64(secs),
            _ => Duration::from_secs_f64(defaults.timeout_secs),
        }
    }

    /// Resolve the memory ceiling in MiB, applying the Python-only grace.
    pub fn memory_mb(&self, submission: &Submission, defaults: &LanguageDefaults) -> u64 {
        let base = submission.memory_limit.unwrap_or(defaults.memory_mb);
        match self {
            Self::Python => base + PYTHON_MEMORY_GRACE_MB,
            Self::Cpp | Self::Lean => base,
        }
    }

    /// Resolve the CPU quota as a systemd `CPUQuota=N%` percentage.
    pub fn cpu_quota_percent(&self, submission: &Submission, defaults: &LanguageDefaults) -> u32 {
        let cores = submission.cpu_core.unwrap_or(defaults.cpu_core);
        (cores * 100.0).round() as u32
    }

    pub async fn prepare(
        &self,
        scratch: &Path,
        submission: &Submission,
        toolchain: &Toolchain,
    ) -> Result<PrepareOutcome> {
        match self {
            Self::Cpp => cpp::prepare(scratch, submission, toolchain).await,
            Self::Python => python::prepare(scratch, submission, toolchain),
            Self::Lean => lean::prepare(scratch, submission, toolchain),
        }
    }

    pub fn postprocess(&self, raw: &ExecutionResult, expected_output: &str) -> DriverOutput {
        match self {
            Self::Cpp => cpp::postprocess(raw, expected_output),
            Self::Python => python::postprocess(raw, expected_output),
            Self::Lean => lean::postprocess(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(timeout_secs: f64, memory_mb: u64, cpu_core: f64) -> LanguageDefaults {
        LanguageDefaults {
            timeout_secs,
            memory_mb,
            cpu_core,
        }
    }

    fn submission(language: Language) -> Submission {
        Submission {
            language,
            solution: String::new(),
            input: String::new(),
            expected_output: String::new(),
            timeout: None,
            memory_limit: None,
            cpu_core: None,
        }
    }

    #[test]
    fn python_memory_gets_grace_others_do_not() {
        let d = defaults(5.0, 256, 1.0);
        assert_eq!(Driver::Python.memory_mb(&submission(Language::Python), &d), 384);
        assert_eq!(Driver::Cpp.memory_mb(&submission(Language::Cpp), &d), 256);
        assert_eq!(Driver::Lean.memory_mb(&submission(Language::Lean), &d), 256);
    }

    #[test]
    fn submission_override_wins_over_defaults() {
        let d = defaults(5.0, 256, 1.0);
        let mut sub = submission(Language::Cpp);
        sub.memory_limit = Some(512);
        assert_eq!(Driver::Cpp.memory_mb(&sub, &d), 512);
    }

    #[test]
    fn cpu_quota_rounds_fractional_cores_to_percent() {
        let d = defaults(5.0, 256, 1.0);
        let mut sub = submission(Language::Cpp);
        sub.cpu_core = Some(1.5);
        assert_eq!(Driver::Cpp.cpu_quota_percent(&sub, &d), 150);
    }

    #[test]
    fn timeout_override_takes_priority_over_language_default() {
        let d = defaults(5.0, 256, 1.0);
        let mut sub = submission(Language::Python);
        sub.timeout = Some(30.0);
        assert_eq!(Driver::Python.timeout(&sub, &d), Duration::from_secs(30));
    }

    #[test]
    fn lean_default_timeout_is_much_larger_than_imperative_languages() {
        assert!(Driver::Lean.default_timeout() > Driver::Cpp.default_timeout() * 10);
    }

    #[test]
    fn unknown_language_resolves_to_no_driver() {
        assert_eq!(Driver::for_language(Language::Unknown), None);
        assert_eq!(Driver::for_language(Language::Cpp), Some(Driver::Cpp));
    }
}
