//! Runs one submission end to end: scratch directory, driver prepare,
//! sandboxed spawn, wall-clock wait, driver postprocess, classification.

use std::path::Path;

use judge_config::LanguageDefaults;
use judge_core::{Submission, Verdict, VerdictForm};
use judge_drivers::{Driver, PrepareOutcome, Toolchain};
use judge_process::wait_with_wall_timeout;
use judge_sandbox::cgroup::SandboxConfig;
use ulid::Ulid;

use crate::classify::{classify_compile_error, classify_run, classify_spawn_error};

/// Run a single submission and return its verdict. Never returns `Err`:
/// any failure along the way is folded into a `sandbox_error` verdict for
/// this submission's slot, per the "one submission's failure never cancels
/// siblings" rule.
pub async fn run_submission(
    submission: &Submission,
    defaults: &LanguageDefaults,
    toolchain: &Toolchain,
    scratch_root: &Path,
    form: VerdictForm,
) -> Verdict {
    match run_submission_inner(submission, defaults, toolchain, scratch_root, form).await {
        Ok(verdict) => verdict,
        Err(e) => {
            tracing::warn!("submission dispatch failed: {e:#}");
            classify_spawn_error(format!("{e:#}"))
        }
    }
}

async fn run_submission_inner(
    submission: &Submission,
    defaults: &LanguageDefaults,
    toolchain: &Toolchain,
    scratch_root: &Path,
    form: VerdictForm,
) -> anyhow::Result<Verdict> {
    let Some(driver) = Driver::for_language(submission.language) else {
        return Ok(Verdict::sandbox_error(format!(
            "unrecognized submission type '{}'",
            submission.language.as_str()
        )));
    };

    tokio::fs::create_dir_all(scratch_root)
        .await
        .map_err(|e| anyhow::anyhow!("creating scratch root: {e}"))?;
    let scratch = tempfile::Builder::new()
        .prefix("judge-")
        .tempdir_in(scratch_root)
        .map_err(|e| anyhow::anyhow!("creating scratch directory: {e}"))?;

    let submission_id = Ulid::new().to_string();

    let outcome = driver.prepare(scratch.path(), submission, toolchain).await?;
    let cmd = match outcome {
        PrepareOutcome::Ready(cmd) => cmd,
        PrepareOutcome::CompileError { stderr } => {
            return Ok(classify_compile_error(stderr));
        }
    };

    let stdin_data = if submission.input.is_empty() {
        None
    } else {
        Some(submission.input.clone().into_bytes())
    };

    let memory_max_mb = resolve_memory_cap(driver, submission, defaults);
    let sandbox_config = SandboxConfig {
        memory_max_mb,
        memory_swap_max_mb: None,
        pids_max: Some(64),
        cpu_quota_percent: Some(driver.cpu_quota_percent(submission, defaults)),
    };
    let timeout = driver.timeout(submission, defaults);

    let (child, handle) = if matches!(driver, Driver::Lean) {
        // Lean's prepared command is always `Command::new(lean_repl)` with
        // the scratch directory as cwd and no arguments, so the fallback
        // path can rebuild an equivalent command without touching `cmd`.
        let repl_bin = toolchain.lean_repl.clone();
        let scratch_path = scratch.path().to_path_buf();
        let mut first = Some(cmd);
        judge_process::spawn_cpu_quota_preferred(
            move || {
                first.take().unwrap_or_else(|| {
                    let mut rebuilt = tokio::process::Command::new(&repl_bin);
                    rebuilt.current_dir(&scratch_path);
                    rebuilt
                })
            },
            stdin_data.clone(),
            &sandbox_config,
            submission.language.as_str(),
            &submission_id,
        )
        .await?
    } else {
        judge_process::spawn_sandboxed(
            cmd,
            stdin_data,
            &sandbox_config,
            submission.language.as_str(),
            &submission_id,
        )
        .await?
    };

    let raw = wait_with_wall_timeout(child, &handle, timeout).await?;

    let driver_output = if raw.termination == judge_process::Termination::Normal {
        Some(driver.postprocess(&raw, &submission.expected_output))
    } else {
        None
    };

    Ok(classify_run(raw.termination, form, raw.wall_seconds, driver_output))
}

/// Lean's memory footprint (Mathlib imports) is too unpredictable to cap
/// without false OOM kills, so only CPU quota is enforced for it.
fn resolve_memory_cap(
    driver: Driver,
    submission: &Submission,
    defaults: &LanguageDefaults,
) -> Option<u64> {
    match driver {
        Driver::Lean => None,
        Driver::Cpp | Driver::Python => Some(driver.memory_mb(submission, defaults)),
    }
}
