//! One-shot, idempotent tool bootstrap: reads a declarative YAML document,
//! runs each tool's shell setup steps, and records a fingerprint so an
//! unchanged tool is skipped on the next launch.

mod fingerprint;
mod spec;
mod state;

pub use spec::{BootstrapDocument, Step, Tool};
pub use state::{BootstrapState, ToolState};

use std::path::Path;
use std::process::Command;

use judge_core::JudgeError;
use tracing::info;

const LOG_PREFIX: &str = "[bootstrap]";

/// Run every tool's setup in `yaml_path`, skipping tools whose fingerprint
/// matches `state_path`'s recorded value. Returns `Err` on the first failed
/// step; bootstrap failures are fatal startup errors for the caller.
pub fn bootstrap_from_yaml(yaml_path: &Path, state_path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(yaml_path)
        .map_err(|e| anyhow::anyhow!("reading bootstrap file {}: {e}", yaml_path.display()))?;
    let doc = spec::read_yaml(&raw)?;
    let mut state = state::load_state(state_path);

    for (name, tool) in &doc.tools {
        info!("{LOG_PREFIX} initializing {name}");
        let sig = fingerprint::fingerprint_setup(&tool.setup);

        if state.tools.get(name).map(|t| &t.applied_sig) == Some(&sig) {
            info!("{LOG_PREFIX} {name} unchanged, skipping");
            continue;
        }

        for (step_index, step) in tool.setup.iter().enumerate() {
            run_step(name, step_index, step)?;
        }

        state.tools.insert(
            name.clone(),
            state::ToolState {
                applied_sig: sig,
            },
        );
        state::save_state(state_path, &state)?;
        info!("{LOG_PREFIX} {name} ready");
    }

    info!("{LOG_PREFIX} finished initialization");
    Ok(())
}

fn run_step(tool: &str, step_index: usize, step: &Step) -> anyhow::Result<()> {
    let label = step.name.as_deref().unwrap_or(step.step_type.as_str());
    info!("{LOG_PREFIX} \u{25b6} {label}");

    match step.step_type.as_str() {
        "shell" => exec_shell(tool, step_index, &step.run),
        other => Err(anyhow::anyhow!("unknown bootstrap step type '{other}' for tool '{tool}'")),
    }
}

fn exec_shell(tool: &str, step_index: usize, script: &str) -> anyhow::Result<()> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
    let status = Command::new(&shell)
        .arg("-lc")
        .arg(script)
        .status()
        .map_err(|e| anyhow::anyhow!("spawning {shell} for tool '{tool}' step {step_index}: {e}"))?;

    if !status.success() {
        return Err(JudgeError::BootstrapStepFailed {
            tool: tool.to_string(),
            step_index,
            exit_code: status.code().unwrap_or(-1),
        }
        .into());
    }
    Ok(())
}
