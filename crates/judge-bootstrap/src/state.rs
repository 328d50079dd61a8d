//! JSON state file tracking each tool's last-applied fingerprint.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolState {
    pub applied_sig: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapState {
    #[serde(flatten)]
    pub tools: BTreeMap<String, ToolState>,
}

/// Best-effort load: a missing or unparseable state file starts fresh
/// rather than aborting bootstrap, matching the original's "corrupt state
/// is not fatal" behavior.
pub fn load_state(path: &Path) -> BootstrapState {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => BootstrapState::default(),
    }
}

pub fn save_state(path: &Path, state: &BootstrapState) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(state)?;
    std::fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_file_loads_as_empty() {
        let state = load_state(Path::new("/nonexistent/state.json"));
        assert!(state.tools.is_empty());
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut state = BootstrapState::default();
        state.tools.insert(
            "lean".to_string(),
            ToolState {
                applied_sig: "deadbeef".to_string(),
            },
        );
        save_state(&path, &state).unwrap();

        let loaded = load_state(&path);
        assert_eq!(loaded.tools["lean"].applied_sig, "deadbeef");
    }

    #[test]
    fn corrupt_state_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(load_state(&path).tools.is_empty());
    }
}
