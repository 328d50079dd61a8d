//! Declarative shape of the bootstrap YAML document.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapDocument {
    #[serde(default)]
    pub tools: BTreeMap<String, Tool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tool {
    #[serde(default)]
    pub setup: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run: String,
}

pub fn read_yaml(raw: &str) -> anyhow::Result<BootstrapDocument> {
    serde_yaml::from_str(raw).map_err(|e| anyhow::anyhow!("parsing bootstrap yaml: {e}"))
}
