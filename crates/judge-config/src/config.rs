use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::merge::merge_toml_values;

const ENV_PREFIX: &str = "JUDGE_";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LanguageDefaults {
    pub timeout_secs: f64,
    pub memory_mb: u64,
    pub cpu_core: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub worker_pool_size: usize,
    pub long_batch_pool_size: usize,
    pub scratch_root: PathBuf,
    pub languages: BTreeMap<String, LanguageDefaults>,
    pub bootstrap_config_path: PathBuf,
    pub bootstrap_state_path: PathBuf,
}

/// Overrides supplied on the command line; highest precedence of all layers.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub worker_pool_size: Option<usize>,
    pub long_batch_pool_size: Option<usize>,
    pub scratch_root: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl JudgeConfig {
    fn defaults() -> toml::Value {
        toml::toml! {
            worker_pool_size = 4
            long_batch_pool_size = 2
            scratch_root = "/tmp/judge-scratch"
            bootstrap_config_path = "judge-tools.yaml"
            bootstrap_state_path = "/tmp/judge-scratch/bootstrap-state.json"

            [languages.cpp]
            timeout_secs = 5.0
            memory_mb = 256
            cpu_core = 1.0

            [languages.python]
            timeout_secs = 5.0
            memory_mb = 256
            cpu_core = 1.0

            [languages.lean]
            timeout_secs = 600.0
            memory_mb = 4096
            cpu_core = 1.0
        }
        .into()
    }

    /// Loads compiled-in defaults, merges an optional TOML file, then
    /// `JUDGE_*` environment overrides, then CLI overrides (highest
    /// precedence), validating the result before returning it.
    pub fn load(cli: &CliOverrides) -> Result<Self> {
        let mut value = Self::defaults();

        if let Some(path) = Self::resolve_config_path(cli) {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                let file_value: toml::Value =
                    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
                value = merge_toml_values(value, file_value);
            }
        }

        value = merge_toml_values(value, Self::env_overlay());

        let mut config: JudgeConfig = value
            .try_into()
            .context("assembling JudgeConfig from merged layers")?;

        if let Some(n) = cli.worker_pool_size {
            config.worker_pool_size = n;
        }
        if let Some(n) = cli.long_batch_pool_size {
            config.long_batch_pool_size = n;
        }
        if let Some(ref p) = cli.scratch_root {
            config.scratch_root = p.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(cli: &CliOverrides) -> Option<PathBuf> {
        if let Some(ref p) = cli.config_path {
            return Some(p.clone());
        }
        if let Ok(p) = std::env::var("JUDGE_CONFIG") {
            return Some(PathBuf::from(p));
        }
        directories::ProjectDirs::from("", "", "judge")
            .map(|dirs| dirs.config_dir().join("judge.toml"))
    }

    /// Builds a TOML overlay from `JUDGE_*` environment variables. Only the
    /// top-level scalar fields are exposed this way; per-language tuning
    /// stays in the config file.
    fn env_overlay() -> toml::Value {
        let mut table = toml::map::Map::new();

        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}WORKER_POOL_SIZE")) {
            if let Ok(n) = v.parse::<i64>() {
                table.insert("worker_pool_size".into(), toml::Value::Integer(n));
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}LONG_BATCH_POOL_SIZE")) {
            if let Ok(n) = v.parse::<i64>() {
                table.insert("long_batch_pool_size".into(), toml::Value::Integer(n));
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}SCRATCH_ROOT")) {
            table.insert("scratch_root".into(), toml::Value::String(v));
        }

        toml::Value::Table(table)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_pool_size < 1 {
            bail!("worker_pool_size must be >= 1");
        }
        if self.long_batch_pool_size < 1 {
            bail!("long_batch_pool_size must be >= 1");
        }
        for (name, defaults) in &self.languages {
            if defaults.timeout_secs <= 0.0 {
                bail!("languages.{name}.timeout_secs must be > 0");
            }
            if defaults.memory_mb == 0 {
                bail!("languages.{name}.memory_mb must be > 0");
            }
        }
        match self.scratch_root.parent() {
            Some(parent) if parent.as_os_str().is_empty() || parent.exists() => {}
            Some(parent) => bail!("scratch_root's parent {} does not exist", parent.display()),
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_load_without_a_config_file() {
        std::env::remove_var("JUDGE_CONFIG");
        std::env::remove_var("JUDGE_WORKER_POOL_SIZE");
        std::env::remove_var("JUDGE_LONG_BATCH_POOL_SIZE");
        std::env::remove_var("JUDGE_SCRATCH_ROOT");

        let cli = CliOverrides {
            config_path: Some(PathBuf::from("/nonexistent/judge.toml")),
            ..Default::default()
        };
        let config = JudgeConfig::load(&cli).unwrap();
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.long_batch_pool_size, 2);
        assert_eq!(config.languages["python"].timeout_secs, 5.0);
        assert_eq!(config.languages["lean"].timeout_secs, 600.0);
    }

    #[test]
    #[serial]
    fn env_override_beats_file_defaults() {
        std::env::set_var("JUDGE_WORKER_POOL_SIZE", "9");
        let cli = CliOverrides {
            config_path: Some(PathBuf::from("/nonexistent/judge.toml")),
            ..Default::default()
        };
        let config = JudgeConfig::load(&cli).unwrap();
        assert_eq!(config.worker_pool_size, 9);
        std::env::remove_var("JUDGE_WORKER_POOL_SIZE");
    }

    #[test]
    #[serial]
    fn cli_override_beats_env_override() {
        std::env::set_var("JUDGE_WORKER_POOL_SIZE", "9");
        let cli = CliOverrides {
            worker_pool_size: Some(16),
            config_path: Some(PathBuf::from("/nonexistent/judge.toml")),
            ..Default::default()
        };
        let config = JudgeConfig::load(&cli).unwrap();
        assert_eq!(config.worker_pool_size, 16);
        std::env::remove_var("JUDGE_WORKER_POOL_SIZE");
    }

    #[test]
    #[serial]
    fn file_overlay_merges_one_language_without_dropping_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge.toml");
        std::fs::write(
            &path,
            r#"
            [languages.python]
            timeout_secs = 20.0
            "#,
        )
        .unwrap();
        std::env::remove_var("JUDGE_WORKER_POOL_SIZE");
        let cli = CliOverrides {
            config_path: Some(path),
            ..Default::default()
        };
        let config = JudgeConfig::load(&cli).unwrap();
        assert_eq!(config.languages["python"].timeout_secs, 20.0);
        assert_eq!(config.languages["python"].memory_mb, 256);
        assert_eq!(config.languages["cpp"].timeout_secs, 5.0);
    }

    #[test]
    #[serial]
    fn zero_worker_pool_size_is_rejected() {
        let cli = CliOverrides {
            worker_pool_size: Some(0),
            config_path: Some(PathBuf::from("/nonexistent/judge.toml")),
            ..Default::default()
        };
        assert!(JudgeConfig::load(&cli).is_err());
    }
}
