pub mod config;
mod merge;

pub use config::{CliOverrides, JudgeConfig, LanguageDefaults};
