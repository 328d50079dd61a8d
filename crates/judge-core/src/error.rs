#[derive(thiserror::Error, Debug)]
pub enum JudgeError {
    #[error("Failed to create scratch directory: {0}")]
    ScratchDirError(String),

    #[error("Failed to spawn submission process: {0}")]
    SpawnError(String),

    #[error("{language} driver error: {message}")]
    DriverError { language: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Bootstrap step {step_index} for tool '{tool}' failed with exit code {exit_code}")]
    BootstrapStepFailed {
        tool: String,
        step_index: usize,
        exit_code: i32,
    },
}
