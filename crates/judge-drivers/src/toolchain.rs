//! Toolchain binary paths, resolved from environment overrides with sane
//! defaults — the same `JUDGE_*` override convention `judge-config` uses
//! for its own layer, scoped here to binaries rather than scheduling knobs.

#[derive(Clone, Debug)]
pub struct Toolchain {
    pub cpp_compiler: String,
    pub cpp_flags: Vec<String>,
    pub python_bin: String,
    pub lean_repl: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cpp_compiler: env_or("JUDGE_CPP_COMPILER", "g++"),
            cpp_flags: vec!["-O2".into(), "-std=c++17".into()],
            python_bin: env_or("JUDGE_PYTHON_BIN", "python3"),
            lean_repl: env_or("JUDGE_LEAN_REPL", "repl"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env_overrides() {
        std::env::remove_var("JUDGE_CPP_COMPILER");
        std::env::remove_var("JUDGE_PYTHON_BIN");
        std::env::remove_var("JUDGE_LEAN_REPL");
        let t = Toolchain::default();
        assert_eq!(t.cpp_compiler, "g++");
        assert_eq!(t.python_bin, "python3");
        assert_eq!(t.lean_repl, "repl");
    }
}
