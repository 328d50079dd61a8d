use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "judged", version, about = "Multi-language code-judging service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a judge.toml config file (overrides JUDGE_CONFIG / default dirs)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the short-batch worker pool size
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Override the long-batch worker pool size
    #[arg(long, global = true)]
    pub long_batch_workers: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Run the tool bootstrap against a YAML document
    Bootstrap {
        /// Path to the bootstrap YAML file
        #[arg(long)]
        file: PathBuf,
    },
    /// Judge a single submission read from a JSON file (or stdin if omitted)
    /// and print the verdict as JSON to stdout
    Exec {
        /// Path to a JSON-encoded Submission; reads stdin if omitted
        path: Option<PathBuf>,

        /// Use the `run` response form (includes stdout on timeout)
        #[arg(long)]
        run: bool,
    },
    /// Print `{queue, num_workers}` for a running server
    Status {
        /// Base URL of the running server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
}
