mod cli;
mod http;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use judge_config::{CliOverrides, JudgeConfig};
use judge_core::{Submission, VerdictForm};
use judge_drivers::Toolchain;
use judge_pool::JudgeService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let overrides = CliOverrides {
        worker_pool_size: cli.workers,
        long_batch_pool_size: cli.long_batch_workers,
        scratch_root: None,
        config_path: cli.config.clone(),
    };

    match cli.command {
        Commands::Serve { bind } => run_serve(&overrides, &bind).await,
        Commands::Bootstrap { file } => run_bootstrap(&overrides, &file),
        Commands::Exec { path, run } => run_exec(&overrides, path.as_deref(), run).await,
        Commands::Status { url } => run_status(&url).await,
    }
}

async fn run_serve(overrides: &CliOverrides, bind: &str) -> Result<()> {
    let config = Arc::new(JudgeConfig::load(overrides).context("loading configuration")?);
    if config.bootstrap_config_path.exists() {
        judge_bootstrap::bootstrap_from_yaml(&config.bootstrap_config_path, &config.bootstrap_state_path)
            .context("running startup bootstrap")?;
    }

    let service = Arc::new(JudgeService::start(Arc::clone(&config), Arc::new(Toolchain::default())));
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(bind, "judged listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight work");
}

fn run_bootstrap(overrides: &CliOverrides, file: &std::path::Path) -> Result<()> {
    let config = JudgeConfig::load(overrides).context("loading configuration")?;
    judge_bootstrap::bootstrap_from_yaml(file, &config.bootstrap_state_path)
}

async fn run_exec(overrides: &CliOverrides, path: Option<&std::path::Path>, run_form: bool) -> Result<()> {
    let config = Arc::new(JudgeConfig::load(overrides).context("loading configuration")?);
    let raw = match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("reading submission from stdin")?,
    };
    let submission: Submission = serde_json::from_str(&raw).context("parsing submission JSON")?;

    let service = JudgeService::start(config, Arc::new(Toolchain::default()));
    let form = if run_form { VerdictForm::Run } else { VerdictForm::Judge };
    let verdict = service.judge_one(submission, form).await;

    println!("{}", serde_json::to_string(&verdict).context("serializing verdict")?);
    Ok(())
}

async fn run_status(url: &str) -> Result<()> {
    let endpoint = format!("{}/status", url.trim_end_matches('/'));
    let response = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("requesting {endpoint}"))?
        .error_for_status()
        .context("server returned an error status")?;
    let status: judge_core::StatusResponse = response.json().await.context("parsing status response")?;
    println!("{}", serde_json::to_string(&status)?);
    Ok(())
}
