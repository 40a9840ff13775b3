//! TrialDaemon - experiment state coordinator
//!
//! CLI entry point for serving the coordination endpoint and inspecting it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use trialdaemon::cli::{Cli, Command, OutputFormat};
use trialdaemon::config::Config;
use trialdaemon::control::{FileSignalChannel, SignalChannel};
use trialdaemon::domain::ExperimentState;
use trialdaemon::orchestrator::CommandLauncher;
use trialdaemon::server;
use trialdaemon::state::{StateManager, StatusReport};

fn parse_level(s: &str) -> tracing::Level {
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = cli_log_level
        .or(config_log_level)
        .map(parse_level)
        .unwrap_or(tracing::Level::INFO);

    let (writer, ansi) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            (BoxMakeWriter::new(file), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let log_file = match &cli.command {
        Some(Command::Serve { log_file, .. }) => log_file.clone(),
        _ => None,
    };
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        log_file.as_deref(),
    )
    .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Serve {
            host,
            port,
            control_file,
            log_file: _,
        }) => cmd_serve(config, host, port, control_file).await,
        Some(Command::Status { url, format }) => cmd_status(&config, url, format).await,
        Some(Command::Signal { control_file }) => cmd_signal(&config, control_file),
        Some(Command::Config) => cmd_config(&config),
        None => cmd_serve(config, None, None, None).await,
    }
}

/// Run the coordination server until interrupted
async fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    control_file: Option<PathBuf>,
) -> Result<()> {
    debug!(?host, ?port, ?control_file, "cmd_serve: called");
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(path) = control_file {
        config.control.path = path;
    }
    config.validate().context("Invalid configuration")?;

    let addr = config.server.socket_addr()?;
    let channel = Arc::new(FileSignalChannel::new(config.control.path.clone()));
    let launcher = Arc::new(CommandLauncher::new(config.workers.commands.clone()));
    let manager = StateManager::spawn(launcher, channel, config.shutdown.grace_period());
    info!(control = %config.control.path.display(), "Control signal file ready");

    let (listener, local) = server::bind(addr).await?;
    println!("TrialDaemon listening on http://{}", local);

    server::serve(listener, manager.clone(), shutdown_signal()).await?;

    info!("Stopping workers...");
    manager.shutdown().await.context("Failed to stop state manager")?;
    println!("TrialDaemon stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => warn!("SIGINT received"),
                    _ = sigterm.recv() => warn!("SIGTERM received"),
                }
                return;
            }
            _ => warn!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Query a running server for its status
async fn cmd_status(config: &Config, url: Option<String>, format: OutputFormat) -> Result<()> {
    debug!(?url, ?format, "cmd_status: called");
    let base = url.unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
    let endpoint = format!("{}/api/status", base.trim_end_matches('/'));

    let response = reqwest::get(&endpoint)
        .await
        .context(format!("Failed to reach TrialDaemon at {}", base))?
        .error_for_status()
        .context("TrialDaemon returned an error")?;
    let report: StatusReport = response.json().await.context("Failed to parse status response")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_status(&report),
    }
    Ok(())
}

fn print_status(report: &StatusReport) {
    let state = match report.store.state {
        ExperimentState::Active => "active".green().bold(),
        ExperimentState::Idle => "idle".yellow().bold(),
    };

    println!("TrialDaemon Status");
    println!("------------------");
    println!("State: {}", state);
    match report.store.trial {
        Some(trial) => println!("Trial: {}", trial),
        None => println!("Trial: {}", "none".dimmed()),
    }
    if let Some(location) = &report.store.location {
        println!("Location: {}", location);
    }
    println!("Submissions: {}", report.store.submissions);
    println!("Control file: {}", report.control);

    println!();
    match &report.workers.current {
        Some(generation) => {
            println!("Generation {} (trial {})", generation.id, generation.trial);
            if generation.workers.is_empty() {
                println!("  {}", "no live workers".dimmed());
            }
            for worker in &generation.workers {
                let pid = worker.pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
                let label = if worker.stopping { "stopping".yellow() } else { "running".green() };
                println!("  slot {} pid {} {}", worker.slot, pid, label);
            }
        }
        None => println!("Generation: {}", "none".dimmed()),
    }

    let retiring: usize = report.workers.retiring.iter().map(|g| g.workers.len()).sum();
    if retiring > 0 {
        println!("Retiring workers: {}", retiring.to_string().yellow());
    }
}

/// Print the control token workers currently see
fn cmd_signal(config: &Config, control_file: Option<PathBuf>) -> Result<()> {
    debug!(?control_file, "cmd_signal: called");
    let path = control_file.unwrap_or_else(|| config.control.path.clone());
    let channel = FileSignalChannel::new(&path);
    let signal = channel.read_signal().context("Failed to read control signal")?;
    println!("{}", signal);
    Ok(())
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
