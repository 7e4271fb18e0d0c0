//! Uncertainty Session Server Binary
//!
//! Starts the session shell HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with default settings (config.toml, config.local.toml, SKG_* env)
//! cargo run --bin skgstat-uncertainty-server
//!
//! # Explicit config file and address
//! cargo run --bin skgstat-uncertainty-server -- --config prod.toml --host 0.0.0.0 --port 8501
//! ```
//!
//! ## Tracing
//!
//! Logging follows `[logging]` in the configuration. The environment wins
//! where set: `SKG_TRACE=0` disables logging, `SKG_TRACE_LEVEL`,
//! `SKG_TRACE_JSON` and `SKG_TRACE_FILE` override level, format and target.

use anyhow::Context;
use clap::{Parser, ValueHint};
use skgstat_uncertainty::config::{Layout, LoggingConfig};
use skgstat_uncertainty::protocol::rest;
use skgstat_uncertainty::protocol::Handler;
use skgstat_uncertainty::Config;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "skgstat-uncertainty-server",
    version,
    about = "Session and data-store shell of the variogram uncertainty application"
)]
struct Cli {
    /// Configuration file (defaults to config.toml + config.local.toml)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    host: Option<String>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding seed files and private stores
    #[arg(long, value_hint = ValueHint::DirPath)]
    data_dir: Option<PathBuf>,

    /// Page layout: wide or centered
    #[arg(long)]
    layout: Option<Layout>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    println!("Uncertainty by hydrocode");
    println!("========================");
    println!();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|_| {
            println!("Using default configuration");
            Config::default()
        }),
    };

    init_tracing(&config.logging);

    // Override from command line
    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(layout) = cli.layout {
        config.http.layout = layout;
    }

    let http_config = config.http.clone();
    let data_dir = config.storage.data_dir.clone();

    let handler = Arc::new(Handler::from_config(config).context("failed to initialize")?);

    println!("Data directory: {}", data_dir.display());
    println!("Base datasets:  {}", handler.catalog().len());
    println!();
    println!("HTTP Server");
    println!("-----------");
    println!("Address: {}:{}", http_config.host, http_config.port);
    println!();

    rest::start_http_server(handler, &http_config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    if env::var("SKG_TRACE").is_ok_and(|v| v == "0") {
        return;
    }

    // Use SKG_TRACE_JSON env var if set, otherwise fall back to config.logging.format
    let json = env::var("SKG_TRACE_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    // Use SKG_TRACE_LEVEL env var if set, otherwise fall back to config.logging.level
    let level = env::var("SKG_TRACE_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let log_path = env::var("SKG_TRACE_FILE")
        .ok()
        .map(PathBuf::from)
        .or_else(|| logging_config.file.clone());

    let (non_blocking, guard) = match log_path {
        Some(path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open log file '{}': {e}", path.display());
                    return;
                }
            };
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let _ = TRACE_GUARD.set(guard);

    let filter = || {
        tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(non_blocking.clone())
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
