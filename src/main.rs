//! libra - an HTTP load-balancing reverse proxy
//!
//! Usage:
//!     libra --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use libra::config::{Config, ConfigWatcher, load_config};
use libra::frontend::FrontendListener;
use libra::metrics::{MetricsCollector, MetricsServer};
use libra::proxy::{Dispatcher, HttpForwarder};
use libra::state::AppState;
use libra::util::init_logging;

/// An HTTP reverse proxy with pluggable server-selection policies.
#[derive(Parser, Debug)]
#[command(name = "libra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.listener.listen);
        println!("  Policy: {}", config.load_balancing.policy);
        println!("  Servers: {}", config.load_balancing.servers.len());
        for server in &config.load_balancing.servers {
            println!("    - {}", server);
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        listen = %config.listener.listen,
        policy = %config.load_balancing.policy,
        servers = config.load_balancing.servers.len(),
        "libra starting"
    );

    run(cli.config, config)
}

/// Run the proxy with the given configuration.
fn run(config_path: PathBuf, config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config_path, config).await })
}

async fn run_async(config_path: PathBuf, config: Config) -> Result<()> {
    let listen = config.listener.listen;
    let metrics_config = config.global.metrics.clone();

    let state = AppState::new(config);
    let metrics = MetricsCollector::new();

    let mut handles = Vec::new();

    if metrics_config.enabled {
        let server = MetricsServer::bind(
            metrics_config.address,
            metrics_config.path.clone(),
            metrics.clone(),
        )
        .await
        .with_context(|| {
            format!(
                "failed to bind metrics server on {}",
                metrics_config.address
            )
        })?;
        let shutdown_rx = state.shutdown().subscribe();
        handles.push(tokio::spawn(async move {
            server.run(shutdown_rx).await;
        }));
    }

    let watcher = {
        let state = state.clone();
        let metrics = metrics.clone();
        ConfigWatcher::new(
            config_path,
            Box::new(move |new_config| {
                state.apply(new_config);
                metrics.config_reloaded();
            }),
        )
    };
    let shutdown_rx = state.shutdown().subscribe();
    handles.push(tokio::spawn(async move {
        watcher.run(shutdown_rx).await;
    }));

    let dispatcher = Arc::new(Dispatcher::new(
        state.clone(),
        HttpForwarder::default(),
        metrics,
    ));
    let listener = FrontendListener::bind(listen, dispatcher)
        .await
        .with_context(|| format!("failed to bind listener on {}", listen))?;
    let shutdown_rx = state.shutdown().subscribe();
    handles.push(tokio::spawn(async move {
        listener.run(shutdown_rx).await;
    }));

    info!("libra is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    state.trigger_shutdown();

    for handle in handles {
        let _ = handle.await;
    }

    info!("libra shut down complete");
    Ok(())
}
