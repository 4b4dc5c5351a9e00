// ABOUTME: CLI entry point for the memewall service.
// ABOUTME: `run` serves HTTP and Slack over one wall; `check` validates config and lists memes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memewall_core::config::Config;
use memewall_core::router::DEFAULT_PREFIX;
use memewall_core::{CommandRouter, RenderMode, TokenGate, Wall};
use memewall_serve::ServeState;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "memewall")]
#[command(about = "Drive the meme wall display from HTTP and Slack")]
#[command(version)]
struct Cli {
    /// Config file path (default: ~/.config/memewall/memewall.toml)
    #[arg(short, long, global = true, env = "MEMEWALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service
    Run {
        /// Renderer mode: production or probe
        #[arg(long, env = "MEMEWALL_MODE")]
        mode: Option<RenderMode>,
    },

    /// Validate the configuration and list available memes
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { mode } => {
            memewall_log::init_for(&[
                "memewall",
                "memewall-core",
                "memewall-serve",
                "memewall-slack",
            ]);
            run(cli.config, mode).await
        }
        Commands::Check => {
            memewall_log::init();
            check(cli.config).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::load(path).context("loading configuration")
}

async fn run(config_path: Option<PathBuf>, mode: Option<RenderMode>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(mode) = mode {
        config.wall.mode = mode;
    }

    let http_enabled = config.http.enabled;
    let slack = config.slack.clone();
    if !http_enabled && slack.is_none() {
        bail!("nothing to run: [http] is disabled and no [slack] section is configured");
    }

    let prefix = slack
        .as_ref()
        .map(|s| s.command.clone())
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    let router = Arc::new(CommandRouter::with_prefix(prefix));

    let wall = Arc::new(Wall::from_config(&config).context("opening the wall")?);
    router
        .initialize(wall.clone())
        .context("initializing command router")?;

    let renderer = wall.supervisor().command();
    info!(
        mode = ?config.wall.mode,
        program = %renderer.program(),
        image_folder = %wall.store().root().display(),
        "Meme wall ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let http = {
        let router = router.clone();
        let http_config = config.http.clone();
        let shutdown = shutdown_requested(shutdown_rx.clone());
        async move {
            if !http_enabled {
                return Ok(());
            }
            let gate = TokenGate::new(http_config.token.clone());
            if gate.is_open() {
                warn!("http.token is not set; the HTTP API accepts every request");
            }
            let state = ServeState::new(router, Arc::new(gate));
            memewall_serve::run(state, &http_config, shutdown).await
        }
    };

    let chat = {
        let router = router.clone();
        let shutdown = shutdown_requested(shutdown_rx.clone());
        async move {
            match slack {
                Some(slack) => memewall_slack::run(slack, router, shutdown).await,
                None => Ok(()),
            }
        }
    };

    let result = tokio::try_join!(http, chat);

    wall.supervisor().shutdown().await;
    info!("memewall stopped");
    result.map(|_| ())
}

async fn check(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let wall = Wall::from_config(&config).context("opening the wall")?;
    let renderer = config.renderer_command();

    println!("Configuration OK");
    println!("  Image folder: {}", wall.store().root().display());
    println!(
        "  Renderer ({:?}): {} {}",
        config.wall.mode,
        renderer.program(),
        renderer.args().join(" ")
    );
    if config.http.enabled {
        println!(
            "  HTTP: {} (/{}/meme)",
            config.http.bind, config.http.version
        );
    } else {
        println!("  HTTP: disabled");
    }
    match &config.slack {
        Some(slack) => println!("  Slack: {}", slack.command),
        None => println!("  Slack: disabled"),
    }
    println!(
        "  Power commands: {}",
        if config.admin_password().is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let artifacts = wall.store().list().await.context("listing memes")?;
    println!();
    println!("{} meme(s) available", artifacts.len());
    for artifact in artifacts {
        println!("  {}", artifact.file_name());
    }
    Ok(())
}

/// Resolves once the shutdown flag flips (or its sender is gone).
fn shutdown_requested(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
