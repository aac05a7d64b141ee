//! KGB server daemon
//!
//! Accepts authenticated commit notifications over HTTP and announces them
//! on IRC channels across one or more networks.

#![forbid(unsafe_code)]

mod admins;
mod colors;
mod config;
mod dedup;
mod fanout;
mod format;
mod irc;
mod rpc;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use irc::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use supervisor::{Outcome, Supervisor};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "kgbd")]
#[command(author, version, about = "KGB daemon - IRC commit notification bot")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Run in foreground (don't daemonize)
    #[arg(short, long)]
    foreground: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Starting KGB daemon...");

    // A corrupt config at boot is fatal; init will restart us.
    let config = config::load(&cli.config)?;
    info!(
        repositories = config.repositories.len(),
        networks = config.networks.len(),
        channels = config.channels.len(),
        "configuration loaded"
    );

    let bind = format!("{}:{}", config.rpc_addr, config.rpc_port);
    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let manager = SessionManager::new();
    manager.apply_config(&config_rx.borrow().clone());

    let router = rpc::create_router(rpc::RpcState {
        config: config_rx,
        manager: manager.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding RPC listener on {bind}"))?;
    info!(addr = %bind, "RPC listener ready");

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Stop accepting once the supervisor flips the flag.
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    let supervisor = Supervisor::new(
        cli.config.clone(),
        config_tx,
        manager.clone(),
        shutdown_tx,
    );
    let outcome = supervisor.run().await?;

    server.abort();

    match outcome {
        Outcome::Exit => {
            info!("KGB daemon stopped");
            Ok(())
        }
        Outcome::Restart => {
            let err = supervisor::exec_restart(&cli.config);
            Err(err).context("exec-restart failed")
        }
    }
}
