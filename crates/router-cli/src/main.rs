//! Process-level glue around `router-core`: argument parsing, structured
//! log initialization, neighbor-file loading, and the line-oriented
//! operator loop. None of this is "the core" — it's the external-
//! collaborator surface the engine is specified to expect, kept in its own
//! binary crate so `router-core` stays a library with no process-level
//! concerns of its own.

mod config;
mod operator;

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use router_core::{Engine, Timing};
use tokio::sync::mpsc;

/// A small distance-vector overlay router.
#[derive(Parser)]
#[command(name = "router-cli")]
struct Cli {
    /// This node's own address on the overlay.
    #[arg(long)]
    addr: IpAddr,

    /// Path to the neighbor file (one address per line).
    #[arg(long, default_value = "roteadores.txt")]
    neighbors_file: PathBuf,

    /// UDP port to bind.
    #[arg(long, default_value_t = router_core::config::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let neighbors = config::load_neighbors(&cli.neighbors_file);

    let handle = match Engine::start(cli.addr, cli.port, neighbors, Timing::default()).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(%err, "failed to start routing engine");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let operator_task = tokio::spawn(operator::run(handle.operator_sender(), shutdown_tx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
        _ = shutdown_rx.recv() => {
            tracing::info!("operator requested shutdown");
        }
    }

    operator_task.abort();
    handle.shutdown().await;
    Ok(())
}
