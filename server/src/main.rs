use clap::Parser;
use log::{error, info};
use server::network::{run_status_ticker, Server};
use server::snapshot::GameSnapshot;
use server::state::GameState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Match name
    #[arg(short, long, default_value = "blocksiege")]
    name: String,

    /// Cube edge length (the cube holds size^3 blocks)
    #[arg(short, long, default_value = "5")]
    size: u32,

    /// Hit points per block
    #[arg(short, long, default_value = "10")]
    block_hp: i64,

    /// Time limit in seconds
    #[arg(short, long, default_value = "600")]
    time_limit: u64,

    /// Seconds between win-condition evaluations
    #[arg(long, default_value = "10")]
    status_interval: u64,

    /// File the final scores are written to
    #[arg(long, default_value = "player_scores.txt")]
    score_file: PathBuf,

    /// Resume from a previously saved snapshot instead of a fresh cube
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Write a snapshot of the match state here on shutdown
    #[arg(long)]
    snapshot_file: Option<PathBuf>,
}

/// Parses command-line arguments, builds (or restores) the match state, then
/// runs the connection listener and the periodic status evaluator.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let state = match &args.restore {
        Some(path) => {
            info!("Restoring match from {}", path.display());
            // Activation rebuilds every lock before any traffic is accepted
            Arc::new(GameSnapshot::load_from(path)?.activate(args.score_file.clone()))
        }
        None => Arc::new(GameState::new(
            &args.name,
            args.size,
            args.block_hp,
            Duration::from_secs(args.time_limit),
            args.score_file.clone(),
        )),
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, Arc::clone(&state)).await?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server loop failed: {}", e);
        }
    });

    let ticker_handle = tokio::spawn(run_status_ticker(
        Arc::clone(&state),
        Duration::from_secs(args.status_interval),
    ));

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Listener task panicked: {}", e);
                state.mark_crashed();
            }
        }
        result = ticker_handle => {
            match result {
                Ok(()) => info!("Match finished with verdict {}", state.verdict()),
                Err(e) => {
                    error!("Status task panicked: {}", e);
                    state.mark_crashed();
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if let Some(path) = &args.snapshot_file {
        GameSnapshot::capture(&state).save_to(path)?;
    }

    Ok(())
}
