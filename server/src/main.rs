use clap::Parser;
use log::info;
use server::{Server, ServerConfig, TurnPolicy};
use std::net::SocketAddr;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Two-player grid battle server")]
struct Args {
    /// Interface to bind both listeners to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port of the player command channel
    #[arg(short, long, default_value_t = shared::DEFAULT_PLAYER_PORT)]
    player_port: u16,

    /// Port of the viewer broadcast channel
    #[arg(short, long, default_value_t = shared::DEFAULT_VIEWER_PORT)]
    viewer_port: u16,

    /// Viewer endpoint the relay should target (defaults to the local viewer listener)
    #[arg(long)]
    relay_addr: Option<SocketAddr>,

    /// Relay round-trip timeout in milliseconds
    #[arg(long, default_value = "2000")]
    relay_timeout_ms: u64,

    /// Seconds a player connection may stay silent before it is closed
    #[arg(long, default_value = "30")]
    identify_timeout_secs: u64,

    /// Maximum simultaneous player connections
    #[arg(long, default_value = "16")]
    max_clients: usize,

    /// Turn discipline enforced by the session
    #[arg(short, long, value_enum, default_value_t = TurnPolicy::Free)]
    turns: TurnPolicy,

    /// Seed for seat shuffling
    #[arg(long)]
    seed: Option<u64>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            player_port: args.player_port,
            viewer_port: args.viewer_port,
            relay_addr: args.relay_addr,
            relay_timeout: Duration::from_millis(args.relay_timeout_ms),
            identify_timeout: Duration::from_secs(args.identify_timeout_secs),
            max_clients: args.max_clients,
            turn_policy: args.turns,
            seed: args.seed,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!("Starting grid battle server with {:?}", config);

    let server = Server::bind(config).await?;
    info!(
        "Players connect to {}, viewers to {}",
        server.player_addr(),
        server.viewer_addr()
    );

    let handle = server.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    handle.stop().await;

    Ok(())
}
