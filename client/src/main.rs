use clap::{Parser, Subcommand};
use client::{play_match, MatchEnd, PlayOptions, PlayerClient, ViewerClient};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grid battle player and viewer", long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Join as a player and fire automatically
    Play {
        /// Player channel address
        #[arg(short = 's', long, default_value = "127.0.0.1:1001")]
        server: String,

        /// Name to register under
        #[arg(short, long)]
        name: String,

        /// Delay between shots in milliseconds
        #[arg(short, long, default_value = "100")]
        delay: u64,

        /// Seed for placement and targeting
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Subscribe to match snapshots
    Watch {
        /// Viewer channel address
        #[arg(short = 's', long, default_value = "127.0.0.1:1000")]
        server: String,

        /// Reset the match before watching
        #[arg(long)]
        reset: bool,

        /// Print a single snapshot and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    match Args::parse().mode {
        Mode::Play {
            server,
            name,
            delay,
            seed,
        } => {
            info!("Joining {} as {}", server, name);
            let mut player = PlayerClient::connect(&server, &name).await?;
            let options = PlayOptions {
                shot_delay: Duration::from_millis(delay),
                seed,
                placement: None,
            };

            match play_match(&mut player, &options).await? {
                MatchEnd::GameOver { winner, shots } => {
                    println!("{} won; {} fired {} shots", winner, name, shots)
                }
                MatchEnd::Reset { shots } => {
                    println!("Match reset after {} shots", shots)
                }
            }
        }

        Mode::Watch {
            server,
            reset,
            once,
        } => {
            info!("Watching {}", server);
            let mut viewer = ViewerClient::connect(&server).await?;
            if reset {
                viewer.request_reset().await?;
            } else {
                viewer.request_broadcast().await?;
            }

            loop {
                let snapshot = viewer.next_snapshot().await?;
                println!("{}", serde_json::to_string(&snapshot)?);
                if once {
                    break;
                }
            }
        }
    }

    Ok(())
}
