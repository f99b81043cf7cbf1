use crate::game::{random_placement, AutoPlayer};
use crate::network::{ClientError, PlayerClient};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameReply, PlayerMessage, FLEET_SIZE};
use std::time::Duration;

/// Tunables for an unattended player
#[derive(Debug, Clone)]
pub struct PlayOptions {
    /// Pause between consecutive shots
    pub shot_delay: Duration,
    /// Seed for placement and targeting; entropy when `None`
    pub seed: Option<u64>,
    /// Explicit placement instead of a random one
    pub placement: Option<Vec<i64>>,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            shot_delay: Duration::from_millis(100),
            seed: None,
            placement: None,
        }
    }
}

/// How an unattended match ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEnd {
    GameOver { winner: String, shots: u32 },
    Reset { shots: u32 },
}

/// Registers, waits for an opponent and fires until the match ends
pub async fn play_match(
    client: &mut PlayerClient,
    options: &PlayOptions,
) -> Result<MatchEnd, ClientError> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let placement = options
        .placement
        .clone()
        .unwrap_or_else(|| random_placement(&mut rng));
    info!("{} placing fleet at {:?}", client.name(), placement);
    client.register(&placement).await?;

    let mut player = AutoPlayer::new();
    let mut shots = 0u32;
    let mut started = false;

    loop {
        match client.next_message().await? {
            PlayerMessage::Msg { body } => info!("Server says: {}", body),

            PlayerMessage::Init { body } => {
                info!("Seats assigned: {:?}", body);
                if !started {
                    started = true;
                    fire(client, &player, &mut rng, &mut shots).await?;
                }
            }

            PlayerMessage::Game {
                body: GameReply::Grid(grid),
                ..
            } => {
                player.observe(grid);
                debug!("{} has {} hits after {} shots", client.name(), player.hits(), shots);
                if player.hits() < FLEET_SIZE {
                    tokio::time::sleep(options.shot_delay).await;
                    fire(client, &player, &mut rng, &mut shots).await?;
                }
            }

            PlayerMessage::Game {
                body: GameReply::Round(round),
                names,
            } => info!("Round {} with seats {:?}", round, names),

            PlayerMessage::Error { body } => {
                warn!("Server rejected request: {}", body);
                if started && player.hits() < FLEET_SIZE {
                    tokio::time::sleep(options.shot_delay).await;
                    fire(client, &player, &mut rng, &mut shots).await?;
                }
            }

            PlayerMessage::GameOver { body } => {
                info!("Game over, {} wins", body);
                return Ok(MatchEnd::GameOver {
                    winner: body,
                    shots,
                });
            }

            PlayerMessage::Reset => {
                info!("Match was reset");
                return Ok(MatchEnd::Reset { shots });
            }
        }
    }
}

async fn fire(
    client: &mut PlayerClient,
    player: &AutoPlayer,
    rng: &mut StdRng,
    shots: &mut u32,
) -> Result<(), ClientError> {
    let Some(target) = player.next_target(rng) else {
        return Ok(());
    };
    *shots += 1;
    debug!("{} fires at {}", client.name(), target);
    client.attack(target).await
}
