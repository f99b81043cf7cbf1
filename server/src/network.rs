//! Player-facing command channel: accept loop, per-connection workers and dispatch

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::relay::RelayClient;
use crate::session::{GameSession, SessionError};
use log::{debug, error, info, warn};
use shared::framing::{read_frame, write_json};
use shared::{decode_command, Command, GameReply, PlayerMessage};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Greeting pushed to every accepted player connection
pub const WELCOME_TEXT: &str = "connected to grid battle server";

/// Accepts player connections and applies their commands to the session
pub struct PlayerServer {
    session: Arc<GameSession>,
    clients: Arc<RwLock<ClientManager>>,
    relay: RelayClient,
    keep_running: Arc<AtomicBool>,
    accept_poll: Duration,
    identify_timeout: Duration,
}

impl PlayerServer {
    pub fn new(
        session: Arc<GameSession>,
        relay: RelayClient,
        keep_running: Arc<AtomicBool>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            session,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            relay,
            keep_running,
            accept_poll: config.accept_poll,
            identify_timeout: config.identify_timeout,
        }
    }

    /// Runs the accept loop, the reset watcher and the timeout checker until
    /// the stop flag is cleared
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        self.spawn_reset_watcher();
        self.spawn_timeout_checker();
        self.accept_loop(listener).await;
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Player channel listening on {}", addr),
            Err(e) => warn!("Player channel listening on unknown address: {}", e),
        }

        while self.keep_running.load(Ordering::SeqCst) {
            match tokio::time::timeout(self.accept_poll, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Ok(Err(e)) => {
                    error!("Error accepting player connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(_) => continue,
            }
        }

        info!("Player channel stopped");
    }

    /// Spawns task that relays viewer-initiated resets to the players
    ///
    /// Wakes on every reset request, and once per `accept_poll` to notice the
    /// stop flag.
    fn spawn_reset_watcher(self: &Arc<Self>) {
        let server = Arc::clone(self);

        tokio::spawn(async move {
            while server.keep_running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = server.session.reset_requested() => {}
                    _ = tokio::time::sleep(server.accept_poll) => {}
                }
                server.relay_viewer_reset().await;
            }
        });
    }

    /// Tells the players of the match a viewer cleared that it is gone
    ///
    /// Players who registered for the next match in the meantime are left
    /// alone. Returns the number of players notified.
    async fn relay_viewer_reset(&self) -> usize {
        let mut clients = self.clients.write().await;
        let Some(epoch) = self.session.take_reset_request() else {
            return 0;
        };

        let notified = clients.reset_players_before(epoch);
        info!(
            "Viewer-initiated reset to epoch {} sent to {} players",
            epoch, notified
        );
        notified
    }

    /// Spawns task that closes connections which never identify themselves
    fn spawn_timeout_checker(self: &Arc<Self>) {
        let server = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = interval(server.accept_poll);

            while server.keep_running.load(Ordering::SeqCst) {
                interval.tick().await;

                let timed_out = server
                    .clients
                    .write()
                    .await
                    .check_timeouts(server.identify_timeout);
                if !timed_out.is_empty() {
                    debug!("Evicted anonymous connections {:?}", timed_out);
                }
            }
        });
    }

    /// Worker for one player connection
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_player_writer(write_half, rx, addr);

        let added = self.clients.write().await.add_client(addr, tx.clone());
        let Some((client_id, mut evicted)) = added else {
            warn!("Rejecting player connection from {}: server full", addr);
            let _ = tx.send(PlayerMessage::Error {
                body: "server full".to_string(),
            });
            return;
        };

        let _ = tx.send(PlayerMessage::Msg {
            body: WELCOME_TEXT.to_string(),
        });

        let mut reader = BufReader::new(read_half);
        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut reader) => frame,
                _ = &mut evicted => {
                    debug!("Closing evicted player connection {}", addr);
                    break;
                }
            };

            let payload = match frame {
                Ok(payload) => payload,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!("Player connection {} read failed: {}", addr, e);
                    break;
                }
            };

            let command = match decode_command(&payload) {
                Ok(command) => command,
                Err(e) => {
                    debug!("Discarding message from {}: {}", addr, e);
                    continue;
                }
            };

            let actor = self
                .clients
                .write()
                .await
                .bind_identity(client_id, command.author());
            debug!("Received {:?} from {} at {}", command, actor, addr);

            self.dispatch(client_id, &actor, command).await;
        }

        self.clients.write().await.remove_client(&client_id);
    }

    /// Applies one command and sends its reply and any follow-up notices
    async fn dispatch(&self, client_id: u32, actor: &str, command: Command) {
        let state_changed = match command {
            Command::Register { cells, .. } => {
                // Admission and membership change together, so a pending
                // viewer reset cannot land on a player of the next match
                let mut clients = self.clients.write().await;
                match self.session.register(actor, &cells) {
                    Ok(outcome) => {
                        info!("Player {} initialized with cells {:?}", actor, cells);
                        clients.mark_joined(client_id, actor, outcome.epoch);
                        if outcome.forced_reset {
                            clients.reset_players_before(outcome.epoch);
                        }
                        if let Some(seats) = outcome.seats {
                            let announcement = PlayerMessage::Init {
                                body: seats.by_name(),
                            };
                            clients.broadcast(&announcement);
                        }
                        true
                    }
                    Err(e) => {
                        drop(clients);
                        self.reject(client_id, actor, e).await;
                        false
                    }
                }
            }

            Command::QueryRound { .. } => {
                let (round, names) = self.session.round_info();
                let reply = PlayerMessage::Game {
                    body: GameReply::Round(round),
                    names,
                };
                self.reply(client_id, reply).await;
                false
            }

            Command::Attack { cell, .. } => match self.session.attack(actor, cell) {
                Ok(outcome) => {
                    info!(
                        "Player {} attacked {}: {:?} (round {})",
                        actor, cell, outcome.mark, outcome.round
                    );
                    let reply = PlayerMessage::Game {
                        body: GameReply::Grid(outcome.grid),
                        names: None,
                    };
                    self.reply(client_id, reply).await;
                    if let Some(winner) = outcome.winner {
                        self.announce_winner(winner).await;
                    }
                    true
                }
                Err(e) => {
                    self.reject(client_id, actor, e).await;
                    false
                }
            },

            Command::Reset { .. } => {
                info!("Player {} requested a reset", actor);
                let mut clients = self.clients.write().await;
                let epoch = self.session.reset();
                clients.reset_players_before(epoch);
                true
            }
        };

        if state_changed {
            self.trigger_broadcast();
        }
    }

    async fn reply(&self, client_id: u32, message: PlayerMessage) {
        if !self.clients.read().await.send_to(client_id, message) {
            debug!("Reply to connection {} dropped: writer closed", client_id);
        }
    }

    async fn reject(&self, client_id: u32, actor: &str, error: SessionError) {
        info!("Rejected request from {}: {}", actor, error);
        let message = PlayerMessage::Error {
            body: error.to_string(),
        };
        self.reply(client_id, message).await;
    }

    /// Sends `game_over` to every known player
    async fn announce_winner(&self, winner: String) {
        let notice = PlayerMessage::GameOver { body: winner };
        let delivered = self.clients.read().await.broadcast(&notice);
        debug!("game_over delivered to {} players", delivered);
    }

    /// Fires the relay on its own task so the player path never waits on it
    fn trigger_broadcast(&self) {
        let relay = self.relay.clone();
        tokio::spawn(async move {
            match relay.trigger().await {
                Ok(snapshot) => debug!(
                    "Viewer channel broadcast round {} snapshot",
                    snapshot.game_round
                ),
                Err(e) => warn!("Failed to trigger viewer broadcast: {}", e),
            }
        });
    }
}

/// Drains a connection's outbound queue onto its socket
///
/// Replies and pushed notices share the queue, so a connection sees them in
/// the order they were produced.
fn spawn_player_writer(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<PlayerMessage>,
    addr: SocketAddr,
) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_json(&mut writer, &message).await {
                warn!("Failed to send to player {}: {}", addr, e);
                break;
            }
        }
    });
}
