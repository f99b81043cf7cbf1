//! Viewer-facing broadcast channel
//!
//! Viewers are anonymous WebSocket subscribers. Each connection is greeted
//! with a text frame, then gets a reader loop for the two control commands
//! and a writer task that drains its snapshot queue. A `broadcast` command
//! computes one snapshot and queues it for every open viewer; viewers whose
//! writer has died are pruned during the fan-out.
//!
//! Snapshots are taken while the registry lock is held, so viewers receive
//! them in the order the session produced them.

use crate::session::GameSession;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Snapshot, ViewerCommand, VIEWER_GREETING};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ViewerSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// Open viewer connections keyed by a server-assigned id
#[derive(Default)]
pub struct ViewerRegistry {
    viewers: HashMap<u32, (SocketAddr, mpsc::UnboundedSender<Snapshot>)>,
    next_viewer_id: u32,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a viewer's snapshot queue and returns its id
    pub fn add(&mut self, addr: SocketAddr, sender: mpsc::UnboundedSender<Snapshot>) -> u32 {
        self.next_viewer_id += 1;
        let id = self.next_viewer_id;
        self.viewers.insert(id, (addr, sender));
        id
    }

    /// Forgets a viewer; returns false if it was already pruned
    pub fn remove(&mut self, id: u32) -> bool {
        self.viewers.remove(&id).is_some()
    }

    /// Queues `snapshot` for every viewer, dropping those that can no longer receive
    ///
    /// Returns the number of viewers that accepted it.
    pub fn broadcast(&mut self, snapshot: &Snapshot) -> usize {
        let mut dead = Vec::new();
        for (id, (addr, sender)) in &self.viewers {
            if sender.send(snapshot.clone()).is_err() {
                warn!("Pruning viewer {} at {}", id, addr);
                dead.push(*id);
            }
        }
        for id in dead {
            self.viewers.remove(&id);
        }
        self.viewers.len()
    }

    /// Number of registered viewers
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

/// Accepts viewer connections and serves snapshot broadcasts
pub struct ViewerServer {
    session: Arc<GameSession>,
    viewers: Arc<RwLock<ViewerRegistry>>,
    keep_running: Arc<AtomicBool>,
    accept_poll: Duration,
}

impl ViewerServer {
    pub fn new(
        session: Arc<GameSession>,
        keep_running: Arc<AtomicBool>,
        accept_poll: Duration,
    ) -> Self {
        Self {
            session,
            viewers: Arc::new(RwLock::new(ViewerRegistry::new())),
            keep_running,
            accept_poll,
        }
    }

    /// Number of currently open viewer connections
    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Accept loop; returns once the stop flag is cleared
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Viewer channel listening on {}", addr),
            Err(e) => warn!("Viewer channel listening on unknown address: {}", e),
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
                    error!("Error accepting viewer connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(_) => continue,
            }
        }

        info!("Viewer channel stopped");
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (mut sink, mut source) = ws_stream.split();

        if let Err(e) = sink.send(Message::Text(VIEWER_GREETING.to_string())).await {
            debug!("Failed to greet viewer {}: {}", addr, e);
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_viewer_writer(sink, rx, addr);

        let viewer_id = self.viewers.write().await.add(addr, tx);
        debug!("Viewer {} connected from {}", viewer_id, addr);

        while let Some(message) = source.next().await {
            let payload = match message {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Viewer {} read failed: {}", addr, e);
                    break;
                }
            };

            match serde_json::from_slice::<ViewerCommand>(&payload) {
                Ok(command) => self.handle_command(command).await,
                Err(e) => debug!("Discarding viewer message from {}: {}", addr, e),
            }
        }

        self.viewers.write().await.remove(viewer_id);
        debug!("Viewer {} at {} disconnected", viewer_id, addr);
    }

    async fn handle_command(&self, command: ViewerCommand) {
        match command {
            ViewerCommand::Reset => {
                info!("Received reset command from viewer channel");
                self.session.request_reset();
                self.broadcast_snapshot().await;
            }
            ViewerCommand::Broadcast => {
                self.broadcast_snapshot().await;
            }
        }
    }

    /// Pushes the current snapshot to every open viewer
    ///
    /// The snapshot is taken under the registry lock, so of two concurrent
    /// broadcasts the later one always carries the later state.
    pub async fn broadcast_snapshot(&self) -> usize {
        let mut viewers = self.viewers.write().await;
        let snapshot = self.session.snapshot();
        let delivered = viewers.broadcast(&snapshot);
        debug!(
            "Broadcast round {} snapshot to {} viewers",
            snapshot.game_round, delivered
        );
        delivered
    }
}

/// Drains queued snapshots onto the socket until a write fails or the queue closes
fn spawn_viewer_writer(
    mut sink: ViewerSink,
    mut rx: mpsc::UnboundedReceiver<Snapshot>,
    addr: SocketAddr,
) {
    tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let text = match serde_json::to_string(&snapshot) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode snapshot: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Failed to send snapshot to viewer {}: {}", addr, e);
                break;
            }
        }
        let _ = sink.close().await;
    });
}
