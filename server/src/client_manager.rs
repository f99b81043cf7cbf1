//! Player connection registry for the command channel
//!
//! Every accepted player socket gets an entry holding the sending half of its
//! outbound queue. A connection becomes a *known player* once a message with
//! an author has arrived on it; known players receive pushed notices such as
//! `init` and `game_over`.
//!
//! Entries also remember the session epoch of the match their player joined.
//! A reset notice for epoch `n` goes only to players who joined before `n`, so
//! players who already registered for the next match never see a stale
//! `reset`. Connections that never identify themselves are evicted after a
//! timeout so idle sockets cannot hold every slot.

use log::info;
use shared::PlayerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// One accepted player connection
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the server
    pub id: u32,
    /// Peer address, for logging only
    pub addr: SocketAddr,
    /// First author seen on this connection since its last reset
    pub identity: Option<String>,
    /// Epoch of the match this connection's player was admitted to
    pub joined_epoch: Option<u64>,
    /// When the socket was accepted
    pub connected_at: Instant,
    /// Whether an authored message has ever arrived on this connection
    identified: bool,
    sender: mpsc::UnboundedSender<PlayerMessage>,
    // Dropped together with the entry, which tells the reader task to stop
    _eviction: oneshot::Sender<()>,
}

impl Client {
    /// Creates the entry for a freshly accepted connection
    ///
    /// The returned receiver resolves once the entry is dropped, whether by
    /// a normal disconnect or by eviction.
    pub fn new(
        id: u32,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<PlayerMessage>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (eviction, evicted) = oneshot::channel();
        let client = Self {
            id,
            addr,
            identity: None,
            joined_epoch: None,
            connected_at: Instant::now(),
            identified: false,
            sender,
            _eviction: eviction,
        };
        (client, evicted)
    }

    /// Queues a message for this connection's writer task
    ///
    /// Returns false once the writer has shut down.
    pub fn send(&self, message: PlayerMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Checks whether the connection has stayed anonymous for longer than `timeout`
    ///
    /// Connections that have identified once are never considered timed out,
    /// even after a reset has cleared their identity.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        !self.identified && self.connected_at.elapsed() > timeout
    }
}

/// Tracks open player connections and the identities bound to them
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns the connection id and a receiver that resolves when the entry
    /// is removed, or `None` when the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<PlayerMessage>,
    ) -> Option<(u32, oneshot::Receiver<()>)> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Player connection {} opened from {}", client_id, addr);
        let (client, evicted) = Client::new(client_id, addr, sender);
        self.clients.insert(client_id, client);
        Some((client_id, evicted))
    }

    /// Removes a connection from the registry
    ///
    /// Returns true if the connection was still registered.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        match self.clients.remove(client_id) {
            Some(client) => {
                info!(
                    "Player connection {} closed ({})",
                    client.id,
                    client.identity.as_deref().unwrap_or("anonymous")
                );
                true
            }
            None => false,
        }
    }

    /// Binds `author` to the connection unless it already has an identity
    ///
    /// Returns the identity the connection acts under, which is the first
    /// author seen since the last reset. Empty authors never bind.
    pub fn bind_identity(&mut self, client_id: u32, author: &str) -> String {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return author.to_string();
        };

        match &client.identity {
            Some(identity) => identity.clone(),
            None if author.is_empty() => String::new(),
            None => {
                info!("Connection {} identified as {}", client_id, author);
                client.identity = Some(author.to_string());
                client.identified = true;
                author.to_string()
            }
        }
    }

    /// Records that the connection's player was admitted in `epoch`
    ///
    /// Also rebinds `name` if a concurrent reset cleared the identity between
    /// the message arriving and the admission.
    pub fn mark_joined(&mut self, client_id: u32, name: &str, epoch: u64) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            if client.identity.is_none() {
                client.identity = Some(name.to_string());
                client.identified = true;
            }
            client.joined_epoch = Some(epoch);
        }
    }

    /// Queues a message for one connection
    pub fn send_to(&self, client_id: u32, message: PlayerMessage) -> bool {
        self.clients
            .get(&client_id)
            .map_or(false, |client| client.send(message))
    }

    /// Queues a message for every known player, returning how many accepted it
    pub fn broadcast(&self, message: &PlayerMessage) -> usize {
        self.clients
            .values()
            .filter(|client| client.identity.is_some())
            .filter(|client| client.send(message.clone()))
            .count()
    }

    /// Tells every player of a match older than `epoch` that it was reset
    ///
    /// Those connections lose their identity and membership and re-learn
    /// them from their next message. Players admitted in `epoch` or later are
    /// untouched. Returns the number of connections notified.
    pub fn reset_players_before(&mut self, epoch: u64) -> usize {
        let mut notified = 0;
        for client in self.clients.values_mut() {
            if client.joined_epoch.map_or(false, |joined| joined < epoch) {
                if client.send(PlayerMessage::Reset) {
                    notified += 1;
                }
                client.identity = None;
                client.joined_epoch = None;
            }
        }
        notified
    }

    /// Removes connections that never identified within `timeout`
    ///
    /// Dropping an entry ends its reader task, which closes the socket.
    /// Returns the ids that were evicted.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for client_id in &timed_out {
            if let Some(client) = self.clients.remove(client_id) {
                info!(
                    "Evicting connection {} from {}: no identity after {:?}",
                    client.id, client.addr, timeout
                );
            }
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
