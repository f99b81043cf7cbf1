//! # Grid Battle Server Library
//!
//! Authoritative server for a two-player grid battle. Each player registers a
//! hidden placement of 16 cells on a 64-cell board, then the players fire at
//! single cells until one of them has found every opposing cell.
//!
//! ## Channels
//!
//! ### Player channel (`network`)
//! Persistent TCP connections carrying `init`, `round`, `game` and `reset`
//! requests. Each connection is served by its own task; replies and pushed
//! notices (`init` seat announcement, `game_over`, `reset`) share one ordered
//! outbound queue per connection. Connections that never identify themselves
//! are closed after `identify_timeout`.
//!
//! ### Viewer channel (`broadcast`)
//! WebSocket subscribers receive match snapshots. The channel greets each
//! viewer and accepts two control commands, `reset` and `broadcast`.
//!
//! ### Relay (`relay`)
//! After every state change the player channel asks the viewer channel for a
//! broadcast by connecting to it as an ordinary viewer. The two channels never
//! share in-process state other than the session.
//!
//! ## Shared state
//!
//! [`GameSession`] is constructed once and handed to both channels. It guards
//! all match state with a single mutex that is only held inside its own
//! synchronous methods, so no task can hold it across network I/O.
//!
//! ## Wire format
//!
//! Player messages are a 4-byte big-endian length followed by a JSON object
//! (see `shared::framing`). Viewer messages are JSON objects carried in
//! WebSocket text frames.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let handle = server.spawn();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod config;
pub mod network;
pub mod player;
pub mod relay;
pub mod session;

pub use broadcast::ViewerServer;
pub use config::{ServerConfig, TurnPolicy};
pub use network::PlayerServer;
pub use player::{Participant, ValidationError};
pub use relay::{RelayClient, RelayError};
pub use session::{GameSession, Phase, SessionError};

use log::error;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Both listeners bound and ready, sharing one session
pub struct Server {
    config: ServerConfig,
    session: Arc<GameSession>,
    player_listener: TcpListener,
    viewer_listener: TcpListener,
    player_addr: SocketAddr,
    viewer_addr: SocketAddr,
}

impl Server {
    /// Binds the player and viewer listeners
    ///
    /// This is the only fallible step of startup.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let player_listener = TcpListener::bind(config.player_bind_addr()).await?;
        let viewer_listener = TcpListener::bind(config.viewer_bind_addr()).await?;
        let player_addr = player_listener.local_addr()?;
        let viewer_addr = viewer_listener.local_addr()?;

        let session = Arc::new(GameSession::new(config.turn_policy, config.seed));

        Ok(Self {
            config,
            session,
            player_listener,
            viewer_listener,
            player_addr,
            viewer_addr,
        })
    }

    pub fn player_addr(&self) -> SocketAddr {
        self.player_addr
    }

    pub fn viewer_addr(&self) -> SocketAddr {
        self.viewer_addr
    }

    pub fn session(&self) -> Arc<GameSession> {
        Arc::clone(&self.session)
    }

    /// Address the relay connects to: the configured one, or the local viewer listener
    fn relay_addr(&self) -> SocketAddr {
        self.config
            .relay_addr
            .unwrap_or_else(|| reachable(self.viewer_addr))
    }

    /// Starts both channels on background tasks
    pub fn spawn(self) -> ServerHandle {
        let keep_running = Arc::new(AtomicBool::new(true));
        let relay = RelayClient::new(self.relay_addr(), self.config.relay_timeout);

        let viewer_server = Arc::new(ViewerServer::new(
            Arc::clone(&self.session),
            Arc::clone(&keep_running),
            self.config.accept_poll,
        ));
        let player_server = Arc::new(PlayerServer::new(
            Arc::clone(&self.session),
            relay,
            Arc::clone(&keep_running),
            &self.config,
        ));

        let viewer_task = tokio::spawn(viewer_server.run(self.viewer_listener));
        let player_task = tokio::spawn(player_server.run(self.player_listener));

        ServerHandle {
            keep_running,
            session: self.session,
            player_addr: self.player_addr,
            viewer_addr: self.viewer_addr,
            player_task,
            viewer_task,
        }
    }
}

/// Turns a wildcard bind address into one a local client can connect to
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

/// Controls a running server
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    session: Arc<GameSession>,
    player_addr: SocketAddr,
    viewer_addr: SocketAddr,
    player_task: JoinHandle<()>,
    viewer_task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn player_addr(&self) -> SocketAddr {
        self.player_addr
    }

    pub fn viewer_addr(&self) -> SocketAddr {
        self.viewer_addr
    }

    pub fn session(&self) -> Arc<GameSession> {
        Arc::clone(&self.session)
    }

    /// Stops accepting connections and waits for both accept loops to exit
    ///
    /// Open connections are left to finish on their own.
    pub async fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.wait().await;
    }

    /// Waits until both accept loops have exited
    pub async fn wait(self) {
        if let Err(e) = self.player_task.await {
            error!("Player channel task panicked: {}", e);
        }
        if let Err(e) = self.viewer_task.await {
            error!("Viewer channel task panicked: {}", e);
        }
    }
}
