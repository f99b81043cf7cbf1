//! Runtime configuration for the game server

use clap::ValueEnum;
use shared::{DEFAULT_PLAYER_PORT, DEFAULT_VIEWER_PORT};
use std::net::SocketAddr;
use std::time::Duration;

/// Whether the session enforces alternating shots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TurnPolicy {
    /// Any seated player may fire at any time; clients keep turn discipline
    #[default]
    Free,
    /// Seat A fires on odd rounds, seat B on even rounds
    Alternate,
}

/// Settings shared by both listeners
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface both listeners bind to
    pub host: String,
    /// Port of the player command channel
    pub player_port: u16,
    /// Port of the viewer broadcast channel
    pub viewer_port: u16,
    /// Where the relay sends snapshot triggers; defaults to the local viewer listener
    pub relay_addr: Option<SocketAddr>,
    /// Upper bound on one relay round trip
    pub relay_timeout: Duration,
    /// How long an accept call waits before re-checking the stop flag
    pub accept_poll: Duration,
    /// How long a player connection may stay anonymous before it is closed
    pub identify_timeout: Duration,
    /// Maximum simultaneous player connections
    pub max_clients: usize,
    pub turn_policy: TurnPolicy,
    /// Fixed seed for seat shuffling; random when absent
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            player_port: DEFAULT_PLAYER_PORT,
            viewer_port: DEFAULT_VIEWER_PORT,
            relay_addr: None,
            relay_timeout: Duration::from_secs(2),
            accept_poll: Duration::from_millis(250),
            identify_timeout: Duration::from_secs(30),
            max_clients: 16,
            turn_policy: TurnPolicy::Free,
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Loopback configuration with OS-assigned ports and short poll intervals
    pub fn ephemeral() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            player_port: 0,
            viewer_port: 0,
            accept_poll: Duration::from_millis(50),
            ..Self::default()
        }
    }

    pub fn player_bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.player_port)
    }

    pub fn viewer_bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.viewer_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.player_bind_addr(), "0.0.0.0:1001");
        assert_eq!(config.viewer_bind_addr(), "0.0.0.0:1000");
        assert_eq!(config.turn_policy, TurnPolicy::Free);
        assert!(config.relay_addr.is_none());
        assert_eq!(config.identify_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_ephemeral_uses_loopback() {
        let config = ServerConfig::ephemeral();
        assert_eq!(config.player_bind_addr(), "127.0.0.1:0");
        assert_eq!(config.viewer_bind_addr(), "127.0.0.1:0");
        assert!(config.accept_poll < ServerConfig::default().accept_poll);
    }

    #[test]
    fn test_turn_policy_parses_from_cli_value() {
        assert_eq!(
            TurnPolicy::from_str("alternate", true).unwrap(),
            TurnPolicy::Alternate
        );
        assert!(TurnPolicy::from_str("strict", true).is_err());
    }
}
