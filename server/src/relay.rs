//! Snapshot trigger from the command channel to the viewer channel
//!
//! The command channel does not reach into the viewer server's state. It
//! opens a WebSocket to the viewer endpoint like any other viewer, sends
//! `{"command":"broadcast"}` and waits for the snapshot that the broadcast
//! fans out, which doubles as the acknowledgement. Both servers can therefore
//! run in one process or in two without code changes.

use futures_util::{SinkExt, StreamExt};
use shared::{Snapshot, ViewerCommand, VIEWER_GREETING};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("viewer channel unreachable at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: tungstenite::Error,
    },
    #[error("viewer channel websocket failed: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("viewer channel did not answer within {0:?}")]
    Timeout(Duration),
    #[error("viewer channel closed before sending a snapshot")]
    Closed,
    #[error("viewer channel sent an undecodable snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client half of the inter-channel relay
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RelayClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Asks the viewer channel to broadcast a fresh snapshot
    ///
    /// The whole round trip, handshake included, is bounded by the relay timeout.
    pub async fn trigger(&self) -> Result<Snapshot, RelayError> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| RelayError::Timeout(self.timeout))?
    }

    async fn exchange(&self) -> Result<Snapshot, RelayError> {
        let url = format!("ws://{}", self.addr);
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|source| RelayError::Connect {
                addr: self.addr,
                source,
            })?;

        let command = serde_json::to_string(&ViewerCommand::Broadcast)?;
        ws.send(Message::Text(command)).await?;

        let snapshot: Snapshot = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) if text == VIEWER_GREETING => continue,
                Some(Ok(Message::Text(text))) => break serde_json::from_str(&text)?,
                Some(Ok(Message::Close(_))) | None => return Err(RelayError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        };

        let _ = ws.close(None).await;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_trigger_returns_snapshot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(VIEWER_GREETING.to_string()))
                .await
                .unwrap();

            let command = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("Unexpected relay message: {:?}", other),
            };
            let command: ViewerCommand = serde_json::from_str(&command).unwrap();
            assert_eq!(command, ViewerCommand::Broadcast);

            let snapshot = Snapshot {
                game_round: 4,
                ..Snapshot::default()
            };
            let text = serde_json::to_string(&snapshot).unwrap();
            ws.send(Message::Text(text)).await.unwrap();
        });

        let relay = RelayClient::new(addr, Duration::from_secs(2));
        let snapshot = relay.trigger().await.unwrap();
        assert_eq!(snapshot.game_round, 4);
    }

    #[tokio::test]
    async fn test_trigger_reports_early_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.next().await;
            ws.close(None).await.unwrap();
        });

        let relay = RelayClient::new(addr, Duration::from_secs(2));
        let err = relay.trigger().await.unwrap_err();
        assert!(matches!(err, RelayError::Closed | RelayError::WebSocket(_)));
    }

    #[tokio::test]
    async fn test_trigger_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let relay = RelayClient::new(addr, Duration::from_millis(100));
        let err = relay.trigger().await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_trigger_reports_unreachable_endpoint() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let relay = RelayClient::new(addr, Duration::from_secs(2));
        let err = relay.trigger().await.unwrap_err();
        assert!(matches!(err, RelayError::Connect { .. }));
    }
}
