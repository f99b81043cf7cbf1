use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::framing::{read_frame, write_json};
use shared::{
    Cell, GameBody, PlayerMessage, PlayerRequest, Snapshot, ViewerCommand, VIEWER_GREETING,
};
use std::fmt::Display;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("undecodable server message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no message from server within {0:?}")]
    Timeout(Duration),
    #[error("server closed the connection")]
    Closed,
}

/// Split stream with framed JSON in both directions
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    async fn send<T: serde::Serialize>(&mut self, value: &T) -> Result<(), ClientError> {
        write_json(&mut self.writer, value).await?;
        Ok(())
    }

    async fn recv<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        let payload = read_frame(&mut self.reader).await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    async fn recv_timeout<T: serde::de::DeserializeOwned>(
        &mut self,
        timeout: Duration,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }
}

/// Player side of the command channel
///
/// Replies and pushed notices arrive on the same stream, so requests only
/// send; callers read everything back through [`next_message`](Self::next_message).
pub struct PlayerClient {
    name: String,
    connection: Connection,
}

impl PlayerClient {
    /// Connects and consumes the server's greeting
    pub async fn connect<A: ToSocketAddrs>(addr: A, name: &str) -> Result<Self, ClientError> {
        let mut connection = Connection::open(addr).await?;

        match connection.recv::<PlayerMessage>().await? {
            PlayerMessage::Msg { body } => info!("Server says: {}", body),
            other => debug!("Unexpected greeting: {:?}", other),
        }

        Ok(Self {
            name: name.to_string(),
            connection,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends the hidden placement
    pub async fn register(&mut self, cells: &[i64]) -> Result<(), ClientError> {
        let request = PlayerRequest::Init {
            author: self.name.clone(),
            body: cells.to_vec(),
        };
        self.connection.send(&request).await
    }

    /// Asks for the current round and seats
    pub async fn query_round(&mut self) -> Result<(), ClientError> {
        let request = PlayerRequest::Game {
            author: self.name.clone(),
            body: GameBody::Keyword(shared::protocol::ROUND_KEYWORD.to_string()),
        };
        self.connection.send(&request).await
    }

    pub async fn attack(&mut self, cell: Cell) -> Result<(), ClientError> {
        let request = PlayerRequest::Game {
            author: self.name.clone(),
            body: GameBody::Targets(vec![i64::from(cell)]),
        };
        self.connection.send(&request).await
    }

    pub async fn reset(&mut self) -> Result<(), ClientError> {
        let request = PlayerRequest::Reset {
            author: self.name.clone(),
        };
        self.connection.send(&request).await
    }

    pub async fn next_message(&mut self) -> Result<PlayerMessage, ClientError> {
        self.connection.recv().await
    }

    pub async fn next_message_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<PlayerMessage, ClientError> {
        self.connection.recv_timeout(timeout).await
    }
}

/// Viewer side of the broadcast channel
pub struct ViewerClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ViewerClient {
    /// Opens the WebSocket and consumes the server's greeting
    ///
    /// `addr` is either `host:port` or a full `ws://` URL.
    pub async fn connect(addr: impl Display) -> Result<Self, ClientError> {
        let addr = addr.to_string();
        let url = if addr.starts_with("ws://") || addr.starts_with("wss://") {
            addr
        } else {
            format!("ws://{}", addr)
        };

        let (mut socket, _) = connect_async(url).await?;
        match socket.next().await {
            Some(Ok(Message::Text(text))) if text == VIEWER_GREETING => {
                info!("Server says: {}", text)
            }
            Some(Ok(other)) => debug!("Unexpected greeting: {:?}", other),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::Closed),
        }

        Ok(Self { socket })
    }

    async fn send(&mut self, command: &ViewerCommand) -> Result<(), ClientError> {
        let text = serde_json::to_string(command)?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Asks the server to push a snapshot to every viewer, this one included
    pub async fn request_broadcast(&mut self) -> Result<(), ClientError> {
        self.send(&ViewerCommand::Broadcast).await
    }

    pub async fn request_reset(&mut self) -> Result<(), ClientError> {
        self.send(&ViewerCommand::Reset).await
    }

    /// Waits for the next snapshot, skipping control frames
    pub async fn next_snapshot(&mut self) -> Result<Snapshot, ClientError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Binary(bytes))) => return Ok(serde_json::from_slice(&bytes)?),
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn next_snapshot_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Snapshot, ClientError> {
        tokio::time::timeout(timeout, self.next_snapshot())
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::framing::read_json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_player_requests_match_wire_format() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            write_json(
                &mut stream,
                &PlayerMessage::Msg {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap();

            let mut seen = Vec::new();
            for _ in 0..3 {
                let value: serde_json::Value = read_json(&mut stream).await.unwrap();
                seen.push(value);
            }
            seen
        });

        let mut client = PlayerClient::connect(addr, "alice").await.unwrap();
        client.register(&(0..16).collect::<Vec<i64>>()).await.unwrap();
        client.attack(Cell::new(9).unwrap()).await.unwrap();
        client.query_round().await.unwrap();

        let seen = server.await.unwrap();
        assert_eq!(seen[0]["header"], "init");
        assert_eq!(seen[0]["author"], "alice");
        assert_eq!(seen[0]["body"].as_array().unwrap().len(), 16);
        assert_eq!(
            seen[1],
            serde_json::json!({"header": "game", "author": "alice", "body": [9]})
        );
        assert_eq!(
            seen[2],
            serde_json::json!({"header": "game", "author": "alice", "body": "round"})
        );
    }

    #[tokio::test]
    async fn test_viewer_commands_and_snapshots() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(VIEWER_GREETING.to_string()))
                .await
                .unwrap();

            let mut seen = Vec::new();
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    seen.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
                }
            }

            let snapshot = Snapshot {
                game_round: 3,
                player1_name: "alice".to_string(),
                ..Snapshot::default()
            };
            ws.send(Message::Ping(vec![1])).await.unwrap();
            ws.send(Message::Text(serde_json::to_string(&snapshot).unwrap()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            seen
        });

        let mut viewer = ViewerClient::connect(addr).await.unwrap();
        viewer.request_broadcast().await.unwrap();
        viewer.request_reset().await.unwrap();

        let snapshot = viewer.next_snapshot().await.unwrap();
        assert_eq!(snapshot.game_round, 3);
        assert_eq!(snapshot.player1_name, "alice");
        assert!(matches!(
            viewer.next_snapshot().await.unwrap_err(),
            ClientError::Closed | ClientError::WebSocket(_)
        ));

        let seen = server.await.unwrap();
        assert_eq!(seen[0], serde_json::json!({"command": "broadcast"}));
        assert_eq!(seen[1], serde_json::json!({"command": "reset"}));
    }

    #[tokio::test]
    async fn test_viewer_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(VIEWER_GREETING.to_string()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut viewer = ViewerClient::connect(addr).await.unwrap();
        let err = viewer
            .next_snapshot_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
    }
}
