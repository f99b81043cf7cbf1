//! Wire messages for the player channel and the viewer channel
//!
//! The player channel carries one JSON object per length-prefixed frame (see
//! [`crate::framing`]); the viewer channel carries one JSON object per
//! WebSocket text message. Player requests are tagged by a `header` field;
//! viewer control messages are tagged by a `command` field.

use crate::board::{Cell, ObservationGrid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Body keyword that turns a `game` request into a round query
pub const ROUND_KEYWORD: &str = "round";

/// Plain-text greeting sent to every viewer before any snapshot
pub const VIEWER_GREETING: &str = "Connected to the server.";

/// Raw request from a player, as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header", rename_all = "snake_case")]
pub enum PlayerRequest {
    Init {
        #[serde(default)]
        author: String,
        body: Vec<i64>,
    },
    Round {
        #[serde(default)]
        author: String,
    },
    Game {
        #[serde(default)]
        author: String,
        body: GameBody,
    },
    Reset {
        #[serde(default)]
        author: String,
    },
}

/// Body of a `game` request: either the `"round"` keyword or a target list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GameBody {
    Keyword(String),
    Targets(Vec<i64>),
}

/// A decoded, range-checked player command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { author: String, cells: Vec<i64> },
    QueryRound { author: String },
    Attack { author: String, cell: Cell },
    Reset { author: String },
}

impl Command {
    pub fn author(&self) -> &str {
        match self {
            Command::Register { author, .. }
            | Command::QueryRound { author }
            | Command::Attack { author, .. }
            | Command::Reset { author } => author,
        }
    }
}

/// Reasons an inbound player message is discarded
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown game body keyword {0:?}")]
    UnknownKeyword(String),
    #[error("attack request carries no target cell")]
    MissingTarget,
    #[error("target cell {0} is outside the board")]
    CellOutOfRange(i64),
}

impl TryFrom<PlayerRequest> for Command {
    type Error = ProtocolError;

    fn try_from(request: PlayerRequest) -> Result<Self, Self::Error> {
        match request {
            PlayerRequest::Init { author, body } => Ok(Command::Register {
                author,
                cells: body,
            }),
            PlayerRequest::Round { author } => Ok(Command::QueryRound { author }),
            PlayerRequest::Game {
                author,
                body: GameBody::Keyword(keyword),
            } => {
                if keyword == ROUND_KEYWORD {
                    Ok(Command::QueryRound { author })
                } else {
                    Err(ProtocolError::UnknownKeyword(keyword))
                }
            }
            PlayerRequest::Game {
                author,
                body: GameBody::Targets(targets),
            } => {
                // Only the first target is fired at
                let target = *targets.first().ok_or(ProtocolError::MissingTarget)?;
                let cell = Cell::new(target).ok_or(ProtocolError::CellOutOfRange(target))?;
                Ok(Command::Attack { author, cell })
            }
            PlayerRequest::Reset { author } => Ok(Command::Reset { author }),
        }
    }
}

/// Decodes one frame from a player into a command
pub fn decode_command(payload: &[u8]) -> Result<Command, ProtocolError> {
    let request: PlayerRequest = serde_json::from_slice(payload)?;
    Command::try_from(request)
}

/// Display seat assigned to a participant for one match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    A,
    B,
}

/// Names seated at A and B
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatNames {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
}

impl SeatNames {
    /// The `{name: seat}` mapping announced when a match starts
    pub fn by_name(&self) -> BTreeMap<String, Seat> {
        BTreeMap::from([(self.a.clone(), Seat::A), (self.b.clone(), Seat::B)])
    }
}

/// Body of a `game` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GameReply {
    Round(u32),
    Grid(ObservationGrid),
}

/// Messages the server sends down a player connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header", rename_all = "snake_case")]
pub enum PlayerMessage {
    /// Informational text, sent once when a connection is accepted
    Msg { body: String },
    /// Seat announcement when the second player joins
    Init { body: BTreeMap<String, Seat> },
    Game {
        body: GameReply,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<SeatNames>,
    },
    GameOver { body: String },
    Reset,
    /// A request was rejected without changing the match
    Error { body: String },
}

/// Control messages accepted on the viewer channel
///
/// Extra fields next to `command` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ViewerCommand {
    Reset,
    Broadcast,
}

/// Summary of the match pushed to every viewer
///
/// Player 1 is seat A once both players are seated, otherwise the first
/// admitted player. Absent players have an empty name and a score of zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub player1_score: usize,
    pub player2_score: usize,
    pub player1_name: String,
    pub player2_name: String,
    pub game_round: u32,
    pub winner: Option<String>,
    pub winner_history: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Mark;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<Command, ProtocolError> {
        decode_command(value.to_string().as_bytes())
    }

    #[test]
    fn test_decode_init() {
        let command = decode(json!({
            "header": "init",
            "author": "alice",
            "body": (0..16).collect::<Vec<i64>>()
        }))
        .unwrap();

        match command {
            Command::Register { author, cells } => {
                assert_eq!(author, "alice");
                assert_eq!(cells.len(), 16);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_round_query_both_forms() {
        let via_game = decode(json!({"header": "game", "author": "bob", "body": "round"}));
        let via_round = decode(json!({"header": "round", "author": "bob"}));

        let expected = Command::QueryRound {
            author: "bob".to_string(),
        };
        assert_eq!(via_game.unwrap(), expected);
        assert_eq!(via_round.unwrap(), expected);
    }

    #[test]
    fn test_decode_attack() {
        let command = decode(json!({"header": "game", "author": "bob", "body": [17]})).unwrap();
        assert_eq!(
            command,
            Command::Attack {
                author: "bob".to_string(),
                cell: Cell::new(17).unwrap()
            }
        );
        assert_eq!(command.author(), "bob");
    }

    #[test]
    fn test_decode_attack_out_of_range() {
        let result = decode(json!({"header": "game", "author": "bob", "body": [64]}));
        assert!(matches!(result, Err(ProtocolError::CellOutOfRange(64))));

        let result = decode(json!({"header": "game", "author": "bob", "body": []}));
        assert!(matches!(result, Err(ProtocolError::MissingTarget)));

        let result = decode(json!({"header": "game", "author": "bob", "body": "fire"}));
        assert!(matches!(result, Err(ProtocolError::UnknownKeyword(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_command(b"{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(json!({"header": "dance", "author": "bob"})),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(json!({"header": "init", "author": "bob", "body": "ships"})),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_reset_without_author() {
        let command = decode(json!({"header": "reset"})).unwrap();
        assert_eq!(
            command,
            Command::Reset {
                author: String::new()
            }
        );
    }

    #[test]
    fn test_round_reply_shape() {
        let message = PlayerMessage::Game {
            body: GameReply::Round(3),
            names: Some(SeatNames {
                a: "alice".to_string(),
                b: "bob".to_string(),
            }),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"header": "game", "body": 3, "names": {"A": "alice", "B": "bob"}})
        );
    }

    #[test]
    fn test_grid_reply_decodes_as_grid() {
        let mut grid = ObservationGrid::new();
        grid.record(Cell::new(16).unwrap(), Mark::Hit);
        let message = PlayerMessage::Game {
            body: GameReply::Grid(grid.clone()),
            names: None,
        };

        let text = serde_json::to_string(&message).unwrap();
        assert!(!text.contains("names"));
        let decoded: PlayerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_pushed_message_shapes() {
        let game_over = PlayerMessage::GameOver {
            body: "alice".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&game_over).unwrap(),
            json!({"header": "game_over", "body": "alice"})
        );
        assert_eq!(
            serde_json::to_value(&PlayerMessage::Reset).unwrap(),
            json!({"header": "reset"})
        );

        let seats = SeatNames {
            a: "bob".to_string(),
            b: "alice".to_string(),
        };
        let init = PlayerMessage::Init {
            body: seats.by_name(),
        };
        assert_eq!(
            serde_json::to_value(&init).unwrap(),
            json!({"header": "init", "body": {"alice": "B", "bob": "A"}})
        );
    }

    #[test]
    fn test_viewer_command_ignores_extra_fields() {
        let command: ViewerCommand =
            serde_json::from_value(json!({"command": "broadcast", "player1Score": 3})).unwrap();
        assert_eq!(command, ViewerCommand::Broadcast);

        let command: ViewerCommand = serde_json::from_value(json!({"command": "reset"})).unwrap();
        assert_eq!(command, ViewerCommand::Reset);

        assert!(serde_json::from_value::<ViewerCommand>(json!({"command": "explode"})).is_err());
    }

    #[test]
    fn test_snapshot_field_names() {
        let snapshot = Snapshot {
            player1_score: 2,
            player2_score: 5,
            player1_name: "alice".to_string(),
            player2_name: "bob".to_string(),
            game_round: 9,
            winner: None,
            winner_history: vec!["bob".to_string()],
        };

        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "player1Score": 2,
                "player2Score": 5,
                "player1Name": "alice",
                "player2Name": "bob",
                "gameRound": 9,
                "winner": null,
                "winnerHistory": ["bob"]
            })
        );
    }
}
