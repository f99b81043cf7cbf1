//! Types shared between the game server and its clients: the board model,
//! both wire protocols and the frame codec of the player channel.

pub mod board;
pub mod framing;
pub mod protocol;

pub use board::{
    Cell, GridError, Mark, ObservationGrid, Placement, PlacementError, BOARD_CELLS, FLEET_SIZE,
};
pub use protocol::{
    decode_command, Command, GameBody, GameReply, PlayerMessage, PlayerRequest, ProtocolError,
    Seat, SeatNames, Snapshot, ViewerCommand, VIEWER_GREETING,
};

/// Default port of the player command channel
pub const DEFAULT_PLAYER_PORT: u16 = 1001;
/// Default port of the viewer broadcast channel
pub const DEFAULT_VIEWER_PORT: u16 = 1000;
