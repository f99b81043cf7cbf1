//! # Grid Battle Client Library
//!
//! Connects to a grid battle server as either a player or a viewer.
//!
//! ## Modules
//!
//! ### Network (`network`)
//! [`PlayerClient`] speaks the player command channel: registering a
//! placement, querying the round, firing at cells and requesting resets.
//! [`ViewerClient`] subscribes to match snapshots and can ask for a broadcast
//! or a reset.
//!
//! ### Game (`game`)
//! Local targeting logic: random fleet placement and a hunt-and-target
//! [`AutoPlayer`] that follows up hits on orthogonal neighbours.
//!
//! ### Autoplay (`autoplay`)
//! [`play_match`] drives a [`PlayerClient`] unattended from registration
//! until the match is won or reset.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{play_match, PlayOptions, PlayerClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut player = PlayerClient::connect("127.0.0.1:1001", "alice").await?;
//!     let end = play_match(&mut player, &PlayOptions::default()).await?;
//!     println!("{:?}", end);
//!     Ok(())
//! }
//! ```

pub mod autoplay;
pub mod game;
pub mod network;

pub use autoplay::{play_match, MatchEnd, PlayOptions};
pub use game::{random_placement, AutoPlayer};
pub use network::{ClientError, PlayerClient, ViewerClient};
