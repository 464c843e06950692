//! # Paint Relay Server Library
//!
//! The server is the meeting point of a paint room. It does not own the
//! canvas in the authoritative sense: every participant keeps its own replica
//! and the ownership rules converge on their own. The server relays stroke
//! traffic, keeps an observer replica so late joiners can be brought up to
//! date, and runs the round clock that turns coverage into a winner.
//!
//! ## Responsibilities
//!
//! ### Relay
//! Stroke start, update and end messages are checked against the sender's
//! participant id, applied to the observer canvas and forwarded to every
//! other participant. Messages the observer ignores (duplicates, updates to
//! finished strokes) are not forwarded.
//!
//! ### Snapshots
//! A participant that connects late, or lost track after a gap, sends a
//! snapshot request and receives a begin marker, every stroke in paint
//! order and the territory grid.
//!
//! ### Rounds
//! Standings go out once a second. When the round clock runs out the final
//! standings and winner are broadcast and the canvas is cleared for the
//! next round.
//!
//! ## Module Organization
//!
//! - `client_manager`: participant ids, address lookup, timeouts
//! - `game`: the observer canvas and the round clock
//! - `network`: UDP tasks and the relay loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::PaintConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         8,
//!         PaintConfig::default(),
//!         Duration::from_secs(90),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
