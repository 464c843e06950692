//! # Paint Client Library
//!
//! The graphical participant of a paint room. Every client keeps a full
//! replica of the canvas in a [`shared::PaintSession`]: local strokes are
//! applied immediately and queued for the relay, remote strokes are applied
//! as they arrive, and the territory ownership rules make all replicas agree
//! once every stroke has ended.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Owns the session and the connection lifecycle: binding to a participant
//! id, heartbeats, reconnecting after silence and requesting a snapshot
//! afterwards. Also keeps what the HUD shows (ping, standings, round result).
//!
//! ### Input Module (`input`)
//! Turns mouse state into press/drag/release events and maps control keys.
//!
//! ### Network Module (`network`)
//! UDP socket tasks on a tokio runtime, exchanging packets with the frame
//! loop over channels. Optional simulated latency.
//!
//! ### Rendering Module (`rendering`)
//! Uploads the software-composited canvas to a texture and draws the HUD.
//!
//! ### Bot Module (`bot`)
//! A random-walk painter that goes through the same pointer calls as a
//! person, for filling a room without enough people.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::ClientGame;
//! use client::input::PointerEvent;
//! use shared::{CanvasSpec, Packet, PaintConfig};
//! use std::time::Instant;
//!
//! let now = Instant::now();
//! let mut game = ClientGame::new(PaintConfig::default(), now);
//!
//! // The first drain carries the connect request
//! let hello = game.drain_outbound();
//! assert_eq!(hello.len(), 1);
//!
//! game.handle_packet(
//!     Packet::Connected {
//!         client_id: 1,
//!         canvas: CanvasSpec::from(&PaintConfig::default()),
//!     },
//!     now,
//!     0,
//! );
//!
//! // Drawing waits for the canvas snapshot the client asked for
//! let cells = game.session().territory_snapshot().cells;
//! game.handle_packet(Packet::SnapshotBegin { stroke_count: 0 }, now, 0);
//! game.handle_packet(Packet::SnapshotEnd { cells }, now, 0);
//! assert!(!game.is_syncing());
//!
//! game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 100);
//! game.handle_pointer(PointerEvent::Move { x: 40.0, y: 12.0 }, 116);
//! game.handle_pointer(PointerEvent::Up, 132);
//!
//! // Snapshot request, then the stroke's start, update and end
//! let packets = game.drain_outbound();
//! assert!(matches!(packets.last(), Some(Packet::StrokeEnd { .. })));
//! ```

pub mod bot;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
