//! # Lane Race Server Library
//!
//! Authoritative server for a single-room lane race of up to five players.
//! Clients connect over TCP, pick a character, items and a map in the lobby,
//! and race once the owner starts. The server simulates movement, distance
//! and HP decay, and broadcasts the results at a fixed rate.
//!
//! ## Architecture
//!
//! ### Single Owning Task
//! One task owns the [`game::GameState`]. Per-connection reader tasks decode
//! frames and forward them over a channel; the owning task applies them in
//! arrival order and also runs the simulation tick, so every mutation of the
//! room happens sequentially.
//!
//! ### Outbound Queues
//! Each connection has a bounded queue drained by its own writer task. A
//! peer that lets its queue fill up is dropped like any other transport
//! failure instead of stalling the room.
//!
//! ## Module Organization
//!
//! - `client_manager`: admitted connections, id assignment and room ownership
//! - `content`: static character/item/map tables loaded from JSON
//! - `dispatch`: routing of client messages to room operations
//! - `game`: the Waiting/Running state machine, start and game over
//! - `network`: TCP accept loop, connection tasks and packet delivery
//! - `simulation`: countdown, per-frame race update and state broadcasts
//! - `stats`: derived stats, damage, stun and protection timers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::content::ContentStore;
//! use server::game::GameState;
//! use server::network::Server;
//! use server::simulation::{Simulation, SimulationConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let content = Arc::new(ContentStore::load_dir("content")?);
//!     let config = SimulationConfig::default();
//!     let poll_interval = config.poll_interval;
//!
//!     let mut server = Server::new(
//!         "127.0.0.1:12345",
//!         GameState::new(content),
//!         Simulation::new(config),
//!         poll_interval,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod content;
pub mod dispatch;
pub mod game;
pub mod network;
pub mod simulation;
pub mod stats;
