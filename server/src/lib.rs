//! # Game Server Library
//!
//! This library provides the authoritative server for the arcade shooter. It
//! owns the one true copy of the world, applies player inputs, advances the
//! simulation at a fixed rate and streams per-session snapshots back to every
//! connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every movement, collision, score change and stage transition is decided
//! here. Clients only send intents (`PlayerInput`) and render whatever the
//! server reports.
//!
//! ### Session Management
//! Handles the lifecycle of TCP sessions including:
//! - Capacity enforcement and session id assignment
//! - Login, signup and ranking requests answered on the same connection
//! - Binding a session to a ship (eagerly in single mode, on first input
//!   after login in multi mode)
//! - Teardown on read failure, write failure or a stalled outbound queue
//!
//! ### Score Persistence
//! Accounts and scores live behind the [`persistence::PersistenceGateway`]
//! trait. A session's final score is written at most once per run.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Game Loop
//! One task owns [`game::GameState`] and `select!`s between the inbound
//! message channel and a fixed-rate interval. Session tasks never touch the
//! world directly; they send messages which become queued commands applied at
//! the start of the next tick. Broadcasting works on an owned snapshot, and
//! each session's writer drains its own bounded queue, so a slow client can
//! never stall the tick.
//!
//! ### Deferred Removal
//! Entities are only marked for removal during a tick and purged once at its
//! end, so every id resolved during the tick stays valid.
//!
//! ## Module Organization
//!
//! - `config`: [`config::ServerConfig`] and the single/multi [`config::Mode`]
//! - `entity`: entity record, per-kind payloads and tuning constants
//! - `registry`: id → entity map with deferred removal
//! - `factory`: typed constructors for every entity kind
//! - `collision`: AABB pass and per-kind reactions
//! - `stage`: wave list and quota-driven progression
//! - `boss`: boss patrol and attack patterns
//! - `game`: the tick engine
//! - `persistence`: account and score storage
//! - `client_manager`: session table and outbound queues
//! - `network`: accept loop, session tasks and the main server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{Mode, ServerConfig};
//! use server::network::Server;
//! use server::persistence::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig::new("127.0.0.1:8080", Mode::Multi);
//!     let mut server = Server::new(config, Arc::new(MemoryStore::new())).await?;
//!
//!     // Accepts sessions, ticks the world at 120 Hz and broadcasts
//!     // snapshots until the process is stopped.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod boss;
pub mod client_manager;
pub mod collision;
pub mod config;
pub mod entity;
pub mod factory;
pub mod game;
pub mod network;
pub mod persistence;
pub mod registry;
pub mod stage;
