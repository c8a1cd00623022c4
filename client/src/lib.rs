//! # Game Client Library
//!
//! Headless client for the arcade shooter server. It speaks the framed
//! protocol from `shared` and offers two connection patterns:
//!
//! - **One-shot requests** ([`network::request_once`] and the `sign_up`,
//!   `login` and `fetch_rankings` helpers): open a connection, send exactly
//!   one request, read its reply, close.
//! - **Game sessions** ([`network::GameConnection`]): a persistent duplex
//!   stream that sends player actions and receives a snapshot every tick.
//!
//! The [`bot::Autopilot`] turns snapshots into actions so a session can be
//! driven from the command line or from tests without any rendering.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bot::Autopilot;
//! use client::network::{BoxError, GameConnection};
//! use shared::Packet;
//!
//! async fn fly(addr: &str) -> Result<(), BoxError> {
//!     let mut connection = GameConnection::connect(addr).await?;
//!     let mut pilot = Autopilot::new();
//!
//!     loop {
//!         match connection.next_packet().await? {
//!             Packet::GameState { entities, .. } => {
//!                 for action in pilot.decide(&entities) {
//!                     connection.send_action(action).await?;
//!                 }
//!             }
//!             Packet::Victory => return Ok(()),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod bot;
pub mod network;
