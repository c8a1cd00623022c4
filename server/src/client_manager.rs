//! Connected sessions and their outbound queues
//!
//! This module tracks every live connection on the server side:
//! - Session id assignment and capacity enforcement
//! - The account name attached by a successful login or signup
//! - Whether the session already steers a ship
//! - A bounded outbound queue drained by the session's writer task
//!
//! Sending never waits. A session whose queue is full or whose writer has
//! gone away is reported back to the caller, which tears it down.

use log::{debug, info, warn};
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Packets a session may have in flight before it counts as stalled.
pub const OUTBOUND_QUEUE: usize = 32;

/// One accepted connection.
#[derive(Debug)]
pub struct Client {
    /// Unique session identifier assigned by the server
    pub id: u32,
    pub addr: SocketAddr,
    /// Set after a successful login or signup on this connection
    pub username: Option<String>,
    /// True once a ship has been bound to this session
    pub bound: bool,
    pub connected_at: Instant,
    outbound: mpsc::Sender<Packet>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbound: mpsc::Sender<Packet>) -> Self {
        Self {
            id,
            addr,
            username: None,
            bound: false,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Queues a packet without waiting. Returns false when the session is
    /// stalled or already closed.
    pub fn send(&self, packet: Packet) -> bool {
        match self.outbound.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Session {} is not keeping up, dropping it", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {} writer already closed", self.id);
                false
            }
        }
    }
}

/// All live sessions, capped at `max_clients`.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a connection. Returns None when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr, outbound: mpsc::Sender<Packet>) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Session {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbound));

        Some(client_id)
    }

    /// Forgets a session, closing its outbound queue. Returns false when it
    /// was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Session {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: &u32) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Records the account a session logged in as. Returns false for an
    /// unknown session.
    pub fn set_username(&mut self, client_id: u32, username: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.username = Some(username.to_string());
                true
            }
            None => false,
        }
    }

    /// Marks the session as steering a ship. Returns false if it already was
    /// or no longer exists.
    pub fn bind(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) if !client.bound => {
                client.bound = true;
                true
            }
            _ => false,
        }
    }

    /// Whether any session already plays. Used to hand out the single seat.
    pub fn has_bound_client(&self) -> bool {
        self.clients.values().any(|client| client.bound)
    }

    /// Queues a per-session packet for every session and returns the ids
    /// that could not take it.
    pub fn broadcast<F>(&self, mut packet_for: F) -> Vec<u32>
    where
        F: FnMut(u32) -> Packet,
    {
        let mut failed = Vec::new();
        for (&id, client) in &self.clients {
            if !client.send(packet_for(id)) {
                failed.push(id);
            }
        }
        failed.sort_unstable();
        failed
    }

    /// Session ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
