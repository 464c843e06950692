//! Connected participant tracking for the paint relay
//!
//! Handles the server-side bookkeeping of who is in the room:
//! - Participant id assignment and capacity limits
//! - Address lookup for incoming datagrams
//! - Liveness tracking and timeout cleanup

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a participant is dropped
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected participant
#[derive(Debug)]
pub struct Client {
    /// Participant id, also the author id of every stroke they send
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Stroke messages accepted from this client
    pub strokes_relayed: u64,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            strokes_relayed: 0,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of connected participants
///
/// Ids start at 1 and are never reused within a server run, which keeps
/// stroke ids globally unique across reconnects.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    by_addr: HashMap<SocketAddr, u32>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            by_addr: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns `None` when the room is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Participant {} joined from {}", client_id, addr);
        self.by_addr.insert(addr, client_id);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        let Some(client) = self.clients.remove(client_id) else {
            return false;
        };
        if self.by_addr.get(&client.addr) == Some(client_id) {
            self.by_addr.remove(&client.addr);
        }
        info!(
            "Participant {} left after {} stroke messages",
            client.id, client.strokes_relayed
        );
        true
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).copied()
    }

    /// Refreshes liveness for the client at `addr` and returns its id.
    pub fn mark_seen(&mut self, addr: SocketAddr) -> Option<u32> {
        let id = self.find_client_by_addr(addr)?;
        let client = self.clients.get_mut(&id)?;
        client.last_seen = Instant::now();
        Some(id)
    }

    pub fn record_stroke_message(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.strokes_relayed += 1;
        }
    }

    /// Removes and returns every client silent for longer than
    /// [`CLIENT_TIMEOUT`].
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
