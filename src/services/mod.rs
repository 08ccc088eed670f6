//! Onboard services run by the step engine.
//!
//! Every service here polls its peers in rotation: one peer per tick, so a chatty hart cannot
//! starve the others and each tick stays short.

pub mod console;
pub mod crypto;
pub mod ipi_poll;
pub mod powermode;
pub mod relay;

use arrayvec::ArrayVec;

use crate::config::HART_COUNT;
use crate::hart::HartId;

pub use self::ipi_poll::IpiPoll;
pub use self::relay::{CONSOLE_RELAY, CRYPTO_RELAY, Endpoint, POWERMODE_RELAY, Relay};

/// Round-robin over every hart except the one running the service.
#[derive(Debug, Default)]
pub struct PeerRotation {
    peers: ArrayVec<HartId, HART_COUNT>,
    next: usize,
}

impl PeerRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills the rotation with every hart but `me`, starting from the lowest id.
    pub fn populate(&mut self, me: HartId) {
        self.peers = HartId::all().filter(|hart| *hart != me).collect();
        self.next = 0;
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// The peer to poll this tick.
    pub fn next_peer(&mut self) -> Option<HartId> {
        let peer = self.peers.get(self.next).copied()?;
        self.next = (self.next + 1) % self.peers.len();
        Some(peer)
    }
}
