//! Room presence tracking, kept alive by the keepalive worker.
//!
//! Peers announce themselves by heartbeat; the keepalive pass drops peers
//! that went quiet and deletes rooms left empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

use crate::statistics::{Event, Statistics};

pub struct Lobby {
    rooms: DashMap<String, HashMap<String, Instant>>,
    peer_timeout: Duration,
    statistics: Arc<Statistics>,
}

impl Lobby {
    pub fn new(peer_timeout: Duration, statistics: Arc<Statistics>) -> Self {
        Self {
            rooms: DashMap::new(),
            peer_timeout,
            statistics,
        }
    }

    /// Join `room`, or refresh the peer's heartbeat if already present.
    /// Returns the number of peers in the room.
    pub fn join(&self, room: &str, peer: &str) -> usize {
        let mut created = false;
        let mut peers = self.rooms.entry(room.to_string()).or_insert_with(|| {
            created = true;
            HashMap::new()
        });
        if created {
            self.statistics.record(Event::RoomCreated);
        }
        if peers.insert(peer.to_string(), Instant::now()).is_none() {
            self.statistics.record(Event::PeerConnected);
        }
        peers.len()
    }

    /// Leave `room`. Returns the remaining peer count, or `None` if the peer
    /// was not in the room.
    pub fn leave(&self, room: &str, peer: &str) -> Option<usize> {
        let remaining = {
            let mut peers = self.rooms.get_mut(room)?;
            peers.remove(peer)?;
            peers.len()
        };
        self.statistics.record(Event::PeerDisconnected);

        if remaining == 0
            && self
                .rooms
                .remove_if(room, |_, peers| peers.is_empty())
                .is_some()
        {
            self.statistics.record(Event::RoomDeleted);
        }
        Some(remaining)
    }

    pub fn peer_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |peers| peers.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Keepalive pass: drop peers not heard from within the peer timeout.
    /// Returns the number of peers dropped.
    pub fn ping_peers(&self) -> usize {
        self.ping_peers_at(Instant::now())
    }

    fn ping_peers_at(&self, now: Instant) -> usize {
        let mut dropped = 0;
        for mut room in self.rooms.iter_mut() {
            let before = room.len();
            room.retain(|_, seen| now.saturating_duration_since(*seen) < self.peer_timeout);
            dropped += before - room.len();
        }

        let mut deleted = 0;
        self.rooms.retain(|_, peers| {
            let keep = !peers.is_empty();
            if !keep {
                deleted += 1;
            }
            keep
        });

        for _ in 0..dropped {
            self.statistics.record(Event::PeerZombieDropped);
        }
        for _ in 0..deleted {
            self.statistics.record(Event::RoomDeleted);
        }
        if dropped > 0 || deleted > 0 {
            debug!("Keepalive dropped {dropped} idle peers and {deleted} empty rooms");
        }
        dropped
    }
}
