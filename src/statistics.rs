//! Event statistics: lock-free counters drained once per period into a
//! bounded history of snapshots, served as JSON.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use atomic_counter::{AtomicCounter, RelaxedCounter};
use serde::{Deserialize, Serialize};

/// Countable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    PeerConnected,
    PeerDisconnected,
    PeerZombieDropped,
    RoomCreated,
    RoomDeleted,
    FrontPageLoaded,
}

impl Event {
    const COUNT: usize = 6;

    const fn index(self) -> usize {
        match self {
            Self::PeerConnected => 0,
            Self::PeerDisconnected => 1,
            Self::PeerZombieDropped => 2,
            Self::RoomCreated => 3,
            Self::RoomDeleted => 4,
            Self::FrontPageLoaded => 5,
        }
    }
}

/// Event counts for one aggregation period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    /// Unix seconds at aggregation time.
    pub timestamp: i64,
    pub ev_peer_connected: u64,
    pub ev_peer_disconnected: u64,
    pub ev_peer_zombie_dropped: u64,
    pub ev_room_created: u64,
    pub ev_room_deleted: u64,
    pub ev_front_page_loaded: u64,
}

pub struct Statistics {
    counters: [RelaxedCounter; Event::COUNT],
    history: Mutex<VecDeque<StatSnapshot>>,
    capacity: usize,
}

impl Statistics {
    /// `capacity` snapshots are kept; older ones are dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            counters: std::array::from_fn(|_| RelaxedCounter::new(0)),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    pub fn record(&self, event: Event) {
        self.counters[event.index()].inc();
    }

    /// Events recorded since the last aggregation.
    pub fn pending(&self, event: Event) -> u64 {
        self.counters[event.index()].get() as u64
    }

    /// Drain the counters into a new snapshot at the end of the history.
    pub fn aggregate(&self) -> Result<StatSnapshot> {
        let take = |event: Event| self.counters[event.index()].reset() as u64;
        let snapshot = StatSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            ev_peer_connected: take(Event::PeerConnected),
            ev_peer_disconnected: take(Event::PeerDisconnected),
            ev_peer_zombie_dropped: take(Event::PeerZombieDropped),
            ev_room_created: take(Event::RoomCreated),
            ev_room_deleted: take(Event::RoomDeleted),
            ev_front_page_loaded: take(Event::FrontPageLoaded),
        };

        let mut history = self
            .history
            .lock()
            .map_err(|_| anyhow!("statistics history lock poisoned"))?;
        history.push_back(snapshot.clone());
        while history.len() > self.capacity {
            history.pop_front();
        }
        Ok(snapshot)
    }

    pub fn history(&self) -> Result<Vec<StatSnapshot>> {
        let history = self
            .history
            .lock()
            .map_err(|_| anyhow!("statistics history lock poisoned"))?;
        Ok(history.iter().cloned().collect())
    }

    /// The history as a JSON array, oldest first.
    pub fn history_json(&self) -> Result<String> {
        serde_json::to_string(&self.history()?).context("Failed to serialize statistics history")
    }
}
