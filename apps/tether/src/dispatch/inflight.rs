use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use tether_proto::ActionPayload;

/// An accepted command awaiting execution on the environment context.
#[derive(Debug, Clone)]
pub struct InflightEntry {
    pub seq: Option<u64>,
    pub action_id: Option<String>,
    pub payload: ActionPayload,
    pub received_at: Instant,
}

/// Bounded FIFO between the transport receive context and the environment
/// tick context. Commands are perishable: when full, the oldest entry is
/// evicted to make room for the newest.
pub struct InflightQueue {
    entries: Mutex<VecDeque<InflightEntry>>,
    capacity: usize,
}

impl InflightQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Pushes an entry, returning the evicted oldest entry when at capacity.
    pub fn push(&self, entry: InflightEntry) -> Option<InflightEntry> {
        let mut entries = self.entries.lock().unwrap();
        let evicted = if entries.len() == self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    pub fn pop(&self) -> Option<InflightEntry> {
        self.entries.lock().unwrap().pop_front()
    }

    /// Discards all queued entries, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let discarded = entries.len();
        entries.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
