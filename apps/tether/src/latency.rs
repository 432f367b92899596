use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Maps outbound observation sequence numbers to send timestamps so a later
/// correlated action can be turned into a round-trip sample. Entries are
/// bounded by count and by age; under sustained loss the unmatched tail is
/// purged instead of growing without limit.
pub struct LatencyTracker {
    entries: Mutex<VecDeque<(u64, Instant)>>,
    max_entries: usize,
    horizon: Duration,
}

impl LatencyTracker {
    pub fn new(max_entries: usize, horizon: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            horizon,
        }
    }

    pub fn record_sent(&self, seq: u64, now: Instant) {
        let mut entries = self.entries.lock().unwrap();
        purge_aged(&mut entries, now, self.horizon);
        entries.push_back((seq, now));
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Removes the record for `seq` and returns the elapsed round trip.
    /// Already-resolved, evicted or never-sent sequences yield `None`.
    pub fn resolve(&self, seq: u64, now: Instant) -> Option<Duration> {
        let mut entries = self.entries.lock().unwrap();
        purge_aged(&mut entries, now, self.horizon);
        let index = entries.iter().position(|&(recorded, _)| recorded == seq)?;
        let (_, sent_at) = entries.remove(index)?;
        Some(now.saturating_duration_since(sent_at))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Records are appended in send order, so the front is always the oldest.
fn purge_aged(entries: &mut VecDeque<(u64, Instant)>, now: Instant, horizon: Duration) {
    while let Some(&(_, sent_at)) = entries.front() {
        if now.saturating_duration_since(sent_at) <= horizon {
            break;
        }
        entries.pop_front();
    }
}
