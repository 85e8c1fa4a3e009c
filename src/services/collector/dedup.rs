// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::B256;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstSeen {
    pub source: String,
    pub received_at_ms: u64,
}

/// First-seen index. Owned and mutated by the processor task only, so no
/// synchronization is involved. Bounded in time: entries older than the
/// horizon are evicted on a timer.
#[derive(Debug)]
pub struct DedupIndex {
    entries: HashMap<B256, FirstSeen>,
    horizon_ms: u64,
}

impl DedupIndex {
    pub fn new(horizon: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            horizon_ms: horizon.as_millis() as u64,
        }
    }

    /// Record a sighting. Returns true when this is the first observation of
    /// the hash; the existing entry is never overwritten.
    pub fn observe(&mut self, hash: B256, source: &str, received_at_ms: u64) -> bool {
        match self.entries.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(FirstSeen {
                    source: source.to_string(),
                    received_at_ms,
                });
                true
            }
        }
    }

    pub fn get(&self, hash: &B256) -> Option<&FirstSeen> {
        self.entries.get(hash)
    }

    /// Drop entries whose first sighting is older than the horizon.
    /// Returns the number of evicted entries.
    pub fn evict_before(&mut self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.horizon_ms);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.received_at_ms >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
