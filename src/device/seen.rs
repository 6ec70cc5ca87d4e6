//! Bounded, time-aged duplicate-suppression set.
//!
//! Remembers which frames this node has already observed, keyed by
//! `(id, src, dst, kind)`. The kind discriminator keeps the roles
//! apart: a node that forwarded a frame can still deliver it when it is
//! also the destination, and a confirmed frame never aliases its own
//! acknowledgement.

use std::collections::VecDeque;

use crate::address::Address;
use crate::config::SeenConfig;
use crate::frame::Frame;

use super::QueuedKind;

struct SeenEntry {
    id: u8,
    src: Address,
    dst: Address,
    kind: QueuedKind,
    remaining_ms: i64,
}

/// Duplicate-suppression set with FIFO eviction and TTL aging.
///
/// Aging is batched: [`maintain`] runs on a fixed cadence and subtracts
/// the elapsed time from every entry, so an entry can outlive its
/// nominal TTL by up to one cleanup interval.
///
/// [`maintain`]: SeenSet::maintain
pub(crate) struct SeenSet {
    entries: VecDeque<SeenEntry>,
    max_entries: usize,
    ttl_ms: u64,
    cleanup_interval_ms: u64,
    last_cleanup_ms: Option<u64>,
}

impl SeenSet {
    pub fn new(config: &SeenConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: config.max_entries,
            ttl_ms: config.ttl_ms,
            cleanup_interval_ms: config.cleanup_interval_ms,
            last_cleanup_ms: None,
        }
    }

    /// Whether the frame was already observed under this kind.
    pub fn contains(&self, frame: &Frame, kind: QueuedKind) -> bool {
        self.entries.iter().any(|e| {
            e.remaining_ms > 0
                && e.id == frame.id
                && e.src == frame.src_addr
                && e.dst == frame.dst_addr
                && e.kind == kind
        })
    }

    /// Record the frame. Evicts the oldest entry when full.
    pub fn remember(&mut self, frame: &Frame, kind: QueuedKind) {
        if self.contains(frame, kind) {
            return;
        }
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(SeenEntry {
            id: frame.id,
            src: frame.src_addr,
            dst: frame.dst_addr,
            kind,
            remaining_ms: self.ttl_ms as i64,
        });
    }

    /// Age entries and drop the expired ones. Gated to run at most once
    /// per cleanup interval.
    pub fn maintain(&mut self, now_ms: u64) {
        let last = match self.last_cleanup_ms {
            Some(ts) => ts,
            None => {
                self.last_cleanup_ms = Some(now_ms);
                return;
            }
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < self.cleanup_interval_ms {
            return;
        }
        self.last_cleanup_ms = Some(now_ms);

        for entry in self.entries.iter_mut() {
            entry.remaining_ms -= elapsed as i64;
        }
        self.entries.retain(|e| e.remaining_ms > 0);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
