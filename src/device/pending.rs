//! Confirmed sends awaiting their end-to-end acknowledgement.

use crate::address::Address;

/// One confirmed send waiting for an ack, keyed by `(id, dst)`.
pub(crate) struct PendingEntry {
    pub id: u8,
    pub dst: Address,
    pub remaining_ms: i64,
    /// A status callback already fired for this send (broadcast
    /// destinations report immediately); the entry only lingers to
    /// absorb late acks without a second callback.
    pub reported: bool,
}

/// The set of confirmed sends still awaiting acknowledgement.
#[derive(Default)]
pub(crate) struct PendingConfirmations {
    entries: Vec<PendingEntry>,
}

impl PendingConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a confirmed send that was just handed to the link.
    pub fn track(&mut self, id: u8, dst: Address, timeout_ms: u64) {
        self.entries.push(PendingEntry {
            id,
            dst,
            remaining_ms: timeout_ms as i64,
            reported: false,
        });
    }

    /// Match an incoming ack: the ack's source is the original
    /// destination. Removes the entry and returns its `reported` flag.
    pub fn acknowledge(&mut self, id: u8, ack_src: &Address) -> Option<bool> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id && e.dst == *ack_src)?;
        Some(self.entries.remove(pos).reported)
    }

    /// Drop the entry for a send that failed at the link layer.
    pub fn remove(&mut self, id: u8, dst: &Address) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !(e.id == id && e.dst == *dst));
        self.entries.len() != before
    }

    /// Mark that a status callback already fired for this send.
    pub fn mark_reported(&mut self, id: u8, dst: &Address) {
        for entry in self.entries.iter_mut() {
            if entry.id == id && entry.dst == *dst {
                entry.reported = true;
            }
        }
    }

    /// Age all entries by `elapsed_ms` and return the expired ones.
    pub fn expire(&mut self, elapsed_ms: u64) -> Vec<PendingEntry> {
        for entry in self.entries.iter_mut() {
            entry.remaining_ms -= elapsed_ms as i64;
        }
        let (expired, alive): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.remaining_ms <= 0);
        self.entries = alive;
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
