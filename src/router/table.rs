//! Time-aged next-hop routing table.
//!
//! Maps final destinations to the neighbor that last carried a frame
//! from them, preferring the shortest observed distance. Entries decay:
//! a route that is not re-learned within its TTL is removed, and the
//! table is capped, evicting the entry closest to expiry on overflow.

use tracing::{debug, trace};

use crate::address::Address;
use crate::config::RoutingConfig;

/// One cached route.
#[derive(Clone, Debug)]
pub struct RoutingEntry {
    /// Final destination.
    pub destination: Address,
    /// Neighbor to transmit to in order to reach it.
    pub link: Address,
    /// Observed distance in hops (direct neighbor = 1).
    pub hops: u8,
    /// Remaining lifetime in ms.
    pub remaining_ms: i64,
}

/// Capped, time-aged routing table with shortest-hop preference.
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
    max_entries: usize,
    ttl_ms: u64,
    update_interval_ms: u64,
    last_update_ms: Option<u64>,
}

impl RoutingTable {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: config.max_entries,
            ttl_ms: config.ttl_ms,
            update_interval_ms: config.update_interval_ms,
            last_update_ms: None,
        }
    }

    /// Learn or refresh a route.
    ///
    /// An existing route is replaced only by a strictly shorter one; a
    /// route with equal or more hops never displaces what is already
    /// known, so a live entry's distance only improves. At capacity the
    /// entry closest to expiry is evicted.
    pub fn add_or_update(&mut self, destination: Address, link: Address, hops: u8) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.destination == destination)
        {
            if hops < entry.hops {
                trace!(dst = %destination, via = %link, hops, "route improved");
                entry.link = link;
                entry.hops = hops;
                entry.remaining_ms = self.ttl_ms as i64;
            }
            return;
        }

        if self.entries.len() >= self.max_entries {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.remaining_ms)
                .map(|(i, _)| i)
            {
                let evicted = self.entries.swap_remove(oldest);
                debug!(dst = %evicted.destination, "routing table full, evicted oldest route");
            }
        }

        trace!(dst = %destination, via = %link, hops, "route learned");
        self.entries.push(RoutingEntry {
            destination,
            link,
            hops,
            remaining_ms: self.ttl_ms as i64,
        });
    }

    /// Neighbor to use for `destination`, if a route is cached.
    pub fn next_hop(&self, destination: &Address) -> Option<Address> {
        self.entries
            .iter()
            .find(|e| e.destination == *destination)
            .map(|e| e.link)
    }

    /// The cached route for a destination.
    pub fn get(&self, destination: &Address) -> Option<&RoutingEntry> {
        self.entries.iter().find(|e| e.destination == *destination)
    }

    /// Age entries and drop the expired ones. Gated to run at most once
    /// per update interval.
    pub fn age(&mut self, now_ms: u64) {
        let last = match self.last_update_ms {
            Some(ts) => ts,
            None => {
                self.last_update_ms = Some(now_ms);
                return;
            }
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < self.update_interval_ms {
            return;
        }
        self.last_update_ms = Some(now_ms);

        for entry in self.entries.iter_mut() {
            entry.remaining_ms -= elapsed as i64;
        }
        self.entries.retain(|e| e.remaining_ms > 0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_addr(val: u8) -> Address {
        Address::from_bytes([val; 6])
    }

    fn make_table() -> RoutingTable {
        RoutingTable::new(&RoutingConfig::default())
    }

    #[test]
    fn test_learn_and_lookup() {
        let mut table = make_table();
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 2);

        assert_eq!(table.next_hop(&make_addr(0xbb)), Some(make_addr(0x22)));
        assert_eq!(table.next_hop(&make_addr(0xcc)), None);
    }

    #[test]
    fn test_shorter_route_wins() {
        let mut table = make_table();
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 3);
        table.add_or_update(make_addr(0xbb), make_addr(0x33), 2);

        let entry = table.get(&make_addr(0xbb)).unwrap();
        assert_eq!(entry.link, make_addr(0x33));
        assert_eq!(entry.hops, 2);
    }

    #[test]
    fn test_equal_or_worse_route_kept_out() {
        let mut table = make_table();
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 2);
        table.add_or_update(make_addr(0xbb), make_addr(0x33), 2);
        table.add_or_update(make_addr(0xbb), make_addr(0x44), 5);

        let entry = table.get(&make_addr(0xbb)).unwrap();
        assert_eq!(entry.link, make_addr(0x22));
        assert_eq!(entry.hops, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_hops_monotonically_non_increasing() {
        let mut table = make_table();
        let mut last_hops = u8::MAX;
        for hops in [4, 2, 3, 1, 2] {
            table.add_or_update(make_addr(0xbb), make_addr(hops), hops);
            let entry = table.get(&make_addr(0xbb)).unwrap();
            assert!(entry.hops <= last_hops);
            last_hops = entry.hops;
        }
        assert_eq!(table.get(&make_addr(0xbb)).unwrap().hops, 1);
    }

    #[test]
    fn test_capacity_evicts_entry_closest_to_expiry() {
        let mut table = make_table();
        let max = RoutingConfig::default().max_entries;

        table.age(1000);
        table.add_or_update(make_addr(0), make_addr(0x11), 1);

        // age the first entry down a little, then fill the table
        table.age(1200);
        for i in 1..max as u8 {
            table.add_or_update(make_addr(i), make_addr(0x11), 1);
        }
        assert_eq!(table.len(), max);

        // overflow: the first (most-aged) entry goes
        table.add_or_update(make_addr(0xee), make_addr(0x11), 1);
        assert_eq!(table.len(), max);
        assert!(table.next_hop(&make_addr(0)).is_none());
        assert!(table.next_hop(&make_addr(0xee)).is_some());
    }

    #[test]
    fn test_routes_expire() {
        let mut table = make_table();
        table.age(1000);
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 1);

        table.age(6000);
        assert!(table.next_hop(&make_addr(0xbb)).is_some());

        // 10 s TTL exceeded
        table.age(11_100);
        assert!(table.next_hop(&make_addr(0xbb)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_aging_is_interval_gated() {
        let mut table = make_table();
        table.age(1000);
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 1);

        // calls inside the 100 ms interval do not age
        table.age(1050);
        table.age(1090);
        assert_eq!(table.get(&make_addr(0xbb)).unwrap().remaining_ms, 10_000);

        table.age(1200);
        assert!(table.get(&make_addr(0xbb)).unwrap().remaining_ms < 10_000);
    }

    #[test]
    fn test_relearning_refreshes_ttl_only_when_shorter() {
        let mut table = make_table();
        table.age(1000);
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 2);

        table.age(2000);
        let aged = table.get(&make_addr(0xbb)).unwrap().remaining_ms;
        assert!(aged < 10_000);

        // same distance: no refresh
        table.add_or_update(make_addr(0xbb), make_addr(0x22), 2);
        assert_eq!(table.get(&make_addr(0xbb)).unwrap().remaining_ms, aged);

        // shorter: refreshed
        table.add_or_update(make_addr(0xbb), make_addr(0x33), 1);
        assert_eq!(table.get(&make_addr(0xbb)).unwrap().remaining_ms, 10_000);
    }
}
