//! In-process simulated radio.
//!
//! [`SimBus`] is a shared broadcast medium; [`SimDriver`] implements the
//! [`Driver`] contract against it. Every transmission is queued on the
//! bus and propagated by [`SimBus::deliver`], which plays the interrupt
//! side of every attached node: receivers get `frame_received`, the
//! sender gets `send_status`. Tests drive topologies by cutting links
//! and taking nodes offline.
//!
//! Semantics mirror a real half-duplex radio:
//! - a unicast send reports ok iff the addressed node is attached,
//!   online, and not cut off from the sender,
//! - a broadcast send always reports ok; reachable nodes receive it,
//! - a node never receives its own transmission.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::address::Address;

use super::driver::{Driver, DriverError};
use super::isr::IsrHandle;

struct Transmission {
    src: Address,
    dst: Address,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct BusInner {
    /// Interrupt hooks of attached nodes, present once initialized.
    nodes: HashMap<Address, Option<IsrHandle>>,
    /// Transmissions awaiting [`SimBus::deliver`].
    in_flight: VecDeque<Transmission>,
    /// Nodes that neither receive nor confirm reception.
    offline: HashSet<Address>,
    /// Severed pairs, stored in normalized order.
    cut: HashSet<(Address, Address)>,
}

impl BusInner {
    fn pair(a: Address, b: Address) -> (Address, Address) {
        if a.as_bytes() <= b.as_bytes() {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn reachable(&self, from: Address, to: Address) -> bool {
        !self.offline.contains(&to) && !self.cut.contains(&Self::pair(from, to))
    }
}

/// A shared in-process radio medium.
#[derive(Clone, Default)]
pub struct SimBus {
    inner: Arc<Mutex<BusInner>>,
}

impl SimBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node and return its driver.
    pub fn attach(&self, addr: Address) -> SimDriver {
        self.lock().nodes.insert(addr, None);
        SimDriver {
            bus: self.inner.clone(),
            addr,
        }
    }

    /// Take a node off the air (or back on).
    pub fn set_offline(&self, addr: Address, offline: bool) {
        let mut inner = self.lock();
        if offline {
            inner.offline.insert(addr);
        } else {
            inner.offline.remove(&addr);
        }
    }

    /// Sever the path between two nodes in both directions.
    pub fn cut_link(&self, a: Address, b: Address) {
        let pair = BusInner::pair(a, b);
        self.lock().cut.insert(pair);
    }

    /// Restore a previously cut path.
    pub fn restore_link(&self, a: Address, b: Address) {
        let pair = BusInner::pair(a, b);
        self.lock().cut.remove(&pair);
    }

    /// Propagate every queued transmission: deliver frames to reachable
    /// receivers and report each sender's status.
    pub fn deliver(&self) {
        let mut inner = self.lock();
        while let Some(tx) = inner.in_flight.pop_front() {
            let ok = if tx.dst.is_broadcast() {
                let receivers: Vec<IsrHandle> = inner
                    .nodes
                    .iter()
                    .filter(|(addr, isr)| {
                        **addr != tx.src && isr.is_some() && inner.reachable(tx.src, **addr)
                    })
                    .filter_map(|(_, isr)| isr.clone())
                    .collect();
                for isr in receivers {
                    isr.frame_received(tx.src, &tx.bytes);
                }
                // entering the air is all a broadcast can confirm
                true
            } else {
                let reachable = inner.reachable(tx.src, tx.dst);
                match inner.nodes.get(&tx.dst) {
                    Some(Some(isr)) if reachable => {
                        isr.frame_received(tx.src, &tx.bytes);
                        true
                    }
                    _ => false,
                }
            };

            trace!(src = %tx.src, dst = %tx.dst, ok, "sim delivery");
            if let Some(Some(isr)) = inner.nodes.get(&tx.src) {
                isr.send_status(ok);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Driver for one node attached to a [`SimBus`].
pub struct SimDriver {
    bus: Arc<Mutex<BusInner>>,
    addr: Address,
}

impl SimDriver {
    fn lock(&self) -> MutexGuard<'_, BusInner> {
        match self.bus.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Driver for SimDriver {
    fn init(&mut self, isr: IsrHandle) -> Result<(), DriverError> {
        let mut inner = self.lock();
        match inner.nodes.get_mut(&self.addr) {
            Some(slot) => {
                *slot = Some(isr);
                Ok(())
            }
            None => Err(DriverError::Init(format!(
                "node {} not attached to bus",
                self.addr
            ))),
        }
    }

    fn deinit(&mut self) {
        if let Some(slot) = self.lock().nodes.get_mut(&self.addr) {
            *slot = None;
        }
    }

    fn local_address(&self) -> Address {
        self.addr
    }

    fn add_peer(&mut self, _addr: &Address, _channel: u8) -> Result<(), DriverError> {
        // the simulated medium has no peer table
        Ok(())
    }

    fn del_peer(&mut self, _addr: &Address) -> Result<(), DriverError> {
        Ok(())
    }

    fn send(&mut self, dst: &Address, bytes: &[u8]) -> Result<(), DriverError> {
        let mut inner = self.lock();
        if !matches!(inner.nodes.get(&self.addr), Some(Some(_))) {
            return Err(DriverError::NotInitialized);
        }
        inner.in_flight.push_back(Transmission {
            src: self.addr,
            dst: *dst,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
