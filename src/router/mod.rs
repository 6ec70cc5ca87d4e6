//! Forwarding router.
//!
//! A router is a mesh device whose [`Routing`] policy relays frames
//! addressed to other nodes and maintains a [`RoutingTable`] learned
//! from traffic. Forwarding is TTL-bounded and duplicate-suppressed so
//! broadcast storms die out after one pass per node.

pub mod table;

#[cfg(test)]
mod tests;

use tracing::{debug, trace, warn};

use crate::address::Address;
use crate::config::{MeshConfig, RoutingConfig};
use crate::device::{MeshDevice, OutboundMessage, QueuedKind, RouteCtx, Routing};
use crate::frame::Frame;
use crate::link::driver::Driver;

pub use table::{RoutingEntry, RoutingTable};

/// A mesh device that forwards.
pub type MeshRouter<D> = MeshDevice<D, Router>;

impl<D: Driver> MeshDevice<D, Router> {
    /// Create a forwarding device.
    pub fn router(driver: D, config: MeshConfig) -> Self {
        let routing = Router::new(&config.routing);
        MeshDevice::with_routing(driver, config, routing)
    }
}

/// Forwarding policy: relay foreign frames and learn routes from every
/// frame that passes through.
pub struct Router {
    table: RoutingTable,
}

impl Router {
    /// Create a router policy with an empty table.
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            table: RoutingTable::new(config),
        }
    }

    /// The learned routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}

impl Routing for Router {
    /// Prefer a learned route; fall back to broadcast.
    fn next_hop(&self, dst: &Address) -> Address {
        self.table.next_hop(dst).unwrap_or(Address::BROADCAST)
    }

    /// Relay a frame addressed to another node.
    ///
    /// The TTL check runs first: a frame that arrives with one hop left
    /// has spent its budget here. Dedup runs under the `Forwarded` kind,
    /// so the same frame is relayed at most once per node while the
    /// node can still deliver its own copy.
    fn on_foreign(&mut self, frame: &Frame, ctx: &mut RouteCtx<'_>) {
        if frame.hop_count <= 1 {
            debug!(id = frame.id, src = %frame.src_addr, "hop budget exhausted, not forwarding");
            return;
        }
        if ctx.already_seen(frame, QueuedKind::Forwarded) {
            trace!(id = frame.id, src = %frame.src_addr, "already forwarded, dropping");
            return;
        }
        ctx.remember(frame, QueuedKind::Forwarded);

        let mut forwarded = frame.clone();
        forwarded.hop_count -= 1;

        trace!(
            id = forwarded.id,
            dst = %forwarded.dst_addr,
            hop_count = forwarded.hop_count,
            "forwarding frame"
        );
        let queued = ctx.enqueue(OutboundMessage {
            kind: QueuedKind::Forwarded,
            channel: 0,
            frame: forwarded,
        });
        if !queued {
            warn!(id = frame.id, "outbound queue full, forward dropped");
        }
    }

    fn observe(&mut self, src: &Address, link: &Address, hops: u8, _now_ms: u64) {
        self.table.add_or_update(*src, *link, hops);
    }

    fn tick(&mut self, now_ms: u64) {
        self.table.age(now_ms);
    }
}
