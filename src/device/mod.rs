//! Per-node mesh engine.
//!
//! A [`MeshDevice`] drives end-to-end message semantics over one
//! [`LinkAdapter`]: framing, a single outbound queue, duplicate
//! suppression, acknowledgements with timeouts, and dispatch to the
//! application callbacks. Everything advances from [`MeshDevice::tick`],
//! called from the host's main loop; there is no internal thread.
//!
//! Forwarding behavior is pluggable through the [`Routing`] seam: a
//! [`Leaf`] device drops frames addressed to other nodes, a
//! [`Router`](crate::router::Router) forwards them and learns routes.

mod pending;
mod seen;

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::address::Address;
use crate::config::MeshConfig;
use crate::frame::{Frame, FrameError, FrameType};
use crate::link::driver::{Driver, DriverError};
use crate::link::{LinkAdapter, LinkError, ReceivedFrame, SendStatus};

use pending::PendingConfirmations;
use seen::SeenSet;

/// Errors surfaced to callers of the device API.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("outbound queue full")]
    QueueFull,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Role of an entry in the outbound queue, and the discriminator in the
/// duplicate-suppression key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuedKind {
    /// Locally originated fire-and-forget message.
    Unconfirmed,
    /// Locally originated message awaiting an end-to-end ack.
    Confirmed,
    /// Frame in transit on behalf of another node.
    Forwarded,
    /// Acknowledgement synthesized for a received confirmed frame.
    Ack,
}

impl From<FrameType> for QueuedKind {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Unconfirmed => QueuedKind::Unconfirmed,
            FrameType::Confirmed => QueuedKind::Confirmed,
            FrameType::Ack => QueuedKind::Ack,
        }
    }
}

/// One outbound queue entry.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// What this frame is to the local node.
    pub kind: QueuedKind,
    /// Radio channel to transmit on (0 = current).
    pub channel: u8,
    /// The frame as it will appear on the wire.
    pub frame: Frame,
}

/// Device internals a [`Routing`] implementation may touch while
/// handling a frame addressed to another node.
pub struct RouteCtx<'a> {
    seen: &'a mut SeenSet,
    queue: &'a mut VecDeque<OutboundMessage>,
    capacity: usize,
}

impl RouteCtx<'_> {
    /// Whether the frame was already observed under this kind.
    pub fn already_seen(&self, frame: &Frame, kind: QueuedKind) -> bool {
        self.seen.contains(frame, kind)
    }

    /// Record the frame in the duplicate-suppression set.
    pub fn remember(&mut self, frame: &Frame, kind: QueuedKind) {
        self.seen.remember(frame, kind);
    }

    /// Append to the outbound queue. Returns false when the queue is at
    /// capacity and the message was dropped.
    pub fn enqueue(&mut self, message: OutboundMessage) -> bool {
        if self.queue.len() >= self.capacity {
            return false;
        }
        self.queue.push_back(message);
        true
    }
}

/// Per-node forwarding and next-hop policy.
///
/// This is the seam between the plain device and the router: the device
/// consults it for the link destination of every outbound frame and
/// hands it every frame addressed to another node.
pub trait Routing {
    /// Link address to transmit to in order to reach `dst`.
    fn next_hop(&self, dst: &Address) -> Address;

    /// Handle a valid frame whose destination is another node.
    fn on_foreign(&mut self, frame: &Frame, ctx: &mut RouteCtx<'_>);

    /// Observe a valid received frame for route learning. `link` is the
    /// immediate sender, `hops` the inferred distance to `src`.
    fn observe(&mut self, _src: &Address, _link: &Address, _hops: u8, _now_ms: u64) {}

    /// Periodic maintenance (table aging).
    fn tick(&mut self, _now_ms: u64) {}
}

/// Non-forwarding endpoint policy: every transmission is broadcast and
/// frames for other nodes are dropped.
pub struct Leaf;

impl Routing for Leaf {
    fn next_hop(&self, _dst: &Address) -> Address {
        Address::BROADCAST
    }

    fn on_foreign(&mut self, frame: &Frame, _ctx: &mut RouteCtx<'_>) {
        trace!(dst = %frame.dst_addr, "not a router, dropping foreign frame");
    }
}

type OnMessage = Box<dyn FnMut(FrameType, Address, &[u8]) + Send>;
type OnStatus = Box<dyn FnMut(SendStatus) + Send>;

/// A mesh network endpoint.
///
/// Owns its link adapter, outbound queue, pending-ack set, and seen-set
/// exclusively; nothing is shared between devices.
pub struct MeshDevice<D: Driver, R: Routing = Leaf> {
    link: LinkAdapter<D>,
    routing: R,
    config: MeshConfig,
    queue: VecDeque<OutboundMessage>,
    pending: PendingConfirmations,
    seen: SeenSet,
    /// A queue head has been handed to the link and its completion has
    /// not fired yet.
    send_in_progress: bool,
    next_id: u8,
    last_timeout_check_ms: Option<u64>,
    on_message: Option<OnMessage>,
    on_status: Option<OnStatus>,
    started: bool,
}

impl<D: Driver> MeshDevice<D, Leaf> {
    /// Create a non-forwarding device.
    pub fn new(driver: D, config: MeshConfig) -> Self {
        Self::with_routing(driver, config, Leaf)
    }
}

impl<D: Driver, R: Routing> MeshDevice<D, R> {
    /// Create a device with an explicit routing policy.
    pub fn with_routing(driver: D, config: MeshConfig, routing: R) -> Self {
        let link = LinkAdapter::new(driver, &config.link);
        let seen = SeenSet::new(&config.seen);
        Self {
            link,
            routing,
            queue: VecDeque::new(),
            pending: PendingConfirmations::new(),
            seen,
            send_in_progress: false,
            // random start so a reboot does not reuse ids still alive in
            // peers' seen-sets
            next_id: rand::random(),
            last_timeout_check_ms: None,
            on_message: None,
            on_status: None,
            started: false,
            config,
        }
    }

    /// Initialize the radio and start processing.
    pub fn begin(&mut self) -> Result<(), MeshError> {
        self.link.begin()?;
        self.started = true;
        info!(local = %self.link.local_address(), "mesh device started");
        Ok(())
    }

    /// Unregister callbacks and tear down the radio. In-flight sends
    /// lose their completion path; callers get no further callbacks.
    pub fn stop(&mut self) {
        self.link.stop();
        self.on_message = None;
        self.on_status = None;
        self.queue.clear();
        self.pending = PendingConfirmations::new();
        self.send_in_progress = false;
        self.last_timeout_check_ms = None;
        self.started = false;
    }

    /// The local link address.
    pub fn local_address(&self) -> Address {
        self.link.local_address()
    }

    /// The routing policy.
    pub fn routing(&self) -> &R {
        &self.routing
    }

    /// Callback for frames addressed to this node: `(type, source,
    /// payload)`.
    pub fn set_on_message<F>(&mut self, callback: F)
    where
        F: FnMut(FrameType, Address, &[u8]) + Send + 'static,
    {
        self.on_message = Some(Box::new(callback));
    }

    /// Callback for the end-to-end outcome of confirmed sends. Fires at
    /// most once per send: `Success` on ack, `Fail` on link failure or
    /// timeout, `Broadcast` for broadcast destinations.
    pub fn set_on_status<F>(&mut self, callback: F)
    where
        F: FnMut(SendStatus) + Send + 'static,
    {
        self.on_status = Some(Box::new(callback));
    }

    /// Enqueue a fire-and-forget message.
    pub fn send_message(&mut self, payload: &[u8], dst: Address) -> Result<(), MeshError> {
        self.enqueue_new(payload, dst, FrameType::Unconfirmed)
    }

    /// Enqueue a message that expects an end-to-end acknowledgement.
    pub fn send_confirmed_message(&mut self, payload: &[u8], dst: Address) -> Result<(), MeshError> {
        self.enqueue_new(payload, dst, FrameType::Confirmed)
    }

    /// Advance the device: link adapter first, then maintenance, then
    /// the next queued transmission.
    pub fn tick(&mut self, now_ms: u64) {
        if !self.started {
            return;
        }

        let link_tick = self.link.tick(now_ms);
        if let Some(outcome) = link_tick.sent {
            self.complete_send(outcome);
        }
        if let Some(received) = link_tick.received {
            self.handle_ingress(received, now_ms);
        }

        self.seen.maintain(now_ms);
        self.check_confirm_timeouts(now_ms);
        self.routing.tick(now_ms);

        self.process_next_message();
    }

    fn enqueue_new(
        &mut self,
        payload: &[u8],
        dst: Address,
        frame_type: FrameType,
    ) -> Result<(), MeshError> {
        if self.queue.len() >= self.config.queue.capacity {
            return Err(MeshError::QueueFull);
        }

        let frame = Frame::new(
            self.config.network_id,
            frame_type,
            self.next_message_id(),
            self.config.initial_hop_count,
            self.link.local_address(),
            dst,
            payload.to_vec(),
        )?;

        trace!(id = frame.id, dst = %dst, kind = %frame_type, "message queued");
        self.queue.push_back(OutboundMessage {
            kind: QueuedKind::from(frame_type),
            channel: 0,
            frame,
        });
        Ok(())
    }

    /// Per-source message id. Wrap-around is fine: the seen-set key
    /// includes both addresses and entries expire long before an id
    /// comes around again at realistic send rates.
    fn next_message_id(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Resolve a completed link-level send against the queue head.
    fn complete_send(&mut self, outcome: SendStatus) {
        self.send_in_progress = false;
        let Some(head) = self.queue.pop_front() else {
            warn!("link completion with an empty queue");
            return;
        };

        if head.kind != QueuedKind::Confirmed {
            trace!(kind = ?head.kind, status = %outcome, "send complete");
            return;
        }

        match outcome {
            SendStatus::Fail => {
                self.pending.remove(head.frame.id, &head.frame.dst_addr);
                debug!(id = head.frame.id, dst = %head.frame.dst_addr, "confirmed send failed at link layer");
                self.emit_status(SendStatus::Fail);
            }
            SendStatus::Broadcast if head.frame.dst_addr.is_broadcast() => {
                // a broadcast destination can never be acked reliably;
                // report now and absorb any late acks silently
                self.pending.mark_reported(head.frame.id, &head.frame.dst_addr);
                self.emit_status(SendStatus::Broadcast);
            }
            _ => {
                // delivered to the next hop (or broadcast carrying a
                // unicast frame): the ack or the timeout decides
            }
        }
    }

    fn handle_ingress(&mut self, received: ReceivedFrame, now_ms: u64) {
        let frame = match Frame::decode(&received.bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(src = %received.src, error = %e, "malformed frame dropped");
                return;
            }
        };

        if frame.network_id != self.config.network_id {
            debug!(network_id = frame.network_id, "frame from another network dropped");
            return;
        }

        let local = self.link.local_address();

        // route learning: the immediate sender reaches frame.src_addr in
        // (initial_hop - hop_count) forwards, so our distance is one more
        if frame.src_addr != local && !frame.src_addr.is_broadcast() {
            let hops = self
                .config
                .initial_hop_count
                .saturating_sub(frame.hop_count)
                .saturating_add(1);
            self.routing.observe(&frame.src_addr, &received.src, hops, now_ms);
        }

        if frame.dst_addr == local {
            self.handle_own(frame);
        } else {
            let mut ctx = RouteCtx {
                seen: &mut self.seen,
                queue: &mut self.queue,
                capacity: self.config.queue.capacity,
            };
            self.routing.on_foreign(&frame, &mut ctx);
        }
    }

    /// Process a frame addressed to this node.
    fn handle_own(&mut self, frame: Frame) {
        let kind = QueuedKind::from(frame.frame_type);
        let duplicate = self.seen.contains(&frame, kind);

        // confirmed frames are acked even when duplicate: the first ack
        // may have been lost and the sender is still waiting
        if frame.frame_type == FrameType::Confirmed {
            self.enqueue_ack(&frame);
        }

        if duplicate {
            trace!(id = frame.id, src = %frame.src_addr, "duplicate frame dropped");
            return;
        }
        self.seen.remember(&frame, kind);

        match frame.frame_type {
            FrameType::Unconfirmed | FrameType::Confirmed => {
                debug!(id = frame.id, src = %frame.src_addr, len = frame.payload.len(), "message delivered");
                self.emit_message(&frame);
            }
            FrameType::Ack => self.process_ack(&frame),
        }
    }

    /// Queue an acknowledgement back to the frame's source.
    fn enqueue_ack(&mut self, frame: &Frame) {
        let ack = match Frame::new(
            self.config.network_id,
            FrameType::Ack,
            frame.id,
            self.config.initial_hop_count,
            self.link.local_address(),
            frame.src_addr,
            Vec::new(),
        ) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "could not build ack");
                return;
            }
        };

        if self.queue.len() >= self.config.queue.capacity {
            warn!(id = frame.id, dst = %frame.src_addr, "outbound queue full, ack dropped");
            return;
        }
        self.queue.push_back(OutboundMessage {
            kind: QueuedKind::Ack,
            channel: 0,
            frame: ack,
        });
    }

    /// Match an ack against a pending confirmed send.
    fn process_ack(&mut self, frame: &Frame) {
        match self.pending.acknowledge(frame.id, &frame.src_addr) {
            Some(false) => {
                debug!(id = frame.id, from = %frame.src_addr, "confirmed send acknowledged");
                self.emit_status(SendStatus::Success);
            }
            Some(true) => {
                // outcome was already reported (broadcast destination)
            }
            None => {
                trace!(id = frame.id, from = %frame.src_addr, "ack without pending entry");
            }
        }
    }

    /// Expire pending confirmations and report their failures.
    fn check_confirm_timeouts(&mut self, now_ms: u64) {
        let last = match self.last_timeout_check_ms {
            Some(ts) => ts,
            None => {
                self.last_timeout_check_ms = Some(now_ms);
                return;
            }
        };
        let elapsed = now_ms.saturating_sub(last);
        self.last_timeout_check_ms = Some(now_ms);
        if elapsed == 0 || self.pending.is_empty() {
            return;
        }

        for entry in self.pending.expire(elapsed) {
            debug!(id = entry.id, dst = %entry.dst, "confirmation timed out");
            if !entry.reported {
                self.emit_status(SendStatus::Fail);
            }
        }
    }

    /// Hand the queue head to the link when both sides are idle.
    fn process_next_message(&mut self) {
        if self.send_in_progress || !self.link.sending_possible() {
            return;
        }
        let Some(head) = self.queue.front() else {
            return;
        };

        let next_hop = self.routing.next_hop(&head.frame.dst_addr);
        let bytes = head.frame.encode();
        let id = head.frame.id;
        let dst = head.frame.dst_addr;
        let kind = head.kind;
        let channel = head.channel;

        match self
            .link
            .send(&next_hop, &bytes, self.config.link.max_tries, channel)
        {
            Ok(()) => {
                trace!(id, dst = %dst, via = %next_hop, "frame handed to link");
                self.send_in_progress = true;
                if kind == QueuedKind::Confirmed {
                    self.pending.track(id, dst, self.config.confirm.timeout_ms);
                }
            }
            Err(e) => {
                // never went out; drop the head rather than wedge the queue
                debug!(id, dst = %dst, error = %e, "link rejected frame, dropping");
                self.queue.pop_front();
            }
        }
    }

    fn emit_message(&mut self, frame: &Frame) {
        if let Some(callback) = self.on_message.as_mut() {
            callback(frame.frame_type, frame.src_addr, &frame.payload);
        }
    }

    fn emit_status(&mut self, status: SendStatus) {
        if let Some(callback) = self.on_status.as_mut() {
            callback(status);
        }
    }
}
