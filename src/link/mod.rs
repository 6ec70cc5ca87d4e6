//! Link adapter: single-in-flight sends over an asynchronous driver.
//!
//! The adapter owns the radio driver and bridges its interrupt-driven
//! world into the cooperative one. Egress is a one-deep staging area
//! with bounded link-layer retries; ingress is the interrupt slot
//! drained into a bounded queue. Everything advances from [`LinkAdapter::tick`],
//! which reports what happened as a [`LinkTick`] event record for the
//! owning device to consume.
//!
//! ## Send machine
//!
//! ```text
//! Idle --send()--> Armed --tick, interval elapsed--> InFlight
//! InFlight + status ok            -> report Success (Broadcast if dst is broadcast), Idle
//! InFlight + status err, tries>0  -> Armed (retry)
//! InFlight + status err, tries==0 -> report Fail, Idle
//! ```
//!
//! A driver "ok" for a broadcast frame only means the frame entered the
//! air; the outcome is remapped to [`SendStatus::Broadcast`] so upper
//! layers never mistake it for delivery.

pub mod driver;
pub mod isr;
pub mod sim;

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use crate::address::Address;
use crate::config::LinkConfig;
use crate::frame::MAX_FRAME_SIZE;

use driver::{Driver, DriverError};
use isr::IsrHandle;

/// Errors from the link adapter.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("a send is already in flight")]
    Busy,

    #[error("adapter not started")]
    NotStarted,

    #[error("frame too large: max {max}, got {got}")]
    FrameTooLarge { max: usize, got: usize },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Terminal outcome of one staged send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// The frame reached the addressed peer's link layer.
    Success,
    /// The frame was broadcast; no peer confirmed reception.
    Broadcast,
    /// All link-layer tries failed.
    Fail,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendStatus::Success => "success",
            SendStatus::Broadcast => "broadcast",
            SendStatus::Fail => "fail",
        };
        write!(f, "{}", name)
    }
}

/// A frame delivered by the radio, before decoding.
#[derive(Clone, Debug)]
pub struct ReceivedFrame {
    /// Link address of the immediate sender.
    pub src: Address,
    /// Raw frame bytes (at least one header long).
    pub bytes: Vec<u8>,
}

/// What one adapter tick produced.
#[derive(Default)]
pub struct LinkTick {
    /// Terminal outcome of the staged send, if it completed this tick.
    pub sent: Option<SendStatus>,
    /// One buffered ingress frame, if any.
    pub received: Option<ReceivedFrame>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendState {
    /// Staged, waiting for the send interval.
    Armed,
    /// Handed to the driver, awaiting its status interrupt.
    InFlight,
}

struct StagedSend {
    dst: Address,
    channel: u8,
    bytes: Vec<u8>,
    tries_left: u8,
    state: SendState,
}

/// Serializes sends over a half-duplex driver and buffers ingress.
///
/// One adapter owns one driver instance; the interrupt-facing state is
/// confined to the [`IsrHandle`] it registers at [`begin`].
///
/// [`begin`]: LinkAdapter::begin
pub struct LinkAdapter<D: Driver> {
    driver: D,
    isr: IsrHandle,
    ingress: VecDeque<ReceivedFrame>,
    ingress_capacity: usize,
    staged: Option<StagedSend>,
    send_interval_ms: u64,
    last_attempt_ms: u64,
    local: Address,
    started: bool,
}

impl<D: Driver> LinkAdapter<D> {
    /// Create an adapter over the given driver. Call [`begin`] before use.
    ///
    /// [`begin`]: LinkAdapter::begin
    pub fn new(driver: D, config: &LinkConfig) -> Self {
        let local = driver.local_address();
        Self {
            driver,
            isr: IsrHandle::new(),
            ingress: VecDeque::new(),
            ingress_capacity: config.ingress_capacity,
            staged: None,
            send_interval_ms: config.send_interval_ms,
            last_attempt_ms: 0,
            local,
            started: false,
        }
    }

    /// Initialize the driver and register the interrupt hooks.
    pub fn begin(&mut self) -> Result<(), DriverError> {
        self.isr.reset();
        self.driver.init(self.isr.clone())?;
        self.local = self.driver.local_address();
        self.started = true;
        debug!(local = %self.local, "link adapter started");
        Ok(())
    }

    /// Unregister hooks and tear down the driver. A staged send loses
    /// its completion path.
    pub fn stop(&mut self) {
        self.driver.deinit();
        self.isr.reset();
        self.staged = None;
        self.ingress.clear();
        self.started = false;
    }

    /// The local link address.
    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Whether a new send would be accepted.
    pub fn sending_possible(&self) -> bool {
        self.started && self.staged.is_none()
    }

    /// Stage one frame for transmission.
    ///
    /// Rejects with [`LinkError::Busy`] while a previous send awaits its
    /// outcome. `max_tries` bounds link-layer attempts; `channel` 0 is
    /// the current radio channel.
    pub fn send(
        &mut self,
        dst: &Address,
        bytes: &[u8],
        max_tries: u8,
        channel: u8,
    ) -> Result<(), LinkError> {
        if !self.started {
            return Err(LinkError::NotStarted);
        }
        if self.staged.is_some() {
            return Err(LinkError::Busy);
        }
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(LinkError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
                got: bytes.len(),
            });
        }

        self.staged = Some(StagedSend {
            dst: *dst,
            channel,
            bytes: bytes.to_vec(),
            tries_left: max_tries.max(1),
            state: SendState::Armed,
        });
        trace!(dst = %dst, len = bytes.len(), "send staged");
        Ok(())
    }

    /// Advance the adapter: drain the interrupt slot, reconcile a
    /// pending send status, emit the staged frame when eligible, and
    /// hand back one buffered ingress frame.
    pub fn tick(&mut self, now_ms: u64) -> LinkTick {
        let mut tick = LinkTick::default();
        if !self.started {
            return tick;
        }

        // (a) move captured frames into the cooperative queue
        while let Some(raw) = self.isr.take_ingress() {
            if self.ingress.len() >= self.ingress_capacity {
                debug!("ingress queue full, dropping oldest frame");
                self.ingress.pop_front();
            }
            self.ingress.push_back(ReceivedFrame {
                src: raw.src,
                bytes: raw.bytes[..raw.len].to_vec(),
            });
        }

        // (b) reconcile the driver's status report
        if let Some(ok) = self.isr.take_status() {
            tick.sent = self.reconcile(ok);
        }

        // (c) emit the staged frame once the interval has elapsed
        let armed = self
            .staged
            .as_ref()
            .is_some_and(|s| s.state == SendState::Armed);
        if armed && now_ms.saturating_sub(self.last_attempt_ms) >= self.send_interval_ms {
            if let Some(fail) = self.issue(now_ms) {
                tick.sent = Some(fail);
            }
        }

        // (d) dispatch one buffered ingress frame
        tick.received = self.ingress.pop_front();
        tick
    }

    /// Apply a status interrupt to the in-flight send.
    fn reconcile(&mut self, ok: bool) -> Option<SendStatus> {
        let staged = self.staged.as_mut()?;
        if staged.state != SendState::InFlight {
            // stale report from a cancelled or torn-down send
            return None;
        }

        if ok {
            let status = if staged.dst.is_broadcast() {
                SendStatus::Broadcast
            } else {
                SendStatus::Success
            };
            trace!(dst = %staged.dst, status = %status, "send complete");
            self.staged = None;
            Some(status)
        } else if staged.tries_left == 0 {
            debug!(dst = %staged.dst, "send failed, tries exhausted");
            self.staged = None;
            Some(SendStatus::Fail)
        } else {
            trace!(dst = %staged.dst, tries_left = staged.tries_left, "send failed, retrying");
            staged.state = SendState::Armed;
            None
        }
    }

    /// Hand the staged frame to the driver. Returns a terminal `Fail`
    /// when the driver rejects the transmission outright.
    fn issue(&mut self, now_ms: u64) -> Option<SendStatus> {
        self.last_attempt_ms = now_ms;
        if let Some(staged) = self.staged.as_mut() {
            staged.tries_left = staged.tries_left.saturating_sub(1);
            staged.state = SendState::InFlight;
        }

        let result = match self.staged.as_ref() {
            Some(staged) => self
                .driver
                .add_peer(&staged.dst, staged.channel)
                .and_then(|_| self.driver.send(&staged.dst, &staged.bytes)),
            None => return None,
        };
        if let Some(staged) = self.staged.as_ref() {
            let _ = self.driver.del_peer(&staged.dst);
        }

        match result {
            Ok(()) => None,
            Err(e) => {
                debug!(error = %e, "driver rejected transmission");
                self.staged = None;
                Some(SendStatus::Fail)
            }
        }
    }
}
