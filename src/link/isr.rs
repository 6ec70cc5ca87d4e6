//! Interrupt-side shared state.
//!
//! The radio driver's receive and send-status callbacks run in interrupt
//! context at arbitrary times. Everything they touch lives in one shared
//! structure with two cells:
//!
//! - a single-slot ingress cell for the most recent frame, taken with
//!   `try_lock` so the interrupt side drops a frame instead of waiting
//!   when the cooperative side is mid-copy,
//! - a send-status word recording the outcome of the last transmission.
//!
//! The cooperative side polls both from the adapter's `tick()`. Atomics
//! carry acquire/release ordering so the flag publish is never observed
//! before the data it guards.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::address::Address;
use crate::frame::{HEADER_SIZE, MAX_FRAME_SIZE};

const STATUS_NONE: u8 = 0;
const STATUS_OK: u8 = 1;
const STATUS_ERR: u8 = 2;

/// A raw frame as captured by the receive interrupt: the immediate
/// sender's link address plus the undecoded bytes.
#[derive(Clone)]
pub(crate) struct RawIngress {
    pub src: Address,
    pub len: usize,
    pub bytes: [u8; MAX_FRAME_SIZE],
}

/// Shared cells between interrupt and cooperative context.
struct IsrShared {
    /// Single-slot "new frame" cell.
    slot: Mutex<Option<RawIngress>>,
    /// Set after the slot is written, cleared when the slot is drained.
    new_data: AtomicBool,
    /// Outcome of the last transmission: none / ok / err.
    send_status: AtomicU8,
}

/// Handle the driver uses to report interrupt events into the adapter.
///
/// Cloneable and safe to invoke from interrupt context: neither method
/// blocks. One handle pairs with exactly one [`LinkAdapter`]; the
/// adapter passes it to [`Driver::init`].
///
/// [`Driver::init`]: super::driver::Driver::init
/// [`LinkAdapter`]: super::LinkAdapter
#[derive(Clone)]
pub struct IsrHandle(Arc<IsrShared>);

impl IsrHandle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(IsrShared {
            slot: Mutex::new(None),
            new_data: AtomicBool::new(false),
            send_status: AtomicU8::new(STATUS_NONE),
        }))
    }

    /// Record a received frame. Invoked by the driver's receive interrupt.
    ///
    /// Frames shorter than the 18-byte header or longer than a legal
    /// frame are dropped here. If the cooperative side currently holds
    /// the slot the frame is dropped as back-pressure; a frame already
    /// waiting in the slot is overwritten by a newer one.
    pub fn frame_received(&self, src: Address, bytes: &[u8]) {
        if bytes.len() < HEADER_SIZE || bytes.len() > MAX_FRAME_SIZE {
            return;
        }

        let Ok(mut slot) = self.0.slot.try_lock() else {
            return;
        };

        let mut raw = RawIngress {
            src,
            len: bytes.len(),
            bytes: [0u8; MAX_FRAME_SIZE],
        };
        raw.bytes[..bytes.len()].copy_from_slice(bytes);
        *slot = Some(raw);
        drop(slot);

        self.0.new_data.store(true, Ordering::Release);
    }

    /// Record the outcome of the last transmission. Invoked by the
    /// driver's send-status interrupt.
    pub fn send_status(&self, ok: bool) {
        let status = if ok { STATUS_OK } else { STATUS_ERR };
        self.0.send_status.store(status, Ordering::Release);
    }

    /// Drain the ingress slot. Cooperative side only.
    pub(crate) fn take_ingress(&self) -> Option<RawIngress> {
        if !self.0.new_data.swap(false, Ordering::Acquire) {
            return None;
        }
        let mut slot = match self.0.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }

    /// Drain the send-status cell. Cooperative side only.
    pub(crate) fn take_status(&self) -> Option<bool> {
        match self.0.send_status.swap(STATUS_NONE, Ordering::AcqRel) {
            STATUS_OK => Some(true),
            STATUS_ERR => Some(false),
            _ => None,
        }
    }

    /// Discard any buffered interrupt state.
    pub(crate) fn reset(&self) {
        self.0.new_data.store(false, Ordering::Release);
        self.0.send_status.store(STATUS_NONE, Ordering::Release);
        let mut slot = match self.0.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}
