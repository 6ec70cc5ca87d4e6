//! Radio driver contract.
//!
//! Abstracts an ESP-NOW-class primitive: send one frame to a link
//! address, learn the outcome asynchronously, receive frames through an
//! interrupt. The engine is transport-agnostic; anything that can carry
//! a 250-byte datagram and report per-send status fits behind this
//! trait. `link::sim` provides the in-process implementation used by
//! the test suite.

use thiserror::Error;

use crate::address::Address;

use super::isr::IsrHandle;

/// Errors surfaced by a [`Driver`] implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver initialization failed: {0}")]
    Init(String),

    #[error("driver not initialized")]
    NotInitialized,

    #[error("unknown peer: {0}")]
    UnknownPeer(Address),

    #[error("send rejected: {0}")]
    SendRejected(String),
}

/// A half-duplex single-frame radio driver.
///
/// ## Contract
///
/// - After `init`, the driver invokes [`IsrHandle::frame_received`] from
///   its receive interrupt for every frame that arrives, and
///   [`IsrHandle::send_status`] exactly once per `send` call, reporting
///   whether the frame reached the addressed peer's link layer. For a
///   broadcast destination "ok" only means the frame entered the air.
/// - `send` transmits to a peer previously registered with `add_peer`.
///   The broadcast address is a valid peer.
/// - One in-flight send at a time; the adapter serializes calls.
pub trait Driver {
    /// Initialize the radio and register the interrupt hooks.
    fn init(&mut self, isr: IsrHandle) -> Result<(), DriverError>;

    /// Unregister hooks and tear down the radio.
    fn deinit(&mut self);

    /// The local link address.
    fn local_address(&self) -> Address;

    /// Register a peer for transmission on the given channel
    /// (0 = current channel).
    fn add_peer(&mut self, addr: &Address, channel: u8) -> Result<(), DriverError>;

    /// Remove a previously registered peer.
    fn del_peer(&mut self, addr: &Address) -> Result<(), DriverError>;

    /// Start transmitting one frame. The outcome arrives later through
    /// [`IsrHandle::send_status`].
    fn send(&mut self, dst: &Address, bytes: &[u8]) -> Result<(), DriverError>;
}
