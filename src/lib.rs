//! airmesh: a small wireless mesh message engine
//!
//! Reliable, loop-free delivery of short datagrams over an unreliable
//! single-hop broadcast link, built for constrained hosts that expose an
//! ESP-NOW-class primitive: send one frame, learn the outcome from an
//! interrupt, receive frames from an interrupt.
//!
//! Three layers, leaves first:
//!
//! - [`LinkAdapter`] serializes one outbound frame at a time over the
//!   driver, with bounded link-layer retries and interrupt-safe ingress
//!   buffering.
//! - [`MeshDevice`] adds end-to-end semantics: framing, a single
//!   outbound queue, duplicate suppression, acknowledgements with
//!   timeouts, and dispatch to application callbacks.
//! - [`MeshRouter`] is a device whose routing policy forwards frames
//!   addressed to other nodes and learns next hops from traffic.
//!
//! Scheduling is cooperative: each layer exposes a `tick()` driven from
//! the host's main loop with host-supplied millisecond time. The only
//! preemption is the radio interrupt, which is confined to the link
//! adapter's shared cells.

pub mod address;
pub mod clock;
pub mod config;
pub mod device;
pub mod frame;
pub mod link;
pub mod router;

// Re-export address types
pub use address::{Address, AddressParseError};

// Re-export configuration types
pub use config::{
    ConfigError, ConfirmConfig, LinkConfig, MeshConfig, QueueConfig, RoutingConfig, SeenConfig,
};

// Re-export wire format types
pub use frame::{Frame, FrameError, FrameType, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD};

// Re-export link layer types
pub use link::driver::{Driver, DriverError};
pub use link::isr::IsrHandle;
pub use link::sim::{SimBus, SimDriver};
pub use link::{LinkAdapter, LinkError, LinkTick, ReceivedFrame, SendStatus};

// Re-export device types
pub use device::{Leaf, MeshDevice, MeshError, OutboundMessage, QueuedKind, RouteCtx, Routing};

// Re-export router types
pub use router::{MeshRouter, Router, RoutingEntry, RoutingTable};
