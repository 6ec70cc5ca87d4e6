//! Millisecond time source for std hosts.
//!
//! The engine itself never reads the clock: every `tick()` takes the
//! current time in milliseconds from the host loop, so embedded ports
//! can feed their own monotonic counter and tests can drive virtual
//! time. This helper covers hosts that have a wall clock.

/// Current Unix time in milliseconds, 0 if the clock is unset.
pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
