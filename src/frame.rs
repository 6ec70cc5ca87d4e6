//! Wire format parsing and serialization.
//!
//! Every frame on the air is a fixed 18-byte header followed by up to
//! 232 bytes of payload:
//!
//! ```text
//! offset  size  field
//! 0       2     network_id (LE)
//! 2       1     type        (0=Unconfirmed, 1=Confirmed, 3=Ack)
//! 3       1     id          per-source message identifier
//! 4       1     hop_count   forwarding TTL, >= 1 on the wire
//! 5       6     src_addr    original source
//! 11      6     dst_addr    ultimate destination
//! 17      1     len         payload length, 0..=232
//! 18      len   payload
//! ```
//!
//! Decoding is strict: short headers, unknown type values, a zero hop
//! count, and a length byte that disagrees with the buffer are all
//! rejected. Encoding never reinterprets memory; fields are written out
//! one by one.

use std::fmt;

use thiserror::Error;

use crate::address::Address;

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 18;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 232;

/// Maximum total on-wire frame size.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD; // 250 bytes

/// Errors from frame decoding and construction.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short: expected at least {expected}, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("payload too long: max {max}, got {got}")]
    PayloadTooLong { max: usize, got: usize },

    #[error("declared length {declared} does not match {available} payload bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("invalid frame type: 0x{0:02x}")]
    InvalidType(u8),

    #[error("zero hop count")]
    ZeroHopCount,
}

/// Frame type identifiers.
///
/// Value `2` is unassigned and treated as malformed on receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Fire-and-forget datagram.
    Unconfirmed = 0,
    /// End-to-end acknowledged datagram.
    Confirmed = 1,
    /// Zero-payload acknowledgement for a confirmed datagram.
    Ack = 3,
}

impl FrameType {
    /// Try to convert from a wire byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameType::Unconfirmed),
            1 => Some(FrameType::Confirmed),
            3 => Some(FrameType::Ack),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameType::Unconfirmed => "Unconfirmed",
            FrameType::Confirmed => "Confirmed",
            FrameType::Ack => "Ack",
        };
        write!(f, "{}", name)
    }
}

/// A decoded mesh frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Network identifier. Carried on the wire, compared against the
    /// local configuration on receive.
    pub network_id: u16,
    /// Frame type.
    pub frame_type: FrameType,
    /// Per-source message identifier.
    pub id: u8,
    /// Remaining forwarding budget. Decremented by each forwarder.
    pub hop_count: u8,
    /// Original source address.
    pub src_addr: Address,
    /// Ultimate destination address.
    pub dst_addr: Address,
    /// Application payload, at most [`MAX_PAYLOAD`] bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, validating the payload length.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network_id: u16,
        frame_type: FrameType,
        id: u8,
        hop_count: u8,
        src_addr: Address,
        dst_addr: Address,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong {
                max: MAX_PAYLOAD,
                got: payload.len(),
            });
        }
        if hop_count == 0 {
            return Err(FrameError::ZeroHopCount);
        }
        Ok(Self {
            network_id,
            frame_type,
            id,
            hop_count,
            src_addr,
            dst_addr,
            payload,
        })
    }

    /// Total on-wire size of this frame.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize to wire bytes. Emits exactly `18 + len` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_size());
        bytes.extend_from_slice(&self.network_id.to_le_bytes());
        bytes.push(self.frame_type.to_byte());
        bytes.push(self.id);
        bytes.push(self.hop_count);
        bytes.extend_from_slice(self.src_addr.as_bytes());
        bytes.extend_from_slice(self.dst_addr.as_bytes());
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a frame from wire bytes.
    ///
    /// The buffer must contain exactly the frame: a declared length that
    /// disagrees with the remaining bytes is rejected, so a successful
    /// decode guarantees `bytes.len() == 18 + len`.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let network_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let frame_type =
            FrameType::from_byte(bytes[2]).ok_or(FrameError::InvalidType(bytes[2]))?;
        let id = bytes[3];
        let hop_count = bytes[4];
        if hop_count == 0 {
            return Err(FrameError::ZeroHopCount);
        }

        // from_slice cannot fail on fixed 6-byte ranges, but stay total
        let src_addr = Address::from_slice(&bytes[5..11]).ok_or(FrameError::TooShort {
            expected: HEADER_SIZE,
            got: bytes.len(),
        })?;
        let dst_addr = Address::from_slice(&bytes[11..17]).ok_or(FrameError::TooShort {
            expected: HEADER_SIZE,
            got: bytes.len(),
        })?;

        let len = bytes[17] as usize;
        if len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong {
                max: MAX_PAYLOAD,
                got: len,
            });
        }
        let available = bytes.len() - HEADER_SIZE;
        if len != available {
            return Err(FrameError::LengthMismatch {
                declared: len,
                available,
            });
        }

        Ok(Self {
            network_id,
            frame_type,
            id,
            hop_count,
            src_addr,
            dst_addr,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_addr(val: u8) -> Address {
        Address::from_bytes([val, val, val, val, val, 0x01])
    }

    fn make_frame(payload: Vec<u8>) -> Frame {
        Frame::new(
            0,
            FrameType::Confirmed,
            42,
            3,
            make_addr(0xaa),
            make_addr(0xbb),
            payload,
        )
        .unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let frame = make_frame(vec![0xde, 0xad]);
        let bytes = frame.encode();

        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..2], &[0x00, 0x00]); // network_id LE
        assert_eq!(bytes[2], 1); // type
        assert_eq!(bytes[3], 42); // id
        assert_eq!(bytes[4], 3); // hop_count
        assert_eq!(&bytes[5..11], make_addr(0xaa).as_bytes());
        assert_eq!(&bytes[11..17], make_addr(0xbb).as_bytes());
        assert_eq!(bytes[17], 2); // len
        assert_eq!(&bytes[18..], &[0xde, 0xad]);
    }

    #[test]
    fn test_network_id_little_endian() {
        let mut frame = make_frame(vec![]);
        frame.network_id = 0x1234;
        let bytes = frame.encode();
        assert_eq!(bytes[0], 0x34);
        assert_eq!(bytes[1], 0x12);
    }

    #[test]
    fn test_roundtrip() {
        let frame = make_frame(vec![1, 2, 3, 4, 5]);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
        // re-encode is byte-identical
        assert_eq!(decoded.encode(), frame.encode());
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = make_frame(vec![]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            Frame::decode(&[0u8; 17]),
            Err(FrameError::TooShort { .. })
        ));
        assert!(matches!(Frame::decode(&[]), Err(FrameError::TooShort { .. })));
    }

    #[test]
    fn test_decode_invalid_type() {
        let mut bytes = make_frame(vec![]).encode();
        bytes[2] = 2; // unassigned type value
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::InvalidType(2))
        ));

        bytes[2] = 0x7f;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::InvalidType(0x7f))
        ));
    }

    #[test]
    fn test_decode_zero_hop_count() {
        let mut bytes = make_frame(vec![]).encode();
        bytes[4] = 0;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::ZeroHopCount)
        ));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = make_frame(vec![1, 2, 3]).encode();
        bytes[17] = 2; // declares fewer bytes than present
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 2,
                available: 3
            })
        ));

        bytes[17] = 4; // declares more bytes than present
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_payload_too_long() {
        let err = Frame::new(
            0,
            FrameType::Unconfirmed,
            0,
            3,
            make_addr(1),
            make_addr(2),
            vec![0; MAX_PAYLOAD + 1],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLong { .. }));
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let frame = make_frame(vec![0xab; MAX_PAYLOAD]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), MAX_FRAME_SIZE);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_frame_type_bytes() {
        assert_eq!(FrameType::from_byte(0), Some(FrameType::Unconfirmed));
        assert_eq!(FrameType::from_byte(1), Some(FrameType::Confirmed));
        assert_eq!(FrameType::from_byte(2), None);
        assert_eq!(FrameType::from_byte(3), Some(FrameType::Ack));
        assert_eq!(FrameType::Ack.to_byte(), 3);
    }
}
