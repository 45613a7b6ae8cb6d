//! Wire format for pattern broadcasts
//!
//! One datagram carries one full pattern snapshot:
//!
//! ```text
//! +----------------+-------------------------------+
//! | channel (u64)  | N x RGBA (4 bytes each)       |
//! | little endian  | steps 0..N-1 in order         |
//! +----------------+-------------------------------+
//! ```
//!
//! N is fixed per deployment, so every datagram has the same length
//! `8 + 4N`. Channel 0 is the broadcast wildcard.

use crate::color::Rgba;

pub const CHANNEL_LEN: usize = 8;
pub const STEP_LEN: usize = 4;

/// Channel tag accepted by every receiver
pub const WILDCARD_CHANNEL: u64 = 0;

/// Datagram length for a pattern of `steps` steps
pub const fn wire_len(steps: usize) -> usize {
    CHANNEL_LEN + STEP_LEN * steps
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated pattern message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Decoded pattern broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub channel: u64,
    pub steps: Vec<Rgba>,
}

impl WireMessage {
    pub fn new(channel: u64, steps: Vec<Rgba>) -> Self {
        Self { channel, steps }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(wire_len(self.steps.len()));
        out.extend_from_slice(&self.channel.to_le_bytes());
        for step in &self.steps {
            out.extend_from_slice(&step.to_array());
        }
        out
    }

    /// Parse a message of exactly `steps` steps
    ///
    /// Input shorter than the fixed length is rejected before any field is
    /// read. Bytes past the fixed length are ignored, which is what a
    /// receive buffer sized for one message does to an oversized datagram.
    pub fn decode(bytes: &[u8], steps: usize) -> Result<Self, WireError> {
        let expected = wire_len(steps);
        if bytes.len() < expected {
            return Err(WireError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let (head, body) = bytes.split_at(CHANNEL_LEN);
        let mut channel = [0u8; CHANNEL_LEN];
        channel.copy_from_slice(head);

        let steps = body[..STEP_LEN * steps]
            .chunks_exact(STEP_LEN)
            .map(|c| Rgba::new(c[0], c[1], c[2], c[3]))
            .collect();

        Ok(Self {
            channel: u64::from_le_bytes(channel),
            steps,
        })
    }

    /// Whether a receiver configured for `channel` applies this message
    pub fn accepts(&self, channel: u64) -> bool {
        self.channel == WILDCARD_CHANNEL || self.channel == channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_len_is_fixed() {
        assert_eq!(wire_len(16), 72);
        assert_eq!(wire_len(0), 8);
    }

    #[test]
    fn test_layout() {
        let msg = WireMessage::new(
            0x0102,
            vec![Rgba::new(1, 2, 3, 4), Rgba::new(5, 6, 7, 8)],
        );
        assert_eq!(
            msg.encode(),
            vec![0x02, 0x01, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_short_input_rejected() {
        let bytes = WireMessage::new(3, vec![Rgba::BLACK; 16]).encode();
        let err = WireMessage::decode(&bytes[..40], 16).unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                expected: 72,
                actual: 40
            }
        );
        // Not even the channel survives a cut inside the header
        assert!(WireMessage::decode(&bytes[..5], 16).is_err());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = WireMessage::new(9, vec![Rgba::new(10, 20, 30, 40); 4]).encode();
        bytes.extend_from_slice(&[0xff; 12]);
        let msg = WireMessage::decode(&bytes, 4).unwrap();
        assert_eq!(msg.channel, 9);
        assert_eq!(msg.steps, vec![Rgba::new(10, 20, 30, 40); 4]);
    }

    #[test]
    fn test_accepts_wildcard_and_own_channel() {
        let broadcast = WireMessage::new(WILDCARD_CHANNEL, vec![]);
        assert!(broadcast.accepts(0));
        assert!(broadcast.accepts(7));

        let tagged = WireMessage::new(2, vec![]);
        assert!(tagged.accepts(2));
        assert!(!tagged.accepts(0));
        assert!(!tagged.accepts(3));
    }
}
