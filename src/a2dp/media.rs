//! Media packets
//!
//! Encoded frames travel in media packets whose payload starts with a
//! one-octet header: fragmentation flags and a 4-bit frame count.
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +---+---+---+---+---------------+
//! | F | S | L | R | frame count   |
//! +---+---+---+---+---------------+
//! ```

use super::A2dpError;
use crate::constants::{MAX_FRAMES_PER_PACKET, MAX_MEDIA_PAYLOAD};
use heapless::Vec;

/// Media payload header octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MediaPayloadHeader {
    /// Frame is split across packets
    pub fragmented: bool,
    /// First packet of a fragmented frame
    pub starting: bool,
    /// Last packet of a fragmented frame
    pub last: bool,
    /// Frames in this packet, or fragments left for a fragmented frame
    pub frame_count: u8,
}

impl MediaPayloadHeader {
    const FRAGMENTED: u8 = 0x80;
    const STARTING: u8 = 0x40;
    const LAST: u8 = 0x20;
    const FRAME_COUNT_MASK: u8 = 0x0F;

    /// Header for an unfragmented packet of `frame_count` frames
    #[must_use]
    pub const fn new(frame_count: u8) -> Self {
        Self {
            fragmented: false,
            starting: false,
            last: false,
            frame_count,
        }
    }

    /// Encode the header octet
    ///
    /// # Errors
    /// Returns `InvalidParams` if the frame count does not fit in four bits
    pub const fn to_byte(&self) -> Result<u8, A2dpError> {
        if self.frame_count > MAX_FRAMES_PER_PACKET {
            return Err(A2dpError::InvalidParams);
        }
        let mut byte = self.frame_count;
        if self.fragmented {
            byte |= Self::FRAGMENTED;
        }
        if self.starting {
            byte |= Self::STARTING;
        }
        if self.last {
            byte |= Self::LAST;
        }
        Ok(byte)
    }

    /// Decode a header octet; the reserved bit is ignored
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            fragmented: byte & Self::FRAGMENTED != 0,
            starting: byte & Self::STARTING != 0,
            last: byte & Self::LAST != 0,
            frame_count: byte & Self::FRAME_COUNT_MASK,
        }
    }

    /// Split a received payload into its header and the encoded frames
    ///
    /// # Errors
    /// Returns `InvalidParams` for an empty payload
    pub fn split(payload: &[u8]) -> Result<(Self, &[u8]), A2dpError> {
        match payload.split_first() {
            Some((&byte, frames)) => Ok((Self::from_byte(byte), frames)),
            None => Err(A2dpError::InvalidParams),
        }
    }
}

/// Encoded payload of one media packet
pub type MediaPayload = Vec<u8, MAX_MEDIA_PAYLOAD>;

/// One media packet ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    /// Media timestamp of the first frame, in samples
    pub timestamp: u32,
    /// Payload header
    pub header: MediaPayloadHeader,
    /// Encoded frames, without the header octet
    pub payload: MediaPayload,
    /// PCM bytes consumed to produce the payload
    pub pcm_bytes: u32,
}

impl MediaPacket {
    /// Empty packet starting at `timestamp`
    #[must_use]
    pub const fn new(timestamp: u32) -> Self {
        Self {
            timestamp,
            header: MediaPayloadHeader::new(0),
            payload: Vec::new(),
            pcm_bytes: 0,
        }
    }

    /// Frames in the packet
    #[must_use]
    pub const fn frame_count(&self) -> u8 {
        self.header.frame_count
    }

    /// Whether the frame count has reached what the header can carry
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.header.frame_count >= MAX_FRAMES_PER_PACKET
    }

    /// Serialize header octet and payload into `out`
    ///
    /// # Errors
    /// Returns `InvalidParams` if `out` is too small or the header is invalid
    pub fn write_to(&self, out: &mut [u8]) -> Result<usize, A2dpError> {
        let len = self.payload.len() + 1;
        let dest = out.get_mut(..len).ok_or(A2dpError::InvalidParams)?;
        dest[0] = self.header.to_byte()?;
        dest[1..].copy_from_slice(&self.payload);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_byte() {
        assert_eq!(MediaPayloadHeader::new(5).to_byte(), Ok(0x05));
        let fragment = MediaPayloadHeader {
            fragmented: true,
            starting: true,
            last: false,
            frame_count: 3,
        };
        assert_eq!(fragment.to_byte(), Ok(0xC3));
        assert_eq!(MediaPayloadHeader::from_byte(0xC3), fragment);
        assert!(MediaPayloadHeader::from_byte(0xA1).last);
        // Reserved bit is dropped
        assert_eq!(MediaPayloadHeader::from_byte(0x12), MediaPayloadHeader::new(2));
        assert_eq!(MediaPayloadHeader::new(16).to_byte(), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_split_payload() {
        let (header, frames) = MediaPayloadHeader::split(&[0x02, 0x9C, 0x00, 0x9C]).unwrap();
        assert_eq!(header.frame_count, 2);
        assert_eq!(frames, &[0x9C, 0x00, 0x9C]);
        assert_eq!(MediaPayloadHeader::split(&[]), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_packet_write() {
        let mut packet = MediaPacket::new(1024);
        packet.header.frame_count = 2;
        packet.payload.extend_from_slice(&[1, 2, 3]).unwrap();
        assert!(!packet.is_full());

        let mut out = [0u8; 8];
        assert_eq!(packet.write_to(&mut out), Ok(4));
        assert_eq!(&out[..4], &[0x02, 1, 2, 3]);
        assert_eq!(packet.write_to(&mut out[..3]), Err(A2dpError::InvalidParams));

        packet.header.frame_count = MAX_FRAMES_PER_PACKET;
        assert!(packet.is_full());
    }
}
