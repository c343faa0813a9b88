//! Encoder and decoder contracts
//!
//! The DSP engines stay opaque behind [`FrameCodec`]; PCM comes in through a
//! [`PcmSource`] and packets leave through a [`PacketSink`]. [`PacedEncoder`]
//! ties them to a [`FramePacer`] so every codec family shares the same
//! timing and packing logic.

use super::A2dpError;
use super::cie::CodecInfo;
use super::codec::CodecInstance;
use super::media::MediaPacket;
use super::pacing::{FeedingParams, FramePacer, PacingStats};
use crate::constants::{
    DEFAULT_PEER_MTU, ENCODER_INTERVAL_MS, MAX_2MBPS_AVDTP_MTU, MAX_FRAMES_PER_PACKET, MAX_MEDIA_PAYLOAD,
    MAX_PCM_BYTES_PER_FRAME, MEDIA_PACKET_HEADER_LEN,
};
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Transport parameters of the connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerParams {
    /// AVDTP MTU reported by the peer
    pub peer_mtu: u16,
    /// Peer supports Enhanced Data Rate
    pub is_peer_edr: bool,
    /// Peer supports 3 Mbps EDR packets
    pub peer_supports_3mbps: bool,
}

impl Default for PeerParams {
    fn default() -> Self {
        Self {
            peer_mtu: DEFAULT_PEER_MTU,
            is_peer_edr: false,
            peer_supports_3mbps: false,
        }
    }
}

impl PeerParams {
    /// MTU after the 2 Mbps EDR packet-size restriction
    #[must_use]
    pub const fn effective_mtu(&self) -> u16 {
        if self.is_peer_edr && !self.peer_supports_3mbps && self.peer_mtu > MAX_2MBPS_AVDTP_MTU {
            MAX_2MBPS_AVDTP_MTU
        } else {
            self.peer_mtu
        }
    }

    /// Encoded bytes one media packet can carry
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        usize::from(self.effective_mtu())
            .saturating_sub(MEDIA_PACKET_HEADER_LEN + 1)
            .min(MAX_MEDIA_PAYLOAD)
    }
}

/// Everything an encoder needs from a negotiated codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSetup {
    /// Negotiated codec information element
    pub codec_info: CodecInfo,
    /// PCM format to expect from the feeding path
    pub feeding: FeedingParams,
    /// PCM samples per channel in one encoded frame
    pub samples_per_frame: u32,
    /// Encoder tick interval
    pub interval_ms: u64,
    /// Optional cap on frames per tick
    pub frame_limit: Option<u32>,
}

impl EncoderSetup {
    /// Collect the encoder parameters of a negotiated codec
    ///
    /// # Errors
    /// Returns `InvalidParams` if the codec has no valid negotiated
    /// configuration
    pub fn from_codec<M: RawMutex>(codec: &CodecInstance<M>) -> Result<Self, A2dpError> {
        let family = codec.family();
        Ok(Self {
            codec_info: codec.ota_codec_config().ok_or(A2dpError::InvalidParams)?,
            feeding: codec.feeding_params()?,
            samples_per_frame: codec.samples_per_frame()?,
            interval_ms: family.encoder_interval_ms(),
            frame_limit: family.frame_limit(),
        })
    }

    /// PCM bytes consumed by one encoded frame
    #[must_use]
    pub const fn pcm_bytes_per_frame(&self) -> u32 {
        self.samples_per_frame * self.feeding.bytes_per_sample_frame()
    }
}

/// Source-side encoder lifecycle
pub trait EncoderInterface {
    /// Prepare for streaming with a negotiated configuration
    ///
    /// # Errors
    /// Returns `InvalidParams` if the setup cannot be streamed to this peer,
    /// or the engine's configuration error
    fn init(&mut self, peer: &PeerParams, setup: &EncoderSetup) -> Result<(), A2dpError>;

    /// Release the configuration; `send_frames` fails until the next `init`
    fn cleanup(&mut self);

    /// Forget timing history and buffered PCM
    fn feeding_reset(&mut self);

    /// Drop owed PCM and buffered PCM, keeping timing history
    fn feeding_flush(&mut self);

    /// Interval at which `send_frames` should be called
    fn encoder_interval_ms(&self) -> u64;

    /// Encode and emit the frames owed at `timestamp_us`
    ///
    /// Returns the number of frames sent.
    ///
    /// # Errors
    /// Returns `InvalidParams` before `init`, or the engine's encode error
    fn send_frames(&mut self, timestamp_us: u64) -> Result<u32, A2dpError>;
}

/// Sink-side decoder lifecycle
pub trait DecoderInterface {
    /// Prepare to decode streams configured by `codec_info`
    ///
    /// # Errors
    /// Returns the engine's configuration error
    fn init(&mut self, codec_info: &[u8]) -> Result<(), A2dpError>;

    /// Release the configuration
    fn cleanup(&mut self);

    /// Decode one received media payload, header octet included
    ///
    /// # Errors
    /// Returns `InvalidParams` for a malformed payload, or the engine's
    /// decode error
    fn decode_packet(&mut self, payload: &[u8]) -> Result<(), A2dpError>;
}

/// Opaque frame encoder (the DSP engine)
pub trait FrameCodec {
    /// Configure for the negotiated element and PCM format
    ///
    /// # Errors
    /// Returns `InvalidParams` if the engine cannot handle the configuration
    fn configure(&mut self, codec_info: &[u8], feeding: &FeedingParams) -> Result<(), A2dpError>;

    /// Encode one frame of PCM into `out`, returning the encoded length
    ///
    /// # Errors
    /// Returns `InvalidParams` if `out` is too small
    fn encode_frame(&mut self, pcm: &[u8], out: &mut [u8]) -> Result<usize, A2dpError>;
}

/// Audio-feeding path
pub trait PcmSource {
    /// Read up to `buf.len()` PCM bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Transport queue for outgoing media packets
pub trait PacketSink {
    /// Queue a packet; `false` means the queue is full and the tick should end
    fn enqueue(&mut self, packet: MediaPacket) -> bool;
}

struct ActiveStream {
    pacer: FramePacer,
    bytes_per_frame: usize,
    samples_per_frame: u32,
    payload_capacity: usize,
    interval_ms: u64,
}

/// Reference [`EncoderInterface`] over a frame codec, PCM source and packet sink
pub struct PacedEncoder<C, R, W> {
    codec: C,
    source: R,
    sink: W,
    stream: Option<ActiveStream>,
    timestamp: u32,
    pcm: [u8; MAX_PCM_BYTES_PER_FRAME],
    residue: usize,
    dropped_packets: u64,
}

impl<C: FrameCodec, R: PcmSource, W: PacketSink> PacedEncoder<C, R, W> {
    /// Encoder that still needs `init`
    pub const fn new(codec: C, source: R, sink: W) -> Self {
        Self {
            codec,
            source,
            sink,
            stream: None,
            timestamp: 0,
            pcm: [0; MAX_PCM_BYTES_PER_FRAME],
            residue: 0,
            dropped_packets: 0,
        }
    }

    /// Pacing counters of the active stream
    pub fn stats(&self) -> Option<PacingStats> {
        self.stream.as_ref().map(|stream| stream.pacer.stats())
    }

    /// Packets abandoned because no frame could be encoded
    pub const fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    /// Media timestamp the next packet will carry
    pub const fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Frame codec
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Packet sink
    pub const fn sink(&self) -> &W {
        &self.sink
    }

    /// Mutable PCM source
    pub fn source_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// Fill the PCM buffer for one frame; `false` on underflow
    fn read_frame(&mut self, bytes_per_frame: usize) -> bool {
        let read = self.source.read(&mut self.pcm[self.residue..bytes_per_frame]);
        self.residue += read;
        if self.residue < bytes_per_frame {
            return false;
        }
        self.residue = 0;
        true
    }

    fn encode_frames(&mut self, frames: u32) -> Result<u32, A2dpError> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(A2dpError::InvalidParams);
        };
        let (bytes_per_frame, samples_per_frame, capacity) =
            (stream.bytes_per_frame, stream.samples_per_frame, stream.payload_capacity);

        let mut remaining = frames;
        let mut sent = 0;
        while remaining > 0 {
            let mut packet = MediaPacket::new(self.timestamp);
            let mut last_frame_len = 0;
            loop {
                if !self.read_frame(bytes_per_frame) {
                    if let Some(stream) = self.stream.as_mut() {
                        stream.pacer.credit_underflow(remaining);
                    }
                    remaining = 0;
                    break;
                }
                let start = packet.payload.len();
                packet
                    .payload
                    .resize(capacity, 0)
                    .map_err(|()| A2dpError::InvalidParams)?;
                let len = self
                    .codec
                    .encode_frame(&self.pcm[..bytes_per_frame], &mut packet.payload[start..])?;
                packet.payload.truncate(start + len);
                last_frame_len = len;
                packet.header.frame_count += 1;
                packet.pcm_bytes += bytes_per_frame as u32;
                remaining -= 1;

                let fits_another = packet.payload.len() + last_frame_len < capacity;
                if !fits_another || packet.is_full() || remaining == 0 {
                    break;
                }
            }

            if packet.frame_count() == 0 {
                self.dropped_packets += 1;
                continue;
            }
            let count = u32::from(packet.frame_count());
            self.timestamp = self.timestamp.wrapping_add(count * samples_per_frame);
            sent += count;
            trace!(
                "[ENCODER] packet of {} frames, {} bytes",
                count,
                packet.payload.len()
            );
            if !self.sink.enqueue(packet) {
                debug!("[ENCODER] transport queue full");
                break;
            }
        }
        Ok(sent)
    }
}

impl<C: FrameCodec, R: PcmSource, W: PacketSink> EncoderInterface for PacedEncoder<C, R, W> {
    fn init(&mut self, peer: &PeerParams, setup: &EncoderSetup) -> Result<(), A2dpError> {
        let bytes_per_frame = setup.pcm_bytes_per_frame() as usize;
        if bytes_per_frame > MAX_PCM_BYTES_PER_FRAME {
            error!("[ENCODER] {} PCM bytes per frame is too large", bytes_per_frame);
            return Err(A2dpError::InvalidParams);
        }
        let payload_capacity = peer.payload_capacity();
        if payload_capacity == 0 {
            error!("[ENCODER] invalid peer MTU {}", peer.peer_mtu);
            return Err(A2dpError::InvalidParams);
        }

        let mut pacer = FramePacer::new(&setup.feeding, setup.interval_ms, setup.samples_per_frame)?;
        if let Some(limit) = setup.frame_limit {
            pacer = pacer.with_frame_limit(limit);
        }
        self.codec.configure(&setup.codec_info, &setup.feeding)?;

        info!(
            "[ENCODER] {} Hz, {} bits, {} channels, {} byte payloads, at most {} frames per packet",
            setup.feeding.sample_rate,
            setup.feeding.bits_per_sample,
            setup.feeding.channel_count,
            payload_capacity,
            MAX_FRAMES_PER_PACKET
        );
        self.stream = Some(ActiveStream {
            pacer,
            bytes_per_frame,
            samples_per_frame: setup.samples_per_frame,
            payload_capacity,
            interval_ms: setup.interval_ms,
        });
        self.timestamp = 0;
        self.residue = 0;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stream = None;
        self.residue = 0;
    }

    fn feeding_reset(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.pacer.reset();
        }
        self.residue = 0;
    }

    fn feeding_flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.pacer.flush();
        }
        self.residue = 0;
    }

    fn encoder_interval_ms(&self) -> u64 {
        self.stream
            .as_ref()
            .map_or(ENCODER_INTERVAL_MS, |stream| stream.interval_ms)
    }

    fn send_frames(&mut self, timestamp_us: u64) -> Result<u32, A2dpError> {
        let stream = self.stream.as_mut().ok_or(A2dpError::InvalidParams)?;
        let frames = stream.pacer.tick(timestamp_us);
        if frames == 0 {
            return Ok(0);
        }
        self.encode_frames(frames)
    }
}
