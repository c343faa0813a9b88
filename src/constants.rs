//! A2DP Codec Constants
//!
//! This module contains the constants used throughout the crate: codec
//! information element sizes, per-family lengths and vendor identifiers,
//! protocol limits, priorities and pacing parameters.

/// Maximum size of a codec information element, including the length octet
pub const AVDT_CODEC_SIZE: usize = 20;

/// Maximum number of codec indices (families x directions)
pub const MAX_CODEC_INDICES: usize = 8;

/// Length octet (LOSC) of an SBC codec information element
pub const SBC_CODEC_LEN: u8 = 6;

/// Length octet (LOSC) of an AAC codec information element
pub const AAC_CODEC_LEN: u8 = 8;

/// Length octet (LOSC) of an aptX codec information element
pub const APTX_CODEC_LEN: u8 = 9;

/// Length octet (LOSC) of an aptX-HD codec information element
pub const APTX_HD_CODEC_LEN: u8 = 13;

/// Length octet (LOSC) of an LDAC codec information element
pub const LDAC_CODEC_LEN: u8 = 10;

/// Length of the vendor header (vendor ID + codec ID) in vendor CIEs
pub const VENDOR_HEADER_LEN: usize = 6;

/// aptX vendor identifier
pub const APTX_VENDOR_ID: u32 = 0x0000_004F;

/// aptX codec identifier
pub const APTX_CODEC_ID: u16 = 0x0001;

/// aptX-HD vendor identifier
pub const APTX_HD_VENDOR_ID: u32 = 0x0000_00D7;

/// aptX-HD codec identifier
pub const APTX_HD_CODEC_ID: u16 = 0x0024;

/// LDAC vendor identifier
pub const LDAC_VENDOR_ID: u32 = 0x0000_012D;

/// LDAC codec identifier
pub const LDAC_CODEC_ID: u16 = 0x00AA;

/// Lowest legal SBC bitpool value
pub const SBC_MIN_BITPOOL: u8 = 2;

/// Highest legal SBC bitpool value
pub const SBC_MAX_BITPOOL: u8 = 250;

/// Highest bitpool this device encodes with
pub const SBC_LOCAL_MAX_BITPOOL: u8 = 53;

/// Default AAC bit rate in bits per second
pub const AAC_DEFAULT_BIT_RATE: u32 = 320_000;

/// Peer-advertised AAC bit rates below this are treated as bogus
pub const AAC_MIN_BIT_RATE: u32 = 64_000;

/// Largest value the 23-bit AAC bit rate field can carry
pub const AAC_MAX_BIT_RATE: u32 = 0x7F_FFFF;

/// Priority value meaning "compute the default"
pub const CODEC_PRIORITY_DEFAULT: i32 = 0;

/// Priority value marking a codec as disabled
pub const CODEC_PRIORITY_DISABLED: i32 = -1;

/// Highest codec priority a caller may request
pub const CODEC_PRIORITY_HIGHEST: i32 = 1_000_000;

/// Default peer MTU used when the transport has not reported one
pub const DEFAULT_PEER_MTU: u16 = 672;

/// Largest AVDTP MTU that fits a 2-DH5 packet on 2 Mbps EDR links
pub const MAX_2MBPS_AVDTP_MTU: u16 = 663;

/// Length of the AVDTP media packet (RTP) header
pub const MEDIA_PACKET_HEADER_LEN: usize = 12;

/// Maximum number of frames a single media packet header can count
pub const MAX_FRAMES_PER_PACKET: u8 = 0x0F;

/// Nominal SBC/AAC/LDAC encoder tick interval in milliseconds
pub const ENCODER_INTERVAL_MS: u64 = 20;

/// Nominal aptX/aptX-HD encoder tick interval in milliseconds
pub const APTX_ENCODER_INTERVAL_MS: u64 = 15;

/// Maximum PCM frames produced per tick before frames are dropped
pub const MAX_PCM_FRAME_NUM_PER_TICK: u32 = 14;

/// Maximum encoded payload buffered for one media packet
pub const MAX_MEDIA_PAYLOAD: usize = 1024;

/// Maximum PCM bytes read for one encoded frame (AAC 1024 samples, 32-bit stereo)
pub const MAX_PCM_BYTES_PER_FRAME: usize =
    crate::a2dp::codec::aac::AAC_SAMPLES_PER_FRAME as usize * 2 * 4;
