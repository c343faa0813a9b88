//! A2DP (Advanced Audio Distribution Profile) Codec Negotiation
//!
//! This module implements the codec side of A2DP: decoding and building codec
//! information elements, negotiating a stream configuration with a peer,
//! selecting the active codec by priority, and pacing the encoder once a
//! configuration is settled.
//!
//! ## Architecture
//!
//! - **CIE layer** ([`cie`]): structured reader/writer for codec information elements
//! - **Codec families** ([`codec`]): SBC, AAC, aptX, aptX-HD and LDAC negotiation
//! - **Registry** ([`registry`]): codec priorities and the active-codec state machine
//! - **Pacing** ([`pacing`]): drift-free conversion of elapsed time into frames
//! - **Media packets** ([`media`]): payload header and packet framing
//! - **Engine contracts** ([`engine`]): the boundary to encoder/decoder engines
//!
//! ## Usage
//!
//! ```rust
//! use a2dp_codecs::a2dp::registry::{CodecRegistry, RegistryOptions};
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//!
//! let registry: CodecRegistry<NoopRawMutex> = CodecRegistry::new(&RegistryOptions::default());
//! let peer_sbc_caps = [6, 0x00, 0x00, 0x3F, 0xFF, 2, 53];
//! let config = registry.set_codec_config(&peer_sbc_caps, true, true).unwrap();
//! assert_eq!(config.as_slice(), &[6, 0x00, 0x00, 0x21, 0x15, 2, 53]);
//! ```

pub mod cie;
pub mod codec;
pub mod config;
pub mod engine;
pub mod media;
pub mod pacing;
pub mod registry;

pub use cie::*;
pub use config::*;

/// A2DP Profile Roles
///
/// A codec instance negotiates either as the audio source (local encoder,
/// peer sink) or as the audio sink (local decoder, peer source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Audio source (sends audio)
    Source,
    /// Audio sink (receives audio)
    Sink,
}

/// Media Types carried in the upper nibble of CIE byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaType {
    /// Audio media
    Audio = 0x00,
    /// Video media
    Video = 0x01,
    /// Multimedia media
    Multimedia = 0x02,
}

impl MediaType {
    /// Decode a media type nibble
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Audio),
            0x01 => Some(Self::Video),
            0x02 => Some(Self::Multimedia),
            _ => None,
        }
    }
}

/// Codec types carried in CIE byte 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecType {
    /// SBC (Sub-Band Coding) - Mandatory codec for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio (MP3)
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// Vendor-specific codec (aptX, aptX-HD, LDAC)
    VendorSpecific = 0xFF,
}

impl CodecType {
    /// Decode a codec type octet
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Sbc),
            0x01 => Some(Self::Mpeg12Audio),
            0x02 => Some(Self::Mpeg24Aac),
            0xFF => Some(Self::VendorSpecific),
            _ => None,
        }
    }
}

/// A2DP codec errors
///
/// Structural errors come from the CIE length/identity checks, `Bad*` errors
/// from a field that fails its bit-count rule, `*Mismatch` errors from a
/// negotiation with no usable value for a field, and the remaining variants
/// from registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpError {
    /// Missing, empty or truncated input
    InvalidParams,
    /// Length, media type, codec type or vendor identity does not match
    WrongCodec,
    /// Object type field is invalid
    BadObjectType,
    /// Sample rate field is invalid
    BadSampleRate,
    /// Channel mode field is invalid
    BadChannelMode,
    /// SBC block length field is invalid
    BadBlockLength,
    /// SBC subbands field is invalid
    BadSubbands,
    /// SBC allocation method field is invalid
    BadAllocationMethod,
    /// SBC minimum bitpool is out of range
    BadMinBitpool,
    /// SBC maximum bitpool is out of range or below the minimum
    BadMaxBitpool,
    /// No common sample rate
    SampleRateMismatch,
    /// No common bits per sample
    BitsPerSampleMismatch,
    /// No common channel mode
    ChannelModeMismatch,
    /// No common object type
    ObjectTypeMismatch,
    /// No common SBC block length
    BlockLengthMismatch,
    /// No common SBC subband count
    SubbandsMismatch,
    /// No common SBC allocation method
    AllocationMethodMismatch,
    /// SBC bitpool ranges do not overlap
    BitpoolMismatch,
    /// No codec instance matches the request
    NoMatchingCodec,
    /// An explicit user configuration prevents the change
    UserConfigPresent,
    /// No codec is currently selected
    NoCurrentCodec,
}

/// Number of bits set in a bitmask field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitsSet {
    /// No bit set
    Zero,
    /// Exactly one bit set
    One,
    /// More than one bit set
    Many,
}

/// Classify a bitmask by how many bits it has set
#[must_use]
pub const fn bits_set(value: u64) -> BitsSet {
    match value.count_ones() {
        0 => BitsSet::Zero,
        1 => BitsSet::One,
        _ => BitsSet::Many,
    }
}

/// Check a capability (`is_capability`) or configuration bitmask field
///
/// Capabilities need at least one bit set, configurations exactly one.
pub(crate) const fn check_field(value: u64, is_capability: bool) -> bool {
    match bits_set(value) {
        BitsSet::Zero => false,
        BitsSet::One => true,
        BitsSet::Many => is_capability,
    }
}
