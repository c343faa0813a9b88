//! Codec configuration records
//!
//! [`CodecConfig`] is the codec-neutral view of a configuration or capability
//! exchanged with the upper layers: user preferences, the audio-feeding
//! preference, the negotiated configuration and the three capability views
//! all share this shape. Sample rate, bit depth and channel mode are bitfields
//! so a single record can describe either a choice or a set of choices.

use crate::constants::{CODEC_PRIORITY_DEFAULT, MAX_CODEC_INDICES};
use core::ops::BitOr;

/// Codec family and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecIndex {
    /// SBC encoder
    SourceSbc = 0,
    /// AAC encoder
    SourceAac = 1,
    /// aptX encoder
    SourceAptx = 2,
    /// aptX-HD encoder
    SourceAptxHd = 3,
    /// LDAC encoder
    SourceLdac = 4,
    /// SBC decoder
    SinkSbc = 5,
    /// AAC decoder
    SinkAac = 6,
    /// LDAC decoder
    SinkLdac = 7,
}

impl CodecIndex {
    /// Every codec index, in ascending order
    pub const ALL: [Self; MAX_CODEC_INDICES] = [
        Self::SourceSbc,
        Self::SourceAac,
        Self::SourceAptx,
        Self::SourceAptxHd,
        Self::SourceLdac,
        Self::SinkSbc,
        Self::SinkAac,
        Self::SinkLdac,
    ];

    /// Decode a raw codec index
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SourceSbc),
            1 => Some(Self::SourceAac),
            2 => Some(Self::SourceAptx),
            3 => Some(Self::SourceAptxHd),
            4 => Some(Self::SourceLdac),
            5 => Some(Self::SinkSbc),
            6 => Some(Self::SinkAac),
            7 => Some(Self::SinkLdac),
            _ => None,
        }
    }

    /// Whether this index encodes (source) rather than decodes (sink)
    #[must_use]
    pub const fn is_source(self) -> bool {
        (self as u8) < Self::SinkSbc as u8
    }

    /// Direction of this codec
    #[must_use]
    pub const fn role(self) -> super::Role {
        if self.is_source() {
            super::Role::Source
        } else {
            super::Role::Sink
        }
    }

    /// Codec name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SourceSbc => "SBC",
            Self::SourceAac => "AAC",
            Self::SourceAptx => "aptX",
            Self::SourceAptxHd => "aptX-HD",
            Self::SourceLdac => "LDAC",
            Self::SinkSbc => "SBC SINK",
            Self::SinkAac => "AAC SINK",
            Self::SinkLdac => "LDAC SINK",
        }
    }

    /// Priority assigned when none is configured
    ///
    /// Higher indices get higher priorities, so vendor codecs win over SBC.
    #[must_use]
    pub const fn computed_priority(self) -> i32 {
        1000 * (self as i32 + 1) + 1
    }
}

/// Sample rate support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// No sample rate
    pub const NONE: Self = Self(0x00);
    /// 44100 Hz
    pub const HZ_44100: Self = Self(0x01);
    /// 48000 Hz
    pub const HZ_48000: Self = Self(0x02);
    /// 88200 Hz
    pub const HZ_88200: Self = Self(0x04);
    /// 96000 Hz
    pub const HZ_96000: Self = Self(0x08);
    /// 176400 Hz
    pub const HZ_176400: Self = Self(0x10);
    /// 192000 Hz
    pub const HZ_192000: Self = Self(0x20);
    /// 16000 Hz
    pub const HZ_16000: Self = Self(0x40);
    /// 24000 Hz
    pub const HZ_24000: Self = Self(0x80);

    /// Check if any rate in `other` is supported
    #[must_use]
    pub const fn supports(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Check if no rate is set
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Frequency in Hz of a single-rate value
    #[must_use]
    pub const fn hz(&self) -> Option<u32> {
        match self.0 {
            0x01 => Some(44_100),
            0x02 => Some(48_000),
            0x04 => Some(88_200),
            0x08 => Some(96_000),
            0x10 => Some(176_400),
            0x20 => Some(192_000),
            0x40 => Some(16_000),
            0x80 => Some(24_000),
            _ => None,
        }
    }

    /// Single-rate value for a frequency in Hz
    #[must_use]
    pub const fn from_hz(hz: u32) -> Self {
        match hz {
            44_100 => Self::HZ_44100,
            48_000 => Self::HZ_48000,
            88_200 => Self::HZ_88200,
            96_000 => Self::HZ_96000,
            176_400 => Self::HZ_176400,
            192_000 => Self::HZ_192000,
            16_000 => Self::HZ_16000,
            24_000 => Self::HZ_24000,
            _ => Self::NONE,
        }
    }
}

/// Bits per sample support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitsPerSample(pub u8);

impl BitsPerSample {
    /// No bit depth
    pub const NONE: Self = Self(0x00);
    /// 16 bits
    pub const BITS_16: Self = Self(0x01);
    /// 24 bits
    pub const BITS_24: Self = Self(0x02);
    /// 32 bits
    pub const BITS_32: Self = Self(0x04);

    /// Check if any depth in `other` is supported
    #[must_use]
    pub const fn supports(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Check if no depth is set
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Bit depth of a single-depth value
    #[must_use]
    pub const fn bits(&self) -> Option<u8> {
        match self.0 {
            0x01 => Some(16),
            0x02 => Some(24),
            0x04 => Some(32),
            _ => None,
        }
    }
}

/// Channel mode support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMode(pub u8);

impl ChannelMode {
    /// No channel mode
    pub const NONE: Self = Self(0x00);
    /// Mono
    pub const MONO: Self = Self(0x01);
    /// Stereo (any two-channel wire mode)
    pub const STEREO: Self = Self(0x02);

    /// Check if any mode in `other` is supported
    #[must_use]
    pub const fn supports(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Check if no mode is set
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Channel count of a single-mode value
    #[must_use]
    pub const fn channel_count(&self) -> Option<u8> {
        match self.0 {
            0x01 => Some(1),
            0x02 => Some(2),
            _ => None,
        }
    }
}

impl BitOr for SampleRate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr for BitsPerSample {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr for ChannelMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Codec configuration or capability record
///
/// Used for every view a codec instance exposes. `NONE` fields and zero
/// codec-specific values mean "no preference" in user and audio configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecConfig {
    /// Codec this record refers to; `None` means "the current codec"
    pub codec_index: Option<CodecIndex>,
    /// Codec priority (`CODEC_PRIORITY_DEFAULT` means "compute")
    pub priority: i32,
    /// Sample rate(s)
    pub sample_rate: SampleRate,
    /// Bits per sample
    pub bits_per_sample: BitsPerSample,
    /// Channel mode(s)
    pub channel_mode: ChannelMode,
    /// Codec-specific extensions; non-zero user values override negotiation
    pub codec_specific: [i64; 4],
}

impl CodecConfig {
    /// An empty record for `codec_index`
    #[must_use]
    pub const fn new(codec_index: Option<CodecIndex>) -> Self {
        Self {
            codec_index,
            priority: CODEC_PRIORITY_DEFAULT,
            sample_rate: SampleRate::NONE,
            bits_per_sample: BitsPerSample::NONE,
            channel_mode: ChannelMode::NONE,
            codec_specific: [0; 4],
        }
    }

    /// Set the sample rate
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the bit depth
    #[must_use]
    pub const fn with_bits_per_sample(mut self, bits_per_sample: BitsPerSample) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    /// Set the channel mode
    #[must_use]
    pub const fn with_channel_mode(mut self, channel_mode: ChannelMode) -> Self {
        self.channel_mode = channel_mode;
        self
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set one of the four codec-specific values (`slot` 0..=3)
    #[must_use]
    pub const fn with_codec_specific(mut self, slot: usize, value: i64) -> Self {
        if slot < self.codec_specific.len() {
            self.codec_specific[slot] = value;
        }
        self
    }

    /// Whether the record expresses no preference at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.priority == CODEC_PRIORITY_DEFAULT
            && self.sample_rate.is_none()
            && self.bits_per_sample.is_none()
            && self.channel_mode.is_none()
            && self.codec_specific[0] == 0
            && self.codec_specific[1] == 0
            && self.codec_specific[2] == 0
            && self.codec_specific[3] == 0
    }

    /// Whether the audio format (rate, depth, mode) differs from `other`
    #[must_use]
    pub fn audio_format_differs(&self, other: &Self) -> bool {
        self.sample_rate != other.sample_rate
            || self.bits_per_sample != other.bits_per_sample
            || self.channel_mode != other.channel_mode
    }

    /// Whether every field is set, as needed for a usable capability
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !self.sample_rate.is_none() && !self.bits_per_sample.is_none() && !self.channel_mode.is_none()
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new(None)
    }
}
