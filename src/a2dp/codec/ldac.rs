//! LDAC codec
//!
//! ```text
//! [vendor ID (4, LE)][codec ID (2, LE)][sampling frequency][channel mode]
//! ```
//!
//! Bit depth is not carried on the wire; it is chosen locally from 16, 24
//! and 32 bits. The encoder quality mode travels in `codec_specific[0]`.

use super::{CodecState, Negotiator, flags_of, resolve, resolve_bits_per_sample};
use crate::a2dp::cie::{CieReader, CieWriter, CodecInfo};
use crate::a2dp::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use crate::a2dp::{A2dpError, MediaType, Role, check_field};
use crate::constants::{LDAC_CODEC_ID, LDAC_CODEC_LEN, LDAC_VENDOR_ID};

/// PCM samples per channel consumed by one LDAC frame
pub const LDAC_SAMPLES_PER_FRAME: u32 = 128;

/// LDAC Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacSamplingFrequency(pub u8);

impl LdacSamplingFrequency {
    /// 44100 Hz
    pub const HZ_44100: u8 = 0x20;
    /// 48000 Hz
    pub const HZ_48000: u8 = 0x10;
    /// 88200 Hz
    pub const HZ_88200: u8 = 0x08;
    /// 96000 Hz
    pub const HZ_96000: u8 = 0x04;
    /// 176400 Hz
    pub const HZ_176400: u8 = 0x02;
    /// 192000 Hz
    pub const HZ_192000: u8 = 0x01;
    /// Field mask
    pub const MASK: u8 = 0x3F;

    /// Check if frequency is supported
    #[must_use]
    pub const fn supports(&self, freq: u8) -> bool {
        (self.0 & freq) != 0
    }
}

/// LDAC Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacChannelMode(pub u8);

impl LdacChannelMode {
    /// Mono
    pub const MONO: u8 = 0x04;
    /// Dual channel
    pub const DUAL: u8 = 0x02;
    /// Stereo
    pub const STEREO: u8 = 0x01;
    /// Field mask
    pub const MASK: u8 = 0x07;

    /// Check if mode is supported
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }
}

/// Encoder quality mode selected through `codec_specific[0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LdacQuality {
    /// Quality optimized (990/909 kbps)
    High,
    /// Normal (660/606 kbps)
    Mid,
    /// Connection optimized (330/303 kbps)
    Low,
    /// Adaptive bit rate
    Abr,
}

impl LdacQuality {
    /// Decode the quality from a codec-specific value; the last decimal
    /// digit selects the mode and 0 means adaptive
    #[must_use]
    pub const fn from_codec_specific(value: i64) -> Self {
        if value == 0 {
            return Self::Abr;
        }
        match value % 10 {
            0 => Self::High,
            1 => Self::Mid,
            2 => Self::Low,
            _ => Self::Abr,
        }
    }

    /// Quality byte in the offload parameter block
    #[must_use]
    pub const fn offload_value(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Mid => 1,
            Self::Low => 2,
            Self::Abr => 0x7F,
        }
    }

    /// Peak bit rate in bits per second at `sample_rate_hz`
    ///
    /// Adaptive mode reports its ceiling.
    #[must_use]
    pub const fn bit_rate(self, sample_rate_hz: u32) -> u32 {
        let cd_family = matches!(sample_rate_hz, 44_100 | 88_200);
        match (self, cd_family) {
            (Self::High | Self::Abr, true) => 909_000,
            (Self::High | Self::Abr, false) => 990_000,
            (Self::Mid, true) => 606_000,
            (Self::Mid, false) => 660_000,
            (Self::Low, true) => 303_000,
            (Self::Low, false) => 330_000,
        }
    }
}

/// Decoded LDAC codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacCie {
    /// Sampling frequency support (bitfield)
    pub sample_rate: LdacSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_mode: LdacChannelMode,
}

/// Local capability, shared by source and sink
pub const LDAC_CAPS: LdacCie = LdacCie {
    sample_rate: LdacSamplingFrequency(
        LdacSamplingFrequency::HZ_44100
            | LdacSamplingFrequency::HZ_48000
            | LdacSamplingFrequency::HZ_88200
            | LdacSamplingFrequency::HZ_96000,
    ),
    channel_mode: LdacChannelMode(LdacChannelMode::DUAL | LdacChannelMode::STEREO),
};

/// Local bit depth capability
pub const LDAC_BITS_PER_SAMPLE: BitsPerSample =
    BitsPerSample(BitsPerSample::BITS_16.0 | BitsPerSample::BITS_24.0 | BitsPerSample::BITS_32.0);

/// Default configuration
pub const LDAC_DEFAULT_CONFIG: LdacCie = LdacCie {
    sample_rate: LdacSamplingFrequency(LdacSamplingFrequency::HZ_96000),
    channel_mode: LdacChannelMode(LdacChannelMode::STEREO),
};

const SAMPLE_RATE_MAP: [(u16, SampleRate); 6] = [
    (LdacSamplingFrequency::HZ_192000 as u16, SampleRate::HZ_192000),
    (LdacSamplingFrequency::HZ_176400 as u16, SampleRate::HZ_176400),
    (LdacSamplingFrequency::HZ_96000 as u16, SampleRate::HZ_96000),
    (LdacSamplingFrequency::HZ_88200 as u16, SampleRate::HZ_88200),
    (LdacSamplingFrequency::HZ_48000 as u16, SampleRate::HZ_48000),
    (LdacSamplingFrequency::HZ_44100 as u16, SampleRate::HZ_44100),
];

const CHANNEL_MODE_MAP: [(u16, ChannelMode); 3] = [
    (LdacChannelMode::STEREO as u16, ChannelMode::STEREO),
    (LdacChannelMode::DUAL as u16, ChannelMode::STEREO),
    (LdacChannelMode::MONO as u16, ChannelMode::MONO),
];

impl LdacCie {
    /// Parse an LDAC capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the structural error from the header checks, or
    /// `BadSampleRate`/`BadChannelMode`
    pub fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        let mut reader = CieReader::open_vendor(info, LDAC_CODEC_LEN, LDAC_VENDOR_ID, LDAC_CODEC_ID)?;
        let sample_rate = LdacSamplingFrequency(reader.u8()? & LdacSamplingFrequency::MASK);
        let channel_mode = LdacChannelMode(reader.u8()? & LdacChannelMode::MASK);
        if !check_field(u64::from(sample_rate.0), is_capability) {
            return Err(A2dpError::BadSampleRate);
        }
        if !check_field(u64::from(channel_mode.0), is_capability) {
            return Err(A2dpError::BadChannelMode);
        }
        Ok(Self {
            sample_rate,
            channel_mode,
        })
    }

    /// Build the information element
    ///
    /// # Errors
    /// Returns `InvalidParams` for empty fields or stray bits
    pub fn build(&self, media_type: MediaType) -> Result<CodecInfo, A2dpError> {
        if self.sample_rate.0 == 0
            || self.sample_rate.0 & !LdacSamplingFrequency::MASK != 0
            || self.channel_mode.0 == 0
            || self.channel_mode.0 & !LdacChannelMode::MASK != 0
        {
            return Err(A2dpError::InvalidParams);
        }
        let mut writer = CieWriter::vendor(LDAC_CODEC_LEN, media_type, LDAC_VENDOR_ID, LDAC_CODEC_ID)?;
        writer.u8(self.sample_rate.0)?.u8(self.channel_mode.0)?;
        writer.finish()
    }
}

/// LDAC negotiation rules for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacCodec {
    /// Local role
    pub role: Role,
}

impl LdacCodec {
    /// LDAC rules for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Negotiator for LdacCodec {
    fn local_capability(&self) -> CodecConfig {
        CodecConfig::default()
            .with_sample_rate(flags_of(&SAMPLE_RATE_MAP, u16::from(LDAC_CAPS.sample_rate.0)))
            .with_bits_per_sample(LDAC_BITS_PER_SAMPLE)
            .with_channel_mode(flags_of(&CHANNEL_MODE_MAP, u16::from(LDAC_CAPS.channel_mode.0)))
    }

    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        LdacCie::parse(info, is_capability).is_ok()
    }

    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let parsed = LdacCie::parse(peer, is_capability)?;
        let peer_cie = if is_capability {
            LdacCie::parse(&state.ota_peer_config, false).unwrap_or(parsed)
        } else {
            parsed
        };
        state.begin_negotiation();

        let sample_rate = resolve(
            &SAMPLE_RATE_MAP,
            u16::from(LDAC_CAPS.sample_rate.0 & peer_cie.sample_rate.0),
            u16::from(LDAC_DEFAULT_CONFIG.sample_rate.0),
            state.user_config.sample_rate,
            state.audio_config.sample_rate,
            A2dpError::SampleRateMismatch,
        )?;
        let bits = resolve_bits_per_sample(state, LDAC_BITS_PER_SAMPLE, BitsPerSample::BITS_32)?;
        let channel_mode = resolve(
            &CHANNEL_MODE_MAP,
            u16::from(LDAC_CAPS.channel_mode.0 & peer_cie.channel_mode.0),
            u16::from(LDAC_DEFAULT_CONFIG.channel_mode.0),
            state.user_config.channel_mode,
            state.audio_config.channel_mode,
            A2dpError::ChannelModeMismatch,
        )?;

        let result = LdacCie {
            sample_rate: LdacSamplingFrequency(sample_rate.wire as u8),
            channel_mode: LdacChannelMode(channel_mode.wire as u8),
        }
        .build(MediaType::Audio)?;

        state.record_format(&sample_rate, &bits, &channel_mode);
        state.apply_codec_specific();
        if self.role == Role::Source {
            let quality = LdacQuality::from_codec_specific(state.config.codec_specific[0]);
            debug!("[LDAC] quality mode {:?}", quality);
        }
        state.commit(peer, is_capability, result)
    }

    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError> {
        let peer_cie = LdacCie::parse(peer, true)?;
        state.selectable_capability.sample_rate = flags_of(
            &SAMPLE_RATE_MAP,
            u16::from(LDAC_CAPS.sample_rate.0 & peer_cie.sample_rate.0),
        );
        state.selectable_capability.bits_per_sample = LDAC_BITS_PER_SAMPLE;
        state.selectable_capability.channel_mode = flags_of(
            &CHANNEL_MODE_MAP,
            u16::from(LDAC_CAPS.channel_mode.0 & peer_cie.channel_mode.0),
        );
        Ok(())
    }

    fn samples_per_frame(&self, _config: &[u8]) -> u32 {
        LDAC_SAMPLES_PER_FRAME
    }
}
