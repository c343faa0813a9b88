//! MPEG-2/4 AAC codec
//!
//! ```text
//! [object type]
//! [sampling frequency, low octet]
//! [sampling frequency (7..4) | channels (3..2)]
//! [VBR (7) | bit rate (22..16)]
//! [bit rate (15..8)]
//! [bit rate (7..0)]
//! ```

use super::{CodecState, Negotiator, best_bit, flags_of, resolve, resolve_bits_per_sample};
use crate::a2dp::cie::{CieReader, CieWriter, CodecInfo};
use crate::a2dp::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use crate::a2dp::{A2dpError, CodecType, MediaType, Role, check_field};
use crate::constants::{AAC_CODEC_LEN, AAC_DEFAULT_BIT_RATE, AAC_MAX_BIT_RATE, AAC_MIN_BIT_RATE};

/// PCM samples per channel in one AAC access unit
pub const AAC_SAMPLES_PER_FRAME: u32 = 1024;

/// AAC Object Type Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacObjectType(pub u8);

impl AacObjectType {
    /// MPEG-2 AAC Low Complexity
    pub const MPEG2_LC: u8 = 0x80;
    /// MPEG-4 AAC Low Complexity
    pub const MPEG4_LC: u8 = 0x40;
    /// MPEG-4 AAC Long Term Prediction
    pub const MPEG4_LTP: u8 = 0x20;
    /// MPEG-4 AAC Scalable
    pub const MPEG4_SCALABLE: u8 = 0x10;
    /// Field mask
    pub const MASK: u8 = 0xF0;

    /// Check if object type is supported
    #[must_use]
    pub const fn supports(&self, object_type: u8) -> bool {
        (self.0 & object_type) != 0
    }
}

/// AAC Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacSamplingFrequency(pub u16);

impl AacSamplingFrequency {
    /// 8000 Hz
    pub const HZ_8000: u16 = 0x0080;
    /// 11025 Hz
    pub const HZ_11025: u16 = 0x0040;
    /// 12000 Hz
    pub const HZ_12000: u16 = 0x0020;
    /// 16000 Hz
    pub const HZ_16000: u16 = 0x0010;
    /// 22050 Hz
    pub const HZ_22050: u16 = 0x0008;
    /// 24000 Hz
    pub const HZ_24000: u16 = 0x0004;
    /// 32000 Hz
    pub const HZ_32000: u16 = 0x0002;
    /// 44100 Hz
    pub const HZ_44100: u16 = 0x0001;
    /// 48000 Hz
    pub const HZ_48000: u16 = 0x8000;
    /// 64000 Hz
    pub const HZ_64000: u16 = 0x4000;
    /// 88200 Hz
    pub const HZ_88200: u16 = 0x2000;
    /// 96000 Hz
    pub const HZ_96000: u16 = 0x1000;
    /// Field mask
    pub const MASK: u16 = 0xF0FF;

    /// Check if frequency is supported
    #[must_use]
    pub const fn supports(&self, freq: u16) -> bool {
        (self.0 & freq) != 0
    }
}

/// AAC Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacChannelMode(pub u8);

impl AacChannelMode {
    /// Mono (one channel)
    pub const MONO: u8 = 0x08;
    /// Stereo (two channels)
    pub const STEREO: u8 = 0x04;
    /// Field mask
    pub const MASK: u8 = 0x0C;

    /// Check if mode is supported
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }
}

/// Decoded AAC codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacCie {
    /// Object type support (bitfield)
    pub object_type: AacObjectType,
    /// Sampling frequency support (bitfield)
    pub sample_rate: AacSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_mode: AacChannelMode,
    /// Variable bit rate support
    pub variable_bit_rate: bool,
    /// Peak bit rate in bits per second (23 bits)
    pub bit_rate: u32,
}

/// Local source capability
pub const AAC_SOURCE_CAPS: AacCie = AacCie {
    object_type: AacObjectType(AacObjectType::MPEG2_LC),
    sample_rate: AacSamplingFrequency(AacSamplingFrequency::HZ_44100),
    channel_mode: AacChannelMode(AacChannelMode::STEREO),
    variable_bit_rate: false,
    bit_rate: AAC_DEFAULT_BIT_RATE,
};

/// Local sink capability
pub const AAC_SINK_CAPS: AacCie = AacCie {
    object_type: AacObjectType(AacObjectType::MPEG2_LC),
    sample_rate: AacSamplingFrequency(AacSamplingFrequency::HZ_44100 | AacSamplingFrequency::HZ_48000),
    channel_mode: AacChannelMode(AacChannelMode::MASK),
    variable_bit_rate: true,
    bit_rate: AAC_DEFAULT_BIT_RATE,
};

/// Default configuration
pub const AAC_DEFAULT_CONFIG: AacCie = AacCie {
    object_type: AacObjectType(AacObjectType::MPEG2_LC),
    sample_rate: AacSamplingFrequency(AacSamplingFrequency::HZ_44100),
    channel_mode: AacChannelMode(AacChannelMode::STEREO),
    variable_bit_rate: false,
    bit_rate: AAC_DEFAULT_BIT_RATE,
};

const SAMPLE_RATE_MAP: [(u16, SampleRate); 4] = [
    (AacSamplingFrequency::HZ_96000, SampleRate::HZ_96000),
    (AacSamplingFrequency::HZ_88200, SampleRate::HZ_88200),
    (AacSamplingFrequency::HZ_48000, SampleRate::HZ_48000),
    (AacSamplingFrequency::HZ_44100, SampleRate::HZ_44100),
];

const CHANNEL_MODE_MAP: [(u16, ChannelMode); 2] = [
    (AacChannelMode::STEREO as u16, ChannelMode::STEREO),
    (AacChannelMode::MONO as u16, ChannelMode::MONO),
];

const OBJECT_TYPE_ORDER: [u8; 4] = [
    AacObjectType::MPEG2_LC,
    AacObjectType::MPEG4_LC,
    AacObjectType::MPEG4_LTP,
    AacObjectType::MPEG4_SCALABLE,
];

const VBR_BIT: u8 = 0x80;

impl AacCie {
    /// Parse an AAC capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the structural error from the header checks, or
    /// `BadObjectType`/`BadSampleRate`/`BadChannelMode`
    pub fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        let mut reader = CieReader::open(info, AAC_CODEC_LEN, CodecType::Mpeg24Aac)?;
        let object_type = reader.u8()? & AacObjectType::MASK;
        let rate_low = reader.u8()?;
        let octet2 = reader.u8()?;
        let octet3 = reader.u8()?;
        let octet4 = reader.u8()?;
        let octet5 = reader.u8()?;
        let cie = Self {
            object_type: AacObjectType(object_type),
            sample_rate: AacSamplingFrequency(u16::from_le_bytes([rate_low, octet2]) & AacSamplingFrequency::MASK),
            channel_mode: AacChannelMode(octet2 & AacChannelMode::MASK),
            variable_bit_rate: octet3 & VBR_BIT != 0,
            bit_rate: u32::from_be_bytes([0, octet3 & !VBR_BIT, octet4, octet5]),
        };

        let fields = [
            (u64::from(cie.object_type.0), A2dpError::BadObjectType),
            (u64::from(cie.sample_rate.0), A2dpError::BadSampleRate),
            (u64::from(cie.channel_mode.0), A2dpError::BadChannelMode),
        ];
        for (value, error) in fields {
            if !check_field(value, is_capability) {
                return Err(error);
            }
        }
        Ok(cie)
    }

    /// Build the information element
    ///
    /// # Errors
    /// Returns `InvalidParams` for empty fields, stray bits or an
    /// out-of-range bit rate
    pub fn build(&self, media_type: MediaType) -> Result<CodecInfo, A2dpError> {
        if self.object_type.0 == 0
            || self.object_type.0 & !AacObjectType::MASK != 0
            || self.sample_rate.0 == 0
            || self.sample_rate.0 & !AacSamplingFrequency::MASK != 0
            || self.channel_mode.0 == 0
            || self.channel_mode.0 & !AacChannelMode::MASK != 0
            || self.bit_rate > AAC_MAX_BIT_RATE
        {
            return Err(A2dpError::InvalidParams);
        }

        let [rate_low, rate_high] = self.sample_rate.0.to_le_bytes();
        let [_, bit_rate_high, bit_rate_mid, bit_rate_low] = self.bit_rate.to_be_bytes();
        let vbr = if self.variable_bit_rate { VBR_BIT } else { 0 };

        let mut writer = CieWriter::new(AAC_CODEC_LEN, media_type, CodecType::Mpeg24Aac);
        writer
            .u8(self.object_type.0)?
            .u8(rate_low)?
            .u8(rate_high | self.channel_mode.0)?
            .u8(vbr | bit_rate_high)?
            .u8(bit_rate_mid)?
            .u8(bit_rate_low)?;
        writer.finish()
    }
}

/// AAC negotiation rules for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacCodec {
    /// Local role
    pub role: Role,
}

impl AacCodec {
    /// AAC rules for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }

    /// Local capability element for this direction
    #[must_use]
    pub const fn caps(&self) -> &'static AacCie {
        match self.role {
            Role::Source => &AAC_SOURCE_CAPS,
            Role::Sink => &AAC_SINK_CAPS,
        }
    }
}

impl Negotiator for AacCodec {
    fn local_capability(&self) -> CodecConfig {
        let caps = self.caps();
        CodecConfig::default()
            .with_sample_rate(flags_of(&SAMPLE_RATE_MAP, caps.sample_rate.0))
            .with_bits_per_sample(BitsPerSample::BITS_16)
            .with_channel_mode(flags_of(&CHANNEL_MODE_MAP, u16::from(caps.channel_mode.0)))
    }

    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        AacCie::parse(info, is_capability).is_ok()
    }

    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let parsed = AacCie::parse(peer, is_capability)?;
        let peer_cie = if is_capability {
            AacCie::parse(&state.ota_peer_config, false).unwrap_or(parsed)
        } else {
            parsed
        };
        let caps = self.caps();
        state.begin_negotiation();

        let object_type = best_bit(caps.object_type.0 & peer_cie.object_type.0, &OBJECT_TYPE_ORDER)
            .ok_or(A2dpError::ObjectTypeMismatch)?;
        let sample_rate = resolve(
            &SAMPLE_RATE_MAP,
            caps.sample_rate.0 & peer_cie.sample_rate.0,
            AAC_DEFAULT_CONFIG.sample_rate.0,
            state.user_config.sample_rate,
            state.audio_config.sample_rate,
            A2dpError::SampleRateMismatch,
        )?;
        let bits = resolve_bits_per_sample(state, BitsPerSample::BITS_16, BitsPerSample::BITS_16)?;
        let channel_mode = resolve(
            &CHANNEL_MODE_MAP,
            u16::from(caps.channel_mode.0 & peer_cie.channel_mode.0),
            u16::from(AAC_DEFAULT_CONFIG.channel_mode.0),
            state.user_config.channel_mode,
            state.audio_config.channel_mode,
            A2dpError::ChannelModeMismatch,
        )?;

        // Peers advertising implausibly low rates get the local rate
        let bit_rate = if peer_cie.bit_rate < AAC_MIN_BIT_RATE {
            caps.bit_rate
        } else {
            caps.bit_rate.min(peer_cie.bit_rate)
        };

        let result = AacCie {
            object_type: AacObjectType(object_type),
            sample_rate: AacSamplingFrequency(sample_rate.wire),
            channel_mode: AacChannelMode(channel_mode.wire as u8),
            variable_bit_rate: caps.variable_bit_rate && peer_cie.variable_bit_rate,
            bit_rate,
        }
        .build(MediaType::Audio)?;

        state.record_format(&sample_rate, &bits, &channel_mode);
        state.apply_codec_specific();
        state.commit(peer, is_capability, result)
    }

    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError> {
        let peer_cie = AacCie::parse(peer, true)?;
        let caps = self.caps();
        state.selectable_capability.sample_rate =
            flags_of(&SAMPLE_RATE_MAP, caps.sample_rate.0 & peer_cie.sample_rate.0);
        state.selectable_capability.bits_per_sample = BitsPerSample::BITS_16;
        state.selectable_capability.channel_mode = flags_of(
            &CHANNEL_MODE_MAP,
            u16::from(caps.channel_mode.0 & peer_cie.channel_mode.0),
        );
        Ok(())
    }

    fn samples_per_frame(&self, _config: &[u8]) -> u32 {
        AAC_SAMPLES_PER_FRAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2dp::codec::CodecInstance;
    use crate::a2dp::config::CodecIndex;
    use crate::constants::CODEC_PRIORITY_DEFAULT;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const CODEC_INFO_AAC: [u8; 9] = [8, 0, 2, 0x80, 0x01, 0x04, 0x04, 0xE2, 0x00];
    const CODEC_INFO_AAC_SINK_CAPABILITY: [u8; 9] = [8, 0, 2, 0xC0, 0x01, 0x8C, 0x84, 0xE2, 0x00];

    fn codec(index: CodecIndex) -> CodecInstance<NoopRawMutex> {
        CodecInstance::new(index, CODEC_PRIORITY_DEFAULT)
    }

    #[test]
    fn test_parse_config() {
        let cie = AacCie::parse(&CODEC_INFO_AAC, false).unwrap();
        assert!(cie.object_type.supports(AacObjectType::MPEG2_LC));
        assert_eq!(cie.sample_rate.0, AacSamplingFrequency::HZ_44100);
        assert_eq!(cie.channel_mode.0, AacChannelMode::STEREO);
        assert!(!cie.variable_bit_rate);
        assert_eq!(cie.bit_rate, 320_000);
        assert_eq!(cie, AAC_DEFAULT_CONFIG);
    }

    #[test]
    fn test_parse_field_errors() {
        assert_eq!(
            AacCie::parse(&[8, 0, 2, 0x00, 0x01, 0x04, 0x04, 0xE2, 0x00], true),
            Err(A2dpError::BadObjectType)
        );
        assert_eq!(
            AacCie::parse(&[8, 0, 2, 0xC0, 0x01, 0x04, 0x04, 0xE2, 0x00], false),
            Err(A2dpError::BadObjectType)
        );
        assert_eq!(
            AacCie::parse(&[8, 0, 2, 0x80, 0x00, 0x04, 0x04, 0xE2, 0x00], true),
            Err(A2dpError::BadSampleRate)
        );
        assert_eq!(
            AacCie::parse(&[8, 0, 2, 0x80, 0x01, 0x80, 0x04, 0xE2, 0x00], false),
            Err(A2dpError::BadSampleRate)
        );
        assert_eq!(
            AacCie::parse(&[8, 0, 2, 0x80, 0x01, 0x0C, 0x04, 0xE2, 0x00], false),
            Err(A2dpError::BadChannelMode)
        );
        assert_eq!(
            AacCie::parse(&[6, 0, 2, 0x80, 0x01, 0x04, 0x04], false),
            Err(A2dpError::WrongCodec)
        );
    }

    #[test]
    fn test_build_round_trip() {
        for cie in [AAC_SOURCE_CAPS, AAC_SINK_CAPS, AAC_DEFAULT_CONFIG] {
            let info = cie.build(MediaType::Audio).unwrap();
            assert_eq!(AacCie::parse(&info, true), Ok(cie));
        }
        assert_eq!(
            AAC_SOURCE_CAPS.build(MediaType::Audio).unwrap().as_slice(),
            &CODEC_INFO_AAC
        );
        let high = AacCie {
            sample_rate: AacSamplingFrequency(AacSamplingFrequency::HZ_96000),
            variable_bit_rate: true,
            bit_rate: AAC_MAX_BIT_RATE,
            ..AAC_DEFAULT_CONFIG
        };
        let info = high.build(MediaType::Audio).unwrap();
        assert_eq!(info.as_slice(), &[8, 0, 2, 0x80, 0x00, 0x14, 0xFF, 0xFF, 0xFF]);
        assert_eq!(AacCie::parse(&info, false), Ok(high));
    }

    #[test]
    fn test_build_rejects_bad_fields() {
        let too_fast = AacCie {
            bit_rate: AAC_MAX_BIT_RATE + 1,
            ..AAC_DEFAULT_CONFIG
        };
        assert_eq!(too_fast.build(MediaType::Audio), Err(A2dpError::InvalidParams));
        let stray = AacCie {
            channel_mode: AacChannelMode(0x01),
            ..AAC_DEFAULT_CONFIG
        };
        assert_eq!(stray.build(MediaType::Audio), Err(A2dpError::InvalidParams));
        let empty = AacCie {
            object_type: AacObjectType(0),
            ..AAC_DEFAULT_CONFIG
        };
        assert_eq!(empty.build(MediaType::Audio), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_source_negotiation() {
        let aac = codec(CodecIndex::SourceAac);
        let result = aac.set_codec_config(&CODEC_INFO_AAC_SINK_CAPABILITY, true).unwrap();
        assert_eq!(result.as_slice(), &CODEC_INFO_AAC);
        let config = aac.codec_config();
        assert_eq!(config.sample_rate, SampleRate::HZ_44100);
        assert_eq!(config.channel_mode, ChannelMode::STEREO);
        assert_eq!(aac.samples_per_frame(), Ok(AAC_SAMPLES_PER_FRAME));
    }

    #[test]
    fn test_sink_prefers_highest_rate_without_default() {
        let aac = codec(CodecIndex::SinkAac);
        // Peer only at 48 kHz and mono
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x00, 0x88, 0x84, 0xE2, 0x00], true)
            .unwrap();
        let cie = AacCie::parse(&result, false).unwrap();
        assert_eq!(cie.sample_rate.0, AacSamplingFrequency::HZ_48000);
        assert_eq!(cie.channel_mode.0, AacChannelMode::MONO);
        assert!(cie.variable_bit_rate);
    }

    #[test]
    fn test_bit_rate_selection() {
        let aac = codec(CodecIndex::SourceAac);
        // 128 kbps peer: smaller rate wins
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x01, 0x04, 0x01, 0xF4, 0x00], true)
            .unwrap();
        assert_eq!(AacCie::parse(&result, false).unwrap().bit_rate, 128_000);
        // Bogus 1 kbps peer: local rate
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x01, 0x04, 0x00, 0x03, 0xE8], true)
            .unwrap();
        assert_eq!(AacCie::parse(&result, false).unwrap().bit_rate, AAC_DEFAULT_BIT_RATE);
        // The minimum rate itself is accepted
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x01, 0x04, 0x00, 0xFA, 0x00], true)
            .unwrap();
        assert_eq!(AacCie::parse(&result, false).unwrap().bit_rate, AAC_MIN_BIT_RATE);
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x01, 0x04, 0x00, 0xF9, 0xFF], true)
            .unwrap();
        assert_eq!(AacCie::parse(&result, false).unwrap().bit_rate, AAC_DEFAULT_BIT_RATE);
        // VBR requires both sides
        let result = aac
            .set_codec_config(&[8, 0, 2, 0x80, 0x01, 0x04, 0x84, 0xE2, 0x00], true)
            .unwrap();
        assert!(!AacCie::parse(&result, false).unwrap().variable_bit_rate);
    }

    #[test]
    fn test_object_type_mismatch() {
        let aac = codec(CodecIndex::SourceAac);
        assert_eq!(
            aac.set_codec_config(&[8, 0, 2, 0x40, 0x01, 0x04, 0x04, 0xE2, 0x00], true),
            Err(A2dpError::ObjectTypeMismatch)
        );
    }

    #[test]
    fn test_user_mono_unsupported_by_source() {
        let aac = codec(CodecIndex::SourceAac);
        let user = CodecConfig::default().with_channel_mode(ChannelMode::MONO);
        assert_eq!(
            aac.set_codec_user_config(
                &user,
                &CodecConfig::default(),
                &CODEC_INFO_AAC_SINK_CAPABILITY,
                true
            ),
            Err(A2dpError::ChannelModeMismatch)
        );
        assert!(aac.user_config().is_empty());
    }
}
