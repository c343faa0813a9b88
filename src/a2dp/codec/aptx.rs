//! aptX codec
//!
//! Vendor-specific element with a single octet after the vendor header:
//! sampling frequency in the high nibble, channel mode in the low nibble.

use super::{CodecState, Negotiator, Resolved, flags_of, resolve, resolve_bits_per_sample};
use crate::a2dp::cie::{CieReader, CieWriter, CodecInfo};
use crate::a2dp::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use crate::a2dp::{A2dpError, MediaType, Role, check_field};
use crate::constants::{APTX_CODEC_ID, APTX_CODEC_LEN, APTX_VENDOR_ID};

/// PCM samples per channel consumed by one aptX codeword
pub const APTX_SAMPLES_PER_FRAME: u32 = 4;

/// aptX Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxSamplingFrequency(pub u8);

impl AptxSamplingFrequency {
    /// 44100 Hz
    pub const HZ_44100: u8 = 0x20;
    /// 48000 Hz
    pub const HZ_48000: u8 = 0x10;
    /// Field mask
    pub const MASK: u8 = 0xF0;

    /// Check if frequency is supported
    #[must_use]
    pub const fn supports(&self, freq: u8) -> bool {
        (self.0 & freq) != 0
    }
}

/// aptX Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxChannelMode(pub u8);

impl AptxChannelMode {
    /// Mono
    pub const MONO: u8 = 0x01;
    /// Stereo
    pub const STEREO: u8 = 0x02;
    /// Field mask
    pub const MASK: u8 = 0x0F;

    /// Check if mode is supported
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }
}

/// Decoded aptX codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxCie {
    /// Sampling frequency support (bitfield)
    pub sample_rate: AptxSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_mode: AptxChannelMode,
}

/// Local source capability
pub const APTX_SOURCE_CAPS: AptxCie = AptxCie {
    sample_rate: AptxSamplingFrequency(AptxSamplingFrequency::HZ_44100 | AptxSamplingFrequency::HZ_48000),
    channel_mode: AptxChannelMode(AptxChannelMode::STEREO),
};

/// Default configuration
pub const APTX_DEFAULT_CONFIG: AptxCie = AptxCie {
    sample_rate: AptxSamplingFrequency(AptxSamplingFrequency::HZ_48000),
    channel_mode: AptxChannelMode(AptxChannelMode::STEREO),
};

pub(crate) const SAMPLE_RATE_MAP: [(u16, SampleRate); 2] = [
    (AptxSamplingFrequency::HZ_48000 as u16, SampleRate::HZ_48000),
    (AptxSamplingFrequency::HZ_44100 as u16, SampleRate::HZ_44100),
];

pub(crate) const CHANNEL_MODE_MAP: [(u16, ChannelMode); 2] = [
    (AptxChannelMode::STEREO as u16, ChannelMode::STEREO),
    (AptxChannelMode::MONO as u16, ChannelMode::MONO),
];

/// Split the shared aptX format octet and check both fields
pub(crate) fn parse_format(
    octet: u8,
    is_capability: bool,
) -> Result<(AptxSamplingFrequency, AptxChannelMode), A2dpError> {
    let sample_rate = AptxSamplingFrequency(octet & AptxSamplingFrequency::MASK);
    let channel_mode = AptxChannelMode(octet & AptxChannelMode::MASK);
    if !check_field(u64::from(sample_rate.0), is_capability) {
        return Err(A2dpError::BadSampleRate);
    }
    if !check_field(u64::from(channel_mode.0), is_capability) {
        return Err(A2dpError::BadChannelMode);
    }
    Ok((sample_rate, channel_mode))
}

/// Join and check the shared aptX format octet
pub(crate) fn build_format(
    sample_rate: AptxSamplingFrequency,
    channel_mode: AptxChannelMode,
) -> Result<u8, A2dpError> {
    if sample_rate.0 == 0
        || sample_rate.0 & !AptxSamplingFrequency::MASK != 0
        || channel_mode.0 == 0
        || channel_mode.0 & !AptxChannelMode::MASK != 0
    {
        return Err(A2dpError::InvalidParams);
    }
    Ok(sample_rate.0 | channel_mode.0)
}

/// Negotiated aptX-family audio format
pub(crate) struct AptxFormat {
    pub sample_rate: Resolved<SampleRate>,
    pub bits: Resolved<BitsPerSample>,
    pub channel_mode: Resolved<ChannelMode>,
}

/// Resolve the audio format shared by aptX and aptX-HD
pub(crate) fn resolve_format(
    state: &CodecState,
    local: (AptxSamplingFrequency, AptxChannelMode),
    peer: (AptxSamplingFrequency, AptxChannelMode),
    default: (AptxSamplingFrequency, AptxChannelMode),
    bits: BitsPerSample,
) -> Result<AptxFormat, A2dpError> {
    Ok(AptxFormat {
        sample_rate: resolve(
            &SAMPLE_RATE_MAP,
            u16::from(local.0.0 & peer.0.0),
            u16::from(default.0.0),
            state.user_config.sample_rate,
            state.audio_config.sample_rate,
            A2dpError::SampleRateMismatch,
        )?,
        bits: resolve_bits_per_sample(state, bits, bits)?,
        channel_mode: resolve(
            &CHANNEL_MODE_MAP,
            u16::from(local.1.0 & peer.1.0),
            u16::from(default.1.0),
            state.user_config.channel_mode,
            state.audio_config.channel_mode,
            A2dpError::ChannelModeMismatch,
        )?,
    })
}

/// Selectable format of an aptX-family codec against a peer
pub(crate) fn selectable_format(
    state: &mut CodecState,
    local: (AptxSamplingFrequency, AptxChannelMode),
    peer: (AptxSamplingFrequency, AptxChannelMode),
    bits: BitsPerSample,
) {
    state.selectable_capability.sample_rate = flags_of(&SAMPLE_RATE_MAP, u16::from(local.0.0 & peer.0.0));
    state.selectable_capability.bits_per_sample = bits;
    state.selectable_capability.channel_mode = flags_of(&CHANNEL_MODE_MAP, u16::from(local.1.0 & peer.1.0));
}

impl AptxCie {
    /// Parse an aptX capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the structural error from the header checks, or
    /// `BadSampleRate`/`BadChannelMode`
    pub fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        let mut reader = CieReader::open_vendor(info, APTX_CODEC_LEN, APTX_VENDOR_ID, APTX_CODEC_ID)?;
        let (sample_rate, channel_mode) = parse_format(reader.u8()?, is_capability)?;
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
        let format = build_format(self.sample_rate, self.channel_mode)?;
        let mut writer = CieWriter::vendor(APTX_CODEC_LEN, media_type, APTX_VENDOR_ID, APTX_CODEC_ID)?;
        writer.u8(format)?;
        writer.finish()
    }

    const fn format(&self) -> (AptxSamplingFrequency, AptxChannelMode) {
        (self.sample_rate, self.channel_mode)
    }
}

/// aptX negotiation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxCodec {
    /// Local role
    pub role: Role,
}

impl AptxCodec {
    /// aptX rules for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Negotiator for AptxCodec {
    fn local_capability(&self) -> CodecConfig {
        CodecConfig::default()
            .with_sample_rate(flags_of(&SAMPLE_RATE_MAP, u16::from(APTX_SOURCE_CAPS.sample_rate.0)))
            .with_bits_per_sample(BitsPerSample::BITS_16)
            .with_channel_mode(flags_of(&CHANNEL_MODE_MAP, u16::from(APTX_SOURCE_CAPS.channel_mode.0)))
    }

    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        AptxCie::parse(info, is_capability).is_ok()
    }

    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let parsed = AptxCie::parse(peer, is_capability)?;
        let peer_cie = if is_capability {
            AptxCie::parse(&state.ota_peer_config, false).unwrap_or(parsed)
        } else {
            parsed
        };
        state.begin_negotiation();

        let format = resolve_format(
            state,
            APTX_SOURCE_CAPS.format(),
            peer_cie.format(),
            APTX_DEFAULT_CONFIG.format(),
            BitsPerSample::BITS_16,
        )?;
        let result = AptxCie {
            sample_rate: AptxSamplingFrequency(format.sample_rate.wire as u8),
            channel_mode: AptxChannelMode(format.channel_mode.wire as u8),
        }
        .build(MediaType::Audio)?;

        state.record_format(&format.sample_rate, &format.bits, &format.channel_mode);
        state.apply_codec_specific();
        state.commit(peer, is_capability, result)
    }

    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError> {
        let peer_cie = AptxCie::parse(peer, true)?;
        selectable_format(state, APTX_SOURCE_CAPS.format(), peer_cie.format(), BitsPerSample::BITS_16);
        Ok(())
    }

    fn samples_per_frame(&self, _config: &[u8]) -> u32 {
        APTX_SAMPLES_PER_FRAME
    }
}
