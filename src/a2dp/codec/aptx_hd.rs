//! aptX-HD codec
//!
//! Same format octet as aptX, followed by four reserved octets.

use super::aptx::{
    AptxChannelMode, AptxSamplingFrequency, CHANNEL_MODE_MAP, SAMPLE_RATE_MAP, build_format,
    parse_format, resolve_format, selectable_format,
};
use super::{CodecState, Negotiator, flags_of};
use crate::a2dp::cie::{CieReader, CieWriter, CodecInfo};
use crate::a2dp::config::{BitsPerSample, CodecConfig};
use crate::a2dp::{A2dpError, MediaType, Role};
use crate::constants::{APTX_HD_CODEC_ID, APTX_HD_CODEC_LEN, APTX_HD_VENDOR_ID};

/// PCM samples per channel consumed by one aptX-HD codeword
pub const APTX_HD_SAMPLES_PER_FRAME: u32 = 4;

/// Decoded aptX-HD codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxHdCie {
    /// Sampling frequency support (bitfield)
    pub sample_rate: AptxSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_mode: AptxChannelMode,
    /// Reserved octets, carried through unchanged
    pub reserved: [u8; 4],
}

/// Local source capability
pub const APTX_HD_SOURCE_CAPS: AptxHdCie = AptxHdCie {
    sample_rate: AptxSamplingFrequency(AptxSamplingFrequency::HZ_44100 | AptxSamplingFrequency::HZ_48000),
    channel_mode: AptxChannelMode(AptxChannelMode::STEREO),
    reserved: [0; 4],
};

/// Default configuration
pub const APTX_HD_DEFAULT_CONFIG: AptxHdCie = AptxHdCie {
    sample_rate: AptxSamplingFrequency(AptxSamplingFrequency::HZ_48000),
    channel_mode: AptxChannelMode(AptxChannelMode::STEREO),
    reserved: [0; 4],
};

impl AptxHdCie {
    /// Parse an aptX-HD capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the structural error from the header checks, or
    /// `BadSampleRate`/`BadChannelMode`
    pub fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        let mut reader =
            CieReader::open_vendor(info, APTX_HD_CODEC_LEN, APTX_HD_VENDOR_ID, APTX_HD_CODEC_ID)?;
        let (sample_rate, channel_mode) = parse_format(reader.u8()?, is_capability)?;
        Ok(Self {
            sample_rate,
            channel_mode,
            reserved: reader.u32_le()?.to_le_bytes(),
        })
    }

    /// Build the information element
    ///
    /// # Errors
    /// Returns `InvalidParams` for empty fields or stray bits
    pub fn build(&self, media_type: MediaType) -> Result<CodecInfo, A2dpError> {
        let format = build_format(self.sample_rate, self.channel_mode)?;
        let mut writer =
            CieWriter::vendor(APTX_HD_CODEC_LEN, media_type, APTX_HD_VENDOR_ID, APTX_HD_CODEC_ID)?;
        writer.u8(format)?.bytes(&self.reserved)?;
        writer.finish()
    }

    const fn format(&self) -> (AptxSamplingFrequency, AptxChannelMode) {
        (self.sample_rate, self.channel_mode)
    }
}

/// aptX-HD negotiation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxHdCodec {
    /// Local role
    pub role: Role,
}

impl AptxHdCodec {
    /// aptX-HD rules for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Negotiator for AptxHdCodec {
    fn local_capability(&self) -> CodecConfig {
        CodecConfig::default()
            .with_sample_rate(flags_of(&SAMPLE_RATE_MAP, u16::from(APTX_HD_SOURCE_CAPS.sample_rate.0)))
            .with_bits_per_sample(BitsPerSample::BITS_24)
            .with_channel_mode(flags_of(&CHANNEL_MODE_MAP, u16::from(APTX_HD_SOURCE_CAPS.channel_mode.0)))
    }

    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        AptxHdCie::parse(info, is_capability).is_ok()
    }

    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let parsed = AptxHdCie::parse(peer, is_capability)?;
        let peer_cie = if is_capability {
            AptxHdCie::parse(&state.ota_peer_config, false).unwrap_or(parsed)
        } else {
            parsed
        };
        state.begin_negotiation();

        let format = resolve_format(
            state,
            APTX_HD_SOURCE_CAPS.format(),
            peer_cie.format(),
            APTX_HD_DEFAULT_CONFIG.format(),
            BitsPerSample::BITS_24,
        )?;
        let result = AptxHdCie {
            sample_rate: AptxSamplingFrequency(format.sample_rate.wire as u8),
            channel_mode: AptxChannelMode(format.channel_mode.wire as u8),
            reserved: APTX_HD_DEFAULT_CONFIG.reserved,
        }
        .build(MediaType::Audio)?;

        state.record_format(&format.sample_rate, &format.bits, &format.channel_mode);
        state.apply_codec_specific();
        state.commit(peer, is_capability, result)
    }

    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError> {
        let peer_cie = AptxHdCie::parse(peer, true)?;
        selectable_format(
            state,
            APTX_HD_SOURCE_CAPS.format(),
            peer_cie.format(),
            BitsPerSample::BITS_24,
        );
        Ok(())
    }

    fn samples_per_frame(&self, _config: &[u8]) -> u32 {
        APTX_HD_SAMPLES_PER_FRAME
    }
}
