//! SBC (Sub-Band Coding) codec
//!
//! SBC is the mandatory A2DP codec. Its information element carries four
//! octets after the header:
//!
//! ```text
//! [sampling frequency (7..4) | channel mode (3..0)]
//! [block length (7..4) | subbands (3..2) | allocation method (1..0)]
//! [min bitpool]
//! [max bitpool]
//! ```

use super::{CodecState, Negotiator, best_bit, flags_of, resolve, resolve_bits_per_sample};
use crate::a2dp::cie::{CieReader, CieWriter, CodecInfo};
use crate::a2dp::config::{BitsPerSample, ChannelMode, CodecConfig, SampleRate};
use crate::a2dp::{A2dpError, CodecType, MediaType, Role, check_field};
use crate::constants::{SBC_CODEC_LEN, SBC_LOCAL_MAX_BITPOOL, SBC_MAX_BITPOOL, SBC_MIN_BITPOOL};

/// SBC frame header size in bytes
const FRAME_HEADER_LEN: u32 = 4;

/// Bits per scale factor
const SCALE_FACTOR_BITS: u32 = 4;

/// SBC Sampling Frequency Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSamplingFrequency(pub u8);

impl SbcSamplingFrequency {
    /// 16000 Hz
    pub const HZ_16000: u8 = 0x80;
    /// 32000 Hz
    pub const HZ_32000: u8 = 0x40;
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

    /// Frequency in Hz of a single-frequency value
    #[must_use]
    pub const fn hz(&self) -> Option<u32> {
        match self.0 {
            Self::HZ_16000 => Some(16_000),
            Self::HZ_32000 => Some(32_000),
            Self::HZ_44100 => Some(44_100),
            Self::HZ_48000 => Some(48_000),
            _ => None,
        }
    }
}

/// SBC Channel Mode Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcChannelMode(pub u8);

impl SbcChannelMode {
    /// Mono
    pub const MONO: u8 = 0x08;
    /// Dual Channel
    pub const DUAL_CHANNEL: u8 = 0x04;
    /// Stereo
    pub const STEREO: u8 = 0x02;
    /// Joint Stereo
    pub const JOINT_STEREO: u8 = 0x01;
    /// Field mask
    pub const MASK: u8 = 0x0F;

    /// Check if mode is supported
    #[must_use]
    pub const fn supports(&self, mode: u8) -> bool {
        (self.0 & mode) != 0
    }
}

/// SBC Block Length Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcBlockLength(pub u8);

impl SbcBlockLength {
    /// 4 blocks
    pub const BLOCKS_4: u8 = 0x80;
    /// 8 blocks
    pub const BLOCKS_8: u8 = 0x40;
    /// 12 blocks
    pub const BLOCKS_12: u8 = 0x20;
    /// 16 blocks
    pub const BLOCKS_16: u8 = 0x10;
    /// Field mask
    pub const MASK: u8 = 0xF0;

    /// Check if block length is supported
    #[must_use]
    pub const fn supports(&self, blocks: u8) -> bool {
        (self.0 & blocks) != 0
    }

    /// Block count of a single-length value
    #[must_use]
    pub const fn count(&self) -> Option<u32> {
        match self.0 {
            Self::BLOCKS_4 => Some(4),
            Self::BLOCKS_8 => Some(8),
            Self::BLOCKS_12 => Some(12),
            Self::BLOCKS_16 => Some(16),
            _ => None,
        }
    }
}

/// SBC Subbands Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcSubbands(pub u8);

impl SbcSubbands {
    /// 4 subbands
    pub const SUBBANDS_4: u8 = 0x08;
    /// 8 subbands
    pub const SUBBANDS_8: u8 = 0x04;
    /// Field mask
    pub const MASK: u8 = 0x0C;

    /// Check if subband count is supported
    #[must_use]
    pub const fn supports(&self, subbands: u8) -> bool {
        (self.0 & subbands) != 0
    }

    /// Subband count of a single-count value
    #[must_use]
    pub const fn count(&self) -> Option<u32> {
        match self.0 {
            Self::SUBBANDS_4 => Some(4),
            Self::SUBBANDS_8 => Some(8),
            _ => None,
        }
    }
}

/// SBC Allocation Method Support (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcAllocationMethod(pub u8);

impl SbcAllocationMethod {
    /// SNR allocation method
    pub const SNR: u8 = 0x02;
    /// Loudness allocation method
    pub const LOUDNESS: u8 = 0x01;
    /// Field mask
    pub const MASK: u8 = 0x03;

    /// Check if allocation method is supported
    #[must_use]
    pub const fn supports(&self, method: u8) -> bool {
        (self.0 & method) != 0
    }
}

/// Decoded SBC codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCie {
    /// Sampling frequency support (bitfield)
    pub sampling_frequencies: SbcSamplingFrequency,
    /// Channel mode support (bitfield)
    pub channel_modes: SbcChannelMode,
    /// Block length support (bitfield)
    pub block_lengths: SbcBlockLength,
    /// Subbands support (bitfield)
    pub subbands: SbcSubbands,
    /// Allocation method support (bitfield)
    pub allocation_methods: SbcAllocationMethod,
    /// Minimum bitpool value (2-250)
    pub min_bitpool: u8,
    /// Maximum bitpool value (2-250)
    pub max_bitpool: u8,
}

/// Local source capability
pub const SBC_SOURCE_CAPS: SbcCie = SbcCie {
    sampling_frequencies: SbcSamplingFrequency(SbcSamplingFrequency::HZ_44100),
    channel_modes: SbcChannelMode(SbcChannelMode::MONO | SbcChannelMode::JOINT_STEREO),
    block_lengths: SbcBlockLength(SbcBlockLength::MASK),
    subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
    allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
    min_bitpool: SBC_MIN_BITPOOL,
    max_bitpool: SBC_LOCAL_MAX_BITPOOL,
};

/// Local sink capability
pub const SBC_SINK_CAPS: SbcCie = SbcCie {
    sampling_frequencies: SbcSamplingFrequency(
        SbcSamplingFrequency::HZ_44100 | SbcSamplingFrequency::HZ_48000,
    ),
    channel_modes: SbcChannelMode(SbcChannelMode::MASK),
    block_lengths: SbcBlockLength(SbcBlockLength::MASK),
    subbands: SbcSubbands(SbcSubbands::MASK),
    allocation_methods: SbcAllocationMethod(SbcAllocationMethod::MASK),
    min_bitpool: SBC_MIN_BITPOOL,
    max_bitpool: SBC_LOCAL_MAX_BITPOOL,
};

/// Default configuration
pub const SBC_DEFAULT_CONFIG: SbcCie = SbcCie {
    sampling_frequencies: SbcSamplingFrequency(SbcSamplingFrequency::HZ_44100),
    channel_modes: SbcChannelMode(SbcChannelMode::JOINT_STEREO),
    block_lengths: SbcBlockLength(SbcBlockLength::BLOCKS_16),
    subbands: SbcSubbands(SbcSubbands::SUBBANDS_8),
    allocation_methods: SbcAllocationMethod(SbcAllocationMethod::LOUDNESS),
    min_bitpool: SBC_MIN_BITPOOL,
    max_bitpool: SBC_LOCAL_MAX_BITPOOL,
};

/// Sample rates, best first
const SAMPLE_RATE_MAP: [(u16, SampleRate); 2] = [
    (SbcSamplingFrequency::HZ_48000 as u16, SampleRate::HZ_48000),
    (SbcSamplingFrequency::HZ_44100 as u16, SampleRate::HZ_44100),
];

/// Channel modes, best first; every two-channel wire mode is stereo
const CHANNEL_MODE_MAP: [(u16, ChannelMode); 4] = [
    (SbcChannelMode::JOINT_STEREO as u16, ChannelMode::STEREO),
    (SbcChannelMode::STEREO as u16, ChannelMode::STEREO),
    (SbcChannelMode::DUAL_CHANNEL as u16, ChannelMode::STEREO),
    (SbcChannelMode::MONO as u16, ChannelMode::MONO),
];

const BLOCK_LENGTH_ORDER: [u8; 4] = [
    SbcBlockLength::BLOCKS_16,
    SbcBlockLength::BLOCKS_12,
    SbcBlockLength::BLOCKS_8,
    SbcBlockLength::BLOCKS_4,
];

const SUBBANDS_ORDER: [u8; 2] = [SbcSubbands::SUBBANDS_8, SbcSubbands::SUBBANDS_4];

const ALLOCATION_ORDER: [u8; 2] = [SbcAllocationMethod::LOUDNESS, SbcAllocationMethod::SNR];

impl SbcCie {
    /// Parse an SBC capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the structural error from the header checks, or the first
    /// field that fails its range or bit-count rule
    pub fn parse(info: &[u8], is_capability: bool) -> Result<Self, A2dpError> {
        let mut reader = CieReader::open(info, SBC_CODEC_LEN, CodecType::Sbc)?;
        let octet0 = reader.u8()?;
        let octet1 = reader.u8()?;
        let cie = Self {
            sampling_frequencies: SbcSamplingFrequency(octet0 & SbcSamplingFrequency::MASK),
            channel_modes: SbcChannelMode(octet0 & SbcChannelMode::MASK),
            block_lengths: SbcBlockLength(octet1 & SbcBlockLength::MASK),
            subbands: SbcSubbands(octet1 & SbcSubbands::MASK),
            allocation_methods: SbcAllocationMethod(octet1 & SbcAllocationMethod::MASK),
            min_bitpool: reader.u8()?,
            max_bitpool: reader.u8()?,
        };

        if !(SBC_MIN_BITPOOL..=SBC_MAX_BITPOOL).contains(&cie.min_bitpool) {
            return Err(A2dpError::BadMinBitpool);
        }
        if !(SBC_MIN_BITPOOL..=SBC_MAX_BITPOOL).contains(&cie.max_bitpool)
            || cie.max_bitpool < cie.min_bitpool
        {
            return Err(A2dpError::BadMaxBitpool);
        }

        let fields = [
            (cie.sampling_frequencies.0, A2dpError::BadSampleRate),
            (cie.channel_modes.0, A2dpError::BadChannelMode),
            (cie.block_lengths.0, A2dpError::BadBlockLength),
            (cie.subbands.0, A2dpError::BadSubbands),
            (cie.allocation_methods.0, A2dpError::BadAllocationMethod),
        ];
        for (value, error) in fields {
            if !check_field(u64::from(value), is_capability) {
                return Err(error);
            }
        }
        Ok(cie)
    }

    /// Build the information element
    ///
    /// # Errors
    /// Returns `InvalidParams` for stray bits, empty fields or a bad bitpool range
    pub fn build(&self, media_type: MediaType) -> Result<CodecInfo, A2dpError> {
        let fields = [
            (self.sampling_frequencies.0, SbcSamplingFrequency::MASK),
            (self.channel_modes.0, SbcChannelMode::MASK),
            (self.block_lengths.0, SbcBlockLength::MASK),
            (self.subbands.0, SbcSubbands::MASK),
            (self.allocation_methods.0, SbcAllocationMethod::MASK),
        ];
        let bitpool_range = SBC_MIN_BITPOOL..=SBC_MAX_BITPOOL;
        if fields.iter().any(|&(value, mask)| value == 0 || value & !mask != 0)
            || !bitpool_range.contains(&self.min_bitpool)
            || !bitpool_range.contains(&self.max_bitpool)
            || self.min_bitpool > self.max_bitpool
        {
            return Err(A2dpError::InvalidParams);
        }

        let mut writer = CieWriter::new(SBC_CODEC_LEN, media_type, CodecType::Sbc);
        writer
            .u8(self.sampling_frequencies.0 | self.channel_modes.0)?
            .u8(self.block_lengths.0 | self.subbands.0 | self.allocation_methods.0)?
            .u8(self.min_bitpool)?
            .u8(self.max_bitpool)?;
        writer.finish()
    }

    /// Number of audio channels: 1 for mono, 2 for any other mode
    #[must_use]
    pub const fn channel_count(&self) -> u32 {
        if self.channel_modes.0 == SbcChannelMode::MONO {
            1
        } else {
            2
        }
    }

    /// PCM samples per channel in one frame (blocks x subbands)
    #[must_use]
    pub const fn samples_per_frame(&self) -> Option<u32> {
        match (self.block_lengths.count(), self.subbands.count()) {
            (Some(blocks), Some(subbands)) => Some(blocks * subbands),
            _ => None,
        }
    }

    /// Encoded frame size in bytes at `bitpool`
    #[must_use]
    pub const fn frame_length(&self, bitpool: u8) -> Option<u32> {
        let (Some(blocks), Some(subbands)) = (self.block_lengths.count(), self.subbands.count())
        else {
            return None;
        };
        let channels = self.channel_count();
        let bitpool = bitpool as u32;
        let scale_factors = SCALE_FACTOR_BITS * subbands * channels / 8;
        let audio = match self.channel_modes.0 {
            SbcChannelMode::MONO | SbcChannelMode::DUAL_CHANNEL => blocks * channels * bitpool / 8,
            SbcChannelMode::STEREO => blocks * bitpool / 8,
            SbcChannelMode::JOINT_STEREO => (subbands + blocks * bitpool) / 8,
            _ => return None,
        };
        Some(FRAME_HEADER_LEN + scale_factors + audio)
    }

    /// Encoded bit rate in bits per second at the maximum bitpool
    #[must_use]
    pub const fn bit_rate(&self) -> Option<u32> {
        let (Some(frame_len), Some(samples), Some(hz)) = (
            self.frame_length(self.max_bitpool),
            self.samples_per_frame(),
            self.sampling_frequencies.hz(),
        ) else {
            return None;
        };
        Some(8 * frame_len * hz / samples)
    }

    /// Rewrite `info` with the maximum bitpool capped to what this device encodes
    ///
    /// # Errors
    /// Returns the parse or build error
    pub fn adjust_codec(info: &[u8]) -> Result<CodecInfo, A2dpError> {
        let mut cie = Self::parse(info, true)?;
        if cie.max_bitpool > SBC_LOCAL_MAX_BITPOOL {
            warn!(
                "[SBC] max bitpool capped from {} to {}",
                cie.max_bitpool, SBC_LOCAL_MAX_BITPOOL
            );
            cie.max_bitpool = SBC_LOCAL_MAX_BITPOOL;
        }
        cie.build(MediaType::Audio)
    }

    fn sample_rates(&self) -> SampleRate {
        flags_of(&SAMPLE_RATE_MAP, u16::from(self.sampling_frequencies.0))
    }

    fn channel_modes(&self) -> ChannelMode {
        flags_of(&CHANNEL_MODE_MAP, u16::from(self.channel_modes.0))
    }
}

/// SBC negotiation rules for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCodec {
    /// Local role
    pub role: Role,
}

impl SbcCodec {
    /// SBC rules for `role`
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }

    /// Local capability element for this direction
    #[must_use]
    pub const fn caps(&self) -> &'static SbcCie {
        match self.role {
            Role::Source => &SBC_SOURCE_CAPS,
            Role::Sink => &SBC_SINK_CAPS,
        }
    }
}

impl Negotiator for SbcCodec {
    fn local_capability(&self) -> CodecConfig {
        let caps = self.caps();
        CodecConfig::default()
            .with_sample_rate(caps.sample_rates())
            .with_bits_per_sample(BitsPerSample::BITS_16)
            .with_channel_mode(caps.channel_modes())
    }

    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        SbcCie::parse(info, is_capability).is_ok()
    }

    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let parsed = SbcCie::parse(peer, is_capability)?;
        let peer_cie = if is_capability {
            SbcCie::parse(&state.ota_peer_config, false).unwrap_or(parsed)
        } else {
            parsed
        };
        let caps = self.caps();
        state.begin_negotiation();

        let sample_rate = resolve(
            &SAMPLE_RATE_MAP,
            u16::from(caps.sampling_frequencies.0 & peer_cie.sampling_frequencies.0),
            u16::from(SBC_DEFAULT_CONFIG.sampling_frequencies.0),
            state.user_config.sample_rate,
            state.audio_config.sample_rate,
            A2dpError::SampleRateMismatch,
        )?;
        let bits = resolve_bits_per_sample(state, BitsPerSample::BITS_16, BitsPerSample::BITS_16)?;
        let channel_mode = resolve(
            &CHANNEL_MODE_MAP,
            u16::from(caps.channel_modes.0 & peer_cie.channel_modes.0),
            u16::from(SBC_DEFAULT_CONFIG.channel_modes.0),
            state.user_config.channel_mode,
            state.audio_config.channel_mode,
            A2dpError::ChannelModeMismatch,
        )?;

        let block_length = best_bit(caps.block_lengths.0 & peer_cie.block_lengths.0, &BLOCK_LENGTH_ORDER)
            .ok_or(A2dpError::BlockLengthMismatch)?;
        let subbands = best_bit(caps.subbands.0 & peer_cie.subbands.0, &SUBBANDS_ORDER)
            .ok_or(A2dpError::SubbandsMismatch)?;
        let allocation = best_bit(
            caps.allocation_methods.0 & peer_cie.allocation_methods.0,
            &ALLOCATION_ORDER,
        )
        .ok_or(A2dpError::AllocationMethodMismatch)?;

        let min_bitpool = caps.min_bitpool.max(peer_cie.min_bitpool);
        let max_bitpool = caps.max_bitpool.min(peer_cie.max_bitpool);
        if min_bitpool > max_bitpool {
            error!(
                "[SBC] cannot match bitpool: local {}..{} peer {}..{}",
                caps.min_bitpool, caps.max_bitpool, peer_cie.min_bitpool, peer_cie.max_bitpool
            );
            return Err(A2dpError::BitpoolMismatch);
        }

        let result = SbcCie {
            sampling_frequencies: SbcSamplingFrequency(sample_rate.wire as u8),
            channel_modes: SbcChannelMode(channel_mode.wire as u8),
            block_lengths: SbcBlockLength(block_length),
            subbands: SbcSubbands(subbands),
            allocation_methods: SbcAllocationMethod(allocation),
            min_bitpool,
            max_bitpool,
        }
        .build(MediaType::Audio)?;

        state.record_format(&sample_rate, &bits, &channel_mode);
        state.apply_codec_specific();
        state.commit(peer, is_capability, result)
    }

    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError> {
        let peer_cie = SbcCie::parse(peer, true)?;
        let caps = self.caps();
        state.selectable_capability.sample_rate = flags_of(
            &SAMPLE_RATE_MAP,
            u16::from(caps.sampling_frequencies.0 & peer_cie.sampling_frequencies.0),
        );
        state.selectable_capability.bits_per_sample = BitsPerSample::BITS_16;
        state.selectable_capability.channel_mode =
            flags_of(&CHANNEL_MODE_MAP, u16::from(caps.channel_modes.0 & peer_cie.channel_modes.0));
        Ok(())
    }

    fn samples_per_frame(&self, config: &[u8]) -> u32 {
        SbcCie::parse(config, false)
            .ok()
            .and_then(|cie| cie.samples_per_frame())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2dp::codec::CodecInstance;
    use crate::a2dp::config::CodecIndex;
    use crate::constants::CODEC_PRIORITY_DEFAULT;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const CODEC_INFO_SBC: [u8; 7] = [6, 0, 0, 0x21, 0x15, 2, 53];
    const CODEC_INFO_SBC_CAPABILITY: [u8; 7] = [6, 0, 0, 0x29, 0xF5, 2, 53];
    const CODEC_INFO_SBC_SINK_CAPABILITY: [u8; 7] = [6, 0, 0, 0x3F, 0xFF, 2, 53];

    fn codec(index: CodecIndex) -> CodecInstance<NoopRawMutex> {
        CodecInstance::new(index, CODEC_PRIORITY_DEFAULT)
    }

    #[test]
    fn test_parse_config() {
        let cie = SbcCie::parse(&CODEC_INFO_SBC, false).unwrap();
        assert_eq!(cie.sampling_frequencies.hz(), Some(44_100));
        assert!(cie.channel_modes.supports(SbcChannelMode::JOINT_STEREO));
        assert_eq!(cie.block_lengths.count(), Some(16));
        assert_eq!(cie.subbands.count(), Some(8));
        assert!(cie.allocation_methods.supports(SbcAllocationMethod::LOUDNESS));
        assert_eq!((cie.min_bitpool, cie.max_bitpool), (2, 53));
        assert_eq!(cie, SBC_DEFAULT_CONFIG);
    }

    #[test]
    fn test_capability_must_not_parse_as_config() {
        assert!(SbcCie::parse(&CODEC_INFO_SBC_CAPABILITY, true).is_ok());
        assert_eq!(
            SbcCie::parse(&CODEC_INFO_SBC_CAPABILITY, false),
            Err(A2dpError::BadChannelMode)
        );
    }

    #[test]
    fn test_parse_field_errors() {
        let cases: [([u8; 7], A2dpError); 7] = [
            ([6, 0, 0, 0x21, 0x15, 1, 53], A2dpError::BadMinBitpool),
            ([6, 0, 0, 0x21, 0x15, 251, 251], A2dpError::BadMinBitpool),
            ([6, 0, 0, 0x21, 0x15, 40, 30], A2dpError::BadMaxBitpool),
            ([6, 0, 0, 0x01, 0x15, 2, 53], A2dpError::BadSampleRate),
            ([6, 0, 0, 0x20, 0x15, 2, 53], A2dpError::BadChannelMode),
            ([6, 0, 0, 0x21, 0x05, 2, 53], A2dpError::BadBlockLength),
            ([6, 0, 0, 0x21, 0x1D, 2, 53], A2dpError::BadSubbands),
        ];
        for (info, error) in cases {
            assert_eq!(SbcCie::parse(&info, false), Err(error));
        }
        assert_eq!(
            SbcCie::parse(&[6, 0, 0, 0x21, 0x14, 2, 53], true),
            Err(A2dpError::BadAllocationMethod)
        );
        assert_eq!(SbcCie::parse(&[7, 0, 0, 0x21, 0x15, 2, 53, 0], false), Err(A2dpError::WrongCodec));
        assert_eq!(SbcCie::parse(&[6, 0, 0, 0x21], false), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_build_round_trip() {
        for cie in [SBC_SOURCE_CAPS, SBC_SINK_CAPS, SBC_DEFAULT_CONFIG] {
            let info = cie.build(MediaType::Audio).unwrap();
            assert_eq!(SbcCie::parse(&info, true), Ok(cie));
        }
        assert_eq!(
            SBC_SOURCE_CAPS.build(MediaType::Audio).unwrap().as_slice(),
            &CODEC_INFO_SBC_CAPABILITY
        );
    }

    #[test]
    fn test_build_rejects_bad_fields() {
        let mut cie = SBC_DEFAULT_CONFIG;
        cie.sampling_frequencies = SbcSamplingFrequency(0x01);
        assert_eq!(cie.build(MediaType::Audio), Err(A2dpError::InvalidParams));

        let mut cie = SBC_DEFAULT_CONFIG;
        cie.subbands = SbcSubbands(0);
        assert_eq!(cie.build(MediaType::Audio), Err(A2dpError::InvalidParams));

        let mut cie = SBC_DEFAULT_CONFIG;
        cie.min_bitpool = 60;
        assert_eq!(cie.build(MediaType::Audio), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_frame_length_and_bit_rate() {
        let cie = SBC_DEFAULT_CONFIG;
        // 4 + (4 * 8 * 2) / 8 + (8 + 16 * 53) / 8
        assert_eq!(cie.frame_length(53), Some(4 + 8 + 107));
        assert_eq!(cie.samples_per_frame(), Some(128));
        assert_eq!(cie.bit_rate(), Some(8 * 119 * 44_100 / 128));

        let mut mono = cie;
        mono.channel_modes = SbcChannelMode(SbcChannelMode::MONO);
        assert_eq!(mono.channel_count(), 1);
        assert_eq!(mono.frame_length(32), Some(4 + 4 + 64));
        assert_eq!(SBC_SINK_CAPS.frame_length(32), None);
    }

    #[test]
    fn test_adjust_codec_caps_bitpool() {
        let adjusted = SbcCie::adjust_codec(&[6, 0, 0, 0x21, 0x15, 2, 250]).unwrap();
        assert_eq!(adjusted.as_slice(), &[6, 0, 0, 0x21, 0x15, 2, 53]);
        let untouched = SbcCie::adjust_codec(&CODEC_INFO_SBC).unwrap();
        assert_eq!(untouched.as_slice(), &CODEC_INFO_SBC);
    }

    #[test]
    fn test_source_negotiation_with_sink_capability() {
        let sbc = codec(CodecIndex::SourceSbc);
        let result = sbc.set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true).unwrap();
        assert_eq!(result.as_slice(), &CODEC_INFO_SBC);
        let selectable = sbc.selectable_capability();
        assert_eq!(selectable.sample_rate, SampleRate::HZ_44100);
        assert_eq!(selectable.channel_mode, ChannelMode::MONO | ChannelMode::STEREO);
    }

    #[test]
    fn test_negotiation_is_idempotent() {
        let sbc = codec(CodecIndex::SourceSbc);
        let first = sbc.set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true).unwrap();
        let state = sbc.state();
        let second = sbc.set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true).unwrap();
        assert_eq!(first, second);
        assert_eq!(sbc.state(), state);
    }

    #[test]
    fn test_result_is_contained_in_both_capabilities() {
        let peers: [[u8; 7]; 3] = [
            CODEC_INFO_SBC_SINK_CAPABILITY,
            [6, 0, 0, 0x28, 0x89, 10, 30],
            [6, 0, 0, 0x22, 0x46, 2, 250],
        ];
        let sink = codec(CodecIndex::SinkSbc);
        for peer in peers {
            let result = sink.set_codec_config(&peer, true).unwrap();
            let chosen = SbcCie::parse(&result, false).unwrap();
            let peer_cie = SbcCie::parse(&peer, true).unwrap();
            for (field, peer_field, local_field) in [
                (chosen.sampling_frequencies.0, peer_cie.sampling_frequencies.0, SBC_SINK_CAPS.sampling_frequencies.0),
                (chosen.channel_modes.0, peer_cie.channel_modes.0, SBC_SINK_CAPS.channel_modes.0),
                (chosen.block_lengths.0, peer_cie.block_lengths.0, SBC_SINK_CAPS.block_lengths.0),
                (chosen.subbands.0, peer_cie.subbands.0, SBC_SINK_CAPS.subbands.0),
                (chosen.allocation_methods.0, peer_cie.allocation_methods.0, SBC_SINK_CAPS.allocation_methods.0),
            ] {
                assert_eq!(field & peer_field, field);
                assert_eq!(field & local_field, field);
            }
            assert!(chosen.min_bitpool >= peer_cie.min_bitpool);
            assert!(chosen.max_bitpool <= peer_cie.max_bitpool);
        }
    }

    #[test]
    fn test_sink_prefers_default_rate_then_best() {
        let sink = codec(CodecIndex::SinkSbc);
        // Peer offers 44.1 and 48 kHz: the default (44.1 kHz) wins
        let result = sink.set_codec_config(&[6, 0, 0, 0x31, 0x15, 2, 53], true).unwrap();
        assert_eq!(result[3] & SbcSamplingFrequency::MASK, SbcSamplingFrequency::HZ_44100);
        // Peer offers 48 kHz only
        let result = sink.set_codec_config(&[6, 0, 0, 0x11, 0x15, 2, 53], true).unwrap();
        assert_eq!(result[3] & SbcSamplingFrequency::MASK, SbcSamplingFrequency::HZ_48000);
    }

    #[test]
    fn test_user_pinned_rate_unsupported_by_peer_fails() {
        let sink = codec(CodecIndex::SinkSbc);
        sink.set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true).unwrap();
        let before = sink.state();
        let user = CodecConfig::default().with_sample_rate(SampleRate::HZ_48000);
        let peer_44k_only = [6, 0, 0, 0x2F, 0xFF, 2, 53];
        assert_eq!(
            sink.set_codec_user_config(&user, &CodecConfig::default(), &peer_44k_only, true),
            Err(A2dpError::SampleRateMismatch)
        );
        assert_eq!(sink.state(), before);
    }

    #[test]
    fn test_stereo_preference_maps_to_joint() {
        let sink = codec(CodecIndex::SinkSbc);
        let audio = CodecConfig::default().with_channel_mode(ChannelMode::STEREO);
        let update = sink
            .set_codec_user_config(&CodecConfig::default(), &audio, &[6, 0, 0, 0x2E, 0x15, 2, 53], true)
            .unwrap();
        assert_eq!(update.codec_config[3] & SbcChannelMode::MASK, SbcChannelMode::STEREO);
    }

    #[test]
    fn test_bitpool_and_field_mismatches() {
        let source = codec(CodecIndex::SourceSbc);
        assert_eq!(
            source.set_codec_config(&[6, 0, 0, 0x21, 0x15, 60, 80], true),
            Err(A2dpError::BitpoolMismatch)
        );
        assert_eq!(
            source.set_codec_config(&[6, 0, 0, 0x21, 0x19, 2, 53], true),
            Err(A2dpError::SubbandsMismatch)
        );
        assert_eq!(
            source.set_codec_config(&[6, 0, 0, 0x21, 0x16, 2, 53], true),
            Err(A2dpError::AllocationMethodMismatch)
        );
        assert_eq!(
            source.set_codec_config(&[6, 0, 0, 0x22, 0x15, 2, 53], true),
            Err(A2dpError::ChannelModeMismatch)
        );
        assert!(source.ota_codec_config().is_none());
    }

    #[test]
    fn test_cached_peer_config_is_preferred() {
        let source = codec(CodecIndex::SourceSbc);
        source.set_codec_config(&[6, 0, 0, 0x28, 0x25, 2, 40], false).unwrap();
        let result = source.set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true).unwrap();
        assert_eq!(result.as_slice(), &[6, 0, 0, 0x28, 0x25, 2, 40]);
        assert_eq!(source.ota_peer_config().as_slice(), &[6, 0, 0, 0x28, 0x25, 2, 40]);
    }
}
