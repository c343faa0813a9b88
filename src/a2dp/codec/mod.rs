//! Codec Negotiation Engine
//!
//! One [`CodecInstance`] exists per codec family and direction. It owns the
//! capability/configuration views for that codec and runs negotiations
//! against peer codec information elements. Family-specific rules live in the
//! submodules and are reached through the [`Negotiator`] trait; the instance
//! wraps them in the transactional discipline: every negotiation either
//! commits completely or leaves the instance exactly as it was.
//!
//! ## Preference order
//!
//! For sample rate, bits per sample and channel mode:
//!
//! 1. A value pinned in the user configuration (must be supported by both sides)
//! 2. The audio-feeding preference, if it lies in local ∩ peer
//! 3. The family default, if the peer supports it
//! 4. The family's best value in local ∩ peer

pub mod aac;
pub mod aptx;
pub mod aptx_hd;
pub mod ldac;
pub mod sbc;

pub use aac::{AacCie, AacCodec};
pub use aptx::{AptxCie, AptxCodec};
pub use aptx_hd::{AptxHdCie, AptxHdCodec};
pub use ldac::{LdacCie, LdacCodec, LdacQuality};
pub use sbc::{SbcCie, SbcCodec};

use super::cie::{CodecInfo, codec_equals, vendor_ids};
use super::config::{BitsPerSample, ChannelMode, CodecConfig, CodecIndex, SampleRate};
use super::pacing::FeedingParams;
use super::{A2dpError, CodecType, Role};
use crate::constants::{APTX_ENCODER_INTERVAL_MS, ENCODER_INTERVAL_MS, MAX_PCM_FRAME_NUM_PER_TICK};
use core::cell::RefCell;
use core::ops::BitOr;
use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

/// Codec-neutral bitfield used by the preference resolver
pub(crate) trait Flags: Copy + PartialEq + BitOr<Output = Self> {
    /// The empty set
    const EMPTY: Self;
}

impl Flags for SampleRate {
    const EMPTY: Self = Self::NONE;
}

impl Flags for BitsPerSample {
    const EMPTY: Self = Self::NONE;
}

impl Flags for ChannelMode {
    const EMPTY: Self = Self::NONE;
}

/// One parameter table row: a wire bit and the codec-neutral value it maps to
///
/// Tables are ordered best-first.
pub(crate) type FieldMap<T> = [(u16, T)];

/// Outcome of resolving one user-configurable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolved<T> {
    /// Wire bit to transmit
    pub wire: u16,
    /// Chosen codec-neutral value
    pub value: T,
    /// Every codec-neutral value in local ∩ peer
    pub selectable: T,
    /// Negotiated capability: the user value, or the selectable set
    pub capability: T,
}

/// Resolve one parameter against its table
///
/// `common` is local ∩ peer on the wire, `default_bits` the family default
/// restricted to `common`. A pinned `user` value that is not in `common`
/// fails with `error`, as does an empty intersection.
pub(crate) fn resolve<T: Flags>(
    map: &FieldMap<T>,
    common: u16,
    default_bits: u16,
    user: T,
    audio: T,
    error: A2dpError,
) -> Result<Resolved<T>, A2dpError> {
    let selectable = flags_of(map, common);
    let pick = |allowed: u16, wanted: Option<T>| {
        map.iter()
            .find(|(wire, value)| allowed & wire != 0 && wanted.is_none_or(|w| w == *value))
            .copied()
    };

    if user != T::EMPTY {
        let (wire, value) = pick(common, Some(user)).ok_or(error)?;
        return Ok(Resolved {
            wire,
            value,
            selectable,
            capability: user,
        });
    }

    let audio_pick = if audio == T::EMPTY {
        None
    } else {
        pick(common, Some(audio))
    };
    let (wire, value) = audio_pick
        .or_else(|| pick(default_bits & common, None))
        .or_else(|| pick(common, None))
        .ok_or(error)?;
    Ok(Resolved {
        wire,
        value,
        selectable,
        capability: selectable,
    })
}

/// Union of the values the bits of `wire` map to
pub(crate) fn flags_of<T: Flags>(map: &FieldMap<T>, wire: u16) -> T {
    map.iter()
        .filter(|(bit, _)| wire & bit != 0)
        .fold(T::EMPTY, |acc, (_, value)| acc | *value)
}

/// Highest-ranked bit of `common` in a best-first `order`
pub(crate) fn best_bit(common: u8, order: &[u8]) -> Option<u8> {
    order.iter().copied().find(|bit| common & bit != 0)
}

/// Bits per sample table shared by every family, best first
pub(crate) const BITS_PER_SAMPLE_MAP: [(u16, BitsPerSample); 3] = [
    (0x04, BitsPerSample::BITS_32),
    (0x02, BitsPerSample::BITS_24),
    (0x01, BitsPerSample::BITS_16),
];

/// Resolve bits per sample; the peer never advertises a depth, so only
/// local capability constrains it
pub(crate) fn resolve_bits_per_sample(
    state: &CodecState,
    local: BitsPerSample,
    default: BitsPerSample,
) -> Result<Resolved<BitsPerSample>, A2dpError> {
    resolve(
        &BITS_PER_SAMPLE_MAP,
        u16::from(local.0),
        u16::from(default.0),
        state.user_config.bits_per_sample,
        state.audio_config.bits_per_sample,
        A2dpError::BitsPerSampleMismatch,
    )
}

/// Capability and configuration views held by one codec instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecState {
    /// Negotiated configuration
    pub config: CodecConfig,
    /// Negotiated capability
    pub capability: CodecConfig,
    /// Local capability, fixed at construction
    pub local_capability: CodecConfig,
    /// Local ∩ peer capability
    pub selectable_capability: CodecConfig,
    /// User preferences
    pub user_config: CodecConfig,
    /// Audio-feeding preferences
    pub audio_config: CodecConfig,
    /// Negotiated codec information element
    pub ota_config: CodecInfo,
    /// Last peer capability element
    pub ota_peer_capability: CodecInfo,
    /// Last peer configuration element
    pub ota_peer_config: CodecInfo,
}

impl CodecState {
    fn new(index: CodecIndex, priority: i32, local: CodecConfig) -> Self {
        let base = CodecConfig::new(Some(index)).with_priority(priority);
        Self {
            config: base,
            capability: base,
            local_capability: CodecConfig {
                codec_index: Some(index),
                priority,
                ..local
            },
            selectable_capability: base,
            user_config: CodecConfig::new(Some(index)),
            audio_config: CodecConfig::new(Some(index)),
            ota_config: CodecInfo::new(),
            ota_peer_capability: CodecInfo::new(),
            ota_peer_config: CodecInfo::new(),
        }
    }

    /// Clear the per-negotiation views before a new negotiation
    pub(crate) fn begin_negotiation(&mut self) {
        for view in [
            &mut self.config,
            &mut self.capability,
            &mut self.selectable_capability,
        ] {
            view.sample_rate = SampleRate::NONE;
            view.bits_per_sample = BitsPerSample::NONE;
            view.channel_mode = ChannelMode::NONE;
            view.codec_specific = [0; 4];
        }
    }

    /// Record a resolved audio format in all three negotiation views
    pub(crate) fn record_format(
        &mut self,
        sample_rate: &Resolved<SampleRate>,
        bits: &Resolved<BitsPerSample>,
        channel_mode: &Resolved<ChannelMode>,
    ) {
        self.config.sample_rate = sample_rate.value;
        self.config.bits_per_sample = bits.value;
        self.config.channel_mode = channel_mode.value;
        self.capability.sample_rate = sample_rate.capability;
        self.capability.bits_per_sample = bits.capability;
        self.capability.channel_mode = channel_mode.capability;
        self.selectable_capability.sample_rate = sample_rate.selectable;
        self.selectable_capability.bits_per_sample = bits.selectable;
        self.selectable_capability.channel_mode = channel_mode.selectable;
    }

    /// Copy every non-zero user codec-specific value over the negotiated one
    pub(crate) fn apply_codec_specific(&mut self) {
        for (negotiated, user) in self
            .config
            .codec_specific
            .iter_mut()
            .zip(self.user_config.codec_specific)
        {
            if user != 0 {
                *negotiated = user;
            }
        }
    }

    /// Cache the negotiated element and the peer element it came from
    pub(crate) fn commit(
        &mut self,
        peer: &[u8],
        is_capability: bool,
        result: CodecInfo,
    ) -> Result<CodecInfo, A2dpError> {
        let peer = trimmed(peer)?;
        if is_capability {
            self.ota_peer_capability = peer;
        } else {
            self.ota_peer_config = peer;
        }
        self.ota_config = result.clone();
        Ok(result)
    }
}

/// Copy the significant bytes of an element
fn trimmed(info: &[u8]) -> Result<CodecInfo, A2dpError> {
    let len = usize::from(*info.first().ok_or(A2dpError::InvalidParams)?) + 1;
    let bytes = info.get(..len).ok_or(A2dpError::InvalidParams)?;
    CodecInfo::from_slice(bytes).map_err(|()| A2dpError::InvalidParams)
}

/// Family-specific negotiation rules
///
/// Implementations write into `state` freely; the caller snapshots the state
/// first and restores it on any error.
pub trait Negotiator {
    /// Local capability as a codec-neutral record
    fn local_capability(&self) -> CodecConfig;

    /// Whether `info` parses as this family's capability or configuration
    fn is_valid(&self, info: &[u8], is_capability: bool) -> bool;

    /// Negotiate against a peer capability or configuration
    ///
    /// # Errors
    /// Returns the parse error or the per-field mismatch that stopped negotiation
    fn negotiate(
        &self,
        state: &mut CodecState,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError>;

    /// Recompute only the selectable capability from a peer capability
    ///
    /// # Errors
    /// Returns the parse error if the peer capability is invalid
    fn update_selectable(&self, state: &mut CodecState, peer: &[u8]) -> Result<(), A2dpError>;

    /// PCM samples per channel consumed by one encoded frame
    fn samples_per_frame(&self, config: &[u8]) -> u32;
}

/// Closed set of codec families, each carrying its direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecFamily {
    /// SBC
    Sbc(SbcCodec),
    /// MPEG-2/4 AAC
    Aac(AacCodec),
    /// aptX
    Aptx(AptxCodec),
    /// aptX-HD
    AptxHd(AptxHdCodec),
    /// LDAC
    Ldac(LdacCodec),
}

impl CodecFamily {
    /// Family implementing `index`
    #[must_use]
    pub const fn for_index(index: CodecIndex) -> Self {
        let role = index.role();
        match index {
            CodecIndex::SourceSbc | CodecIndex::SinkSbc => Self::Sbc(SbcCodec::new(role)),
            CodecIndex::SourceAac | CodecIndex::SinkAac => Self::Aac(AacCodec::new(role)),
            CodecIndex::SourceAptx => Self::Aptx(AptxCodec::new(role)),
            CodecIndex::SourceAptxHd => Self::AptxHd(AptxHdCodec::new(role)),
            CodecIndex::SourceLdac | CodecIndex::SinkLdac => Self::Ldac(LdacCodec::new(role)),
        }
    }

    /// Shared negotiation contract of this family
    #[must_use]
    pub fn negotiator(&self) -> &dyn Negotiator {
        match self {
            Self::Sbc(codec) => codec,
            Self::Aac(codec) => codec,
            Self::Aptx(codec) => codec,
            Self::AptxHd(codec) => codec,
            Self::Ldac(codec) => codec,
        }
    }

    /// Direction of this family instance
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Sbc(codec) => codec.role,
            Self::Aac(codec) => codec.role,
            Self::Aptx(codec) => codec.role,
            Self::AptxHd(codec) => codec.role,
            Self::Ldac(codec) => codec.role,
        }
    }

    /// Whether `info` parses as this family's capability or configuration
    #[must_use]
    pub fn is_valid(&self, info: &[u8], is_capability: bool) -> bool {
        self.negotiator().is_valid(info, is_capability)
    }

    /// Nominal encoder tick interval
    #[must_use]
    pub const fn encoder_interval_ms(&self) -> u64 {
        match self {
            Self::Aptx(_) | Self::AptxHd(_) => APTX_ENCODER_INTERVAL_MS,
            Self::Sbc(_) | Self::Aac(_) | Self::Ldac(_) => ENCODER_INTERVAL_MS,
        }
    }

    /// Frames the encoder may emit per tick before dropping the excess
    #[must_use]
    pub const fn frame_limit(&self) -> Option<u32> {
        match self {
            Self::Sbc(_) => Some(MAX_PCM_FRAME_NUM_PER_TICK),
            Self::Aac(_) | Self::Aptx(_) | Self::AptxHd(_) | Self::Ldac(_) => None,
        }
    }

    /// Log tag for this family
    pub(crate) const fn tag(&self) -> &'static str {
        match self {
            Self::Sbc(_) => "SBC",
            Self::Aac(_) => "AAC",
            Self::Aptx(_) => "APTX",
            Self::AptxHd(_) => "APTX-HD",
            Self::Ldac(_) => "LDAC",
        }
    }
}

/// Result of applying a user, audio-feeding or OTA configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Negotiated codec information element
    pub codec_config: CodecInfo,
    /// The audio input must be restarted (audio format changed)
    pub restart_input: bool,
    /// The connection must be restarted (OTA configuration changed)
    pub restart_output: bool,
    /// Something observable changed
    pub config_updated: bool,
}

struct CodecInner {
    state: CodecState,
    priority: i32,
    default_priority: i32,
}

impl CodecInner {
    fn set_priority(&mut self, index: CodecIndex, priority: i32) {
        if priority == crate::constants::CODEC_PRIORITY_DEFAULT {
            self.set_default_priority(index);
        } else {
            self.priority = priority;
        }
        self.state.config.priority = self.priority;
    }

    fn set_default_priority(&mut self, index: CodecIndex) {
        self.priority = if self.default_priority == crate::constants::CODEC_PRIORITY_DEFAULT {
            index.computed_priority()
        } else {
            self.default_priority
        };
        self.state.config.priority = self.priority;
    }
}

/// One codec family in one direction, with its negotiation state
///
/// All state sits behind a blocking mutex so a pacing context can read the
/// negotiated configuration while the control path renegotiates. Public
/// methods lock exactly once.
pub struct CodecInstance<M: RawMutex> {
    index: CodecIndex,
    family: CodecFamily,
    inner: Mutex<M, RefCell<CodecInner>>,
}

impl<M: RawMutex> CodecInstance<M> {
    /// Create the codec for `index`
    ///
    /// `priority` of `CODEC_PRIORITY_DEFAULT` selects the computed default.
    #[must_use]
    pub fn new(index: CodecIndex, priority: i32) -> Self {
        let family = CodecFamily::for_index(index);
        let local = family.negotiator().local_capability();
        let mut inner = CodecInner {
            state: CodecState::new(index, priority, local),
            priority,
            default_priority: priority,
        };
        inner.set_priority(index, priority);
        inner.state.capability.priority = inner.priority;
        inner.state.local_capability.priority = inner.priority;
        inner.state.selectable_capability.priority = inner.priority;
        Self {
            index,
            family,
            inner: Mutex::new(RefCell::new(inner)),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut CodecInner) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Codec index
    #[must_use]
    pub const fn index(&self) -> CodecIndex {
        self.index
    }

    /// Codec name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.index.name()
    }

    /// Codec family
    #[must_use]
    pub const fn family(&self) -> &CodecFamily {
        &self.family
    }

    /// Current priority
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.with_inner(|inner| inner.priority)
    }

    /// Set the priority; `CODEC_PRIORITY_DEFAULT` restores the default
    pub(crate) fn set_priority(&self, priority: i32) {
        self.with_inner(|inner| inner.set_priority(self.index, priority));
    }

    /// Restore the priority given at construction, or the computed one
    pub(crate) fn set_default_priority(&self) {
        self.with_inner(|inner| inner.set_default_priority(self.index));
    }

    /// Negotiate against a peer capability (`is_capability`) or configuration
    ///
    /// # Errors
    /// Returns the parse or mismatch error; the instance is left unchanged
    pub fn set_codec_config(&self, peer: &[u8], is_capability: bool) -> Result<CodecInfo, A2dpError> {
        self.with_inner(|inner| self.negotiate_locked(inner, peer, is_capability))
    }

    /// Record a peer capability and recompute the selectable capability
    ///
    /// # Errors
    /// Returns the parse error; the instance is left unchanged
    pub fn set_peer_codec_capabilities(&self, peer: &[u8]) -> Result<(), A2dpError> {
        self.with_inner(|inner| {
            let snapshot = inner.state.clone();
            let result = self
                .family
                .negotiator()
                .update_selectable(&mut inner.state, peer)
                .and_then(|()| {
                    inner.state.ota_peer_capability = trimmed(peer)?;
                    Ok(())
                });
            if let Err(e) = result {
                error!("[{}] invalid peer capability: {:?}", self.family.tag(), e);
                inner.state = snapshot;
            }
            result
        })
    }

    /// Apply user and audio-feeding preferences and renegotiate
    ///
    /// Reports whether the audio format (input) or the OTA element (output)
    /// changed.
    ///
    /// # Errors
    /// Returns the parse or mismatch error; the instance is left unchanged
    pub fn set_codec_user_config(
        &self,
        user: &CodecConfig,
        audio: &CodecConfig,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<ConfigUpdate, A2dpError> {
        self.with_inner(|inner| {
            let snapshot = inner.state.clone();
            let saved_config = inner.state.config;
            let saved_ota = inner.state.ota_config.clone();

            inner.state.user_config = CodecConfig {
                codec_index: Some(self.index),
                ..*user
            };
            inner.state.audio_config = CodecConfig {
                codec_index: Some(self.index),
                ..*audio
            };
            let codec_config = match self.negotiate_locked(inner, peer, is_capability) {
                Ok(info) => info,
                Err(e) => {
                    inner.state = snapshot;
                    return Err(e);
                }
            };

            let restart_input = saved_config.audio_format_differs(&inner.state.config);
            let restart_output = !codec_equals(&saved_ota, &codec_config);
            Ok(ConfigUpdate {
                codec_config,
                restart_input,
                restart_output,
                config_updated: restart_input || restart_output,
            })
        })
    }

    fn negotiate_locked(
        &self,
        inner: &mut CodecInner,
        peer: &[u8],
        is_capability: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let snapshot = inner.state.clone();
        match self
            .family
            .negotiator()
            .negotiate(&mut inner.state, peer, is_capability)
        {
            Ok(info) => {
                inner.state.config.priority = inner.priority;
                debug!(
                    "[{}] negotiated {=[u8]:02x} (capability: {})",
                    self.family.tag(),
                    info.as_slice(),
                    is_capability
                );
                Ok(info)
            }
            Err(e) => {
                error!("[{}] negotiation failed: {:?}", self.family.tag(), e);
                inner.state = snapshot;
                Err(e)
            }
        }
    }

    /// Snapshot of every capability/configuration view
    #[must_use]
    pub fn state(&self) -> CodecState {
        self.with_inner(|inner| inner.state.clone())
    }

    /// Negotiated configuration
    #[must_use]
    pub fn codec_config(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.config)
    }

    /// Negotiated capability
    #[must_use]
    pub fn codec_capability(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.capability)
    }

    /// Local capability
    #[must_use]
    pub fn local_capability(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.local_capability)
    }

    /// Selectable capability (local ∩ peer)
    #[must_use]
    pub fn selectable_capability(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.selectable_capability)
    }

    /// User preferences
    #[must_use]
    pub fn user_config(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.user_config)
    }

    /// Audio-feeding preferences
    #[must_use]
    pub fn audio_config(&self) -> CodecConfig {
        self.with_inner(|inner| inner.state.audio_config)
    }

    /// Store audio-feeding preferences without renegotiating
    pub fn set_audio_config(&self, audio: &CodecConfig) {
        self.with_inner(|inner| {
            inner.state.audio_config = CodecConfig {
                codec_index: Some(self.index),
                ..*audio
            };
        });
    }

    /// Negotiated codec information element, if one is committed
    #[must_use]
    pub fn ota_codec_config(&self) -> Option<CodecInfo> {
        self.with_inner(|inner| {
            self.family
                .is_valid(&inner.state.ota_config, false)
                .then(|| inner.state.ota_config.clone())
        })
    }

    /// Last peer capability element
    #[must_use]
    pub fn ota_peer_capability(&self) -> CodecInfo {
        self.with_inner(|inner| inner.state.ota_peer_capability.clone())
    }

    /// Last peer configuration element
    #[must_use]
    pub fn ota_peer_config(&self) -> CodecInfo {
        self.with_inner(|inner| inner.state.ota_peer_config.clone())
    }

    /// Negotiated bit depth, or 0 if none
    #[must_use]
    pub fn audio_bits_per_sample(&self) -> u8 {
        self.with_inner(|inner| inner.state.config.bits_per_sample.bits().unwrap_or(0))
    }

    /// PCM format the audio-feeding path must produce
    ///
    /// # Errors
    /// Returns `InvalidParams` if no configuration is negotiated
    pub fn feeding_params(&self) -> Result<FeedingParams, A2dpError> {
        self.with_inner(|inner| FeedingParams::from_config(&inner.state.config))
    }

    /// PCM samples per channel consumed by one encoded frame
    ///
    /// # Errors
    /// Returns `InvalidParams` if no configuration is negotiated
    pub fn samples_per_frame(&self) -> Result<u32, A2dpError> {
        self.with_inner(|inner| {
            let negotiator = self.family.negotiator();
            if !negotiator.is_valid(&inner.state.ota_config, false) {
                return Err(A2dpError::InvalidParams);
            }
            Ok(negotiator.samples_per_frame(&inner.state.ota_config))
        })
    }

    /// Codec parameters in the layout hardware offload expects
    ///
    /// SBC: `[blocks|subbands|alloc, min bitpool, max bitpool, rate|mode]`;
    /// AAC: `[object type, VBR|bit rate high byte]`; vendor codecs: vendor ID
    /// and codec ID (little-endian), and for LDAC the quality and channel mode.
    ///
    /// # Errors
    /// Returns `InvalidParams` if no valid configuration is negotiated
    pub fn offload_codec_info(&self) -> Result<[u8; 8], A2dpError> {
        self.with_inner(|inner| {
            let ota = &inner.state.ota_config;
            if !self.family.is_valid(ota, false) {
                return Err(A2dpError::InvalidParams);
            }
            let mut info = [0u8; 8];
            match super::cie::codec_type(ota) {
                Some(CodecType::Sbc) => {
                    info[..4].copy_from_slice(&[ota[4], ota[5], ota[6], ota[3]]);
                }
                Some(CodecType::Mpeg24Aac) => {
                    info[0] = ota[3];
                    info[1] = ota[6];
                }
                Some(CodecType::VendorSpecific) => {
                    let (vendor_id, codec_id) = vendor_ids(ota).ok_or(A2dpError::InvalidParams)?;
                    info[..4].copy_from_slice(&vendor_id.to_le_bytes());
                    info[4..6].copy_from_slice(&codec_id.to_le_bytes());
                    if let CodecFamily::Ldac(_) = self.family {
                        let quality = LdacQuality::from_codec_specific(inner.state.config.codec_specific[0]);
                        info[6] = quality.offload_value();
                        info[7] = ota[10];
                    }
                }
                _ => return Err(A2dpError::InvalidParams),
            }
            Ok(info)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CODEC_PRIORITY_DEFAULT;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const SBC_MAP: [(u16, SampleRate); 2] =
        [(0x10, SampleRate::HZ_48000), (0x20, SampleRate::HZ_44100)];

    const CODEC_INFO_SBC_SINK_CAPABILITY: [u8; 7] = [6, 0, 0, 0x3F, 0xFF, 2, 53];

    fn sbc_source() -> CodecInstance<NoopRawMutex> {
        CodecInstance::new(CodecIndex::SourceSbc, CODEC_PRIORITY_DEFAULT)
    }

    #[test]
    fn test_resolve_best_match() {
        let resolved = resolve(
            &SBC_MAP,
            0x30,
            0,
            SampleRate::NONE,
            SampleRate::NONE,
            A2dpError::SampleRateMismatch,
        )
        .unwrap();
        assert_eq!(resolved.wire, 0x10);
        assert_eq!(resolved.value, SampleRate::HZ_48000);
        assert_eq!(resolved.selectable, SampleRate(0x03));
        assert_eq!(resolved.capability, SampleRate(0x03));
    }

    #[test]
    fn test_resolve_preference_order() {
        // Default wins over best match
        let resolved = resolve(
            &SBC_MAP,
            0x30,
            0x20,
            SampleRate::NONE,
            SampleRate::NONE,
            A2dpError::SampleRateMismatch,
        )
        .unwrap();
        assert_eq!(resolved.value, SampleRate::HZ_44100);

        // Audio-feeding preference wins over default
        let resolved = resolve(
            &SBC_MAP,
            0x30,
            0x20,
            SampleRate::NONE,
            SampleRate::HZ_48000,
            A2dpError::SampleRateMismatch,
        )
        .unwrap();
        assert_eq!(resolved.value, SampleRate::HZ_48000);

        // User wins over everything and collapses the capability
        let resolved = resolve(
            &SBC_MAP,
            0x30,
            0x10,
            SampleRate::HZ_44100,
            SampleRate::HZ_48000,
            A2dpError::SampleRateMismatch,
        )
        .unwrap();
        assert_eq!(resolved.value, SampleRate::HZ_44100);
        assert_eq!(resolved.capability, SampleRate::HZ_44100);
        assert_eq!(resolved.selectable, SampleRate(0x03));
    }

    #[test]
    fn test_resolve_unsupported_audio_preference_falls_through() {
        let resolved = resolve(
            &SBC_MAP,
            0x20,
            0,
            SampleRate::NONE,
            SampleRate::HZ_48000,
            A2dpError::SampleRateMismatch,
        )
        .unwrap();
        assert_eq!(resolved.value, SampleRate::HZ_44100);
    }

    #[test]
    fn test_resolve_failures() {
        assert_eq!(
            resolve(
                &SBC_MAP,
                0x20,
                0,
                SampleRate::HZ_48000,
                SampleRate::NONE,
                A2dpError::SampleRateMismatch,
            ),
            Err(A2dpError::SampleRateMismatch)
        );
        assert_eq!(
            resolve(
                &SBC_MAP,
                0x00,
                0x20,
                SampleRate::NONE,
                SampleRate::NONE,
                A2dpError::SampleRateMismatch,
            ),
            Err(A2dpError::SampleRateMismatch)
        );
    }

    #[test]
    fn test_best_bit() {
        assert_eq!(best_bit(0x30, &[0x10, 0x20]), Some(0x10));
        assert_eq!(best_bit(0x20, &[0x10, 0x20]), Some(0x20));
        assert_eq!(best_bit(0x01, &[0x10, 0x20]), None);
    }

    #[test]
    fn test_instance_defaults() {
        let codec = sbc_source();
        assert_eq!(codec.name(), "SBC");
        assert_eq!(codec.priority(), 1001);
        assert_eq!(codec.codec_config().priority, 1001);
        assert!(codec.user_config().is_empty());
        assert!(codec.ota_codec_config().is_none());
        let local = codec.local_capability();
        assert_eq!(local.sample_rate, SampleRate::HZ_44100);
        assert_eq!(local.bits_per_sample, BitsPerSample::BITS_16);
        assert_eq!(local.channel_mode, ChannelMode(0x03));
    }

    #[test]
    fn test_priority_handling() {
        let codec: CodecInstance<NoopRawMutex> = CodecInstance::new(CodecIndex::SourceAac, 7);
        assert_eq!(codec.priority(), 7);
        codec.set_priority(42);
        assert_eq!(codec.priority(), 42);
        codec.set_default_priority();
        assert_eq!(codec.priority(), 7);

        let codec = sbc_source();
        codec.set_priority(42);
        codec.set_priority(CODEC_PRIORITY_DEFAULT);
        assert_eq!(codec.priority(), 1001);
    }

    #[test]
    fn test_negotiation_commits_views() {
        let codec = sbc_source();
        let result = codec
            .set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert_eq!(result.as_slice(), &[6, 0, 0, 0x21, 0x15, 2, 53]);
        assert_eq!(codec.ota_codec_config(), Some(result));
        assert_eq!(
            codec.ota_peer_capability().as_slice(),
            &CODEC_INFO_SBC_SINK_CAPABILITY
        );
        assert!(codec.ota_peer_config().is_empty());
        let config = codec.codec_config();
        assert_eq!(config.sample_rate, SampleRate::HZ_44100);
        assert_eq!(config.channel_mode, ChannelMode::STEREO);
        assert_eq!(config.bits_per_sample, BitsPerSample::BITS_16);
        assert_eq!(codec.audio_bits_per_sample(), 16);
        assert_eq!(codec.samples_per_frame(), Ok(128));
    }

    #[test]
    fn test_failed_negotiation_rolls_back() {
        let codec = sbc_source();
        codec
            .set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        let before = codec.state();

        // Peer only supports 48 kHz, which the SBC source cannot encode
        let peer_48k_only = [6, 0, 0, 0x1F, 0xFF, 2, 53];
        assert_eq!(
            codec.set_codec_config(&peer_48k_only, true),
            Err(A2dpError::SampleRateMismatch)
        );
        assert_eq!(codec.state(), before);

        assert_eq!(codec.set_codec_config(&[], true), Err(A2dpError::InvalidParams));
        assert_eq!(codec.state(), before);
    }

    #[test]
    fn test_user_config_restart_flags() {
        let codec = sbc_source();
        let user = CodecConfig::default();
        let update = codec
            .set_codec_user_config(&user, &CodecConfig::default(), &CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert!(update.restart_input);
        assert!(update.restart_output);
        assert!(update.config_updated);

        // Same inputs again: nothing changes
        let update = codec
            .set_codec_user_config(&user, &CodecConfig::default(), &CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert!(!update.restart_input);
        assert!(!update.restart_output);
        assert!(!update.config_updated);

        // Pinning mono changes both the audio format and the OTA element
        let mono = CodecConfig::default().with_channel_mode(ChannelMode::MONO);
        let update = codec
            .set_codec_user_config(&mono, &CodecConfig::default(), &CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert!(update.restart_input);
        assert!(update.restart_output);
        assert_eq!(update.codec_config[3], 0x28);
        assert_eq!(codec.codec_capability().channel_mode, ChannelMode::MONO);
        assert_eq!(codec.selectable_capability().channel_mode, ChannelMode(0x03));
        assert_eq!(codec.user_config().codec_index, Some(CodecIndex::SourceSbc));
    }

    #[test]
    fn test_user_config_failure_restores_preferences() {
        let codec = sbc_source();
        codec
            .set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        let before = codec.state();
        let user = CodecConfig::default().with_sample_rate(SampleRate::HZ_48000);
        assert_eq!(
            codec.set_codec_user_config(
                &user,
                &CodecConfig::default(),
                &CODEC_INFO_SBC_SINK_CAPABILITY,
                true
            ),
            Err(A2dpError::SampleRateMismatch)
        );
        assert_eq!(codec.state(), before);
        assert!(codec.user_config().is_empty());
    }

    #[test]
    fn test_codec_specific_override() {
        let codec = sbc_source();
        let user = CodecConfig::default()
            .with_codec_specific(1, 9)
            .with_codec_specific(3, -4);
        codec
            .set_codec_user_config(&user, &CodecConfig::default(), &CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert_eq!(codec.codec_config().codec_specific, [0, 9, 0, -4]);
    }

    #[test]
    fn test_peer_capabilities_update_selectable_only() {
        let codec = sbc_source();
        codec
            .set_peer_codec_capabilities(&CODEC_INFO_SBC_SINK_CAPABILITY)
            .unwrap();
        let selectable = codec.selectable_capability();
        assert_eq!(selectable.sample_rate, SampleRate::HZ_44100);
        assert_eq!(selectable.channel_mode, ChannelMode(0x03));
        assert_eq!(selectable.bits_per_sample, BitsPerSample::BITS_16);
        assert!(codec.ota_codec_config().is_none());
        assert!(codec.codec_config().sample_rate.is_none());

        let before = codec.state();
        assert_eq!(
            codec.set_peer_codec_capabilities(&[6, 0, 0, 0x00, 0xFF, 2, 53]),
            Err(A2dpError::BadSampleRate)
        );
        assert_eq!(codec.state(), before);
    }

    #[test]
    fn test_offload_codec_info() {
        let codec = sbc_source();
        assert_eq!(codec.offload_codec_info(), Err(A2dpError::InvalidParams));
        codec
            .set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        assert_eq!(
            codec.offload_codec_info(),
            Ok([0x15, 2, 53, 0x21, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_feeding_params() {
        let codec = sbc_source();
        assert_eq!(codec.feeding_params(), Err(A2dpError::InvalidParams));
        codec
            .set_codec_config(&CODEC_INFO_SBC_SINK_CAPABILITY, true)
            .unwrap();
        let feeding = codec.feeding_params().unwrap();
        assert_eq!(feeding.sample_rate, 44_100);
        assert_eq!(feeding.bits_per_sample, 16);
        assert_eq!(feeding.channel_count, 2);
    }
}
