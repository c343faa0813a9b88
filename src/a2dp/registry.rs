//! Codec registry and selection state machine
//!
//! The registry owns one [`CodecInstance`] per [`CodecIndex`], keeps the
//! per-direction lists ordered by priority and tracks one current codec per
//! direction. Every codec is in one of three states: disabled (never listed,
//! never selected), enabled, or enabled and current.
//!
//! The registry lock guards the current pointers and the ordered lists and is
//! always taken before any codec lock.

use super::{A2dpError, Role};
use super::cie::{CodecInfo, codec_name, sink_codec_index, source_codec_index};
use super::codec::{CodecInstance, ConfigUpdate};
use super::config::{CodecConfig, CodecIndex};
use crate::constants::{CODEC_PRIORITY_DEFAULT, CODEC_PRIORITY_DISABLED, MAX_CODEC_INDICES};
use core::cell::RefCell;
use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use heapless::Vec;

/// Codec indices in list order
pub type CodecList = Vec<CodecIndex, MAX_CODEC_INDICES>;

/// Source codecs the platform can offload to the controller (bitfield)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OffloadCapability(pub u8);

impl OffloadCapability {
    /// SBC offload
    pub const SBC: u8 = 0x01;
    /// AAC offload
    pub const AAC: u8 = 0x02;
    /// aptX offload
    pub const APTX: u8 = 0x04;
    /// aptX-HD offload
    pub const APTX_HD: u8 = 0x08;
    /// LDAC offload
    pub const LDAC: u8 = 0x10;

    /// Parse a dash-separated token list such as `"sbc-aac-aptx-aptxhd-ldac"`
    ///
    /// Unknown tokens are ignored.
    #[must_use]
    pub fn parse(tokens: &str) -> Self {
        let bits = tokens.split('-').fold(0, |bits, token| {
            bits | match token {
                "sbc" => Self::SBC,
                "aac" => Self::AAC,
                "aptx" => Self::APTX,
                "aptxhd" => Self::APTX_HD,
                "ldac" => Self::LDAC,
                _ => 0,
            }
        });
        Self(bits)
    }

    /// Whether the source codec `index` can be offloaded
    #[must_use]
    pub const fn supports(&self, index: CodecIndex) -> bool {
        let bit = match index {
            CodecIndex::SourceSbc => Self::SBC,
            CodecIndex::SourceAac => Self::AAC,
            CodecIndex::SourceAptx => Self::APTX,
            CodecIndex::SourceAptxHd => Self::APTX_HD,
            CodecIndex::SourceLdac => Self::LDAC,
            CodecIndex::SinkSbc | CodecIndex::SinkAac | CodecIndex::SinkLdac => 0,
        };
        self.0 & bit != 0
    }
}

/// Registry construction options
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Explicit codec priorities; unlisted codecs get the computed default
    pub priorities: Vec<(CodecIndex, i32), MAX_CODEC_INDICES>,
    /// Hardware offload capability; `None` when offload is off
    pub offload: Option<OffloadCapability>,
}

impl RegistryOptions {
    /// Set an explicit priority for `index`
    #[must_use]
    pub fn with_priority(mut self, index: CodecIndex, priority: i32) -> Self {
        match self.priorities.iter_mut().find(|(i, _)| *i == index) {
            Some(entry) => entry.1 = priority,
            None => {
                // One slot per codec index
                let _ = self.priorities.push((index, priority));
            }
        }
        self
    }

    /// Enable offload with the given capability
    #[must_use]
    pub const fn with_offload(mut self, offload: OffloadCapability) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Configured priority for `index`
    #[must_use]
    pub fn priority(&self, index: CodecIndex) -> i32 {
        self.priorities
            .iter()
            .find(|(i, _)| *i == index)
            .map_or(CODEC_PRIORITY_DEFAULT, |(_, priority)| *priority)
    }
}

/// Snapshot for the upper layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigAndCapabilities {
    /// Configuration of the current source codec, or an empty record
    pub config: CodecConfig,
    /// Local capability of every enabled source codec, in list order
    pub local_capabilities: Vec<CodecConfig, MAX_CODEC_INDICES>,
    /// Usable selectable capabilities of the enabled source codecs, in list order
    pub selectable_capabilities: Vec<CodecConfig, MAX_CODEC_INDICES>,
}

struct RegistryState {
    current_source: Option<CodecIndex>,
    current_sink: Option<CodecIndex>,
    ordered_source: CodecList,
    ordered_sink: CodecList,
}

impl RegistryState {
    const fn current(&self, role: Role) -> Option<CodecIndex> {
        match role {
            Role::Source => self.current_source,
            Role::Sink => self.current_sink,
        }
    }

    fn select(&mut self, index: CodecIndex) {
        match index.role() {
            Role::Source => self.current_source = Some(index),
            Role::Sink => self.current_sink = Some(index),
        }
    }
}

/// Every codec instance plus the selection state
pub struct CodecRegistry<M: RawMutex> {
    codecs: [CodecInstance<M>; MAX_CODEC_INDICES],
    enabled: [bool; MAX_CODEC_INDICES],
    offload: Option<OffloadCapability>,
    state: Mutex<M, RefCell<RegistryState>>,
}

impl<M: RawMutex> CodecRegistry<M> {
    /// Create every codec, apply priorities and the offload policy
    #[must_use]
    pub fn new(options: &RegistryOptions) -> Self {
        let codecs = CodecIndex::ALL.map(|index| {
            let mut priority = options.priority(index);
            let offload_unsupported =
                index.is_source() && options.offload.is_some_and(|offload| !offload.supports(index));
            if offload_unsupported {
                priority = CODEC_PRIORITY_DISABLED;
            }
            if priority != CODEC_PRIORITY_DEFAULT {
                info!("[REGISTRY] {} codec priority set to {}", index.name(), priority);
            }
            CodecInstance::new(index, priority)
        });
        let enabled = CodecIndex::ALL.map(|index| codecs[index as usize].priority() != CODEC_PRIORITY_DISABLED);

        let mut ordered_source = CodecList::new();
        let mut ordered_sink = CodecList::new();
        for index in CodecIndex::ALL {
            if !enabled[index as usize] {
                info!("[REGISTRY] {} codec disabled", index.name());
                continue;
            }
            let list = if index.is_source() {
                &mut ordered_source
            } else {
                &mut ordered_sink
            };
            // Both lists hold at most MAX_CODEC_INDICES entries
            let _ = list.push(index);
        }

        let registry = Self {
            codecs,
            enabled,
            offload: options.offload,
            state: Mutex::new(RefCell::new(RegistryState {
                current_source: None,
                current_sink: None,
                ordered_source,
                ordered_sink,
            })),
        };
        registry.with_state(|state| {
            registry.sort_lists(state);
            if state.ordered_source.is_empty() {
                error!("[REGISTRY] no source codecs were initialized");
            }
            if state.ordered_sink.is_empty() {
                error!("[REGISTRY] no sink codecs were initialized");
            }
            for index in state.ordered_source.iter().chain(state.ordered_sink.iter()) {
                info!("[REGISTRY] initialized {} codec", index.name());
            }
        });
        registry
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    const fn instance(&self, index: CodecIndex) -> &CodecInstance<M> {
        &self.codecs[index as usize]
    }

    fn sort_lists(&self, state: &mut RegistryState) {
        for list in [&mut state.ordered_source, &mut state.ordered_sink] {
            list.sort_unstable_by(|a, b| {
                let (pa, pb) = (self.instance(*a).priority(), self.instance(*b).priority());
                pb.cmp(&pa).then(b.cmp(a))
            });
        }
    }

    /// Whether hardware offload is on
    #[must_use]
    pub const fn offload_enabled(&self) -> bool {
        self.offload.is_some()
    }

    /// Whether `index` is enabled
    #[must_use]
    pub const fn is_supported_codec(&self, index: CodecIndex) -> bool {
        self.enabled[index as usize]
    }

    /// The enabled codec for `index`
    #[must_use]
    pub fn codec(&self, index: CodecIndex) -> Option<&CodecInstance<M>> {
        self.is_supported_codec(index).then(|| self.instance(index))
    }

    /// Codecs disabled at construction, in index order
    #[must_use]
    pub fn disabled_codecs(&self) -> CodecList {
        CodecIndex::ALL
            .into_iter()
            .filter(|index| !self.is_supported_codec(*index))
            .collect()
    }

    /// Enabled source codec that would encode for the peer described by `info`
    #[must_use]
    pub fn find_source_codec(&self, info: &[u8]) -> Option<&CodecInstance<M>> {
        source_codec_index(info).and_then(|index| self.codec(index))
    }

    /// Enabled sink codec that would decode for the peer described by `info`
    #[must_use]
    pub fn find_sink_codec(&self, info: &[u8]) -> Option<&CodecInstance<M>> {
        sink_codec_index(info).and_then(|index| self.codec(index))
    }

    /// Enabled source codecs, highest priority first
    #[must_use]
    pub fn ordered_source_codecs(&self) -> CodecList {
        self.with_state(|state| state.ordered_source.clone())
    }

    /// Enabled sink codecs, highest priority first
    #[must_use]
    pub fn ordered_sink_codecs(&self) -> CodecList {
        self.with_state(|state| state.ordered_sink.clone())
    }

    /// Index of the current codec for `role`
    #[must_use]
    pub fn current_codec_index(&self, role: Role) -> Option<CodecIndex> {
        self.with_state(|state| state.current(role))
    }

    /// The current codec for `role`
    #[must_use]
    pub fn current_codec(&self, role: Role) -> Option<&CodecInstance<M>> {
        self.current_codec_index(role).map(|index| self.instance(index))
    }

    /// Set the priority of an enabled codec and re-sort the lists
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` if `index` is disabled
    pub fn set_codec_priority(&self, index: CodecIndex, priority: i32) -> Result<(), A2dpError> {
        let codec = self.codec(index).ok_or(A2dpError::NoMatchingCodec)?;
        self.with_state(|state| {
            codec.set_priority(priority);
            self.sort_lists(state);
        });
        Ok(())
    }

    /// Negotiate the source codec matching a peer sink capability or
    /// configuration, making it the current source codec if `select` is set
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` if no enabled source codec matches, or the
    /// negotiation error
    pub fn set_codec_config(
        &self,
        peer: &[u8],
        is_capability: bool,
        select: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let codec = self.find_source_codec(peer).ok_or(A2dpError::NoMatchingCodec)?;
        self.negotiate_and_select(codec, peer, is_capability, select)
    }

    /// Negotiate the sink codec matching a peer source capability or
    /// configuration, making it the current sink codec if `select` is set
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` if no enabled sink codec matches, or the
    /// negotiation error
    pub fn set_sink_codec_config(
        &self,
        peer: &[u8],
        is_capability: bool,
        select: bool,
    ) -> Result<CodecInfo, A2dpError> {
        let codec = self.find_sink_codec(peer).ok_or(A2dpError::NoMatchingCodec)?;
        self.negotiate_and_select(codec, peer, is_capability, select)
    }

    fn negotiate_and_select(
        &self,
        codec: &CodecInstance<M>,
        peer: &[u8],
        is_capability: bool,
        select: bool,
    ) -> Result<CodecInfo, A2dpError> {
        self.with_state(|state| {
            let result = codec.set_codec_config(peer, is_capability)?;
            if select {
                debug!("[REGISTRY] current codec is now {}", codec.name());
                state.select(codec.index());
            }
            Ok(result)
        })
    }

    /// Apply a user configuration and update priorities and selection
    ///
    /// `user.codec_index` names the codec; `None` means the current source
    /// codec. The codec keeps its audio-feeding preference and negotiates
    /// against `peer_sink_capability`. Priorities are compared only with the
    /// current codec of the same direction: raising a codec to at least that
    /// codec's priority switches to it and resets the displaced codec to its
    /// default priority.
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` for a disabled codec, `NoCurrentCodec` if
    /// none is named or current, or the negotiation error. The current codecs
    /// are unchanged on error.
    pub fn set_codec_user_config(
        &self,
        user: &CodecConfig,
        peer_sink_capability: &[u8],
    ) -> Result<ConfigUpdate, A2dpError> {
        self.with_state(|state| {
            let index = match user.codec_index {
                Some(index) if self.is_supported_codec(index) => index,
                Some(index) => {
                    error!("[REGISTRY] cannot configure disabled codec {}", index.name());
                    return Err(A2dpError::NoMatchingCodec);
                }
                None => state.current(Role::Source).ok_or(A2dpError::NoCurrentCodec)?,
            };
            let last = state.current(index.role());
            let codec = self.instance(index);
            let audio = codec.audio_config();
            let mut update = codec.set_codec_user_config(user, &audio, peer_sink_capability, true)?;

            let old_priority = codec.priority();
            codec.set_priority(user.priority);
            let new_priority = codec.priority();

            match last {
                None => {
                    state.select(index);
                    update.restart_input = true;
                    update.restart_output = true;
                }
                Some(current) if current == index => {
                    if old_priority != new_priority {
                        update.config_updated = true;
                        // A lower priority may let a better codec win
                        if new_priority < old_priority {
                            update.restart_output = true;
                        }
                    }
                }
                Some(_) if new_priority <= old_priority => {
                    if update.restart_input || update.restart_output || old_priority != new_priority {
                        update.config_updated = true;
                    }
                    update.restart_input = false;
                    update.restart_output = false;
                }
                Some(current) => {
                    update.config_updated = true;
                    let displaced = self.instance(current);
                    if new_priority >= displaced.priority() {
                        info!(
                            "[REGISTRY] switching from {} to {}",
                            displaced.name(),
                            codec.name()
                        );
                        state.select(index);
                        displaced.set_default_priority();
                        update.restart_input = true;
                        update.restart_output = true;
                    }
                }
            }
            self.sort_lists(state);

            if update.restart_input || update.restart_output {
                update.config_updated = true;
            }
            debug!(
                "[REGISTRY] configured {}: restart_input={} restart_output={} config_updated={}",
                codec.name(),
                update.restart_input,
                update.restart_output,
                update.config_updated
            );
            Ok(update)
        })
    }

    /// Renegotiate the current source codec with a new audio-feeding preference
    ///
    /// The input has just been restarted by the caller, so `restart_input`
    /// is always reported as false.
    ///
    /// # Errors
    /// Returns `NoCurrentCodec` or the negotiation error
    pub fn set_codec_audio_config(
        &self,
        audio: &CodecConfig,
        peer_sink_capability: &[u8],
    ) -> Result<ConfigUpdate, A2dpError> {
        self.with_state(|state| {
            let current = state.current(Role::Source).ok_or(A2dpError::NoCurrentCodec)?;
            let codec = self.instance(current);
            let user = codec.user_config();
            let mut update = codec.set_codec_user_config(&user, audio, peer_sink_capability, true)?;
            update.restart_input = false;
            Ok(update)
        })
    }

    /// Accept a configuration proposed by the peer
    ///
    /// The proposal is ignored when the current source codec, or the codec it
    /// names, carries an explicit user configuration.
    ///
    /// # Errors
    /// Returns `UserConfigPresent` when ignored, `NoMatchingCodec` if no
    /// enabled source codec matches, or the negotiation error. The current
    /// codec is unchanged on error.
    pub fn set_codec_ota_config(&self, peer_config: &[u8]) -> Result<ConfigUpdate, A2dpError> {
        self.with_state(|state| {
            if let Some(current) = state.current(Role::Source)
                && !self.instance(current).user_config().is_empty()
            {
                warn!(
                    "[REGISTRY] ignoring peer configuration for {}: current codec {} has a user configuration",
                    codec_name(peer_config),
                    current.name()
                );
                return Err(A2dpError::UserConfigPresent);
            }

            let Some(codec) = self.find_source_codec(peer_config) else {
                warn!("[REGISTRY] no codec for peer configuration {}", codec_name(peer_config));
                return Err(A2dpError::NoMatchingCodec);
            };
            let user = codec.user_config();
            if !user.is_empty() {
                warn!(
                    "[REGISTRY] ignoring peer configuration for {}: codec has a user configuration",
                    codec.name()
                );
                return Err(A2dpError::UserConfigPresent);
            }

            let audio = codec.audio_config();
            let mut update = codec
                .set_codec_user_config(&user, &audio, peer_config, false)
                .inspect_err(|_| {
                    warn!("[REGISTRY] cannot apply peer configuration for {}", codec.name());
                })?;
            state.select(codec.index());
            if update.restart_input || update.restart_output {
                update.config_updated = true;
            }
            Ok(update)
        })
    }

    /// Record a peer sink capability on the matching source codec
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` or the parse error
    pub fn set_peer_sink_codec_capabilities(&self, peer: &[u8]) -> Result<(), A2dpError> {
        self.find_source_codec(peer)
            .ok_or(A2dpError::NoMatchingCodec)?
            .set_peer_codec_capabilities(peer)
    }

    /// Record a peer source capability on the matching sink codec
    ///
    /// # Errors
    /// Returns `NoMatchingCodec` or the parse error
    pub fn set_peer_source_codec_capabilities(&self, peer: &[u8]) -> Result<(), A2dpError> {
        self.find_sink_codec(peer)
            .ok_or(A2dpError::NoMatchingCodec)?
            .set_peer_codec_capabilities(peer)
    }

    /// Current configuration plus local and selectable source capabilities
    ///
    /// Selectable capabilities with no sample rate, bit depth or channel
    /// mode are left out.
    #[must_use]
    pub fn config_and_capabilities(&self) -> ConfigAndCapabilities {
        self.with_state(|state| {
            let config = state
                .current(Role::Source)
                .map_or_else(CodecConfig::default, |index| self.instance(index).codec_config());
            let local_capabilities = state
                .ordered_source
                .iter()
                .map(|index| self.instance(*index).local_capability())
                .collect();
            let selectable_capabilities = state
                .ordered_source
                .iter()
                .map(|index| self.instance(*index).selectable_capability())
                .filter(CodecConfig::is_usable)
                .collect();
            ConfigAndCapabilities {
                config,
                local_capabilities,
                selectable_capabilities,
            }
        })
    }
}
