//! Frame pacing
//!
//! Converts elapsed wall-clock time into a whole number of codec frames per
//! encoder tick. Every tick accrues `bytes_per_tick * elapsed / interval` PCM
//! bytes into an `owed` counter, emits as many whole frames as the counter
//! covers and keeps the rest for the next tick. The division remainder is
//! carried as well, so the long-run frame count never drifts from the PCM
//! byte rate.

use super::A2dpError;
use super::config::CodecConfig;

/// PCM format the audio-feeding path produces for the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedingParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u8,
    /// Number of channels
    pub channel_count: u8,
}

impl Default for FeedingParams {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            bits_per_sample: 16,
            channel_count: 2,
        }
    }
}

impl FeedingParams {
    /// Feeding format of a negotiated configuration
    ///
    /// # Errors
    /// Returns `InvalidParams` unless rate, depth and mode each hold exactly
    /// one value
    pub fn from_config(config: &CodecConfig) -> Result<Self, A2dpError> {
        Ok(Self {
            sample_rate: config.sample_rate.hz().ok_or(A2dpError::InvalidParams)?,
            bits_per_sample: config.bits_per_sample.bits().ok_or(A2dpError::InvalidParams)?,
            channel_count: config.channel_mode.channel_count().ok_or(A2dpError::InvalidParams)?,
        })
    }

    /// Bytes in one PCM sample across all channels
    #[must_use]
    pub const fn bytes_per_sample_frame(&self) -> u32 {
        self.bits_per_sample as u32 / 8 * self.channel_count as u32
    }

    /// PCM bytes per second
    #[must_use]
    pub const fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.bytes_per_sample_frame()
    }
}

/// Running counters kept by a [`FramePacer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacingStats {
    /// Ticks processed
    pub ticks: u64,
    /// Frames the elapsed time called for, before limiting
    pub expected_frames: u64,
    /// Frames discarded by the per-tick frame limit
    pub dropped_frames: u64,
    /// Frames that could not be produced for lack of PCM
    pub underflow_frames: u64,
}

/// Per-encoder timing accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacer {
    bytes_per_tick: u64,
    bytes_per_frame: u64,
    interval_us: u64,
    frame_limit: Option<u32>,
    owed: u64,
    carry: u64,
    last_tick_us: Option<u64>,
    stats: PacingStats,
}

impl FramePacer {
    /// Pacer for `feeding` at one tick per `interval_ms`, with frames of
    /// `samples_per_frame` samples per channel
    ///
    /// # Errors
    /// Returns `InvalidParams` if any parameter is zero
    pub fn new(feeding: &FeedingParams, interval_ms: u64, samples_per_frame: u32) -> Result<Self, A2dpError> {
        let bytes_per_frame = u64::from(samples_per_frame) * u64::from(feeding.bytes_per_sample_frame());
        let bytes_per_tick = u64::from(feeding.bytes_per_second()) * interval_ms / 1000;
        if bytes_per_frame == 0 || bytes_per_tick == 0 {
            return Err(A2dpError::InvalidParams);
        }
        debug!(
            "[PACING] {} bytes per tick, {} bytes per frame",
            bytes_per_tick,
            bytes_per_frame
        );
        Ok(Self {
            bytes_per_tick,
            bytes_per_frame,
            interval_us: interval_ms * 1000,
            frame_limit: None,
            owed: 0,
            carry: 0,
            last_tick_us: None,
            stats: PacingStats::default(),
        })
    }

    /// Cap the frames emitted per tick; the excess is dropped and counted
    #[must_use]
    pub const fn with_frame_limit(mut self, limit: u32) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Advance to `now_us` and return the number of frames to produce
    pub fn tick(&mut self, now_us: u64) -> u32 {
        let elapsed = match self.last_tick_us {
            Some(last) => now_us.saturating_sub(last),
            None => self.interval_us,
        };
        self.last_tick_us = Some(now_us);

        let accrued = self.bytes_per_tick * elapsed + self.carry;
        self.owed += accrued / self.interval_us;
        self.carry = accrued % self.interval_us;

        let projected = self.owed / self.bytes_per_frame;
        self.stats.ticks += 1;
        self.stats.expected_frames += projected;

        let frames = match self.frame_limit {
            Some(limit) if projected > u64::from(limit) => {
                warn!(
                    "[PACING] limiting frames to be sent from {} to {}",
                    projected,
                    limit
                );
                self.stats.dropped_frames += projected - u64::from(limit);
                self.owed = 0;
                limit
            }
            _ => {
                self.owed -= projected * self.bytes_per_frame;
                u32::try_from(projected).unwrap_or(u32::MAX)
            }
        };
        trace!("[PACING] t={} elapsed={} frames={} owed={}", now_us, elapsed, frames, self.owed);
        frames
    }

    /// Give back the PCM bytes of `missing_frames` frames that could not be
    /// produced this tick
    pub fn credit_underflow(&mut self, missing_frames: u32) {
        if missing_frames == 0 {
            return;
        }
        warn!("[PACING] underflow, crediting {} frames", missing_frames);
        self.owed += u64::from(missing_frames) * self.bytes_per_frame;
        self.stats.underflow_frames += u64::from(missing_frames);
    }

    /// Drop all accrued bytes
    pub fn flush(&mut self) {
        self.owed = 0;
        self.carry = 0;
    }

    /// Restart timing from scratch; the next tick counts as one nominal interval
    pub fn reset(&mut self) {
        self.flush();
        self.last_tick_us = None;
    }

    /// PCM bytes owed
    #[must_use]
    pub const fn owed(&self) -> u64 {
        self.owed
    }

    /// PCM bytes accrued per nominal interval
    #[must_use]
    pub const fn bytes_per_tick(&self) -> u64 {
        self.bytes_per_tick
    }

    /// PCM bytes consumed by one encoded frame
    #[must_use]
    pub const fn bytes_per_frame(&self) -> u64 {
        self.bytes_per_frame
    }

    /// Nominal tick interval in microseconds
    #[must_use]
    pub const fn interval_us(&self) -> u64 {
        self.interval_us
    }

    /// Running counters
    #[must_use]
    pub const fn stats(&self) -> PacingStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2dp::config::{BitsPerSample, ChannelMode, SampleRate};
    use crate::constants::{APTX_ENCODER_INTERVAL_MS, ENCODER_INTERVAL_MS, MAX_PCM_FRAME_NUM_PER_TICK};

    fn sbc_pacer() -> FramePacer {
        // 44.1 kHz, 16-bit stereo, 16 blocks x 8 subbands
        FramePacer::new(&FeedingParams::default(), ENCODER_INTERVAL_MS, 128).unwrap()
    }

    #[test]
    fn test_feeding_params_from_config() {
        let config = CodecConfig::default()
            .with_sample_rate(SampleRate::HZ_48000)
            .with_bits_per_sample(BitsPerSample::BITS_24)
            .with_channel_mode(ChannelMode::MONO);
        let feeding = FeedingParams::from_config(&config).unwrap();
        assert_eq!(feeding.sample_rate, 48_000);
        assert_eq!(feeding.bits_per_sample, 24);
        assert_eq!(feeding.channel_count, 1);
        assert_eq!(feeding.bytes_per_second(), 144_000);

        let capability = config.with_sample_rate(SampleRate(0x03));
        assert_eq!(FeedingParams::from_config(&capability), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_pacer_parameters() {
        let pacer = sbc_pacer();
        assert_eq!(pacer.bytes_per_tick(), 3528);
        assert_eq!(pacer.bytes_per_frame(), 512);
        assert_eq!(pacer.interval_us(), 20_000);
        assert_eq!(
            FramePacer::new(&FeedingParams::default(), ENCODER_INTERVAL_MS, 0),
            Err(A2dpError::InvalidParams)
        );
        let silent = FeedingParams {
            sample_rate: 0,
            ..FeedingParams::default()
        };
        assert_eq!(
            FramePacer::new(&silent, ENCODER_INTERVAL_MS, 128),
            Err(A2dpError::InvalidParams)
        );
    }

    #[test]
    fn test_first_tick_is_one_interval() {
        let mut pacer = sbc_pacer();
        // 3528 bytes -> 6 frames of 512, 456 left
        assert_eq!(pacer.tick(1_000_000), 6);
        assert_eq!(pacer.owed(), 456);
        assert_eq!(pacer.tick(1_020_000), 7);
        assert_eq!(pacer.owed(), 3528 + 456 - 7 * 512);
    }

    #[test]
    fn test_drift_bound() {
        let mut pacer = sbc_pacer();
        let mut now = 0u64;
        let mut frames = 0u64;
        frames += u64::from(pacer.tick(now));
        let mut elapsed = pacer.interval_us();
        // Jittery ticks: 17, 23, 20, 19, 21 ms
        for step in [17_000u64, 23_000, 20_000, 19_000, 21_000].iter().cycle().take(5000) {
            now += step;
            elapsed += step;
            frames += u64::from(pacer.tick(now));
            let expected = pacer.bytes_per_tick() * elapsed / pacer.interval_us();
            let emitted = frames * pacer.bytes_per_frame();
            assert!(emitted <= expected);
            assert!(expected - emitted < pacer.bytes_per_frame());
        }
    }

    #[test]
    fn test_fractional_rate_does_not_drift() {
        // aptX at 15 ms: 2646 bytes per tick, 16-byte frames
        let mut pacer = FramePacer::new(&FeedingParams::default(), APTX_ENCODER_INTERVAL_MS, 4).unwrap();
        let mut now = 0u64;
        let mut frames = u64::from(pacer.tick(now));
        // 7 ms ticks never line up with the 15 ms interval
        for _ in 0..10_000 {
            now += 7_000;
            frames += u64::from(pacer.tick(now));
        }
        let elapsed = now + pacer.interval_us();
        let expected = pacer.bytes_per_tick() * elapsed / pacer.interval_us();
        assert!(expected - frames * pacer.bytes_per_frame() < pacer.bytes_per_frame());
    }

    #[test]
    fn test_full_underflow_keeps_bytes_owed() {
        let mut pacer = sbc_pacer();
        pacer.tick(0);
        let before = pacer.owed();
        let frames = pacer.tick(20_000);
        assert_eq!(frames, 7);
        // The source produced nothing: every frame is credited back
        pacer.credit_underflow(frames);
        assert_eq!(pacer.owed(), before + pacer.bytes_per_tick());
        assert_eq!(pacer.stats().underflow_frames, 7);

        // The next tick asks for the missed frames again
        assert_eq!(pacer.tick(40_000), 14);
    }

    #[test]
    fn test_flush_and_reset() {
        let mut pacer = sbc_pacer();
        pacer.tick(0);
        pacer.tick(30_000);
        assert_ne!(pacer.owed(), 0);
        pacer.flush();
        assert_eq!(pacer.owed(), 0);

        pacer.reset();
        // After reset the next tick is one nominal interval, whatever the clock says
        assert_eq!(pacer.tick(5_000_000), 6);
        assert_eq!(pacer.stats().ticks, 3);
    }

    #[test]
    fn test_frame_limit_drops_excess() {
        let mut pacer = sbc_pacer().with_frame_limit(MAX_PCM_FRAME_NUM_PER_TICK);
        pacer.tick(0);
        // A 200 ms stall accrues 35280 + 456 bytes: 69 frames
        let frames = pacer.tick(200_000);
        assert_eq!(frames, MAX_PCM_FRAME_NUM_PER_TICK);
        assert_eq!(pacer.owed(), 0);
        let stats = pacer.stats();
        assert_eq!(stats.expected_frames, 6 + 69);
        assert_eq!(stats.dropped_frames, 69 - 14);
    }

    #[test]
    fn test_clock_going_backwards() {
        let mut pacer = sbc_pacer();
        pacer.tick(100_000);
        let owed = pacer.owed();
        assert_eq!(pacer.tick(50_000), 0);
        assert_eq!(pacer.owed(), owed);
    }
}
