//! Soundcard presets and engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sample encoding of a hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    S16,
    S24,
    #[default]
    F32,
}

/// Hardware presets a soundcard negotiates: channel count, samplerate,
/// buffer size and sample format.
///
/// The tick frequency of the whole thread tree is derived from these, so a
/// preset change goes through a queued task and is picked up between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundcardPresets {
    pub channels: usize,
    pub samplerate: u32,
    pub buffer_size: usize,
    pub format: SampleFormat,
}

impl SoundcardPresets {
    pub fn new(channels: usize, samplerate: u32, buffer_size: usize) -> Result<Self> {
        if samplerate == 0 {
            return Err(Error::InvalidSamplerate(samplerate));
        }
        if !(16..=8192).contains(&buffer_size) || !buffer_size.is_power_of_two() {
            return Err(Error::InvalidBufferSize(buffer_size));
        }

        Ok(Self {
            channels,
            samplerate,
            buffer_size,
            format: SampleFormat::F32,
        })
    }

    /// Duration of one hardware buffer in seconds.
    #[inline]
    pub fn buffer_duration(&self) -> f64 {
        self.buffer_size as f64 / self.samplerate as f64
    }

    /// Tick frequency in Hz: samplerate / buffer_size plus a small constant
    /// overclock margin so the walk always finishes ahead of the hardware.
    #[inline]
    pub fn tick_frequency(&self) -> f64 {
        self.samplerate as f64 / self.buffer_size as f64 + TICK_OVERCLOCK_HZ
    }

    /// Tick interval as a `Duration`.
    #[inline]
    pub fn tick_interval(&self) -> core::time::Duration {
        core::time::Duration::from_secs_f64(1.0 / self.tick_frequency())
    }
}

impl Default for SoundcardPresets {
    fn default() -> Self {
        Self {
            channels: 2,
            samplerate: 44100,
            buffer_size: 1024,
            format: SampleFormat::F32,
        }
    }
}

/// Margin added to the nominal tick frequency.
pub const TICK_OVERCLOCK_HZ: f64 = 2.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_presets() {
        let presets = SoundcardPresets::default();
        assert_eq!(presets.channels, 2);
        assert_eq!(presets.samplerate, 44100);
        assert_eq!(presets.buffer_size, 1024);
    }

    #[test]
    fn test_rejects_bad_buffer_size() {
        assert!(SoundcardPresets::new(2, 44100, 1000).is_err());
        assert!(SoundcardPresets::new(2, 44100, 8).is_err());
        assert!(SoundcardPresets::new(2, 44100, 1024).is_ok());
    }

    #[test]
    fn test_rejects_zero_samplerate() {
        assert!(SoundcardPresets::new(2, 0, 1024).is_err());
    }

    #[test]
    fn test_tick_frequency_includes_margin() {
        let presets = SoundcardPresets::new(2, 44100, 1024).unwrap();
        let nominal = 44100.0 / 1024.0;
        assert!((presets.tick_frequency() - nominal - TICK_OVERCLOCK_HZ).abs() < 1e-9);
        assert!(presets.tick_interval().as_secs_f64() < presets.buffer_duration());
    }
}
