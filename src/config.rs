//! Mixer settings.
//!
//! Every value is fixed at construction. Changing the sample rate or channel
//! count means building a new mixer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::filters::{FilterSettings, GainControl};
use crate::error::{ConfigError, MixerError};
use crate::mixer::{Mixer, Scheduler};

/// Settings for one mixer and its scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of one tick's buffer in seconds.
    pub buffer_seconds: f64,
    pub active_hz: f64,
    pub idle_hz: f64,
    /// Duration of one frame handed to a framed transport.
    pub frame_ms: u32,
    pub filters: Vec<FilterSettings>,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            buffer_seconds: 0.05,
            active_hz: 20.0,
            idle_hz: 2.0,
            frame_ms: 20,
            filters: FilterSettings::default_chain(),
        }
    }
}

impl MixerSettings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Tick buffer length in interleaved samples.
    pub fn buffer_size(&self) -> usize {
        let frames = (self.sample_rate as f64 * self.buffer_seconds).round();
        if frames.is_finite() && frames > 0.0 {
            frames as usize * self.channels as usize
        } else {
            0
        }
    }

    /// Build a mixer with every configured filter stage installed.
    ///
    /// # Returns
    /// The mixer and the control of its first gain stage, if any.
    pub fn build_mixer(&self) -> Result<(Mixer, Option<GainControl>), MixerError> {
        let mut mixer = Mixer::new(self.sample_rate, self.channels, self.buffer_size())?;
        let mut gain = None;
        for settings in &self.filters {
            let (stage, control) = settings.build_stage(self.channels);
            mixer.add_filter(stage)?;
            if gain.is_none() {
                gain = control;
            }
        }
        Ok((mixer, gain))
    }

    pub fn build_scheduler(&self) -> Result<Scheduler, MixerError> {
        Scheduler::new(self.active_hz, self.idle_hz)
    }
}
