//! Volume stage with a lock-free control handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::level::deserialize_linear_gain;

const DEFAULT_GAIN: f32 = 1.0;

/// Serialized configuration for a gain stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSettings {
    #[serde(deserialize_with = "deserialize_linear_gain")]
    pub gain: f32,
}

impl GainSettings {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Default for GainSettings {
    fn default() -> Self {
        Self { gain: DEFAULT_GAIN }
    }
}

/// Shared, thread-safe gain value.
///
/// Every filter of one gain stage holds a clone, so a single `set` changes
/// the volume of all audio channels at the next tick.
#[derive(Debug, Clone)]
pub struct GainControl {
    bits: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(sanitize_gain(gain).to_bits())),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Replace the gain. Non-finite values fall back to unity.
    pub fn set(&self, gain: f32) {
        self.bits
            .store(sanitize_gain(gain).to_bits(), Ordering::Relaxed);
    }
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(DEFAULT_GAIN)
    }
}

/// Mono filter multiplying every sample by the current gain.
#[derive(Debug, Clone)]
pub struct GainFilter {
    control: GainControl,
}

impl GainFilter {
    pub fn new(control: GainControl) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &GainControl {
        &self.control
    }

    pub fn process(&mut self, samples: &mut [f32]) -> usize {
        let gain = self.control.get();
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
        samples.len()
    }
}

fn sanitize_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain
    } else {
        DEFAULT_GAIN
    }
}
