//! Reproducible dither ahead of integer quantization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const DEFAULT_BITS: u32 = 24;
const SEED_MASK: u64 = 0xDEAD_BEEF;

/// Serialized configuration for a dither stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherSettings {
    /// Target bit depth of the eventual integer output.
    pub bits: u32,
}

impl Default for DitherSettings {
    fn default() -> Self {
        Self { bits: DEFAULT_BITS }
    }
}

/// Mono filter adding up to one quantization step of noise.
///
/// Samples that already sit on an integer value are left alone. The RNG is
/// seeded from the bit depth, so two filters with the same depth produce the
/// same noise sequence.
#[derive(Debug, Clone)]
pub struct DitherFilter {
    bits: u32,
    range: f32,
    rng: StdRng,
}

impl DitherFilter {
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            range: 1.0 / 2f32.powi(bits.min(i32::MAX as u32) as i32),
            rng: seeded(bits),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn process(&mut self, samples: &mut [f32]) -> usize {
        for sample in samples.iter_mut() {
            if *sample % 1.0 != 0.0 {
                *sample += self.range * self.rng.gen::<f32>();
            }
        }
        samples.len()
    }

    /// Restart the noise sequence from its seed.
    pub fn reset(&mut self) {
        self.rng = seeded(self.bits);
    }
}

fn seeded(bits: u32) -> StdRng {
    StdRng::seed_from_u64(bits as u64 ^ SEED_MASK)
}
