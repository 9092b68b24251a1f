//! Soft clipping with per-channel continuity.
//!
//! Each excursion past ±1 is bent back under unity with the quadratic
//! `x + a·x²`, where `a` is solved from the peak of the excursion. The last
//! coefficient is remembered so that the next block continues the same curve
//! instead of jumping back to the raw signal.

use serde::{Deserialize, Serialize};

/// Serialized configuration for a soft clip stage. It has no parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftClipSettings {}

/// Mono soft clipper.
#[derive(Debug, Clone, Default)]
pub struct SoftClipFilter {
    state: f32,
}

impl SoftClipFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coefficient carried into the next call.
    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn process(&mut self, samples: &mut [f32]) -> usize {
        soft_clip_interleaved(samples, 1, std::slice::from_mut(&mut self.state));
        samples.len()
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Soft clip `x` in place.
///
/// # Arguments
/// - `x`: Interleaved samples. Trailing samples that do not fill a whole
///   frame are left alone.
/// - `channels`: Interleave width.
/// - `declip_mem`: One continuity coefficient per channel, zero initially.
pub fn soft_clip_interleaved(x: &mut [f32], channels: usize, declip_mem: &mut [f32]) {
    if channels < 1 || declip_mem.len() < channels {
        return;
    }
    let n = x.len() / channels;
    if n < 1 {
        return;
    }

    // ±2 is the edge of the curve's domain and its derivative is zero there.
    for sample in x[..n * channels].iter_mut() {
        *sample = sample.clamp(-2.0, 2.0);
    }

    for c in 0..channels {
        let at = |i: usize| c + i * channels;
        let mut a = declip_mem[c];

        // Carry the previous block's curve until the signal changes side.
        for i in 0..n {
            let v = x[at(i)];
            if v * a >= 0.0 {
                break;
            }
            x[at(i)] = v + a * v * v;
        }

        let mut curr = 0;
        let x0 = x[at(0)];
        loop {
            let mut i = curr;
            while i < n {
                let v = x[at(i)];
                if v > 1.0 || v < -1.0 {
                    break;
                }
                i += 1;
            }
            if i == n {
                a = 0.0;
                break;
            }

            let clipped = x[at(i)];
            let mut peak_pos = i;
            let mut start = i;
            let mut end = i;
            let mut maxval = clipped.abs();

            while start > 0 && clipped * x[at(start - 1)] >= 0.0 {
                start -= 1;
            }
            while end < n && clipped * x[at(end)] >= 0.0 {
                let magnitude = x[at(end)].abs();
                if magnitude > maxval {
                    maxval = magnitude;
                    peak_pos = end;
                }
                end += 1;
            }

            // Clipping started before the first zero crossing of the block.
            let special = start == 0 && clipped * x[at(0)] >= 0.0;

            // maxval + a·maxval² = 1, nudged up so rounding never exceeds unity.
            a = (maxval - 1.0) / (maxval * maxval);
            a += a * 2.4e-7;
            if clipped > 0.0 {
                a = -a;
            }

            for j in start..end {
                let v = x[at(j)];
                x[at(j)] = v + a * v * v;
            }

            if special && peak_pos >= 2 {
                // Ramp from the first sample to the peak to hide the block edge.
                let mut offset = x0 - x[at(0)];
                let delta = offset / peak_pos as f32;
                for j in curr..peak_pos {
                    offset -= delta;
                    x[at(j)] = (x[at(j)] + offset).clamp(-1.0, 1.0);
                }
            }

            curr = end;
            if curr == n {
                break;
            }
        }

        declip_mem[c] = a;
    }
}
