//! Post-summation filters.
//!
//! Filters are mono. A [`FilterStage`] holds one filter per audio channel of
//! the mixer, and a [`FilterChain`] runs its stages in insertion order over a
//! de-interleaved copy of each audio channel.

use serde::{Deserialize, Serialize};

pub mod dither;
pub mod gain;
pub mod level;
pub mod soft_clip;

pub use dither::{DitherFilter, DitherSettings};
pub use gain::{GainControl, GainFilter, GainSettings};
pub use soft_clip::{SoftClipFilter, SoftClipSettings};

/// A stateful mono transform.
#[derive(Debug, Clone)]
pub enum MixerFilter {
    Gain(GainFilter),
    SoftClip(SoftClipFilter),
    Dither(DitherFilter),
}

impl MixerFilter {
    /// Process `samples` in place.
    ///
    /// # Returns
    /// Number of samples processed.
    pub fn process(&mut self, samples: &mut [f32]) -> usize {
        match self {
            MixerFilter::Gain(filter) => filter.process(samples),
            MixerFilter::SoftClip(filter) => filter.process(samples),
            MixerFilter::Dither(filter) => filter.process(samples),
        }
    }

    /// Restore the filter's initial state.
    pub fn reset(&mut self) {
        match self {
            MixerFilter::Gain(_) => {}
            MixerFilter::SoftClip(filter) => filter.reset(),
            MixerFilter::Dither(filter) => filter.reset(),
        }
    }
}

/// Serialized filter stage description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterSettings {
    #[serde(rename = "GainSettings")]
    Gain(GainSettings),
    #[serde(rename = "SoftClipSettings")]
    SoftClip(SoftClipSettings),
    #[serde(rename = "DitherSettings")]
    Dither(DitherSettings),
}

impl FilterSettings {
    /// The stage list a mixer gets when none is configured.
    pub fn default_chain() -> Vec<FilterSettings> {
        vec![
            FilterSettings::Gain(GainSettings::default()),
            FilterSettings::SoftClip(SoftClipSettings::default()),
            FilterSettings::Dither(DitherSettings::default()),
        ]
    }

    /// Build a stage with one filter per audio channel.
    ///
    /// # Returns
    /// The stage and, for gain stages, the control shared by its filters.
    pub fn build_stage(&self, channels: u16) -> (FilterStage, Option<GainControl>) {
        match self {
            FilterSettings::Gain(settings) => {
                let control = GainControl::new(settings.gain);
                (FilterStage::gain(channels, &control), Some(control))
            }
            FilterSettings::SoftClip(_) => (FilterStage::soft_clip(channels), None),
            FilterSettings::Dither(settings) => (FilterStage::dither(channels, settings.bits), None),
        }
    }
}

/// Identifier of a stage registered with a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u64);

/// One logical filter, as one mono instance per audio channel.
#[derive(Debug, Clone)]
pub struct FilterStage {
    filters: Vec<MixerFilter>,
}

impl FilterStage {
    pub fn new(filters: Vec<MixerFilter>) -> Self {
        Self { filters }
    }

    /// Gain stage whose filters all follow `control`.
    pub fn gain(channels: u16, control: &GainControl) -> Self {
        Self::new(
            (0..channels)
                .map(|_| MixerFilter::Gain(GainFilter::new(control.clone())))
                .collect(),
        )
    }

    pub fn soft_clip(channels: u16) -> Self {
        Self::new(
            (0..channels)
                .map(|_| MixerFilter::SoftClip(SoftClipFilter::new()))
                .collect(),
        )
    }

    pub fn dither(channels: u16, bits: u32) -> Self {
        Self::new(
            (0..channels)
                .map(|_| MixerFilter::Dither(DitherFilter::new(bits)))
                .collect(),
        )
    }

    /// Number of audio channels this stage covers.
    pub fn width(&self) -> usize {
        self.filters.len()
    }

    pub fn reset(&mut self) {
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
    }
}

/// Ordered filter stages plus the mono scratch buffer they run on.
#[derive(Debug)]
pub struct FilterChain {
    channels: usize,
    stages: Vec<(FilterId, FilterStage)>,
    scratch: Vec<f32>,
}

impl FilterChain {
    /// Create an empty chain for `channels` audio channels and blocks of up
    /// to `max_samples` interleaved samples.
    pub fn new(channels: usize, max_samples: usize) -> Self {
        let frames = if channels == 0 { 0 } else { max_samples / channels };
        Self {
            channels,
            stages: Vec::new(),
            scratch: vec![0.0; frames],
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Append a stage. The caller checks the stage width.
    pub fn push(&mut self, id: FilterId, stage: FilterStage) {
        self.stages.push((id, stage));
    }

    pub fn push_front(&mut self, id: FilterId, stage: FilterStage) {
        self.stages.insert(0, (id, stage));
    }

    pub fn remove(&mut self, id: FilterId) -> Option<FilterStage> {
        let index = self.stages.iter().position(|(stage_id, _)| *stage_id == id)?;
        Some(self.stages.remove(index).1)
    }

    /// Run every stage over an interleaved block.
    ///
    /// Each audio channel is gathered from `block[frame * channels + ch]`
    /// into the mono scratch buffer, filtered by every stage in order, and
    /// scattered back.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.stages.is_empty() || self.channels == 0 {
            return;
        }

        let frames = (block.len() / self.channels).min(self.scratch.len());
        let mono = &mut self.scratch[..frames];
        for ch in 0..self.channels {
            for (frame, slot) in mono.iter_mut().enumerate() {
                *slot = block[frame * self.channels + ch];
            }

            for (_, stage) in self.stages.iter_mut() {
                if let Some(filter) = stage.filters.get_mut(ch) {
                    filter.process(mono);
                }
            }

            for (frame, sample) in mono.iter().enumerate() {
                block[frame * self.channels + ch] = *sample;
            }
        }
    }

    /// Reset the state of every filter in every stage.
    pub fn reset(&mut self) {
        for (_, stage) in self.stages.iter_mut() {
            stage.reset();
        }
    }
}
