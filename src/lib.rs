//! # Mixdown
//!
//! Real-time audio mixing engine for a voice-chat music bot. Decoded sources
//! are wrapped in buffered players, summed by a [`Mixer`], run through a
//! filter chain (gain, soft clip, dither) and handed to sinks on a steady
//! clock driven by a [`Scheduler`].

pub mod audio;
pub mod config;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod mixer;
pub mod player;
pub mod resample;
pub mod sink;
pub mod tools;

pub use audio::{AudioSource, MixerChannel, PcmFormat, RingBuffer, SampleEncoding, SilenceChannel};
pub use config::MixerSettings;
pub use dsp::filters::{FilterId, FilterSettings, FilterStage, GainControl};
pub use mixer::{ChannelId, Mixer, MixerHandle, Scheduler, SchedulerHandle, SinkId};
pub use player::{DecoderPlayer, Player, PlayerControl, ResampledPlayer};
pub use sink::{FrameReceiver, FrameSink, MixerSink, WriterSink};
