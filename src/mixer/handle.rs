//! Cross-thread control surface of a mixer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::{check_filter_width, check_format, ChannelId, SinkId};
use crate::audio::format::PcmFormat;
use crate::audio::source::MixerChannel;
use crate::dsp::filters::{FilterId, FilterStage, GainControl};
use crate::error::MixerError;
use crate::sink::MixerSink;

/// A registry change queued for the mixer thread.
pub enum MixerCommand {
    AddChannel(ChannelId, Box<dyn MixerChannel>),
    RemoveChannel(ChannelId),
    ClearChannels,
    AddSink(SinkId, Box<dyn MixerSink>),
    RemoveSink(SinkId),
    AddFilter(FilterId, FilterStage),
    RemoveFilter(FilterId),
}

impl std::fmt::Debug for MixerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixerCommand::AddChannel(id, channel) => f
                .debug_tuple("AddChannel")
                .field(id)
                .field(&channel.name())
                .finish(),
            MixerCommand::RemoveChannel(id) => f.debug_tuple("RemoveChannel").field(id).finish(),
            MixerCommand::ClearChannels => f.write_str("ClearChannels"),
            MixerCommand::AddSink(id, sink) => f
                .debug_tuple("AddSink")
                .field(id)
                .field(&sink.name())
                .finish(),
            MixerCommand::RemoveSink(id) => f.debug_tuple("RemoveSink").field(id).finish(),
            MixerCommand::AddFilter(id, stage) => f
                .debug_tuple("AddFilter")
                .field(id)
                .field(&stage.width())
                .finish(),
            MixerCommand::RemoveFilter(id) => f.debug_tuple("RemoveFilter").field(id).finish(),
        }
    }
}

/// Mixer state published after every mutation and tick.
#[derive(Debug)]
pub struct MixerStatus {
    format: PcmFormat,
    playing: AtomicBool,
    running: AtomicBool,
    channels: AtomicUsize,
    sinks: AtomicUsize,
    position: AtomicU64,
}

impl MixerStatus {
    pub(crate) fn new(format: PcmFormat) -> Self {
        Self {
            format,
            playing: AtomicBool::new(false),
            running: AtomicBool::new(false),
            channels: AtomicUsize::new(0),
            sinks: AtomicUsize::new(0),
            position: AtomicU64::new(0),
        }
    }

    pub(crate) fn publish(
        &self,
        playing: bool,
        running: bool,
        channels: usize,
        sinks: usize,
        position: u64,
    ) {
        self.playing.store(playing, Ordering::Release);
        self.running.store(running, Ordering::Release);
        self.channels.store(channels, Ordering::Release);
        self.sinks.store(sinks, Ordering::Release);
        self.position.store(position, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn channels(&self) -> usize {
        self.channels.load(Ordering::Acquire)
    }

    pub fn sinks(&self) -> usize {
        self.sinks.load(Ordering::Acquire)
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn position_in_seconds(&self) -> f64 {
        self.format.seconds_for_samples(self.position())
    }
}

/// Queues registry changes for a mixer owned by another thread.
///
/// Formats are checked before a command is queued, so a mismatched channel
/// is rejected here and never reaches the mixer.
#[derive(Clone)]
pub struct MixerHandle {
    format: PcmFormat,
    sender: Sender<MixerCommand>,
    ids: Arc<AtomicU64>,
    status: Arc<MixerStatus>,
}

impl MixerHandle {
    pub(crate) fn new(
        format: PcmFormat,
        sender: Sender<MixerCommand>,
        ids: Arc<AtomicU64>,
        status: Arc<MixerStatus>,
    ) -> Self {
        Self {
            format,
            sender,
            ids,
            status,
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn status(&self) -> &MixerStatus {
        &self.status
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, command: MixerCommand) -> Result<(), MixerError> {
        self.sender
            .send(command)
            .map_err(|_| MixerError::Disconnected)
    }

    pub fn add_channel(
        &self,
        channel: impl MixerChannel + 'static,
    ) -> Result<ChannelId, MixerError> {
        check_format("channel", self.format, channel.format())?;
        let id = ChannelId(self.next_id());
        self.send(MixerCommand::AddChannel(id, Box::new(channel)))?;
        Ok(id)
    }

    pub fn remove_channel(&self, id: ChannelId) -> Result<(), MixerError> {
        self.send(MixerCommand::RemoveChannel(id))
    }

    pub fn clear_channels(&self) -> Result<(), MixerError> {
        self.send(MixerCommand::ClearChannels)
    }

    pub fn add_sink(&self, sink: impl MixerSink + 'static) -> Result<SinkId, MixerError> {
        check_format("sink", self.format, sink.format())?;
        let id = SinkId(self.next_id());
        self.send(MixerCommand::AddSink(id, Box::new(sink)))?;
        Ok(id)
    }

    pub fn remove_sink(&self, id: SinkId) -> Result<(), MixerError> {
        self.send(MixerCommand::RemoveSink(id))
    }

    pub fn add_filter(&self, stage: FilterStage) -> Result<FilterId, MixerError> {
        check_filter_width(self.format, &stage)?;
        let id = FilterId(self.next_id());
        self.send(MixerCommand::AddFilter(id, stage))?;
        Ok(id)
    }

    /// Install a gain stage and return the control that adjusts it.
    pub fn add_gain(&self, gain: f32) -> Result<(FilterId, GainControl), MixerError> {
        let control = GainControl::new(gain);
        let id = self.add_filter(FilterStage::gain(self.format.channels, &control))?;
        Ok((id, control))
    }

    pub fn remove_filter(&self, id: FilterId) -> Result<(), MixerError> {
        self.send(MixerCommand::RemoveFilter(id))
    }
}

impl std::fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerHandle")
            .field("format", &self.format)
            .field("status", &self.status)
            .finish()
    }
}
