//! The mixer: sums channels, filters the sum and feeds sinks.
//!
//! A [`Mixer`] is driven one tick at a time by a single thread (normally the
//! [`scheduler`]). Channel, sink and filter registries are owned by that
//! thread. Other threads mutate them through a [`MixerHandle`], whose
//! commands are queued and applied at the start of the next scheduler
//! cycle, so the tick itself never takes a lock on the registries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::audio::format::PcmFormat;
use crate::audio::source::{AudioSource, MixerChannel};
use crate::dsp::filters::{FilterChain, FilterId, FilterStage};
use crate::error::MixerError;
use crate::sink::MixerSink;

mod handle;
pub mod scheduler;

pub use handle::{MixerCommand, MixerHandle, MixerStatus};
pub use scheduler::{MixDriver, Scheduler, SchedulerHandle};

/// Identifier of a channel registered with a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// Identifier of a sink registered with a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub u64);

/// Fixed-format mixer with per-tick scratch buffers sized at construction.
pub struct Mixer {
    format: PcmFormat,
    buffer_size: usize,
    channels: Vec<(ChannelId, Box<dyn MixerChannel>)>,
    sinks: Vec<(SinkId, Box<dyn MixerSink>)>,
    filters: FilterChain,
    mix_buffer: Vec<f32>,
    channel_buffer: Vec<f32>,
    position: u64,
    ids: Arc<AtomicU64>,
    commands: Receiver<MixerCommand>,
    command_tx: Sender<MixerCommand>,
    status: Arc<MixerStatus>,
}

impl Mixer {
    /// Create a mixer.
    ///
    /// # Arguments
    /// - `sample_rate`: Rate every channel and sink must use.
    /// - `channels`: Audio channel count every channel and sink must use.
    /// - `buffer_size`: Largest tick in interleaved samples. Rounded down to
    ///   whole frames.
    pub fn new(sample_rate: u32, channels: u16, buffer_size: usize) -> Result<Self, MixerError> {
        if sample_rate == 0 {
            return Err(MixerError::InvalidParameters(
                "sample rate must be positive".to_string(),
            ));
        }
        if channels == 0 {
            return Err(MixerError::InvalidParameters(
                "channel count must be positive".to_string(),
            ));
        }
        let audio_channels = channels as usize;
        let buffer_size = buffer_size - buffer_size % audio_channels;
        if buffer_size == 0 {
            return Err(MixerError::InvalidParameters(format!(
                "buffer must hold at least one frame of {} channels",
                channels
            )));
        }

        let format = PcmFormat::float(sample_rate, channels);
        let (command_tx, commands) = mpsc::channel();
        Ok(Self {
            format,
            buffer_size,
            channels: Vec::new(),
            sinks: Vec::new(),
            filters: FilterChain::new(audio_channels, buffer_size),
            mix_buffer: vec![0.0; buffer_size],
            channel_buffer: vec![0.0; buffer_size],
            position: 0,
            ids: Arc::new(AtomicU64::new(1)),
            commands,
            command_tx,
            status: Arc::new(MixerStatus::new(format)),
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Cloneable handle for mutating this mixer from other threads.
    pub fn handle(&self) -> MixerHandle {
        MixerHandle::new(
            self.format,
            self.command_tx.clone(),
            self.ids.clone(),
            self.status.clone(),
        )
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a channel. A stopped mixer starts running.
    pub fn add_channel(
        &mut self,
        channel: impl MixerChannel + 'static,
    ) -> Result<ChannelId, MixerError> {
        let id = ChannelId(self.next_id());
        self.insert_channel(id, Box::new(channel))?;
        Ok(id)
    }

    pub(crate) fn insert_channel(
        &mut self,
        id: ChannelId,
        mut channel: Box<dyn MixerChannel>,
    ) -> Result<(), MixerError> {
        if let Err(err) = check_format("channel", self.format, channel.format()) {
            channel.close();
            return Err(err);
        }
        info!("channel added: {}", channel.name());
        self.channels.push((id, channel));
        if !self.is_running() {
            self.set_running(true);
        }
        self.publish();
        Ok(())
    }

    /// Close and remove a channel.
    ///
    /// # Returns
    /// `false` if no channel has that id.
    pub fn remove_channel(&mut self, id: ChannelId) -> bool {
        let Some(index) = self.channels.iter().position(|(channel_id, _)| *channel_id == id)
        else {
            return false;
        };
        let (_, mut channel) = self.channels.remove(index);
        channel.close();
        info!("channel removed: {}", channel.name());
        self.publish();
        true
    }

    /// Close and remove every channel.
    pub fn clear_channels(&mut self) {
        for (_, mut channel) in self.channels.drain(..) {
            channel.close();
            info!("channel removed: {}", channel.name());
        }
        self.publish();
    }

    /// Add a sink. It is started right away if the mixer is running or has
    /// content.
    pub fn add_sink(&mut self, sink: impl MixerSink + 'static) -> Result<SinkId, MixerError> {
        let id = SinkId(self.next_id());
        self.insert_sink(id, Box::new(sink))?;
        Ok(id)
    }

    pub(crate) fn insert_sink(
        &mut self,
        id: SinkId,
        mut sink: Box<dyn MixerSink>,
    ) -> Result<(), MixerError> {
        check_format("sink", self.format, sink.format())?;
        debug!("sink added: {}", sink.name());
        if (self.is_running() || self.is_playing()) && !sink.is_running() {
            if let Err(err) = sink.start() {
                warn!("failed to start sink {}: {}", sink.name(), err);
            }
        }
        self.sinks.push((id, sink));
        self.publish();
        Ok(())
    }

    /// Stop and remove a sink.
    pub fn remove_sink(&mut self, id: SinkId) -> bool {
        let Some(index) = self.sinks.iter().position(|(sink_id, _)| *sink_id == id) else {
            return false;
        };
        let (_, mut sink) = self.sinks.remove(index);
        if sink.is_running() {
            match sink.stop() {
                // Removing the last running sink stops the mixer.
                Ok(()) if !self.is_running() => self.filters.reset(),
                Ok(()) => {}
                Err(err) => warn!("failed to stop sink {}: {}", sink.name(), err),
            }
        }
        debug!("sink removed: {}", sink.name());
        self.publish();
        true
    }

    /// Append a filter stage. It must hold one filter per audio channel.
    pub fn add_filter(&mut self, stage: FilterStage) -> Result<FilterId, MixerError> {
        let id = FilterId(self.next_id());
        self.insert_filter(id, stage)?;
        Ok(id)
    }

    /// Insert a filter stage ahead of every existing stage.
    pub fn add_filter_first(&mut self, stage: FilterStage) -> Result<FilterId, MixerError> {
        check_filter_width(self.format, &stage)?;
        let id = FilterId(self.next_id());
        self.filters.push_front(id, stage);
        Ok(id)
    }

    pub(crate) fn insert_filter(&mut self, id: FilterId, stage: FilterStage) -> Result<(), MixerError> {
        check_filter_width(self.format, &stage)?;
        self.filters.push(id, stage);
        Ok(())
    }

    pub fn remove_filter(&mut self, id: FilterId) -> bool {
        self.filters.remove(id).is_some()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Start or stop every sink.
    ///
    /// Stopping resets filter state only if every sink stopped cleanly, so a
    /// failed stop can be retried.
    ///
    /// # Returns
    /// `true` if every start or stop succeeded.
    pub fn set_running(&mut self, running: bool) -> bool {
        let mut ok = true;
        for (_, sink) in self.sinks.iter_mut() {
            if sink.is_running() == running {
                continue;
            }
            let result = if running { sink.start() } else { sink.stop() };
            match result {
                Ok(()) => debug!(
                    "sink {}: {}",
                    if running { "started" } else { "stopped" },
                    sink.name()
                ),
                Err(err) => {
                    warn!(
                        "failed to {} sink {}: {}",
                        if running { "start" } else { "stop" },
                        sink.name(),
                        err
                    );
                    ok = false;
                }
            }
        }
        if !running && ok {
            self.filters.reset();
        }
        self.publish();
        ok
    }

    /// `true` while at least one sink is running.
    pub fn is_running(&self) -> bool {
        self.sinks.iter().any(|(_, sink)| sink.is_running())
    }

    /// `true` while any channel is registered.
    pub fn is_playing(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Samples the next tick can move, in whole frames.
    ///
    /// Zero when no sink is ready or no playing channel has data.
    pub fn available(&self) -> usize {
        let sink_room = self
            .sinks
            .iter()
            .filter(|(_, sink)| sink.is_running())
            .map(|(_, sink)| sink.available_input())
            .min()
            .unwrap_or(0);
        if sink_room == 0 {
            return 0;
        }

        let channel_data = self
            .channels
            .iter()
            .filter(|(_, channel)| channel.is_playing())
            .map(|(_, channel)| channel.available())
            .min()
            .unwrap_or(0);
        if channel_data == 0 {
            return 0;
        }

        let len = self.buffer_size.min(sink_room).min(channel_data);
        len - len % self.format.channels as usize
    }

    /// Run one mixing tick.
    ///
    /// # Returns
    /// `Ok(true)` while the mixer still has channels. A sink write failure
    /// is returned as an error and should end the scheduling loop.
    pub fn process_buffer(&mut self) -> Result<bool, MixerError> {
        if !self.is_playing() {
            return Ok(false);
        }

        let len = self.buffer_size.min(self.available());
        if len > 0 {
            self.mix_channels(len);
            self.filters.process(&mut self.mix_buffer[..len]);
            self.write_sinks(len)?;
            self.position += len as u64;
        }

        self.sweep_finished();
        self.publish();
        Ok(self.is_playing())
    }

    fn mix_channels(&mut self, len: usize) {
        let Mixer {
            channels,
            mix_buffer,
            channel_buffer,
            ..
        } = self;
        let out = &mut mix_buffer[..len];
        out.fill(0.0);
        let scratch = &mut channel_buffer[..len];

        channels.retain_mut(|(_, channel)| {
            if !channel.is_playing() {
                channel.close();
                info!("channel finished: {}", channel.name());
                return false;
            }
            match channel.read(scratch) {
                Ok(read) if read > scratch.len() => {
                    error!(
                        "channel {} reported {} samples for a {} sample block, removing it",
                        channel.name(),
                        read,
                        scratch.len()
                    );
                    channel.close();
                    false
                }
                Ok(read) => {
                    for (mixed, sample) in out.iter_mut().zip(&scratch[..read]) {
                        *mixed += *sample;
                    }
                    true
                }
                Err(err) => {
                    error!("channel {} failed, removing it: {}", channel.name(), err);
                    channel.close();
                    false
                }
            }
        });
    }

    fn write_sinks(&mut self, len: usize) -> Result<(), MixerError> {
        let block = &self.mix_buffer[..len];
        for (_, sink) in self.sinks.iter_mut() {
            if !sink.is_running() || sink.available_input() < len {
                continue;
            }
            sink.write(block).map_err(|source| MixerError::SinkWrite {
                name: sink.name(),
                source,
            })?;
        }
        Ok(())
    }

    fn sweep_finished(&mut self) {
        self.channels.retain_mut(|(_, channel)| {
            if channel.is_playing() {
                return true;
            }
            channel.close();
            info!("channel finished: {}", channel.name());
            false
        });
    }

    /// Total samples moved since creation.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn position_in_seconds(&self) -> f64 {
        self.format.seconds_for_samples(self.position)
    }

    /// Apply every queued [`MixerCommand`].
    ///
    /// # Returns
    /// Number of commands applied.
    pub fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            self.apply(command);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::AddChannel(id, channel) => {
                if let Err(err) = self.insert_channel(id, channel) {
                    error!("rejected queued channel: {}", err);
                }
            }
            MixerCommand::RemoveChannel(id) => {
                self.remove_channel(id);
            }
            MixerCommand::ClearChannels => self.clear_channels(),
            MixerCommand::AddSink(id, sink) => {
                if let Err(err) = self.insert_sink(id, sink) {
                    error!("rejected queued sink: {}", err);
                }
            }
            MixerCommand::RemoveSink(id) => {
                self.remove_sink(id);
            }
            MixerCommand::AddFilter(id, stage) => {
                if let Err(err) = self.insert_filter(id, stage) {
                    error!("rejected queued filter: {}", err);
                }
            }
            MixerCommand::RemoveFilter(id) => {
                self.remove_filter(id);
            }
        }
    }

    fn publish(&self) {
        self.status.publish(
            self.is_playing(),
            self.is_running(),
            self.channels.len(),
            self.sinks.len(),
            self.position,
        );
    }
}

pub(crate) fn check_format(
    kind: &'static str,
    expected: PcmFormat,
    actual: PcmFormat,
) -> Result<(), MixerError> {
    if expected.same_layout(&actual) {
        Ok(())
    } else {
        Err(MixerError::FormatMismatch {
            kind,
            expected_rate: expected.sample_rate,
            expected_channels: expected.channels,
            rate: actual.sample_rate,
            channels: actual.channels,
        })
    }
}

pub(crate) fn check_filter_width(format: PcmFormat, stage: &FilterStage) -> Result<(), MixerError> {
    let expected = format.channels as usize;
    if stage.width() == expected {
        Ok(())
    } else {
        Err(MixerError::FilterWidth {
            expected,
            got: stage.width(),
        })
    }
}
