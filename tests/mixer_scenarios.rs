use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mixdown::decode::RawPcmDecoder;
use mixdown::dsp::filters::{GainControl, MixerFilter, SoftClipFilter};
use mixdown::error::{ChannelError, MixerError, SinkError};
use mixdown::tools::ManualClock;
use mixdown::{
    AudioSource, DecoderPlayer, FilterStage, Mixer, MixerChannel, MixerSink, PcmFormat,
    SampleEncoding, Scheduler, SilenceChannel,
};

/// Sink that records every block and answers `available_input` from a
/// script, falling back to `room` once the script runs out.
#[derive(Clone)]
struct RecordingSink {
    format: PcmFormat,
    state: Arc<Mutex<RecordingState>>,
}

struct RecordingState {
    room: usize,
    script: VecDeque<usize>,
    running: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_write: bool,
    writes: Vec<Vec<f32>>,
}

impl RecordingSink {
    fn new(format: PcmFormat, room: usize) -> Self {
        Self {
            format,
            state: Arc::new(Mutex::new(RecordingState {
                room,
                script: VecDeque::new(),
                running: false,
                fail_start: false,
                fail_stop: false,
                fail_write: false,
                writes: Vec::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().expect("sink state")
    }

    fn script(&self, answers: &[usize]) {
        self.state().script.extend(answers.iter().copied());
    }

    fn writes(&self) -> Vec<Vec<f32>> {
        self.state().writes.clone()
    }

    fn running(&self) -> bool {
        self.state().running
    }
}

impl MixerSink for RecordingSink {
    fn name(&self) -> String {
        "recording".to_string()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn available_input(&self) -> usize {
        let mut state = self.state();
        match state.script.pop_front() {
            Some(answer) => answer,
            None => state.room,
        }
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize, SinkError> {
        let mut state = self.state();
        if state.fail_write {
            return Err(SinkError::Device("unplugged".to_string()));
        }
        state.writes.push(samples.to_vec());
        Ok(samples.len())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.fail_start {
            return Err(SinkError::Device("busy".to_string()));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.fail_stop {
            return Err(SinkError::Device("stuck".to_string()));
        }
        state.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state().running
    }

    fn buffer_size(&self) -> usize {
        self.state().room
    }

    fn position(&self) -> u64 {
        self.state().writes.iter().map(|w| w.len() as u64).sum()
    }

    fn underflows(&self) -> u64 {
        0
    }

    fn overflows(&self) -> u64 {
        0
    }
}

/// Channel with a fixed sample sequence.
struct Fixed {
    format: PcmFormat,
    samples: VecDeque<f32>,
    fail: bool,
}

impl Fixed {
    fn new(format: PcmFormat, samples: &[f32]) -> Self {
        Self {
            format,
            samples: samples.iter().copied().collect(),
            fail: false,
        }
    }
}

impl AudioSource for Fixed {
    fn available(&self) -> usize {
        self.samples.len()
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError> {
        if self.fail {
            return Err(ChannelError::Other("source went away".to_string()));
        }
        let count = out.len().min(self.samples.len());
        for slot in out[..count].iter_mut() {
            *slot = self.samples.pop_front().unwrap_or(0.0);
        }
        Ok(count)
    }
}

impl MixerChannel for Fixed {
    fn name(&self) -> String {
        "fixed".to_string()
    }

    fn format(&self) -> PcmFormat {
        self.format
    }

    fn is_playing(&self) -> bool {
        !self.samples.is_empty()
    }

    fn close(&mut self) {
        self.samples.clear();
    }
}

fn stereo() -> PcmFormat {
    PcmFormat::float(48_000, 2)
}

fn mono() -> PcmFormat {
    PcmFormat::float(48_000, 1)
}

/// Block that drives a soft clipper past unity and leaves a nonzero
/// continuity coefficient behind.
const EXCURSION: [f32; 4] = [0.2, 0.8, 1.5, 1.8];
/// Block that bends only while a leftover coefficient is carried.
const AFTER_EXCURSION: [f32; 3] = [0.9, 0.4, -0.1];

fn soft_clipped_mixer() -> Mixer {
    let mut mixer = Mixer::new(48_000, 1, 4).expect("mixer");
    mixer
        .add_filter(FilterStage::soft_clip(1))
        .expect("soft clip");
    mixer
}

fn play_block(mixer: &mut Mixer, samples: &[f32]) {
    mixer
        .add_channel(Fixed::new(mono(), samples))
        .expect("channel");
    mixer.process_buffer().expect("tick");
}

/// Channel that claims to have read more samples than it was given.
struct Overcounting;

impl AudioSource for Overcounting {
    fn available(&self) -> usize {
        usize::MAX
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, ChannelError> {
        out.fill(1.0);
        Ok(out.len() + 1)
    }
}

impl MixerChannel for Overcounting {
    fn name(&self) -> String {
        "overcounting".to_string()
    }

    fn format(&self) -> PcmFormat {
        stereo()
    }

    fn is_playing(&self) -> bool {
        true
    }

    fn close(&mut self) {}
}

fn three_sample_player() -> DecoderPlayer {
    let bytes: Vec<u8> = [0.25f32, -0.5, 0.75]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let format = PcmFormat::new(48_000, 2, SampleEncoding::F32Le);
    let decoder = RawPcmDecoder::new(Cursor::new(bytes), format).expect("decoder");
    DecoderPlayer::from_decoder(decoder, 4096).expect("player")
}

#[test]
fn finished_decoder_channel_is_removed_while_mixer_keeps_running() {
    let clock = ManualClock::new();
    let mut mixer = Mixer::new(48_000, 2, 4096).expect("mixer");
    let sink = RecordingSink::new(stereo(), 8192);
    mixer.add_sink(sink.clone()).expect("sink");

    mixer
        .add_channel(SilenceChannel::with_clock(48_000, 2, clock.clone()))
        .expect("silence");
    mixer.add_channel(three_sample_player()).expect("player");
    assert!(mixer.is_running());
    assert_eq!(mixer.channel_count(), 2);

    clock.advance(Duration::from_millis(50));
    assert_eq!(mixer.available(), 4096);
    assert!(mixer.process_buffer().expect("tick"));

    assert_eq!(mixer.channel_count(), 1);
    assert!(mixer.is_running());
    assert!(sink.running());

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 4096);
    assert_eq!(&writes[0][..4], &[0.25, -0.5, 0.75, 0.0]);

    clock.advance(Duration::from_millis(50));
    assert!(mixer.process_buffer().expect("second tick"));
    assert_eq!(mixer.channel_count(), 1);
    assert_eq!(mixer.position(), 2 * 4096);
}

#[test]
fn mismatched_channel_format_is_rejected_before_it_is_added() {
    let mut mixer = Mixer::new(48_000, 2, 4096).expect("mixer");
    let result = mixer.add_channel(Fixed::new(PcmFormat::float(44_100, 2), &[0.1; 8]));
    assert!(matches!(
        result,
        Err(MixerError::FormatMismatch {
            kind: "channel",
            rate: 44_100,
            ..
        })
    ));
    assert_eq!(mixer.channel_count(), 0);
    assert!(!mixer.is_playing());

    let handle = mixer.handle();
    let result = handle.add_channel(Fixed::new(PcmFormat::float(48_000, 1), &[0.1; 8]));
    assert!(matches!(result, Err(MixerError::FormatMismatch { .. })));
    assert_eq!(mixer.apply_commands(), 0);
    assert_eq!(mixer.channel_count(), 0);
}

#[test]
fn sink_without_room_for_the_tick_is_skipped() {
    let mut mixer = Mixer::new(48_000, 2, 64).expect("mixer");
    let short = RecordingSink::new(stereo(), 1024);
    let full = RecordingSink::new(stereo(), 1024);
    mixer.add_sink(short.clone()).expect("short");
    mixer.add_sink(full.clone()).expect("full");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.5; 200]))
        .expect("channel");

    // First answer feeds the tick-length computation, the second is read
    // when the block is handed out.
    short.script(&[1024, 63]);
    assert!(mixer.process_buffer().expect("tick"));

    assert!(short.writes().is_empty());
    let writes = full.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0], vec![0.5; 64]);
}

#[test]
fn tick_length_is_bounded_by_every_participant() {
    let mut mixer = Mixer::new(48_000, 2, 4096).expect("mixer");
    let sink = RecordingSink::new(stereo(), 101);
    mixer.add_sink(sink.clone()).expect("sink");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.1; 300]))
        .expect("channel");

    // 101 is rounded down to whole stereo frames.
    assert_eq!(mixer.available(), 100);
    mixer.process_buffer().expect("tick");
    assert_eq!(sink.writes()[0].len(), 100);
}

#[test]
fn mixing_is_additive_and_order_independent() {
    let a: Vec<f32> = (0..16).map(|i| i as f32 * 0.01).collect();
    let b: Vec<f32> = (0..16).map(|i| -(i as f32) * 0.02 + 0.1).collect();

    let mix = |first: &[f32], second: &[f32]| {
        let mut mixer = Mixer::new(48_000, 2, 16).expect("mixer");
        let sink = RecordingSink::new(stereo(), 16);
        mixer.add_sink(sink.clone()).expect("sink");
        mixer.add_channel(Fixed::new(stereo(), first)).expect("first");
        mixer
            .add_channel(Fixed::new(stereo(), second))
            .expect("second");
        mixer.process_buffer().expect("tick");
        sink.writes().remove(0)
    };

    let ab = mix(&a, &b);
    let ba = mix(&b, &a);
    for ((x, y), (p, q)) in ab.iter().zip(&ba).zip(a.iter().zip(&b)) {
        assert!((x - y).abs() < 1e-6);
        assert!((x - (p + q)).abs() < 1e-6);
    }
}

#[test]
fn failing_channel_is_removed_and_the_tick_continues() {
    let mut mixer = Mixer::new(48_000, 2, 8).expect("mixer");
    let sink = RecordingSink::new(stereo(), 8);
    mixer.add_sink(sink.clone()).expect("sink");

    let mut broken = Fixed::new(stereo(), &[1.0; 8]);
    broken.fail = true;
    mixer.add_channel(broken).expect("broken");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.25; 16]))
        .expect("healthy");

    assert!(mixer.process_buffer().expect("tick"));
    assert_eq!(mixer.channel_count(), 1);
    assert_eq!(sink.writes()[0], vec![0.25; 8]);
}

#[test]
fn filters_run_per_audio_channel_after_summation() {
    let mut mixer = Mixer::new(48_000, 2, 4).expect("mixer");
    let sink = RecordingSink::new(stereo(), 4);
    mixer.add_sink(sink.clone()).expect("sink");
    let gain = GainControl::new(0.5);
    mixer
        .add_filter(FilterStage::gain(2, &gain))
        .expect("gain stage");

    let too_narrow = FilterStage::new(vec![MixerFilter::SoftClip(SoftClipFilter::new())]);
    assert!(matches!(
        mixer.add_filter(too_narrow),
        Err(MixerError::FilterWidth {
            expected: 2,
            got: 1
        })
    ));

    mixer
        .add_channel(Fixed::new(stereo(), &[0.4, 0.8, 0.4, 0.8, 0.4, 0.8, 0.4, 0.8]))
        .expect("channel");
    mixer.process_buffer().expect("tick");
    gain.set(1.0);
    mixer.process_buffer().expect("tick");

    let writes = sink.writes();
    assert_eq!(writes[0], vec![0.2, 0.4, 0.2, 0.4]);
    assert_eq!(writes[1], vec![0.4, 0.8, 0.4, 0.8]);
}

#[test]
fn failed_stop_keeps_running_state_for_a_retry() {
    let mut mixer = Mixer::new(48_000, 2, 8).expect("mixer");
    let sink = RecordingSink::new(stereo(), 8);
    mixer.add_sink(sink.clone()).expect("sink");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.1; 64]))
        .expect("channel");
    assert!(mixer.is_running());

    sink.state().fail_stop = true;
    assert!(!mixer.set_running(false));
    assert!(mixer.is_running());

    sink.state().fail_stop = false;
    assert!(mixer.set_running(false));
    assert!(!mixer.is_running());
}

#[test]
fn filter_state_survives_a_failed_stop_and_resets_after_a_clean_one() {
    let mut mixer = soft_clipped_mixer();
    let sink = RecordingSink::new(mono(), 4);
    mixer.add_sink(sink.clone()).expect("sink");

    play_block(&mut mixer, &EXCURSION);
    sink.state().fail_stop = true;
    assert!(!mixer.set_running(false));
    assert!(mixer.is_running());

    play_block(&mut mixer, &AFTER_EXCURSION);
    let carried = sink.writes().pop().expect("carried block");
    assert!((carried[0] - 0.7).abs() < 1e-4);
    assert!((carried[1] - 0.3605).abs() < 1e-4);
    assert_eq!(carried[2], -0.1);

    play_block(&mut mixer, &EXCURSION);
    sink.state().fail_stop = false;
    assert!(mixer.set_running(false));
    assert!(!mixer.is_running());

    play_block(&mut mixer, &AFTER_EXCURSION);
    assert!(sink.running());
    assert_eq!(sink.writes().pop().expect("fresh block"), AFTER_EXCURSION.to_vec());
}

#[test]
fn removing_the_last_running_sink_resets_filters() {
    let mut mixer = soft_clipped_mixer();
    let first = RecordingSink::new(mono(), 4);
    let first_id = mixer.add_sink(first.clone()).expect("first sink");

    play_block(&mut mixer, &EXCURSION);
    assert!(mixer.remove_sink(first_id));
    assert!(!first.running());
    assert!(!mixer.is_running());

    let second = RecordingSink::new(mono(), 4);
    mixer.add_sink(second.clone()).expect("second sink");
    play_block(&mut mixer, &AFTER_EXCURSION);
    assert_eq!(second.writes(), vec![AFTER_EXCURSION.to_vec()]);
}

#[test]
fn removing_one_of_several_running_sinks_keeps_filter_state() {
    let mut mixer = soft_clipped_mixer();
    let leaving = RecordingSink::new(mono(), 4);
    let staying = RecordingSink::new(mono(), 4);
    let leaving_id = mixer.add_sink(leaving).expect("leaving sink");
    mixer.add_sink(staying.clone()).expect("staying sink");

    play_block(&mut mixer, &EXCURSION);
    assert!(mixer.remove_sink(leaving_id));
    assert!(mixer.is_running());

    play_block(&mut mixer, &AFTER_EXCURSION);
    let carried = staying.writes().pop().expect("carried block");
    assert!((carried[0] - 0.7).abs() < 1e-4);
}

#[test]
fn channel_reporting_too_many_samples_is_removed() {
    let mut mixer = Mixer::new(48_000, 2, 8).expect("mixer");
    let sink = RecordingSink::new(stereo(), 8);
    mixer.add_sink(sink.clone()).expect("sink");
    mixer.add_channel(Overcounting).expect("overcounting");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.25; 16]))
        .expect("healthy");

    assert!(mixer.process_buffer().expect("tick"));
    assert_eq!(mixer.channel_count(), 1);
    assert_eq!(sink.writes()[0], vec![0.25; 8]);
}

#[test]
fn filter_added_first_runs_before_existing_stages() {
    let mut mixer = soft_clipped_mixer();
    let sink = RecordingSink::new(mono(), 4);
    mixer.add_sink(sink.clone()).expect("sink");
    let gain = GainControl::new(0.5);
    mixer
        .add_filter_first(FilterStage::gain(1, &gain))
        .expect("gain stage");
    assert!(matches!(
        mixer.add_filter_first(FilterStage::gain(2, &gain)),
        Err(MixerError::FilterWidth {
            expected: 1,
            got: 2
        })
    ));
    assert_eq!(mixer.filter_count(), 2);

    play_block(&mut mixer, &[1.6; 4]);
    assert_eq!(sink.writes()[0], vec![0.8; 4]);
}

#[test]
fn sink_write_failure_is_fatal_for_the_tick() {
    let mut mixer = Mixer::new(48_000, 2, 8).expect("mixer");
    let sink = RecordingSink::new(stereo(), 8);
    mixer.add_sink(sink.clone()).expect("sink");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.1; 64]))
        .expect("channel");

    sink.state().fail_write = true;
    assert!(matches!(
        mixer.process_buffer(),
        Err(MixerError::SinkWrite { .. })
    ));
}

#[test]
fn handle_commands_apply_at_the_next_cycle() {
    let mut mixer = Mixer::new(48_000, 2, 8).expect("mixer");
    let handle = mixer.handle();
    let sink_id = handle.add_sink(RecordingSink::new(stereo(), 8)).expect("sink");
    let channel = handle
        .add_channel(Fixed::new(stereo(), &[0.1; 64]))
        .expect("channel");
    let (filter, _control) = handle.add_gain(0.5).expect("gain");

    assert_eq!(mixer.channel_count(), 0);
    assert_eq!(mixer.apply_commands(), 3);
    assert_eq!(mixer.channel_count(), 1);
    assert_eq!(mixer.sink_count(), 1);
    assert_eq!(mixer.filter_count(), 1);
    assert!(handle.status().is_playing());
    assert!(handle.status().is_running());

    handle.remove_channel(channel).expect("remove channel");
    handle.remove_filter(filter).expect("remove filter");
    handle.remove_sink(sink_id).expect("remove sink");
    assert_eq!(mixer.apply_commands(), 3);
    assert_eq!(mixer.channel_count(), 0);
    assert_eq!(mixer.sink_count(), 0);
    assert_eq!(mixer.filter_count(), 0);
    assert_eq!(handle.status().channels(), 0);

    drop(mixer);
    assert!(matches!(
        handle.clear_channels(),
        Err(MixerError::Disconnected)
    ));
}

#[test]
fn scheduler_drives_a_mixer_until_its_channels_finish() {
    let mut mixer = Mixer::new(48_000, 2, 16).expect("mixer");
    let sink = RecordingSink::new(stereo(), 16);
    mixer.add_sink(sink.clone()).expect("sink");
    mixer
        .add_channel(Fixed::new(stereo(), &[0.1; 48]))
        .expect("channel");

    let clock = ManualClock::new();
    let stop = Arc::new(AtomicBool::new(false));
    let watcher_stop = stop.clone();
    let watcher_sink = sink.clone();
    let scheduler = Scheduler::new(20.0, 2.0).expect("scheduler");

    struct StopWhenIdle<'a> {
        mixer: &'a mut Mixer,
        stop: Arc<AtomicBool>,
    }

    impl mixdown::mixer::MixDriver for StopWhenIdle<'_> {
        fn apply_commands(&mut self) -> usize {
            if !self.mixer.is_playing() {
                self.stop.store(true, Ordering::Release);
            }
            self.mixer.apply_commands()
        }

        fn is_playing(&self) -> bool {
            self.mixer.is_playing()
        }

        fn is_running(&self) -> bool {
            self.mixer.is_running()
        }

        fn set_running(&mut self, running: bool) -> bool {
            self.mixer.set_running(running)
        }

        fn process_buffer(&mut self) -> Result<bool, MixerError> {
            self.mixer.process_buffer()
        }
    }

    scheduler
        .run(
            &mut StopWhenIdle {
                mixer: &mut mixer,
                stop: watcher_stop,
            },
            &clock,
            &stop,
        )
        .expect("run");

    assert_eq!(watcher_sink.writes().len(), 3);
    assert!(!mixer.is_playing());
    assert!(!mixer.is_running());
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_millis(50),
            Duration::from_millis(50),
            Duration::from_millis(50),
            Duration::from_millis(500),
        ]
    );
}
