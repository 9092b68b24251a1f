use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use mixdown::decode::SymphoniaDecoder;
use mixdown::dsp::filters::level::{linear_to_db, parse_gain};
use mixdown::resample::SincResamplerFactory;
use mixdown::sink::{PcmOutput, SinkCounters};
use mixdown::{
    DecoderPlayer, FilterStage, FrameSink, GainControl, Mixer, MixerSettings, PcmFormat,
    PlayerControl, ResampledPlayer, WriterSink,
};

mod logging;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TRANSPORT_DEPTH_TICKS: usize = 3;
#[cfg(feature = "local-output")]
const LOCAL_QUEUE_BLOCKS: usize = 4;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mix every input through one mixer until all of them finish
    Play(PlayArgs),
    /// Print the default mixer settings as JSON
    Defaults,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Media files to mix
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Mixer settings JSON file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output gain, linear ("0.5") or in dB ("-6db")
    #[arg(short, long, value_name = "GAIN", allow_hyphen_values = true)]
    gain: Option<String>,

    /// Render the mix as raw PCM to FILE, or - for standard output
    #[arg(short, long, value_name = "FILE", conflicts_with = "local")]
    out: Option<String>,

    /// Sample layout for --out: f32 or s16
    #[arg(long, default_value = "f32", value_name = "FORMAT")]
    format: String,

    /// Play through the default output device
    #[arg(long)]
    local: bool,

    /// Print the log backlog when finished instead of streaming it
    #[arg(long)]
    show_log: bool,
}

fn main() {
    let args = Cli::parse();
    let show_log = matches!(&args.command, Commands::Play(play) if play.show_log);
    let backlog = logging::init(!show_log);

    // For any error, return an exit code -1. Otherwise return the exit code provided.
    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            -1
        }
    };

    if show_log {
        let to_stdout = !matches!(
            &args.command,
            Commands::Play(play) if play.out.as_deref() == Some("-")
        );
        for line in backlog.lines() {
            if to_stdout {
                println!("{}", line);
            } else {
                eprintln!("{}", line);
            }
        }
    }

    std::process::exit(code)
}

fn run(args: &Cli) -> Result<i32> {
    match &args.command {
        Commands::Defaults => {
            println!("{}", MixerSettings::default().to_json_pretty()?);
            Ok(0)
        }
        Commands::Play(play) => run_play(play),
    }
}

fn run_play(args: &PlayArgs) -> Result<i32> {
    let settings = match &args.config {
        Some(path) => MixerSettings::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => MixerSettings::default(),
    };

    let (mut mixer, gain_control) = settings.build_mixer()?;
    if let Some(gain) = &args.gain {
        let value = parse_gain(gain).ok_or_else(|| anyhow!("invalid gain: {}", gain))?;
        info!("output gain {:.1} dB", linear_to_db(value));
        match &gain_control {
            Some(control) => control.set(value),
            None => {
                let control = GainControl::new(value);
                mixer.add_filter_first(FilterStage::gain(settings.channels, &control))?;
            }
        }
    }

    let output = mixer.format();
    let controls = add_inputs(&mut mixer, &args.inputs, output)?;

    if args.local {
        return play_local(mixer, &settings, controls);
    }

    match &args.out {
        Some(out) => render_to_writer(mixer, &settings, controls, out, &args.format),
        None => stream_to_transport(mixer, &settings, controls),
    }
}

fn add_inputs(
    mixer: &mut Mixer,
    inputs: &[PathBuf],
    output: PcmFormat,
) -> Result<Vec<PlayerControl>> {
    let buffer_size = mixer.buffer_size();
    let mut controls = Vec::with_capacity(inputs.len());
    for input in inputs {
        let decoder = SymphoniaDecoder::open(input)
            .with_context(|| format!("failed to open {}", input.display()))?;
        let player = DecoderPlayer::from_decoder(decoder, buffer_size)?;
        let channel = ResampledPlayer::wrap(player, &SincResamplerFactory, output, buffer_size)?;
        controls.push(channel.control());
        mixer.add_channel(channel)?;
    }
    Ok(controls)
}

/// Run the scheduler until every input has finished.
fn mix_until_done(
    mixer: Mixer,
    settings: &MixerSettings,
    controls: &[PlayerControl],
) -> Result<Mixer> {
    let handle = mixer.handle();
    let scheduler = settings.build_scheduler()?.spawn(mixer)?;

    while !scheduler.is_finished() {
        let inputs_done = controls.iter().all(|control| !control.is_playing());
        if inputs_done && handle.status().channels() == 0 {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let mixer = scheduler.join()?;
    info!(
        "mixed {:.2}s of audio from {} input(s)",
        mixer.position_in_seconds(),
        controls.len()
    );
    Ok(mixer)
}

fn stop_sinks(mixer: &mut Mixer) {
    if !mixer.set_running(false) {
        warn!("not every sink stopped cleanly");
    }
}

fn report(counters: &SinkCounters, format: PcmFormat) {
    let stats = counters.snapshot();
    info!(
        "sink: {:.2}s delivered, {} underflows, {} overflows",
        format.seconds_for_samples(stats.position),
        stats.underflows,
        stats.overflows
    );
}

fn render_to_writer(
    mut mixer: Mixer,
    settings: &MixerSettings,
    controls: Vec<PlayerControl>,
    out: &str,
    format: &str,
) -> Result<i32> {
    let layout: PcmOutput = format.parse()?;
    let writer: Box<dyn Write + Send> = if out == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(out).with_context(|| format!("failed to create {}", out))?;
        Box::new(BufWriter::new(file))
    };

    let sink = WriterSink::new(
        format!("pcm writer ({})", out),
        writer,
        mixer.format(),
        layout,
        mixer.buffer_size(),
    );
    let counters = sink.counters();
    mixer.add_sink(sink)?;

    let mut mixer = mix_until_done(mixer, settings, &controls)?;
    stop_sinks(&mut mixer);
    report(&counters, mixer.format());
    Ok(0)
}

/// Stand-in for a network transport: pulls one frame per frame period.
fn stream_to_transport(
    mut mixer: Mixer,
    settings: &MixerSettings,
    controls: Vec<PlayerControl>,
) -> Result<i32> {
    let format = mixer.format();
    let frame_samples = mixdown::sink::frame::frame_samples(format, settings.frame_ms);
    let depth = mixer.buffer_size().div_ceil(frame_samples) * TRANSPORT_DEPTH_TICKS;
    let (sink, receiver) = FrameSink::new("transport", format, settings.frame_ms, depth);
    mixer.add_sink(sink)?;

    let done = Arc::new(AtomicBool::new(false));
    let transport_done = done.clone();
    let transport_receiver = receiver.clone();
    let period = Duration::from_millis(settings.frame_ms.max(1) as u64);
    let transport = thread::Builder::new()
        .name("transport".to_string())
        .spawn(move || {
            let mut frames = 0u64;
            while !transport_done.load(Ordering::Acquire) {
                if transport_receiver.next_frame().is_some() {
                    frames += 1;
                }
                thread::sleep(period);
            }
            while transport_receiver.drain_padded().is_some() {
                frames += 1;
            }
            frames
        })
        .context("failed to start transport thread")?;

    let result = mix_until_done(mixer, settings, &controls).map(|mut mixer| stop_sinks(&mut mixer));
    done.store(true, Ordering::Release);
    let frames = transport
        .join()
        .map_err(|_| anyhow!("transport thread panicked"))?;
    result?;

    info!("transport sent {} frames", frames);
    report(receiver.counters(), format);
    Ok(0)
}

#[cfg(feature = "local-output")]
fn play_local(
    mut mixer: Mixer,
    settings: &MixerSettings,
    controls: Vec<PlayerControl>,
) -> Result<i32> {
    use mixdown::sink::RodioSink;

    let stream = rodio::OutputStreamBuilder::open_default_stream()
        .context("failed to open default output stream")?;
    let device = rodio::Sink::connect_new(stream.mixer());
    let sink = RodioSink::new(
        device,
        mixer.format(),
        mixer.buffer_size(),
        LOCAL_QUEUE_BLOCKS,
    );
    let counters = sink.counters();
    mixer.add_sink(sink)?;

    let mut mixer = mix_until_done(mixer, settings, &controls)?;
    // The idle cycle pauses the device; resume it so the queued blocks play out.
    mixer.set_running(true);
    thread::sleep(Duration::from_secs_f64(
        settings.buffer_seconds * LOCAL_QUEUE_BLOCKS as f64,
    ));
    stop_sinks(&mut mixer);
    report(&counters, mixer.format());
    drop(stream);
    Ok(0)
}

#[cfg(not(feature = "local-output"))]
fn play_local(
    _mixer: Mixer,
    _settings: &MixerSettings,
    _controls: Vec<PlayerControl>,
) -> Result<i32> {
    anyhow::bail!("local playback needs the local-output feature")
}
