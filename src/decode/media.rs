//! Container and codec decoding through Symphonia.

use std::io::ErrorKind;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat;

use crate::audio::format::{PcmFormat, SampleEncoding};
use crate::decode::FrameDecoder;
use crate::error::DecodeError;

/// Decoder for any container/codec pair Symphonia can probe.
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: PcmFormat,
    sample_buf: Option<SampleBuffer<f32>>,
    finished: bool,
    label: String,
}

impl SymphoniaDecoder {
    /// Open a media file, hinting the probe with its extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let extension = path.extension().and_then(|ext| ext.to_str());
        let mut decoder = Self::from_source(Box::new(file), extension)?;
        decoder.label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(decoder)
    }

    /// Probe an arbitrary media source.
    ///
    /// # Arguments
    /// - `source`: Stream to decode.
    /// - `extension`: Optional file extension used as a probe hint.
    pub fn from_source(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|err| DecodeError::Unsupported(err.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let format = native_format(&track.codec_params)?;

        let dec_opts: DecoderOptions = Default::default();
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|err| DecodeError::DecoderCreation(err.to_string()))?;

        debug!("opened media track {} as {}", track_id, format);

        Ok(Self {
            reader,
            decoder,
            track_id,
            format,
            sample_buf: None,
            finished: false,
            label: extension.unwrap_or("media").to_string(),
        })
    }
}

impl FrameDecoder for SymphoniaDecoder {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn next_frame(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => return Err(DecodeError::DecodeFailed(err.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity();
                    let buf = reusable_buffer(&mut self.sample_buf, spec, capacity);
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(buf.samples().to_vec()));
                }
                Err(Error::DecodeError(err)) => {
                    warn!("{}: decode error: {}", self.label, err);
                }
                Err(err) => return Err(DecodeError::DecodeFailed(err.to_string())),
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.label, self.format)
    }
}

fn reusable_buffer(
    slot: &mut Option<SampleBuffer<f32>>,
    spec: SignalSpec,
    capacity: usize,
) -> &mut SampleBuffer<f32> {
    let fits = slot
        .as_ref()
        .map(|buf| buf.capacity() >= capacity * spec.channels.count())
        .unwrap_or(false);
    if !fits {
        *slot = None;
    }
    slot.get_or_insert_with(|| SampleBuffer::<f32>::new(capacity as u64, spec))
}

fn native_format(params: &CodecParameters) -> Result<PcmFormat, DecodeError> {
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".to_string()))?;
    let channels = params
        .channels
        .map(|channels| channels.count() as u16)
        .ok_or_else(|| DecodeError::Unsupported("unknown channel layout".to_string()))?;

    let encoding = match (params.sample_format, params.bits_per_sample) {
        (Some(SampleFormat::F32), _) | (Some(SampleFormat::F64), _) => SampleEncoding::F32Le,
        (Some(SampleFormat::U8), _) | (_, Some(8)) => SampleEncoding::U8,
        (_, Some(16)) => SampleEncoding::S16Le,
        (_, Some(24)) => SampleEncoding::S24Le,
        (_, Some(32)) => SampleEncoding::S32Le,
        _ => SampleEncoding::F32Le,
    };

    let format = PcmFormat::new(sample_rate, channels, encoding);
    format.validate()?;
    Ok(format)
}
