//! Band-limited resampling backed by rubato.

use log::debug;
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use super::{remap_frame, Resampler, ResamplerFactory};
use crate::audio::format::PcmFormat;
use crate::audio::ring_buffer::RingBuffer;
use crate::error::ResampleError;

const MIN_CHUNK_FRAMES: usize = 64;
const MAX_CHUNK_FRAMES: usize = 1024;
const MAX_FLUSH_PASSES: usize = 8;

/// Resampler with per-channel sinc interpolation.
///
/// Channel layout is converted first, then the rate. When the rates match
/// the sinc stage is skipped entirely.
pub struct SincResampler {
    input: PcmFormat,
    output: PcmFormat,
    ratio: f64,
    engine: Option<SincFixedIn<f32>>,
    staged: Vec<Vec<f32>>,
    partial: Vec<f32>,
    remapped: Vec<f32>,
    pending: Vec<f32>,
    skip_frames: usize,
    frames_in: u64,
    frames_out: u64,
    limit: Option<u64>,
    closed: bool,
}

impl SincResampler {
    /// Build a resampler for `input` → `output`.
    ///
    /// # Arguments
    /// - `chunk_frames`: Frames per sinc pass. Larger chunks add latency.
    pub fn new(
        input: PcmFormat,
        output: PcmFormat,
        chunk_frames: usize,
    ) -> Result<Self, ResampleError> {
        input.validate()?;
        output.validate()?;

        let out_channels = output.channels as usize;
        let ratio = output.sample_rate as f64 / input.sample_rate as f64;
        let engine = if input.sample_rate == output.sample_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            };
            let chunk = chunk_frames.clamp(MIN_CHUNK_FRAMES, MAX_CHUNK_FRAMES);
            let engine = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, out_channels)
                .map_err(|err| ResampleError::Construction(err.to_string()))?;
            Some(engine)
        };
        let skip_frames = engine.as_ref().map(|e| e.output_delay()).unwrap_or(0);

        Ok(Self {
            input,
            output,
            ratio,
            engine,
            staged: vec![Vec::new(); out_channels],
            partial: Vec::new(),
            remapped: vec![0.0; out_channels],
            pending: Vec::new(),
            skip_frames,
            frames_in: 0,
            frames_out: 0,
            limit: None,
            closed: false,
        })
    }

    fn ingest(&mut self, input: &[f32]) {
        let in_channels = self.input.channels as usize;
        self.partial.extend_from_slice(input);
        let whole = self.partial.len() - self.partial.len() % in_channels;

        for frame in self.partial[..whole].chunks_exact(in_channels) {
            remap_frame(frame, &mut self.remapped);
            if self.engine.is_some() {
                for (lane, sample) in self.staged.iter_mut().zip(&self.remapped) {
                    lane.push(*sample);
                }
            } else {
                self.pending.extend_from_slice(&self.remapped);
                self.frames_out += 1;
            }
            self.frames_in += 1;
        }
        self.partial.drain(..whole);
    }

    fn run_full_chunks(&mut self) -> Result<(), ResampleError> {
        loop {
            let Some(engine) = self.engine.as_mut() else {
                return Ok(());
            };
            let needed = engine.input_frames_next();
            if self.staged[0].len() < needed {
                return Ok(());
            }

            let chunk: Vec<&[f32]> = self.staged.iter().map(|lane| &lane[..needed]).collect();
            let produced = engine
                .process(&chunk, None)
                .map_err(|err| ResampleError::Process(err.to_string()))?;
            for lane in self.staged.iter_mut() {
                lane.drain(..needed);
            }
            self.emit(&produced);
        }
    }

    fn emit(&mut self, produced: &[Vec<f32>]) {
        let frames = produced.first().map(|lane| lane.len()).unwrap_or(0);
        for frame in 0..frames {
            if self.skip_frames > 0 {
                self.skip_frames -= 1;
                continue;
            }
            if let Some(limit) = self.limit {
                if self.frames_out >= limit {
                    break;
                }
            }
            for lane in produced {
                self.pending.push(lane[frame]);
            }
            self.frames_out += 1;
        }
    }

    fn drain_pending(&mut self, out: &mut RingBuffer) -> Result<usize, ResampleError> {
        let count = self.pending.len().min(out.available_input());
        if count == 0 {
            return Ok(0);
        }
        out.write(&self.pending[..count])?;
        self.pending.drain(..count);
        Ok(count)
    }
}

impl Resampler for SincResampler {
    fn input_format(&self) -> PcmFormat {
        self.input
    }

    fn output_format(&self) -> PcmFormat {
        self.output
    }

    fn resample(&mut self, input: &[f32], out: &mut RingBuffer) -> Result<usize, ResampleError> {
        if self.closed {
            return Err(ResampleError::Closed);
        }
        self.ingest(input);
        self.run_full_chunks()?;
        self.drain_pending(out)
    }

    fn flush(&mut self, out: &mut RingBuffer) -> Result<usize, ResampleError> {
        if self.closed {
            return Err(ResampleError::Closed);
        }

        if self.limit.is_none() {
            let limit = (self.frames_in as f64 * self.ratio).ceil() as u64;
            self.limit = Some(limit);

            if let Some(engine) = self.engine.as_mut() {
                let mut tails = Vec::new();
                if !self.staged[0].is_empty() {
                    let rest: Vec<&[f32]> = self.staged.iter().map(|lane| lane.as_slice()).collect();
                    tails.push(
                        engine
                            .process_partial(Some(rest.as_slice()), None)
                            .map_err(|err| ResampleError::Process(err.to_string()))?,
                    );
                }
                for lane in self.staged.iter_mut() {
                    lane.clear();
                }
                for tail in tails {
                    self.emit(&tail);
                }

                let mut passes = 0;
                while self.frames_out < limit && passes < MAX_FLUSH_PASSES {
                    let Some(engine) = self.engine.as_mut() else {
                        break;
                    };
                    let tail = engine
                        .process_partial::<Vec<f32>>(None, None)
                        .map_err(|err| ResampleError::Process(err.to_string()))?;
                    self.emit(&tail);
                    passes += 1;
                }
            }

            debug!(
                "resampler flushed: {} frames in, {} frames out, {} samples pending",
                self.frames_in,
                self.frames_out,
                self.pending.len()
            );
        }

        self.drain_pending(out)
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn close(&mut self) {
        self.closed = true;
        self.engine = None;
        self.pending.clear();
        for lane in self.staged.iter_mut() {
            lane.clear();
        }
    }
}

/// Factory producing [`SincResampler`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SincResamplerFactory;

impl ResamplerFactory for SincResamplerFactory {
    fn create(
        &self,
        input: PcmFormat,
        output: PcmFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn Resampler>, ResampleError> {
        let chunk_frames = buffer_size / output.channels.max(1) as usize;
        Ok(Box::new(SincResampler::new(input, output, chunk_frames)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::SampleEncoding;

    #[test]
    fn matching_rates_only_remap_channels() {
        let mut resampler =
            SincResampler::new(PcmFormat::float(48_000, 1), PcmFormat::float(48_000, 2), 256)
                .expect("resampler");
        let mut out = RingBuffer::new(16);
        assert_eq!(resampler.resample(&[0.1, 0.2], &mut out).expect("resample"), 4);

        let mut samples = [0.0; 4];
        out.read(&mut samples);
        assert_eq!(samples, [0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn overflowing_output_is_kept_pending() {
        let mut resampler =
            SincResampler::new(PcmFormat::float(8_000, 1), PcmFormat::float(8_000, 1), 64)
                .expect("resampler");
        let mut out = RingBuffer::new(4);
        let written = resampler
            .resample(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &mut out)
            .expect("resample");
        assert_eq!(written, 4);
        assert_eq!(resampler.pending(), 2);

        out.clear();
        assert_eq!(resampler.resample(&[], &mut out).expect("drain"), 2);
        assert_eq!(resampler.pending(), 0);
    }

    #[test]
    fn rate_conversion_length_matches_ratio_after_flush() {
        let input = PcmFormat::float(44_100, 2);
        let output = PcmFormat::float(48_000, 2);
        let mut resampler = SincResampler::new(input, output, 512).expect("resampler");

        let frames = 10_000;
        let signal: Vec<f32> = (0..frames * 2)
            .map(|i| ((i / 2) as f32 * 0.01).sin() * 0.5)
            .collect();

        let mut out = RingBuffer::new(64 * 1024);
        let mut produced = 0;
        for block in signal.chunks(882) {
            produced += resampler.resample(block, &mut out).expect("resample");
        }
        produced += resampler.flush(&mut out).expect("flush");

        let expected = (frames as f64 * 48_000.0 / 44_100.0).ceil() as usize * 2;
        assert!(
            produced.abs_diff(expected) <= 4,
            "produced {} expected {}",
            produced,
            expected
        );
        assert_eq!(resampler.flush(&mut out).expect("second flush"), 0);
    }

    #[test]
    fn raw_input_is_converted_before_resampling() {
        let input = PcmFormat::new(8_000, 1, SampleEncoding::S16Le);
        let mut resampler =
            SincResampler::new(input, PcmFormat::float(8_000, 1), 64).expect("resampler");
        let mut out = RingBuffer::new(4);
        let bytes: Vec<u8> = [16_384i16, -16_384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(resampler.resample_raw(&bytes, &mut out).expect("raw"), 2);
        let mut samples = [0.0; 2];
        out.read(&mut samples);
        assert_eq!(samples, [0.5, -0.5]);
    }

    #[test]
    fn zero_channel_formats_are_rejected() {
        let result =
            SincResampler::new(PcmFormat::float(48_000, 0), PcmFormat::float(48_000, 2), 256);
        assert!(matches!(result, Err(ResampleError::Format(_))));

        let result =
            SincResampler::new(PcmFormat::float(48_000, 2), PcmFormat::float(44_100, 0), 256);
        assert!(matches!(result, Err(ResampleError::Format(_))));
    }

    #[test]
    fn closed_resampler_refuses_work() {
        let mut resampler =
            SincResampler::new(PcmFormat::float(48_000, 2), PcmFormat::float(48_000, 2), 256)
                .expect("resampler");
        resampler.close();
        let mut out = RingBuffer::new(4);
        assert!(matches!(
            resampler.resample(&[0.0, 0.0], &mut out),
            Err(ResampleError::Closed)
        ));
    }
}
