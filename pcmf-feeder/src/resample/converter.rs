//! Streaming sample rate conversion using rubato
//!
//! rubato's fixed-input resamplers consume exactly `input_frames_next()`
//! frames per call. Incoming batches of arbitrary size are accumulated per
//! channel; whole chunks are converted and the remainder carries over to the
//! next batch.

use crate::error::{Error, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frames per conversion chunk
pub const DEFAULT_CHUNK_FRAMES: usize = 1024;

/// Conversion quality selector (indices 0..=4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterType {
    SincBestQuality = 0,
    SincMediumQuality = 1,
    SincFastest = 2,
    ZeroOrderHold = 3,
    Linear = 4,
}

impl ConverterType {
    pub const ALL: [ConverterType; 5] = [
        ConverterType::SincBestQuality,
        ConverterType::SincMediumQuality,
        ConverterType::SincFastest,
        ConverterType::ZeroOrderHold,
        ConverterType::Linear,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Sinc parameters for the sinc presets
    fn sinc_parameters(self) -> Option<SincInterpolationParameters> {
        let (sinc_len, f_cutoff, oversampling_factor, interpolation, window) = match self {
            ConverterType::SincBestQuality => (
                256,
                0.95,
                256,
                SincInterpolationType::Cubic,
                WindowFunction::BlackmanHarris2,
            ),
            ConverterType::SincMediumQuality => (
                128,
                0.925,
                128,
                SincInterpolationType::Linear,
                WindowFunction::Blackman2,
            ),
            ConverterType::SincFastest => (
                64,
                0.915,
                64,
                SincInterpolationType::Linear,
                WindowFunction::Hann2,
            ),
            ConverterType::ZeroOrderHold | ConverterType::Linear => return None,
        };

        Some(SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        })
    }
}

enum Engine {
    Sinc(SincFixedIn<f32>),
    Polynomial(FastFixedIn<f32>),
}

impl Engine {
    fn input_frames_next(&self) -> usize {
        match self {
            Engine::Sinc(r) => r.input_frames_next(),
            Engine::Polynomial(r) => r.input_frames_next(),
        }
    }

    fn process(&mut self, input: &[&[f32]]) -> Result<Vec<Vec<f32>>> {
        let result = match self {
            Engine::Sinc(r) => r.process(input, None),
            Engine::Polynomial(r) => r.process(input, None),
        };
        result.map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))
    }
}

/// Stateful converter for a continuous interleaved stream
pub struct StreamingConverter {
    /// `None` when input and output rates match
    engine: Option<Engine>,
    channels: usize,

    /// Unconverted frames carried between batches, per channel
    pending: Vec<Vec<f32>>,
}

impl std::fmt::Debug for StreamingConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingConverter")
            .field("passthrough", &self.engine.is_none())
            .field("channels", &self.channels)
            .field("pending_frames", &self.pending_frames())
            .finish()
    }
}

impl StreamingConverter {
    pub fn new(
        converter: ConverterType,
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self> {
        let channels = channels.max(1);

        let engine = if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, resampler is pass-through", output_rate);
            None
        } else {
            debug!(
                "Creating {:?} resampler: {}Hz -> {}Hz, {} channels, chunk={} frames",
                converter, input_rate, output_rate, channels, chunk_frames
            );
            Some(Self::create_engine(
                converter,
                output_rate as f64 / input_rate as f64,
                channels,
                chunk_frames.max(1),
            )?)
        };

        Ok(Self {
            engine,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    fn create_engine(
        converter: ConverterType,
        ratio: f64,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Engine> {
        if let Some(params) = converter.sinc_parameters() {
            let resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_frames, channels)
                .map_err(|e| Error::Resample(format!("Failed to create sinc resampler: {}", e)))?;
            return Ok(Engine::Sinc(resampler));
        }

        let degree = match converter {
            ConverterType::ZeroOrderHold => PolynomialDegree::Nearest,
            _ => PolynomialDegree::Linear,
        };
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, degree, chunk_frames, channels)
            .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))?;
        Ok(Engine::Polynomial(resampler))
    }

    pub fn is_passthrough(&self) -> bool {
        self.engine.is_none()
    }

    /// Frames waiting for a full chunk
    pub fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, Vec::len)
    }

    /// Convert an interleaved batch; may return fewer (or zero) frames while
    /// a chunk is still filling
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(self.channels) {
            for (channel, sample) in frame.iter().enumerate() {
                self.pending[channel].push(*sample);
            }
        }

        let mut converted: Vec<Vec<f32>> = vec![Vec::new(); self.channels];
        loop {
            let needed = engine.input_frames_next();
            if self.pending.first().map_or(0, Vec::len) < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|c| &c[..needed]).collect();
            let output = engine.process(&chunk)?;
            for (dest, out) in converted.iter_mut().zip(output) {
                dest.extend_from_slice(&out);
            }
            for channel in self.pending.iter_mut() {
                channel.drain(..needed);
            }
        }

        Ok(interleave(&converted))
    }
}

/// Planar to interleaved
pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };

    let frames = first.len();
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel[frame]);
        }
    }
    interleaved
}
