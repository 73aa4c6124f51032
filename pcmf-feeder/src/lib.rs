//! # PCM Feeder (pcmf-feeder)
//!
//! Streams raw PCM batches from a producer into an audio sink through an
//! intermediate sample buffer, with optional sample rate conversion and
//! fill-threshold playback control.
//!
//! **Pipeline:** producer → [`resample`] stage → [`playback`] adapter
//! (buffer + state machine) → [`audio`] sink
//!
//! **Backends:** a realtime render processor reached only through message
//! [`channel`]s, or a shared render core pulled from a periodic callback.

pub mod audio;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod feeder;
pub mod playback;
pub mod resample;

pub use audio::{AudioSink, CpalSink, OfflineSink, SampleData, SampleFormat};
pub use buffer::{BufferKind, SampleBuffer};
pub use config::{FeederConfig, FeederSettings, RenderBackend, ResamplerMode};
pub use error::{Error, Result};
pub use feeder::{FeederHooks, FeederNode, FeederStatus, NoHooks, NodeState};
pub use playback::PlaybackState;
pub use resample::ConverterType;
