//! Error types for pcmf-feeder
//!
//! Running out of buffered audio is the `Starved` playback state, not an
//! error.

use thiserror::Error;

/// Main error type for pcmf-feeder
#[derive(Error, Debug)]
pub enum Error {
    /// Construction-time configuration out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sample data of an unknown format or not a whole number of frames
    #[error("Invalid sample data: {0}")]
    InvalidSampleData(String),

    /// Fatal violation of the cross-context message protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Threshold outside [0, capacity]
    #[error("Invalid threshold {value}: must be within [0, {capacity}]")]
    InvalidThreshold { value: i64, capacity: usize },

    /// Peer endpoint of a message channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A buffer fill query is already outstanding
    #[error("Buffer fill query {0} is still pending")]
    FillQueryPending(u64),

    /// Sample rate conversion errors
    #[error("Resample error: {0}")]
    Resample(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Operation needs a connected sink
    #[error("Not connected to an audio sink")]
    NotConnected,

    /// A sink is already attached
    #[error("Already connected to an audio sink")]
    AlreadyConnected,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Feeder section did not match the settings schema
    #[error("Configuration error: {0}")]
    Settings(#[from] toml::de::Error),
}

/// Convenience Result type using pcmf-feeder Error
pub type Result<T> = std::result::Result<T, Error>;
