//! Message vocabulary between the controller and the render processor
//!
//! Commands flow controller → processor ([`ControlMessage`]); responses flow
//! back ([`ProcessorEvent`]). Commands without a port endpoint also have a JSON
//! wire form ([`WireCommand`]) for producers outside the process.

use super::ProcessorPort;
use crate::buffer::BufferKind;
use crate::error::{Error, Result};
use crate::playback::PlaybackState;
use serde::{Deserialize, Serialize};

/// Commands accepted by the render processor
#[derive(Debug)]
pub enum ControlMessage {
    /// Build the render core (must be the first command, exactly once)
    Init {
        buffer_length: usize,
        channel_count: usize,
        threshold: usize,
        buffer_kind: BufferKind,
    },

    /// Interleaved samples to append
    Feed { data: Vec<f32> },

    /// New threshold in frames
    SetThreshold { value: i64 },

    /// Hand over the processor end of a direct producer → processor channel
    Connect { endpoint: ProcessorPort },

    /// Ask for a `BufferFillUpdate`
    GetBufferFill { request_id: Option<u64> },

    ClearBuffer,
}

impl ControlMessage {
    /// Command name as used on the wire
    pub fn command_name(&self) -> &'static str {
        match self {
            ControlMessage::Init { .. } => "init",
            ControlMessage::Feed { .. } => "feed",
            ControlMessage::SetThreshold { .. } => "set_threshold",
            ControlMessage::Connect { .. } => "connect",
            ControlMessage::GetBufferFill { .. } => "get_buffer_fill",
            ControlMessage::ClearBuffer => "clear_buffer",
        }
    }

    /// Wire form, if this command has one (`Connect` carries a live endpoint)
    pub fn to_wire(&self) -> Option<WireCommand> {
        let wire = match self {
            ControlMessage::Init {
                buffer_length,
                channel_count,
                threshold,
                buffer_kind,
            } => WireCommand::Init {
                buffer_length: *buffer_length,
                channel_count: *channel_count,
                threshold: *threshold,
                buffer_kind: *buffer_kind,
            },
            ControlMessage::Feed { data } => WireCommand::Feed { data: data.clone() },
            ControlMessage::SetThreshold { value } => WireCommand::SetThreshold { value: *value },
            ControlMessage::Connect { .. } => return None,
            ControlMessage::GetBufferFill { request_id } => WireCommand::GetBufferFill {
                request_id: *request_id,
            },
            ControlMessage::ClearBuffer => WireCommand::ClearBuffer,
        };
        Some(wire)
    }
}

/// Responses from the render processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessorEvent {
    /// Ring buffer reallocated
    BufferLengthChanged { new_length: usize },

    /// Playback state transition
    StateChanged { state: PlaybackState },

    /// Answer to `GetBufferFill`
    BufferFillUpdate {
        fill: usize,
        request_id: Option<u64>,
    },

    /// A channel was shut down after a protocol violation
    ProtocolError {
        channel: ProtocolChannel,
        reason: String,
    },
}

/// Which processor channel a protocol error closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolChannel {
    /// Controller commands; once closed, queries posted on it never complete
    Control,
    /// Producer feed channel; the control channel stays usable
    Direct,
}

/// Serializable command form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WireCommand {
    Init {
        buffer_length: usize,
        channel_count: usize,
        threshold: usize,
        buffer_kind: BufferKind,
    },
    Feed {
        data: Vec<f32>,
    },
    SetThreshold {
        value: i64,
    },
    GetBufferFill {
        #[serde(default)]
        request_id: Option<u64>,
    },
    ClearBuffer,
}

impl WireCommand {
    /// Decode a JSON command; unknown command names are protocol errors
    pub fn decode(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Protocol(format!("bad command: {}", e)))
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Protocol(format!("encode failed: {}", e)))
    }
}

impl From<WireCommand> for ControlMessage {
    fn from(wire: WireCommand) -> Self {
        match wire {
            WireCommand::Init {
                buffer_length,
                channel_count,
                threshold,
                buffer_kind,
            } => ControlMessage::Init {
                buffer_length,
                channel_count,
                threshold,
                buffer_kind,
            },
            WireCommand::Feed { data } => ControlMessage::Feed { data },
            WireCommand::SetThreshold { value } => ControlMessage::SetThreshold { value },
            WireCommand::GetBufferFill { request_id } => {
                ControlMessage::GetBufferFill { request_id }
            }
            WireCommand::ClearBuffer => ControlMessage::ClearBuffer,
        }
    }
}
