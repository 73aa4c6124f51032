//! Playback state and rendering
//!
//! [`RenderCore`] combines a sample buffer with the fill-threshold state
//! machine. A [`RenderingAdapter`] places the core in a render context: a
//! realtime processor reached only through messages, or a shared core pulled
//! from a periodic callback.

pub mod adapter;
pub mod callback;
pub mod core;
pub mod realtime;
pub mod state;

pub use adapter::{create_adapter, AdapterEvent, RenderingAdapter};
pub use callback::CallbackAdapter;
pub use self::core::{validate_threshold, RenderCore, RenderStats};
pub use realtime::{RealtimeAdapter, RealtimeProcessor};
pub use state::{next_state, PlaybackState, StateMachine};
