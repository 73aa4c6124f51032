//! Audio input conversion and output sinks

pub mod convert;
pub mod output;
pub mod sink;

pub use convert::{SampleData, SampleFormat};
pub use output::CpalSink;
pub use sink::{AudioSink, OfflineSink, RenderSource, SourceSlot};
