//! Input sample formats and conversion to `f32`
//!
//! Integer samples are scaled by the magnitude of their type's minimum, so
//! the full negative range maps onto [-1.0, 1.0). Unsigned 8-bit samples are
//! centred on 128 first.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Element type of an incoming batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Float32,
    Float64,
    Int32,
    Int16,
    Int8,
    Uint8,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::Float32 => "float32",
            SampleFormat::Float64 => "float64",
            SampleFormat::Int32 => "int32",
            SampleFormat::Int16 => "int16",
            SampleFormat::Int8 => "int8",
            SampleFormat::Uint8 => "uint8",
        }
    }

    /// Bytes per sample
    pub fn sample_bytes(self) -> usize {
        match self {
            SampleFormat::Float64 => 8,
            SampleFormat::Float32 | SampleFormat::Int32 => 4,
            SampleFormat::Int16 => 2,
            SampleFormat::Int8 | SampleFormat::Uint8 => 1,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "float32" => Ok(SampleFormat::Float32),
            "float64" => Ok(SampleFormat::Float64),
            "int32" => Ok(SampleFormat::Int32),
            "int16" => Ok(SampleFormat::Int16),
            "int8" => Ok(SampleFormat::Int8),
            "uint8" => Ok(SampleFormat::Uint8),
            other => Err(Error::InvalidSampleData(format!(
                "unsupported sample format '{}'",
                other
            ))),
        }
    }
}

/// One interleaved batch in any supported format
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I16(Vec<i16>),
    I8(Vec<i8>),
    U8(Vec<u8>),
}

impl SampleData {
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleData::F32(_) => SampleFormat::Float32,
            SampleData::F64(_) => SampleFormat::Float64,
            SampleData::I32(_) => SampleFormat::Int32,
            SampleData::I16(_) => SampleFormat::Int16,
            SampleData::I8(_) => SampleFormat::Int8,
            SampleData::U8(_) => SampleFormat::Uint8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
            SampleData::I32(v) => v.len(),
            SampleData::I16(v) => v.len(),
            SampleData::I8(v) => v.len(),
            SampleData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to `f32`; `f32` input is moved through unchanged
    pub fn into_f32(self) -> Vec<f32> {
        match self {
            SampleData::F32(v) => v,
            SampleData::F64(v) => v.into_iter().map(|s| s as f32).collect(),
            SampleData::I32(v) => v.into_iter().map(|s| s as f32 / 2_147_483_648.0).collect(),
            SampleData::I16(v) => v.into_iter().map(|s| f32::from(s) / 32768.0).collect(),
            SampleData::I8(v) => v.into_iter().map(|s| f32::from(s) / 128.0).collect(),
            SampleData::U8(v) => v
                .into_iter()
                .map(|s| (f32::from(s) - 128.0) / 128.0)
                .collect(),
        }
    }

    /// Decode little-endian bytes of the given format
    pub fn from_le_bytes(format: SampleFormat, bytes: &[u8]) -> Result<Self> {
        let width = format.sample_bytes();
        if bytes.len() % width != 0 {
            return Err(Error::InvalidSampleData(format!(
                "{} bytes is not a whole number of {} samples",
                bytes.len(),
                format
            )));
        }

        let chunks = bytes.chunks_exact(width);
        let data = match format {
            SampleFormat::Float32 => SampleData::F32(
                chunks
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            SampleFormat::Float64 => SampleData::F64(
                chunks
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            SampleFormat::Int32 => SampleData::I32(
                chunks
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            SampleFormat::Int16 => {
                SampleData::I16(chunks.map(|c| i16::from_le_bytes([c[0], c[1]])).collect())
            }
            SampleFormat::Int8 => SampleData::I8(chunks.map(|c| c[0] as i8).collect()),
            SampleFormat::Uint8 => SampleData::U8(bytes.to_vec()),
        };
        Ok(data)
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for SampleData {
                fn from(samples: Vec<$ty>) -> Self {
                    SampleData::$variant(samples)
                }
            }
        )*
    };
}

impl_from_vec!(f32 => F32, f64 => F64, i32 => I32, i16 => I16, i8 => I8, u8 => U8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_scaling() {
        assert_eq!(SampleData::from(vec![i16::MIN, 0]).into_f32(), vec![-1.0, 0.0]);
        assert_eq!(SampleData::from(vec![i8::MIN, 64]).into_f32(), vec![-1.0, 0.5]);
        assert_eq!(SampleData::from(vec![0u8, 128, 192]).into_f32(), vec![-1.0, 0.0, 0.5]);
        assert_eq!(SampleData::from(vec![i32::MIN]).into_f32(), vec![-1.0]);

        let max = SampleData::from(vec![i16::MAX]).into_f32()[0];
        assert!(max < 1.0 && max > 0.9999);
    }

    #[test]
    fn test_float_passthrough() {
        assert_eq!(SampleData::from(vec![0.25f32]).into_f32(), vec![0.25]);
        assert_eq!(SampleData::from(vec![-0.5f64]).into_f32(), vec![-0.5]);
    }

    #[test]
    fn test_format_names() {
        for format in [
            SampleFormat::Float32,
            SampleFormat::Float64,
            SampleFormat::Int32,
            SampleFormat::Int16,
            SampleFormat::Int8,
            SampleFormat::Uint8,
        ] {
            assert_eq!(format.name().parse::<SampleFormat>().unwrap(), format);
        }

        assert!(matches!(
            "int24".parse::<SampleFormat>(),
            Err(Error::InvalidSampleData(_))
        ));
    }

    #[test]
    fn test_from_le_bytes() {
        let bytes = [0x00, 0x80, 0x00, 0x40];
        let data = SampleData::from_le_bytes(SampleFormat::Int16, &bytes).unwrap();
        assert_eq!(data, SampleData::I16(vec![i16::MIN, 0x4000]));
        assert_eq!(data.into_f32(), vec![-1.0, 0.5]);

        assert!(SampleData::from_le_bytes(SampleFormat::Float32, &[0; 6]).is_err());
    }
}
