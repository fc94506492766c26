// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder abstraction.
//!
//! The engine only relies on "encode one picture, get bytes back". Codec backends plug
//! in through [`EncoderFactory`]; the built-in [`RawEncoder`] passes planar pictures
//! through uncompressed.

use serde::{Deserialize, Serialize};

use crate::{ChromaFormat, Error, PictureRef, Result};

/// Which ring picture an encoding consumes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    /// Primary picture, planar 4:2:2.
    #[default]
    Yuv422,
    /// Secondary picture, planar 4:2:0.
    Yuv420,
    /// Audio only.
    None,
}

impl VideoFormat {
    pub fn chroma_format(&self) -> Option<ChromaFormat> {
        match self {
            VideoFormat::Yuv422 => Some(ChromaFormat::Yuv422),
            VideoFormat::Yuv420 => Some(ChromaFormat::Yuv420),
            VideoFormat::None => None,
        }
    }
}

/// Encodes pictures of one track.
///
/// Implementations are owned by a single worker thread.
pub trait Encoder: Send {
    /// Encodes `picture`, returning bytes valid until the next call.
    fn encode(&mut self, picture: &PictureRef<'_>) -> Result<&[u8]>;

    /// File extension of the encoded video track, without the dot.
    fn extension(&self) -> &str;
}

/// Creates encoders by codec name.
pub trait EncoderFactory: Send + Sync {
    /// Creates an encoder for `codec` taking `width` x `height` pictures in `format`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown codec.
    fn create(
        &self,
        codec: &str,
        format: ChromaFormat,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn Encoder>>;
}

/// Codec name of [`RawEncoder`].
pub const RAW_CODEC: &str = "raw";

/// Uncompressed pass-through: Y, U and V planes back to back.
pub struct RawEncoder {
    format: ChromaFormat,
    width: usize,
    height: usize,
    buffer: Vec<u8>,
}

impl RawEncoder {
    pub fn new(format: ChromaFormat, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            buffer: Vec::with_capacity(format.frame_size(width, height)),
        }
    }
}

impl Encoder for RawEncoder {
    fn encode(&mut self, picture: &PictureRef<'_>) -> Result<&[u8]> {
        if picture.format != self.format || picture.width != self.width || picture.height != self.height {
            return Err(Error::Encode(format!(
                "expected {}x{} {:?}, got {}x{} {:?}",
                self.width, self.height, self.format, picture.width, picture.height, picture.format
            )));
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(picture.y);
        self.buffer.extend_from_slice(picture.u);
        self.buffer.extend_from_slice(picture.v);
        Ok(&self.buffer)
    }

    fn extension(&self) -> &str {
        "yuv"
    }
}

/// Factory knowing only [`RAW_CODEC`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RawEncoderFactory;

impl EncoderFactory for RawEncoderFactory {
    fn create(
        &self,
        codec: &str,
        format: ChromaFormat,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn Encoder>> {
        if codec != RAW_CODEC {
            return Err(Error::Config(format!("Unknown codec \"{codec}\"")));
        }
        Ok(Box::new(RawEncoder::new(format, width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoder_concatenates_planes() {
        let data: Vec<u8> = (0..48).collect();
        let picture = PictureRef::from_bytes(ChromaFormat::Yuv420, 8, 4, &data).unwrap();
        let mut encoder = RawEncoderFactory
            .create(RAW_CODEC, ChromaFormat::Yuv420, 8, 4)
            .unwrap();
        assert_eq!(encoder.encode(&picture).unwrap(), &data[..]);
        assert_eq!(encoder.extension(), "yuv");
    }

    #[test]
    fn raw_encoder_rejects_other_geometry() {
        let data = vec![0u8; 64];
        let picture = PictureRef::from_bytes(ChromaFormat::Yuv422, 8, 4, &data).unwrap();
        let mut encoder = RawEncoder::new(ChromaFormat::Yuv420, 8, 4);
        assert!(matches!(encoder.encode(&picture), Err(Error::Encode(_))));
        assert!(RawEncoderFactory.create("dv", ChromaFormat::Yuv422, 8, 4).is_err());
    }
}
