// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Quad-split compositing.
//!
//! Up to four channels' primary pictures are quartered and tiled into one picture of the
//! same size: channel 0 top-left, 1 top-right, 2 bottom-left, 3 bottom-right. A quadrant
//! with no source keeps its previous contents, which start out as neutral black.

use serde::{Deserialize, Serialize};

use crate::{ChromaFormat, Error, Picture, PictureRef, Result};

/// Number of quadrants.
pub const QUAD_SOURCES: usize = 4;

/// Downscale filtering.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct QuadFilter {
    /// `[1, 2, 1] / 4` filter before dropping every other column.
    pub horizontal: bool,
    /// Average the two source rows that make up an output row.
    pub vertical: bool,
    /// Keep fields apart: output row pairs are built from rows of the same field.
    pub interlaced: bool,
}

impl Default for QuadFilter {
    fn default() -> Self {
        Self {
            horizontal: true,
            vertical: true,
            interlaced: true,
        }
    }
}

/// Builds quad-split pictures in a reusable buffer.
pub struct QuadCompositor {
    picture: Picture,
    filter: QuadFilter,
}

impl QuadCompositor {
    /// Creates a compositor producing `width` x `height` planar 4:2:2 pictures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] unless both dimensions are non-zero multiples
    /// of 4.
    pub fn new(width: usize, height: usize, filter: QuadFilter) -> Result<Self> {
        if width == 0 || height == 0 || width % 4 != 0 || height % 4 != 0 {
            return Err(Error::InvalidGeometry(format!(
                "quad picture {width}x{height} must be a multiple of 4 in both directions"
            )));
        }
        Ok(Self {
            picture: Picture::black(ChromaFormat::Yuv422, width, height),
            filter,
        })
    }

    /// The composite built so far.
    pub fn picture(&self) -> &Picture {
        &self.picture
    }

    /// Resets every quadrant to neutral black.
    pub fn clear(&mut self) {
        self.picture = Picture::black(
            ChromaFormat::Yuv422,
            self.picture.width(),
            self.picture.height(),
        );
    }

    /// Quarters `source` into `quadrant`.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelOutOfRange`] for a quadrant beyond 3
    /// - [`Error::InvalidGeometry`] if `source` is not a 4:2:2 picture of the composite's size
    pub fn place(&mut self, quadrant: usize, source: &PictureRef<'_>) -> Result<()> {
        if quadrant >= QUAD_SOURCES {
            return Err(Error::ChannelOutOfRange(quadrant));
        }
        let (width, height) = (self.picture.width(), self.picture.height());
        if source.format != ChromaFormat::Yuv422 || source.width != width || source.height != height {
            return Err(Error::InvalidGeometry(format!(
                "quad source {}x{} {:?} does not match {width}x{height} Yuv422",
                source.width, source.height, source.format
            )));
        }
        let (chroma_width, chroma_height) = source.chroma_size();
        let (column, row) = (quadrant % 2, quadrant / 2);
        let filter = self.filter;
        let (y, u, v) = self.picture.planes_mut();
        quarter_plane(
            source.y,
            (width, height),
            y,
            (column * width / 2, row * height / 2),
            &filter,
        );
        for (src, dst) in [(source.u, u), (source.v, v)] {
            quarter_plane(
                src,
                (chroma_width, chroma_height),
                dst,
                (column * chroma_width / 2, row * chroma_height / 2),
                &filter,
            );
        }
        Ok(())
    }
}

/// Writes a half-width, half-height copy of `src` into `dst` at `origin`.
///
/// `dst` is a plane of the same stride as `src`.
fn quarter_plane(
    src: &[u8],
    (width, height): (usize, usize),
    dst: &mut [u8],
    (origin_x, origin_y): (usize, usize),
    filter: &QuadFilter,
) {
    let sample = |row: usize, x: usize| -> u16 {
        let line = &src[row * width..(row + 1) * width];
        let centre = 2 * x;
        if filter.horizontal {
            let left = line[centre.saturating_sub(1)] as u16;
            let right = line[(centre + 1).min(width - 1)] as u16;
            (left + 2 * line[centre] as u16 + right + 2) / 4
        } else {
            line[centre] as u16
        }
    };
    for out_y in 0..height / 2 {
        let first = if filter.interlaced {
            4 * (out_y / 2) + out_y % 2
        } else {
            2 * out_y
        };
        let step = if filter.interlaced { 2 } else { 1 };
        let second = (first + step).min(height - 1);
        let line = &mut dst[(origin_y + out_y) * width + origin_x..][..width / 2];
        for (out_x, value) in line.iter_mut().enumerate() {
            *value = if filter.vertical {
                ((sample(first, out_x) + sample(second, out_x) + 1) / 2) as u8
            } else {
                sample(first, out_x) as u8
            };
        }
    }
}
