// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Planar YUV picture views.
//!
//! Ring frames store video as contiguous planar 8-bit YUV: the Y plane followed by the
//! U and V planes. [`PictureRef`] borrows such a layout (typically straight out of the
//! shared ring), [`Picture`] owns one.

use serde::{Deserialize, Serialize};

/// Black luma level.
pub const BLACK_LUMA: u8 = 0x10;

/// Neutral chroma level.
pub const NEUTRAL_CHROMA: u8 = 0x80;

/// Chroma subsampling of a planar picture.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChromaFormat {
    /// Half-width chroma, full height.
    Yuv422,
    /// Half-width, half-height chroma.
    Yuv420,
}

impl ChromaFormat {
    /// Chroma plane dimensions for a `width` x `height` picture.
    pub fn chroma_size(&self, width: usize, height: usize) -> (usize, usize) {
        match self {
            ChromaFormat::Yuv422 => (width / 2, height),
            ChromaFormat::Yuv420 => (width / 2, height / 2),
        }
    }

    /// Total byte size of a picture.
    pub fn frame_size(&self, width: usize, height: usize) -> usize {
        let (cw, ch) = self.chroma_size(width, height);
        width * height + 2 * cw * ch
    }
}

/// Borrowed planar picture.
#[derive(Clone, Copy, Debug)]
pub struct PictureRef<'a> {
    pub format: ChromaFormat,
    pub width: usize,
    pub height: usize,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
}

impl<'a> PictureRef<'a> {
    /// Splits a contiguous Y/U/V buffer into planes.
    ///
    /// Returns `None` if `data` is shorter than the picture.
    pub fn from_bytes(
        format: ChromaFormat,
        width: usize,
        height: usize,
        data: &'a [u8],
    ) -> Option<Self> {
        let (cw, ch) = format.chroma_size(width, height);
        let luma = width * height;
        let chroma = cw * ch;
        if data.len() < luma + 2 * chroma {
            return None;
        }
        let (y, rest) = data.split_at(luma);
        let (u, rest) = rest.split_at(chroma);
        Some(Self {
            format,
            width,
            height,
            y,
            u,
            v: &rest[..chroma],
        })
    }

    /// Chroma plane dimensions.
    pub fn chroma_size(&self) -> (usize, usize) {
        self.format.chroma_size(self.width, self.height)
    }

    /// Converts to planar 4:2:0, averaging vertically adjacent chroma rows.
    ///
    /// A 4:2:0 picture is copied unchanged.
    pub fn to_yuv420(&self) -> Picture {
        if self.format == ChromaFormat::Yuv420 {
            return self.to_owned();
        }
        let mut picture = Picture::black(ChromaFormat::Yuv420, self.width, self.height);
        let (cw, ch) = ChromaFormat::Yuv420.chroma_size(self.width, self.height);
        let source_rows = self.chroma_size().1;
        let (y, u, v) = picture.planes_mut();
        y.copy_from_slice(self.y);
        for (dst, src) in [(u, self.u), (v, self.v)] {
            for row in 0..ch {
                let above = &src[2 * row * cw..][..cw];
                let below = &src[(2 * row + 1).min(source_rows - 1) * cw..][..cw];
                for (out, (a, b)) in dst[row * cw..][..cw].iter_mut().zip(above.iter().zip(below)) {
                    *out = ((*a as u16 + *b as u16 + 1) / 2) as u8;
                }
            }
        }
        picture
    }

    /// Copies the planes into an owned picture.
    pub fn to_owned(&self) -> Picture {
        let mut data = Vec::with_capacity(self.format.frame_size(self.width, self.height));
        data.extend_from_slice(self.y);
        data.extend_from_slice(self.u);
        data.extend_from_slice(self.v);
        Picture {
            format: self.format,
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Owned planar picture with contiguous Y/U/V storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    format: ChromaFormat,
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Picture {
    /// Creates a black picture (black luma, neutral chroma).
    pub fn black(format: ChromaFormat, width: usize, height: usize) -> Self {
        let luma = width * height;
        let mut data = vec![NEUTRAL_CHROMA; format.frame_size(width, height)];
        data[..luma].fill(BLACK_LUMA);
        Self {
            format,
            width,
            height,
            data,
        }
    }

    pub fn format(&self) -> ChromaFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Contiguous Y/U/V bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Borrows the picture as planes.
    pub fn as_ref(&self) -> PictureRef<'_> {
        let (cw, ch) = self.format.chroma_size(self.width, self.height);
        let luma = self.width * self.height;
        let chroma = cw * ch;
        PictureRef {
            format: self.format,
            width: self.width,
            height: self.height,
            y: &self.data[..luma],
            u: &self.data[luma..luma + chroma],
            v: &self.data[luma + chroma..luma + 2 * chroma],
        }
    }

    /// Mutable Y, U and V planes.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let (cw, ch) = self.format.chroma_size(self.width, self.height);
        let luma = self.width * self.height;
        let chroma = cw * ch;
        let (y, rest) = self.data.split_at_mut(luma);
        let (u, rest) = rest.split_at_mut(chroma);
        (y, u, &mut rest[..chroma])
    }
}
