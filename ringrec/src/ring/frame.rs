// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Frame element views for zero-copy ring access.

use crate::{ChromaFormat, PictureRef, RingGeometry, Timecode, TimecodeSource};

/// Zero-copy view of one frame element in a channel ring.
///
/// The lifetime `'a` is tied to the [`crate::RingAccess`] that produced it. The
/// producer may overwrite the slot once it wraps around; callers copy what they need
/// to keep.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    /// Frame number this view was requested for (not reduced modulo the ring).
    pub number: i64,
    element: &'a [u8],
    geometry: &'a RingGeometry,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(number: i64, element: &'a [u8], geometry: &'a RingGeometry) -> Self {
        Self {
            number,
            element,
            geometry,
        }
    }

    /// The whole element payload.
    pub fn payload(&self) -> &'a [u8] {
        self.element
    }

    /// Primary video, planar 4:2:2.
    pub fn primary(&self) -> PictureRef<'a> {
        self.picture(ChromaFormat::Yuv422)
    }

    /// Secondary video, planar 4:2:0.
    pub fn secondary(&self) -> PictureRef<'a> {
        self.picture(ChromaFormat::Yuv420)
    }

    /// The video plane set stored in `format`.
    pub fn picture(&self, format: ChromaFormat) -> PictureRef<'a> {
        let g = self.geometry;
        let (offset, width, height) = match format {
            ChromaFormat::Yuv422 => (0, g.width, g.height),
            ChromaFormat::Yuv420 => (g.sec_video_offset, g.sec_width, g.sec_height),
        };
        let size = format.frame_size(width, height);
        let (cw, ch) = format.chroma_size(width, height);
        let planes = &self.element[offset..offset + size];
        let (y, chroma) = planes.split_at(width * height);
        let (u, v) = chroma.split_at(cw * ch);
        PictureRef {
            format,
            width,
            height,
            y,
            u,
            v,
        }
    }

    /// Audio pair `pair` (0 = channels 1/2, 1 = channels 3/4), 16-bit stereo PCM.
    pub fn audio(&self, pair: usize) -> &'a [u8] {
        let offset = if pair == 0 {
            self.geometry.audio12_offset
        } else {
            self.geometry.audio34_offset
        };
        &self.element[offset..offset + self.geometry.audio_size]
    }

    /// Signal-present flag written by the producer.
    pub fn signal_ok(&self) -> bool {
        self.field(self.geometry.signal_ok_offset) != 0
    }

    /// LTC stored with this frame; null when unreadable.
    pub fn ltc(&self) -> Timecode {
        self.timecode_at(self.geometry.ltc_offset)
    }

    /// VITC stored with this frame; null when unreadable.
    pub fn vitc(&self) -> Timecode {
        self.timecode_at(self.geometry.vitc_offset)
    }

    /// Timecode from the selected source.
    pub fn timecode(&self, source: TimecodeSource) -> Timecode {
        match source {
            TimecodeSource::Ltc => self.ltc(),
            TimecodeSource::Vitc => self.vitc(),
        }
    }

    fn timecode_at(&self, offset: usize) -> Timecode {
        let value = self.field(offset);
        if value < 0 {
            return Timecode::null();
        }
        let rate = self.geometry.frame_rate;
        Timecode::from_frames(
            value as i64,
            rate.nominal_fps(),
            rate.supports_drop_frame(),
        )
    }

    fn field(&self, offset: usize) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.element[offset..offset + 4]);
        i32::from_ne_bytes(bytes)
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("number", &self.number)
            .field("size", &self.element.len())
            .finish()
    }
}
