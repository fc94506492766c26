// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Shared ring buffer access.
//!
//! This module defines types for working with the capture producer's per-channel frame
//! rings:
//! - The read side ([`reader`]) used by the recorder: [`RingAccess`] and [`ChannelRing`]
//! - The write side ([`producer`], [`write_access`]) used by the capture simulator and tests
//! - Zero-copy frame views ([`frame`])
//! - The validated frame geometry ([`RingGeometry`])
//!
//! The rings own no buffering of their own; every read goes to the producer's latest
//! state. Frame numbers grow without bound and are reduced modulo the ring length on
//! every access.

pub mod frame;
pub mod producer;
pub mod reader;
mod region;
pub mod write_access;

use serde::{Deserialize, Serialize};

use ringrec_sys::{ControlBlock, FRAME_FIELD_SIZE, LAYOUT_VERSION, MAX_CHANNELS};

use crate::{ChromaFormat, Error, FrameRate, Result};

/// Smallest ring the recorder accepts.
pub const MIN_RING_LEN: usize = 8;

/// Bytes per stereo 16-bit audio sample frame.
pub const AUDIO_BYTES_PER_SAMPLE: usize = 4;

/// Which embedded timecode field of a frame is authoritative.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimecodeSource {
    #[default]
    Ltc,
    Vitc,
}

/// Frame geometry published by the producer and validated at attach time.
///
/// Offsets are byte offsets inside one frame element. Primary video (planar 4:2:2)
/// always starts at offset 0.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingGeometry {
    pub channels: usize,
    pub ring_len: usize,
    pub element_size: usize,
    pub frame_rate: FrameRate,
    pub width: usize,
    pub height: usize,
    pub sec_width: usize,
    pub sec_height: usize,
    pub sec_video_offset: usize,
    pub audio12_offset: usize,
    pub audio34_offset: usize,
    pub audio_size: usize,
    pub signal_ok_offset: usize,
    pub ltc_offset: usize,
    pub vitc_offset: usize,
}

impl RingGeometry {
    /// Lays out all fields back to back.
    ///
    /// `audio_samples_per_frame` sizes each audio pair block (16-bit stereo).
    pub fn packed(
        channels: usize,
        ring_len: usize,
        frame_rate: FrameRate,
        (width, height): (usize, usize),
        (sec_width, sec_height): (usize, usize),
        audio_samples_per_frame: usize,
    ) -> Self {
        let sec_video_offset = ChromaFormat::Yuv422.frame_size(width, height);
        let audio12_offset = sec_video_offset + ChromaFormat::Yuv420.frame_size(sec_width, sec_height);
        let audio_size = audio_samples_per_frame * AUDIO_BYTES_PER_SAMPLE;
        let audio34_offset = audio12_offset + audio_size;
        let signal_ok_offset = audio34_offset + audio_size;
        let ltc_offset = signal_ok_offset + FRAME_FIELD_SIZE;
        let vitc_offset = ltc_offset + FRAME_FIELD_SIZE;
        Self {
            channels,
            ring_len,
            element_size: vitc_offset + FRAME_FIELD_SIZE,
            frame_rate,
            width,
            height,
            sec_width,
            sec_height,
            sec_video_offset,
            audio12_offset,
            audio34_offset,
            audio_size,
            signal_ok_offset,
            ltc_offset,
            vitc_offset,
        }
    }

    /// Bytes of one primary (4:2:2) picture.
    pub fn primary_size(&self) -> usize {
        ChromaFormat::Yuv422.frame_size(self.width, self.height)
    }

    /// Bytes of one secondary (4:2:0) picture.
    pub fn secondary_size(&self) -> usize {
        ChromaFormat::Yuv420.frame_size(self.sec_width, self.sec_height)
    }

    /// Stereo sample frames per audio pair per video frame.
    pub fn audio_samples_per_frame(&self) -> usize {
        self.audio_size / AUDIO_BYTES_PER_SAMPLE
    }

    /// Bytes of one channel's ring.
    pub fn ring_size(&self) -> usize {
        self.ring_len * self.element_size
    }

    /// Checks that every field lies inside the element and the counts are usable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidGeometry(reason));
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return invalid(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                self.channels
            ));
        }
        if self.ring_len < MIN_RING_LEN || self.ring_len > i32::MAX as usize {
            return invalid(format!("ring length {} too small", self.ring_len));
        }
        if self.frame_rate.numerator == 0 || self.frame_rate.denominator == 0 {
            return invalid(format!("frame rate {}", self.frame_rate));
        }
        for (name, w, h) in [
            ("primary", self.width, self.height),
            ("secondary", self.sec_width, self.sec_height),
        ] {
            if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
                return invalid(format!("{name} video {w}x{h} must be even and non-empty"));
            }
        }
        if self.audio_size % AUDIO_BYTES_PER_SAMPLE != 0 {
            return invalid(format!("audio block of {} bytes", self.audio_size));
        }
        let fields = [
            ("primary video", 0, self.primary_size()),
            ("secondary video", self.sec_video_offset, self.secondary_size()),
            ("audio 1/2", self.audio12_offset, self.audio_size),
            ("audio 3/4", self.audio34_offset, self.audio_size),
            ("signal flag", self.signal_ok_offset, FRAME_FIELD_SIZE),
            ("LTC", self.ltc_offset, FRAME_FIELD_SIZE),
            ("VITC", self.vitc_offset, FRAME_FIELD_SIZE),
        ];
        for (name, offset, size) in fields {
            if offset.checked_add(size).is_none_or(|end| end > self.element_size) {
                return invalid(format!(
                    "{name} at {offset}+{size} exceeds element size {}",
                    self.element_size
                ));
            }
        }
        Ok(())
    }

    /// Reads the geometry from a published control block.
    pub(crate) fn from_control(block: &ControlBlock) -> Result<Self> {
        if block.version != LAYOUT_VERSION {
            return Err(Error::InvalidGeometry(format!(
                "layout version {} (expected {LAYOUT_VERSION})",
                block.version
            )));
        }
        let field = |name: &str, value: i32| {
            usize::try_from(value)
                .map_err(|_| Error::InvalidGeometry(format!("negative {name} ({value})")))
        };
        let geometry = Self {
            channels: field("channel count", block.channels)?,
            ring_len: field("ring length", block.ring_len)?,
            element_size: field("element size", block.element_size)?,
            frame_rate: FrameRate {
                numerator: field("rate numerator", block.frame_rate_numerator)? as u32,
                denominator: field("rate denominator", block.frame_rate_denominator)? as u32,
            },
            width: field("width", block.width)?,
            height: field("height", block.height)?,
            sec_width: field("secondary width", block.sec_width)?,
            sec_height: field("secondary height", block.sec_height)?,
            sec_video_offset: field("secondary video offset", block.sec_video_offset)?,
            audio12_offset: field("audio 1/2 offset", block.audio12_offset)?,
            audio34_offset: field("audio 3/4 offset", block.audio34_offset)?,
            audio_size: field("audio size", block.audio_size)?,
            signal_ok_offset: field("signal offset", block.signal_ok_offset)?,
            ltc_offset: field("LTC offset", block.ltc_offset)?,
            vitc_offset: field("VITC offset", block.vitc_offset)?,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Writes the geometry into an unpublished control block.
    pub(crate) fn write_control(&self, block: &mut ControlBlock) -> Result<()> {
        self.validate()?;
        let field = |value: usize| {
            i32::try_from(value)
                .map_err(|_| Error::InvalidGeometry(format!("{value} does not fit the control block")))
        };
        block.version = LAYOUT_VERSION;
        block.channels = field(self.channels)?;
        block.ring_len = field(self.ring_len)?;
        block.element_size = field(self.element_size)?;
        block.frame_rate_numerator = field(self.frame_rate.numerator as usize)?;
        block.frame_rate_denominator = field(self.frame_rate.denominator as usize)?;
        block.width = field(self.width)?;
        block.height = field(self.height)?;
        block.sec_width = field(self.sec_width)?;
        block.sec_height = field(self.sec_height)?;
        block.sec_video_offset = field(self.sec_video_offset)?;
        block.audio12_offset = field(self.audio12_offset)?;
        block.audio34_offset = field(self.audio34_offset)?;
        block.audio_size = field(self.audio_size)?;
        block.signal_ok_offset = field(self.signal_ok_offset)?;
        block.ltc_offset = field(self.ltc_offset)?;
        block.vitc_offset = field(self.vitc_offset)?;
        Ok(())
    }
}
