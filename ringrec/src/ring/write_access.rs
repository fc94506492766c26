// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII frame write access for zero-copy ring writing.

use std::sync::Arc;

use tracing::trace;

use crate::{Timecode, ring::producer::ProducerContext};

/// RAII-protected frame writing session.
///
/// Provides mutable access to one frame element of a channel ring. The frame is
/// automatically canceled if not explicitly committed, so readers never see a
/// half-written frame through the cursor.
///
/// The lifetime `'a` is tied to the [`crate::RingProducer`] that created this session.
///
/// # Safety Guarantees
///
/// - Automatically cancels uncommitted frames on drop
/// - Prevents double-commit via move semantics
/// - Only one session per channel can be open at a time
pub struct FrameWriteAccess<'a> {
    context: Arc<ProducerContext>,
    channel: usize,
    number: i64,
    payload: &'a mut [u8],
    /// Tracks whether the frame has been committed or canceled to prevent auto-cancel on drop.
    committed_or_canceled: bool,
}

impl<'a> FrameWriteAccess<'a> {
    pub(crate) fn new(
        context: Arc<ProducerContext>,
        channel: usize,
        number: i64,
        payload: &'a mut [u8],
    ) -> Self {
        Self {
            context,
            channel,
            number,
            payload,
            committed_or_canceled: false,
        }
    }

    /// Frame number this session will publish.
    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The whole frame element.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload[..]
    }

    /// Primary picture bytes (planar 4:2:2, Y then U then V).
    pub fn primary_mut(&mut self) -> &mut [u8] {
        let size = self.context.geometry.primary_size();
        &mut self.payload[..size]
    }

    /// Secondary picture bytes (planar 4:2:0).
    pub fn secondary_mut(&mut self) -> &mut [u8] {
        let geometry = &self.context.geometry;
        let offset = geometry.sec_video_offset;
        let size = geometry.secondary_size();
        &mut self.payload[offset..offset + size]
    }

    /// Audio pair `pair` (0 = channels 1/2, 1 = channels 3/4).
    pub fn audio_mut(&mut self, pair: usize) -> &mut [u8] {
        let geometry = &self.context.geometry;
        let offset = if pair == 0 {
            geometry.audio12_offset
        } else {
            geometry.audio34_offset
        };
        let size = geometry.audio_size;
        &mut self.payload[offset..offset + size]
    }

    pub fn set_signal_ok(&mut self, signal_ok: bool) {
        let offset = self.context.geometry.signal_ok_offset;
        self.write_field(offset, signal_ok as i32);
    }

    /// Stores the LTC field; a null timecode stores "unreadable".
    pub fn set_ltc(&mut self, timecode: &Timecode) {
        let offset = self.context.geometry.ltc_offset;
        self.write_field(offset, stored_timecode(timecode));
    }

    /// Stores the VITC field; a null timecode stores "unreadable".
    pub fn set_vitc(&mut self, timecode: &Timecode) {
        let offset = self.context.geometry.vitc_offset;
        self.write_field(offset, stored_timecode(timecode));
    }

    fn write_field(&mut self, offset: usize, value: i32) {
        self.payload[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    /// Commits the frame, advancing the channel cursor to it.
    pub fn commit(mut self) {
        self.committed_or_canceled = true;
        self.context.commit(self.channel, self.number);
        trace!("Committed frame {} on channel {}", self.number, self.channel);
    }

    /// Cancels the frame without moving the cursor.
    ///
    /// **Note**: The element may still hold the written bytes, but readers only look at
    /// frames up to the cursor, so they will not see them until the slot is reused.
    pub fn cancel(mut self) {
        self.committed_or_canceled = true;
        self.context.cancel(self.channel);
    }
}

fn stored_timecode(timecode: &Timecode) -> i32 {
    if timecode.is_null() {
        -1
    } else {
        timecode.frames_since_midnight() as i32
    }
}

impl Drop for FrameWriteAccess<'_> {
    /// Automatically cancels uncommitted frames on drop.
    fn drop(&mut self) {
        if !self.committed_or_canceled {
            trace!(
                "Canceling uncommitted frame {} on channel {}",
                self.number, self.channel
            );
            self.context.cancel(self.channel);
        }
    }
}
