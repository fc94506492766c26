// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # ringrec-sys: Raw layout of the capture shared-memory region
//!
//! This crate describes, as `#[repr(C)]` types, the control block that an external
//! capture process publishes next to its per-channel frame rings. It carries no logic
//! beyond a few naming helpers.
//!
//! ## Overview
//!
//! A region lives in a directory (the "domain", typically on tmpfs):
//!
//! ```text
//! <domain>/control   ControlBlock (geometry, cursors, source names, monitor slots)
//! <domain>/ring_0    ring_len * element_size bytes for channel 0
//! <domain>/ring_1    ...
//! ```
//!
//! Every frame element holds, at the byte offsets recorded in the control block:
//!
//! - primary video, planar YUV 4:2:2, always at offset 0
//! - secondary video, planar YUV 4:2:0
//! - two audio pairs, 16-bit little-endian stereo interleaved PCM
//! - three native-endian `i32` fields: signal-ok flag, LTC and VITC timecodes
//!   (frames since midnight, negative when unreadable)
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe [`ringrec`] crate,
//! which validates the geometry once at attach time and exposes bounds-checked views.
//!
//! ## Safety
//!
//! Fields that change after the producer publishes the region are atomics. The plain
//! geometry fields are written once before [`ControlBlock::magic`] is stored with
//! release ordering and must be treated as read-only afterwards.
//!
//! [`ringrec`]: https://docs.rs/ringrec

use core::sync::atomic::{AtomicI32, AtomicU8, AtomicU32};

/// Value of [`ControlBlock::magic`] once the producer has published the region ("RREC").
pub const CONTROL_MAGIC: u32 = 0x5252_4543;

/// Layout version understood by this crate.
pub const LAYOUT_VERSION: u32 = 1;

/// Maximum number of capture channels described by one control block.
pub const MAX_CHANNELS: usize = 8;

/// Number of job monitoring slots in the control block.
pub const MAX_MONITORED_JOBS: usize = 32;

/// Capacity of a channel source name, including the terminating zero.
pub const SOURCE_NAME_LEN: usize = 64;

/// File name of the control block inside a domain directory.
pub const CONTROL_FILE_NAME: &str = "control";

/// Size of the trailing `i32` fields (signal flag, LTC, VITC) in a frame element.
pub const FRAME_FIELD_SIZE: usize = core::mem::size_of::<i32>();

/// Size in bytes of [`ControlBlock`].
pub const CONTROL_BLOCK_SIZE: usize = core::mem::size_of::<ControlBlock>();

/// Returns the ring file name for `channel` inside a domain directory.
pub fn ring_file_name(channel: usize) -> String {
    format!("ring_{channel}")
}

/// Per-channel cursor and identification.
#[repr(C)]
pub struct ChannelControl {
    /// Number of the last frame fully written by the producer (-1 before the first).
    ///
    /// Monotonically increasing; the slot is `last_frame % ring_len`.
    pub last_frame: AtomicI32,
    /// Frames the capture hardware reported as lost.
    pub hw_dropped: AtomicI32,
    /// Zero-terminated UTF-8 source name, writable by the recorder.
    pub source_name: [AtomicU8; SOURCE_NAME_LEN],
}

/// Observability slot for one encode job, written by the recorder.
#[repr(C)]
pub struct JobMonitor {
    pub enabled: AtomicU32,
    pub recording: AtomicU32,
    pub error: AtomicU32,
    pub frames_written: AtomicU32,
    pub frames_dropped: AtomicU32,
    /// Channel index, or -1 for the quad composite.
    pub channel: AtomicI32,
}

/// Fixed control record at the start of `<domain>/control`.
#[repr(C)]
pub struct ControlBlock {
    /// [`CONTROL_MAGIC`] once the fields below are valid.
    pub magic: AtomicU32,
    pub version: u32,
    pub channels: i32,
    pub ring_len: i32,
    pub element_size: i32,
    pub frame_rate_numerator: i32,
    pub frame_rate_denominator: i32,
    pub width: i32,
    pub height: i32,
    pub sec_width: i32,
    pub sec_height: i32,
    pub sec_video_offset: i32,
    pub audio12_offset: i32,
    pub audio34_offset: i32,
    /// Size in bytes of one audio pair block.
    pub audio_size: i32,
    pub signal_ok_offset: i32,
    pub ltc_offset: i32,
    pub vitc_offset: i32,
    pub channel: [ChannelControl; MAX_CHANNELS],
    pub monitor: [JobMonitor; MAX_MONITORED_JOBS],
}
