// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Smoke test for the shared control block layout.

use std::mem::{align_of, offset_of, size_of};

use ringrec_sys::{ChannelControl, ControlBlock, JobMonitor, MAX_CHANNELS, SOURCE_NAME_LEN};

/// Verifies that the control block has the packed `i32` layout the producer expects.
#[test]
fn control_block_layout_is_stable() {
    assert_eq!(size_of::<ChannelControl>(), 8 + SOURCE_NAME_LEN);
    assert_eq!(size_of::<JobMonitor>(), 24);
    assert_eq!(align_of::<ControlBlock>(), 4);
    assert_eq!(offset_of!(ControlBlock, channels), 8);
    assert_eq!(offset_of!(ControlBlock, vitc_offset), 68);
    assert_eq!(
        offset_of!(ControlBlock, monitor),
        offset_of!(ControlBlock, channel) + MAX_CHANNELS * size_of::<ChannelControl>()
    );
    println!("control block size: {}", ringrec_sys::CONTROL_BLOCK_SIZE);
}

#[test]
fn ring_files_are_numbered_per_channel() {
    assert_eq!(ringrec_sys::ring_file_name(3), "ring_3");
}
