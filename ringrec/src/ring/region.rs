// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Memory mappings of a shared region's files.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use memmap2::{MmapOptions, MmapRaw};
use ringrec_sys::{CONTROL_BLOCK_SIZE, CONTROL_FILE_NAME, ControlBlock, ring_file_name};

use crate::{Error, Result};

/// Path of the control file inside `domain`.
pub(crate) fn control_path(domain: &Path) -> PathBuf {
    domain.join(CONTROL_FILE_NAME)
}

/// Path of `channel`'s ring file inside `domain`.
pub(crate) fn ring_path(domain: &Path, channel: usize) -> PathBuf {
    domain.join(ring_file_name(channel))
}

/// Writable mapping of the control file.
///
/// Every field that changes after publication is atomic, so the block is shared through
/// `&ControlBlock` between the producer, the recorder and any other process mapping it.
pub(crate) struct ControlMapping {
    map: MmapRaw,
}

impl ControlMapping {
    /// Maps an existing control file.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < CONTROL_BLOCK_SIZE as u64 {
            return Err(Error::Other(format!(
                "control file holds {len} bytes, expected at least {CONTROL_BLOCK_SIZE}"
            )));
        }
        Self::map(&file)
    }

    /// Creates (or truncates) a zeroed control file and maps it.
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(CONTROL_BLOCK_SIZE as u64)?;
        Self::map(&file)
    }

    fn map(file: &File) -> Result<Self> {
        // SAFETY
        // The file is at least CONTROL_BLOCK_SIZE bytes long. Concurrent modification by
        // other processes is expected; shared fields are only accessed atomically.
        let map = unsafe { MmapOptions::new().len(CONTROL_BLOCK_SIZE).map_raw(file)? };
        Ok(Self { map })
    }

    pub(crate) fn block(&self) -> &ControlBlock {
        // SAFETY
        // Mappings are page aligned and span the whole block. All-zero bytes are a valid
        // ControlBlock, and the block contains no references.
        unsafe { &*(self.map.as_ptr() as *const ControlBlock) }
    }

    /// Mutable access for writing the geometry before the region is published.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no reader has observed the magic number yet and
    /// that no other reference to the block is alive.
    pub(crate) unsafe fn block_mut(&mut self) -> &mut ControlBlock {
        unsafe { &mut *(self.map.as_mut_ptr() as *mut ControlBlock) }
    }
}

/// Read-only mapping of one channel ring.
///
/// The producer keeps writing into the file, so the mapping is never borrowed as a
/// whole; readers take one slot at a time through [`Self::slot`].
pub(crate) struct RingMapping {
    map: MmapRaw,
}

impl RingMapping {
    /// Maps `path`, requiring at least `size` bytes.
    pub(crate) fn open(path: &Path, size: usize) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < size as u64 {
            return Err(Error::Other(format!(
                "{} holds {len} bytes, expected {size}",
                path.display()
            )));
        }
        // SAFETY
        // The mapping is only read through `slot`.
        let map = unsafe { MmapOptions::new().len(size).map_raw_read_only(&file)? };
        Ok(Self { map })
    }

    /// View of `len` bytes at `offset`, clipped to the mapping.
    ///
    /// Readers only take slots the producer has published and stay at least
    /// [`RING_SAFETY_MARGIN`](crate::session::RING_SAFETY_MARGIN) frames behind it, so the slot is
    /// not rewritten while the view is alive. A reader that falls further behind may see
    /// a slot change under it and must tolerate torn frames.
    pub(crate) fn slot(&self, offset: usize, len: usize) -> &[u8] {
        let offset = offset.min(self.map.len());
        let len = len.min(self.map.len() - offset);
        // SAFETY
        // The range lies inside the mapping, which lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.map.as_ptr().add(offset), len) }
    }
}

/// Writable mapping of one channel ring, owned by the producer.
pub(crate) struct RingMappingMut {
    map: MmapRaw,
}

impl RingMappingMut {
    /// Creates (or truncates) a zeroed ring file of `size` bytes and maps it.
    pub(crate) fn create(path: &Path, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;
        let map = unsafe { MmapOptions::new().len(size).map_raw(&file)? };
        Ok(Self { map })
    }

    /// Mutable view of `len` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// The range must lie inside the mapping and no other mutable view of it may be alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(offset + len <= self.map.len());
        unsafe { std::slice::from_raw_parts_mut(self.map.as_mut_ptr().add(offset), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_slots_the_producer_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring_0");
        let writer = RingMappingMut::create(&path, 64).unwrap();
        let reader = RingMapping::open(&path, 64).unwrap();

        unsafe { writer.slice_mut(16, 4) }.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(reader.slot(16, 4), &[1, 2, 3, 4]);
        assert_eq!(reader.slot(0, 4), &[0; 4]);

        unsafe { writer.slice_mut(16, 4) }.copy_from_slice(&[9, 9, 9, 9]);
        assert_eq!(reader.slot(16, 4), &[9, 9, 9, 9]);
        assert_eq!(reader.slot(60, 16).len(), 4);
    }

    #[test]
    fn short_ring_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring_0");
        drop(RingMappingMut::create(&path, 32).unwrap());
        assert!(RingMapping::open(&path, 64).is_err());
        assert!(RingMapping::open(&path, 32).is_ok());
    }
}
