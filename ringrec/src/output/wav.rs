// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! 16-bit PCM WAV files with a header patched on completion.

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{Error, Result};

/// Size of the canonical RIFF/WAVE header.
pub const HEADER_SIZE: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;

/// Builds a PCM WAV header for `data_len` bytes of sample data.
pub fn header(data_len: u32, channels: u16, sample_rate: u32) -> [u8; HEADER_SIZE] {
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36u32.saturating_add(data_len)).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Streaming WAV writer.
///
/// The header is written up front with zero sizes and rewritten by [`Self::finish`].
pub struct WavWriter {
    path: PathBuf,
    file: BufWriter<File>,
    channels: u16,
    sample_rate: u32,
    data_len: u64,
}

impl WavWriter {
    pub fn create(path: impl AsRef<Path>, channels: u16, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufWriter::new(File::create(&path)?);
        file.write_all(&header(0, channels, sample_rate))?;
        Ok(Self {
            path,
            file,
            channels,
            sample_rate,
            data_len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of sample data written so far.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Appends interleaved little-endian samples.
    pub fn write(&mut self, samples: &[u8]) -> Result<()> {
        self.file.write_all(samples)?;
        self.data_len += samples.len() as u64;
        Ok(())
    }

    /// Patches the header sizes and flushes the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the data no longer fits a 32-bit RIFF size.
    pub fn finish(&mut self) -> Result<()> {
        let data_len = u32::try_from(self.data_len)
            .ok()
            .filter(|len| len.checked_add(36).is_some())
            .ok_or_else(|| {
                Error::Write(format!(
                    "{} exceeds the WAV size limit ({} bytes)",
                    self.path.display(),
                    self.data_len
                ))
            })?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .write_all(&header(data_len, self.channels, self.sample_rate))?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.flush()?;
        debug!("Finished {} ({data_len} bytes)", self.path.display());
        Ok(())
    }
}
