// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Staged output: files are written under `creating/` and moved into place at the end.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::{
    Result,
    output::{
        ProjectMetadata, RawFileWriter, SampleWriter, UserComments, WriterRequest, relocate,
    },
};

/// Staging subdirectory for files being written.
pub const CREATING_DIR: &str = "creating";

/// Subdirectory receiving the files of aborted recordings.
pub const FAILURES_DIR: &str = "failures";

/// Wraps a [`RawFileWriter`] so that the destination directory only ever holds complete
/// file sets.
pub struct StagedWriter {
    inner: RawFileWriter,
    destination: PathBuf,
    failures: PathBuf,
}

impl StagedWriter {
    pub fn create(request: &WriterRequest) -> Result<Self> {
        let creating = request.directory.join(CREATING_DIR);
        let failures = request.directory.join(FAILURES_DIR);
        std::fs::create_dir_all(&failures)?;
        Ok(Self {
            inner: RawFileWriter::create(&creating, request)?,
            destination: request.directory.clone(),
            failures,
        })
    }

    fn move_all(&self, directory: &Path) -> Result<()> {
        // The sidecar only exists once the set is finalized.
        for path in self.inner.output_paths().iter().filter(|path| path.exists()) {
            std::fs::rename(path, relocate(path, directory))?;
        }
        Ok(())
    }
}

impl SampleWriter for StagedWriter {
    fn write_sample(&mut self, track: usize, sample_count: u32, data: &[u8]) -> Result<()> {
        self.inner.write_sample(track, sample_count, data)
    }

    fn complete_and_finalize(
        &mut self,
        comments: &UserComments,
        metadata: &ProjectMetadata,
    ) -> Result<()> {
        self.inner.complete_and_finalize(comments, metadata)?;
        self.move_all(&self.destination)?;
        info!("Moved file set into {}", self.destination.display());
        Ok(())
    }

    fn abort(&mut self) {
        self.inner.abort();
        match self.move_all(&self.failures) {
            Ok(()) => warn!("Moved aborted file set to {}", self.failures.display()),
            Err(error) => error!(
                "Failed to move aborted file set to {}: {error}",
                self.failures.display()
            ),
        }
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.inner
            .output_paths()
            .iter()
            .map(|path| relocate(path, &self.destination))
            .collect()
    }
}
