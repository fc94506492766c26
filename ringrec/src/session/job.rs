// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encode job descriptors.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::EncodingSettings;

/// What a job records.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "channel")]
pub enum JobSource {
    Channel(usize),
    Quad,
}

impl JobSource {
    /// Track index: channels first, then the quad track.
    pub fn track(&self, channel_count: usize) -> usize {
        match self {
            JobSource::Channel(channel) => *channel,
            JobSource::Quad => channel_count,
        }
    }

    /// Channel index, `None` for the quad composite.
    pub fn channel(&self) -> Option<usize> {
        match self {
            JobSource::Channel(channel) => Some(*channel),
            JobSource::Quad => None,
        }
    }
}

/// One (track, encoding) pair of a recording session.
///
/// The counters are written only by the job's own worker and read from any thread.
#[derive(Debug)]
pub struct EncodeJob {
    pub index: usize,
    pub source: JobSource,
    pub source_name: String,
    pub encoding: EncodingSettings,
    /// File name stem shared by all files of the job.
    pub stem: String,
    /// Paths the files will have once the job completes.
    pub output_paths: Vec<PathBuf>,
    frames_written: AtomicU64,
    frames_dropped: AtomicU64,
    finished: AtomicBool,
}

impl EncodeJob {
    pub fn new(
        index: usize,
        source: JobSource,
        source_name: String,
        encoding: EncodingSettings,
        stem: String,
        output_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            index,
            source,
            source_name,
            encoding,
            stem,
            output_paths,
            frames_written: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Acquire)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Acquire)
    }

    /// Frames written plus frames dropped.
    pub fn frames_processed(&self) -> u64 {
        self.frames_written() + self.frames_dropped()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn add_written(&self, frames: u64) {
        self.frames_written.fetch_add(frames, Ordering::AcqRel);
    }

    pub(crate) fn add_dropped(&self, frames: u64) {
        self.frames_dropped.fetch_add(frames, Ordering::AcqRel);
    }

    pub(crate) fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            index: self.index,
            source: self.source,
            source_name: self.source_name.clone(),
            frames_written: self.frames_written(),
            frames_dropped: self.frames_dropped(),
            finished: self.is_finished(),
        }
    }
}

/// Snapshot of a job's progress.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct JobStatus {
    pub index: usize,
    pub source: JobSource,
    pub source_name: String,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub finished: bool,
}
