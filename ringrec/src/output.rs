// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Output writer abstraction and the built-in file outputs.
//!
//! A writer receives samples per track (track 0 is video, tracks 1 and 2 are the two
//! audio pairs) and is finalized once with the user comments and project metadata
//! collected by the session. Container formats plug in through [`WriterFactory`].

pub mod raw;
pub mod staged;
pub mod wav;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FrameRate, Result, Timecode};

pub use raw::RawFileWriter;
pub use staged::StagedWriter;

/// Track id of the video track.
pub const VIDEO_TRACK: usize = 0;

/// Track id of audio pair `pair` (0 = channels 1/2).
pub fn audio_track(pair: usize) -> usize {
    1 + pair
}

/// A marker placed by the operator, carried into the output metadata.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Locator {
    /// Timecode text (`hh:mm:ss:ff`).
    pub timecode: String,
    pub comment: String,
    pub colour: Option<String>,
}

/// Free-form information supplied when a recording stops.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UserComments {
    pub description: String,
    pub locators: Vec<Locator>,
}

/// Identification of one recorded file set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectMetadata {
    pub session_id: Uuid,
    pub project: String,
    pub recorder_name: String,
    pub source_name: String,
    pub start_timecode: String,
    pub frame_rate: FrameRate,
    /// Frames delivered to the writer, including dropped ones replaced by nothing.
    pub frames_written: u64,
    pub frames_dropped: u64,
}

/// Everything a factory needs to open a file set.
#[derive(Clone, Debug, PartialEq)]
pub struct WriterRequest {
    /// Destination directory.
    pub directory: PathBuf,
    /// File name stem, see [`file_stem`].
    pub stem: String,
    /// Extension of the video file, or `None` for audio-only outputs.
    pub video_extension: Option<String>,
    /// Number of stereo audio pairs to write.
    pub audio_pairs: usize,
    pub audio_sample_rate: u32,
    /// Write through a `creating/` staging directory.
    pub staged: bool,
}

/// Receives the samples of one encode job.
///
/// Implementations are owned by a single worker thread.
pub trait SampleWriter: Send {
    /// Appends `sample_count` samples of `track`.
    fn write_sample(&mut self, track: usize, sample_count: u32, data: &[u8]) -> Result<()>;

    /// Closes all tracks and writes the metadata.
    fn complete_and_finalize(
        &mut self,
        comments: &UserComments,
        metadata: &ProjectMetadata,
    ) -> Result<()>;

    /// Gives up on the file set after a failure.
    fn abort(&mut self);

    /// Final paths of every file this writer produces on success.
    fn output_paths(&self) -> Vec<PathBuf>;
}

/// Creates writers for encode jobs.
pub trait WriterFactory: Send + Sync {
    fn create(&self, request: &WriterRequest) -> Result<Box<dyn SampleWriter>>;
}

/// Factory for [`RawFileWriter`], wrapped in a [`StagedWriter`] when requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileWriterFactory;

impl WriterFactory for FileWriterFactory {
    fn create(&self, request: &WriterRequest) -> Result<Box<dyn SampleWriter>> {
        if request.staged {
            Ok(Box::new(StagedWriter::create(request)?))
        } else {
            Ok(Box::new(RawFileWriter::create(&request.directory, request)?))
        }
    }
}

/// Builds the stem `{date}_{start_timecode}_{project}_{recorder}_{source}_{job}`.
///
/// The date is `YYYYMMDD`, the timecode `hhmmssff`. Name fields are sanitised so the
/// stem is a single safe path component.
pub fn file_stem(
    date: NaiveDate,
    start: &Timecode,
    project: &str,
    recorder_name: &str,
    source_name: &str,
    job_index: usize,
) -> String {
    format!(
        "{}_{}_{}_{}_{}_{job_index}",
        date.format("%Y%m%d"),
        start.to_compact_string(),
        sanitize(project),
        sanitize(recorder_name),
        sanitize(source_name),
    )
}

/// Replaces characters that are unsafe in file names, or that would split the stem's
/// fields, with `-`.
fn sanitize(field: &str) -> String {
    field
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// `<directory>/<file name of path>`.
pub(crate) fn relocate(path: &Path, directory: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => directory.join(name),
        None => directory.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_follow_the_naming_pattern() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let start = Timecode::from_text("10:02:03:04", 25);
        assert_eq!(
            file_stem(date, &start, "Evening News", "rec1", "CAM 2/left", 3),
            "20250309_10020304_Evening-News_rec1_CAM-2-left_3"
        );
    }

    #[test]
    fn sanitising_keeps_one_path_component() {
        assert_eq!(sanitize("../etc"), "-etc");
        assert_eq!(sanitize(" a_b "), "a-b");
        assert_eq!(sanitize("Caméra"), "Caméra");
    }
}
