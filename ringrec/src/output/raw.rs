// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Raw per-track file output.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    Error, Result,
    output::{ProjectMetadata, SampleWriter, UserComments, VIDEO_TRACK, WriterRequest, wav::WavWriter},
};

/// Writes `<stem>.<ext>` for video, `<stem>_<n>.wav` per audio pair and a `<stem>.json`
/// metadata sidecar.
pub struct RawFileWriter {
    video: Option<(PathBuf, BufWriter<File>)>,
    audio: Vec<WavWriter>,
    sidecar: PathBuf,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    metadata: &'a ProjectMetadata,
    comments: &'a UserComments,
    files: Vec<String>,
}

impl RawFileWriter {
    /// Creates all files of `request` in `directory` (which may differ from the
    /// request's directory when staging).
    pub fn create(directory: &Path, request: &WriterRequest) -> Result<Self> {
        std::fs::create_dir_all(directory)?;
        let video = match &request.video_extension {
            Some(extension) => {
                let path = directory.join(format!("{}.{extension}", request.stem));
                let file = BufWriter::new(File::create(&path)?);
                Some((path, file))
            }
            None => None,
        };
        let audio = (0..request.audio_pairs)
            .map(|pair| {
                WavWriter::create(
                    directory.join(format!("{}_{}.wav", request.stem, pair + 1)),
                    2,
                    request.audio_sample_rate,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Created raw outputs for {} in {}",
            request.stem,
            directory.display()
        );
        Ok(Self {
            video,
            audio,
            sidecar: directory.join(format!("{}.json", request.stem)),
        })
    }
}

impl SampleWriter for RawFileWriter {
    fn write_sample(&mut self, track: usize, _sample_count: u32, data: &[u8]) -> Result<()> {
        if track == VIDEO_TRACK {
            let (_, file) = self
                .video
                .as_mut()
                .ok_or_else(|| Error::Write("no video track".to_string()))?;
            file.write_all(data)?;
            return Ok(());
        }
        let wav = self
            .audio
            .get_mut(track - 1)
            .ok_or_else(|| Error::Write(format!("no track {track}")))?;
        wav.write(data)
    }

    fn complete_and_finalize(
        &mut self,
        comments: &UserComments,
        metadata: &ProjectMetadata,
    ) -> Result<()> {
        if let Some((_, file)) = self.video.as_mut() {
            file.flush()?;
        }
        for wav in &mut self.audio {
            wav.finish()?;
        }
        let files = self
            .output_paths()
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        let sidecar = Sidecar {
            metadata,
            comments,
            files,
        };
        let mut file = BufWriter::new(File::create(&self.sidecar)?);
        serde_json::to_writer_pretty(&mut file, &sidecar)?;
        file.flush()?;
        Ok(())
    }

    fn abort(&mut self) {
        if let Some((path, file)) = self.video.as_mut()
            && let Err(error) = file.flush()
        {
            warn!("Failed to flush {} on abort: {error}", path.display());
        }
        for wav in &mut self.audio {
            if let Err(error) = wav.finish() {
                warn!("Failed to close {} on abort: {error}", wav.path().display());
            }
        }
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.video
            .iter()
            .map(|(path, _)| path.clone())
            .chain(self.audio.iter().map(|wav| wav.path().to_path_buf()))
            .chain(std::iter::once(self.sidecar.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameRate, output::audio_track};

    fn request(directory: &Path) -> WriterRequest {
        WriterRequest {
            directory: directory.to_path_buf(),
            stem: "stem".to_string(),
            video_extension: Some("yuv".to_string()),
            audio_pairs: 2,
            audio_sample_rate: 48000,
            staged: false,
        }
    }

    fn metadata() -> ProjectMetadata {
        ProjectMetadata {
            session_id: uuid::Uuid::new_v4(),
            project: "project".to_string(),
            recorder_name: "rec".to_string(),
            source_name: "cam".to_string(),
            start_timecode: "10:00:00:00".to_string(),
            frame_rate: FrameRate::PAL,
            frames_written: 1,
            frames_dropped: 0,
        }
    }

    #[test]
    fn tracks_go_to_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RawFileWriter::create(dir.path(), &request(dir.path())).unwrap();
        writer.write_sample(VIDEO_TRACK, 1, &[7; 16]).unwrap();
        writer.write_sample(audio_track(1), 2, &[1; 8]).unwrap();
        assert!(writer.write_sample(audio_track(2), 1, &[0; 4]).is_err());
        writer
            .complete_and_finalize(&UserComments::default(), &metadata())
            .unwrap();

        let paths = writer.output_paths();
        assert_eq!(paths.len(), 4);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![7; 16]);
        assert_eq!(std::fs::metadata(&paths[1]).unwrap().len(), 44);
        assert_eq!(std::fs::metadata(&paths[2]).unwrap().len(), 52);
        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("stem.json")).unwrap()).unwrap();
        assert_eq!(sidecar["metadata"]["project"], "project");
        assert_eq!(sidecar["files"][1], "stem_1.wav");
    }
}
