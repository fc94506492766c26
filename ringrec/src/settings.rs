// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Recorder settings.
//!
//! Settings are a JSON document; every field has a default so a partial file is
//! accepted. A running session keeps the settings it was started with.
//!
//! # Examples
//!
//! ```
//! use ringrec::RecorderSettings;
//!
//! let settings = RecorderSettings::from_json(r#"{
//!     "recorder_name": "studio-a",
//!     "tracks": [{"source_name": "CAM 1"}, {"source_name": "CAM 2", "enabled": false}],
//!     "encodings": [{"video": "yuv420", "output": "staged", "directory": "/srv/media"}]
//! }"#).unwrap();
//! assert_eq!(settings.track(1).source_name, "CAM 2");
//! assert_eq!(settings.search_guard, 5);
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    AttachOptions, BurnInOptions, Error, QuadFilter, Result, TimecodeSource, VideoFormat,
    encode::RAW_CODEC, quad::QUAD_SOURCES, timecode::vitc::VitcSampling,
};

/// Per-channel track settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TrackSettings {
    /// Name used in file stems and published in the control block.
    pub source_name: String,
    /// Recorded when a start request does not say otherwise.
    pub enabled: bool,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            source_name: String::new(),
            enabled: true,
        }
    }
}

/// Where an encoding's files go.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Files written straight into the directory.
    #[default]
    Raw,
    /// Files written under `creating/` and moved into the directory on success.
    Staged,
}

/// One encode variant applied to every enabled track.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EncodingSettings {
    pub video: VideoFormat,
    /// Codec name resolved by the encoder factory.
    pub codec: String,
    pub output: OutputKind,
    pub directory: PathBuf,
    pub burn_timecode: bool,
    /// Write the two audio pairs.
    pub audio: bool,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            video: VideoFormat::Yuv422,
            codec: RAW_CODEC.to_string(),
            output: OutputKind::Raw,
            directory: PathBuf::from("recordings"),
            burn_timecode: false,
            audio: true,
        }
    }
}

/// Quad-split track settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct QuadSettings {
    pub enabled: bool,
    pub source_name: String,
    /// Frames each source is read ahead (positive) or behind its correlated start, to
    /// compensate for channel latency differences.
    pub offsets: [i64; QUAD_SOURCES],
    pub filter: QuadFilter,
}

impl Default for QuadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source_name: "Quad".to_string(),
            offsets: [0; QUAD_SOURCES],
            filter: QuadFilter::default(),
        }
    }
}

/// Complete recorder settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RecorderSettings {
    pub recorder_name: String,
    /// Directory of the shared capture region.
    pub domain: PathBuf,
    pub timecode_source: TimecodeSource,
    pub attach_attempts: u32,
    /// First wait between attach attempts, doubled after every failure.
    pub attach_backoff_ms: u64,
    /// Wait between checks for new frames.
    pub poll_interval_ms: u64,
    /// Ring slots kept out of the correlation search.
    pub search_guard: usize,
    pub audio_sample_rate: u32,
    pub tracks: Vec<TrackSettings>,
    pub encodings: Vec<EncodingSettings>,
    pub quad: QuadSettings,
    pub burn_in: BurnInOptions,
    /// VITC sample positions used by the capture simulator.
    pub vitc_sampling: VitcSampling,
    /// Scan line carrying VITC in simulated pictures.
    pub vitc_line: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            recorder_name: "ringrec".to_string(),
            domain: PathBuf::from("/dev/shm/ringrec"),
            timecode_source: TimecodeSource::Ltc,
            attach_attempts: 10,
            attach_backoff_ms: 100,
            poll_interval_ms: 10,
            search_guard: 5,
            audio_sample_rate: 48000,
            tracks: Vec::new(),
            encodings: vec![EncodingSettings::default()],
            quad: QuadSettings::default(),
            burn_in: BurnInOptions::default(),
            vitc_sampling: VitcSampling::default(),
            vitc_line: 0,
        }
    }
}

impl RecorderSettings {
    /// Parses and validates a settings document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|error| Error::Config(format!("Invalid settings: {error}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read {}: {error}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.encodings.is_empty() {
            return Err(Error::Config("At least one encoding is required".to_string()));
        }
        if self.audio_sample_rate == 0 {
            return Err(Error::Config("Audio sample rate must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("Poll interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Settings of `channel`, defaulting to an enabled track named after the channel.
    pub fn track(&self, channel: usize) -> TrackSettings {
        let mut track = self.tracks.get(channel).cloned().unwrap_or_default();
        if track.source_name.is_empty() {
            track.source_name = format!("Channel {}", channel + 1);
        }
        track
    }

    pub fn attach_options(&self) -> AttachOptions {
        AttachOptions {
            attempts: self.attach_attempts,
            initial_backoff: Duration::from_millis(self.attach_backoff_ms),
            ..AttachOptions::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
