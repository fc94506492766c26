// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for recorder operations.
//!
//! This module defines the error type returned across the crate. Only session setup and
//! the control surface return errors to callers; faults inside a running worker are
//! turned into counters and flags instead (see [`crate::session`]).

use std::path::PathBuf;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the recorder engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shared capture region could not be attached within the retry window.
    ///
    /// This is fatal: the engine cannot run without the producer's region.
    #[error("Failed to attach shared region \"{}\" after {attempts} attempt(s): {reason}", path.display())]
    AttachFailed {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    /// The control block describes a frame layout that does not fit its element size.
    #[error("Invalid ring geometry: {0}")]
    InvalidGeometry(String),

    /// A channel index beyond the channels published by the producer.
    #[error("Channel {0} out of range")]
    ChannelOutOfRange(usize),

    /// Malformed timecode text or fields.
    #[error("Invalid timecode: {0}")]
    InvalidTimecode(String),

    /// Arithmetic between timecodes of different rates or drop-frame modes.
    #[error("Timecode rate mismatch")]
    RateMismatch,

    /// A start request that enables no track.
    #[error("No channels enabled")]
    NoChannelsEnabled,

    /// A signal-bearing channel has no frame matching the requested start timecode.
    #[error("Failed to find start timecode {target} on channel {channel}")]
    CorrelationFailed { channel: usize, target: String },

    /// A start request while a recording is still in progress.
    #[error("Recording already in progress")]
    Busy,

    /// A stop request with no recording in progress.
    #[error("Not recording")]
    NotRecording,

    /// An encoder rejected a frame.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An output writer failed.
    #[error("Write error: {0}")]
    Write(String),

    /// Settings could not be loaded or are inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure (mapping the region, creating output files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error for failures not covered above.
    #[error("Other error: {0}")]
    Other(String),
}
