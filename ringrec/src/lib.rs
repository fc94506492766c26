// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # ringrec - multi-channel ring buffer recorder
//!
//! Records frames that a capture process writes into per-channel shared-memory rings,
//! synchronizing channels by their embedded timecode.
//!
//! ## Overview
//!
//! A capture producer fills one ring of frame elements per hardware input: planar
//! video, two stereo audio pairs, a signal flag and the LTC/VITC timecode read from the
//! signal. This crate attaches to those rings ([`RingAccess`]), finds a common start
//! frame across channels ([`correlator`]), and records every enabled channel, plus an
//! optional quad-split composite, through an encoder and an output writer per encoding.
//!
//! ### Key Concepts
//!
//! - **Domain**: A tmpfs directory holding the control block and one ring file per channel
//! - **Timecode**: Frames since midnight at a nominal rate, drop-frame at 30 fps ([`Timecode`])
//! - **Session**: One recording from start to completion ([`RecordingSession`])
//! - **Job**: One (track, encoding) pair recorded by its own worker thread ([`EncodeJob`])
//! - **Recorder**: The Start/Stop/TracksStatus/UpdateConfig surface ([`Recorder`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────────┐
//! │ Recorder │──►│ Correlator │──►│ RecordingSession │
//! └────┬─────┘   └────────────┘   └────────┬─────────┘
//!      │                                   ├─► worker ──► Encoder ──► SampleWriter
//!      └─► EngineContext (RingAccess)      ├─► worker ──► QuadCompositor ──► ...
//!                                          └─► watcher ──► CompletionReport
//! ```
//!
//! ## Examples
//!
//! ### Recording two channels for four seconds
//!
//! ```no_run
//! use ringrec::{EngineContext, Recorder, RecorderSettings, StartRequest, UserComments};
//!
//! # fn main() -> Result<(), ringrec::Error> {
//! let settings = RecorderSettings::load("/etc/ringrec.json")?;
//! let recorder = Recorder::new(EngineContext::attach(&settings)?, settings);
//!
//! let start = recorder.start(StartRequest {
//!     pre_roll: 10,
//!     enabled: vec![true, true],
//!     project: "Evening News".to_string(),
//!     ..Default::default()
//! })?;
//! let outcome = recorder.stop(Some(start + 100), 0, UserComments::default())?;
//! let report = recorder.wait_for_completion()?;
//! println!("{} frames, success: {}", outcome.duration, report.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`RingAccess`], [`EngineContext`] and [`Recorder`] are `Send + Sync`
//! - Workers own their encoder and writer; nothing else touches them
//! - The only cross-thread signal to a worker is the session's target duration
//!
//! ## Error Handling
//!
//! Setup and control operations return [`Result<T, Error>`](Result). Failures inside a
//! running worker never cross the thread boundary; they disable the failing output and
//! are reported in the [`CompletionReport`].

pub mod burn;
pub mod correlator;
pub mod encode;
pub mod engine;
pub mod error;
pub mod output;
pub mod pattern;
pub mod picture;
pub mod quad;
pub mod recorder;
pub mod ring;
pub mod session;
pub mod settings;
pub mod timecode;

pub use burn::BurnInOptions;
pub use correlator::{Correlation, Correlator};
pub use encode::{Encoder, EncoderFactory, RawEncoder, RawEncoderFactory, VideoFormat};
pub use engine::EngineContext;
pub use error::{Error, Result};
pub use output::{
    FileWriterFactory, Locator, ProjectMetadata, SampleWriter, UserComments, WriterFactory,
    WriterRequest,
};
pub use pattern::TestPattern;
pub use picture::{BLACK_LUMA, ChromaFormat, NEUTRAL_CHROMA, Picture, PictureRef};
pub use quad::{QuadCompositor, QuadFilter};
pub use recorder::{Recorder, TrackStatus};
pub use ring::{
    RingGeometry, TimecodeSource,
    frame::FrameView,
    producer::RingProducer,
    reader::{AttachOptions, ChannelRing, MonitorSlot, MonitorState, RingAccess},
    write_access::FrameWriteAccess,
};
pub use session::{
    CompletionReport, EncodeJob, FrameClock, JobSource, JobStatus, RecordingSession,
    SessionState, SleepClock, StartRequest, StopOutcome, TrackOutput,
};
pub use settings::{EncodingSettings, OutputKind, QuadSettings, RecorderSettings, TrackSettings};
pub use timecode::{FrameDuration, FrameRate, Timecode};
