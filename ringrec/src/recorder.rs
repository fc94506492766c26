// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The recorder control surface: Start, Stop, TracksStatus and UpdateConfig.
//!
//! A [`Recorder`] runs at most one [`RecordingSession`] at a time. A completed session is
//! reaped on the next call, or explicitly by [`Recorder::wait_for_completion`].

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    CompletionReport, EngineContext, Error, RecorderSettings, RecordingSession, Result,
    SessionState, StartRequest, StopOutcome, Timecode, UserComments, quad::QUAD_SOURCES,
};

/// Live state of one track.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TrackStatus {
    pub track: usize,
    pub source_name: String,
    pub recording: bool,
    pub signal_present: bool,
    /// Current timecode text, `None` while unreadable.
    pub timecode: Option<String>,
}

/// Owns the engine context, the current settings and the session in progress.
pub struct Recorder {
    context: EngineContext,
    settings_path: Option<PathBuf>,
    settings: RwLock<Arc<RecorderSettings>>,
    session: Mutex<Option<RecordingSession>>,
}

impl Recorder {
    /// Creates a recorder and publishes the configured source names.
    pub fn new(context: EngineContext, settings: RecorderSettings) -> Self {
        let recorder = Self {
            context,
            settings_path: None,
            settings: RwLock::new(Arc::new(settings)),
            session: Mutex::new(None),
        };
        recorder.publish_source_names();
        recorder
    }

    /// File re-read by [`Self::update_config`].
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Settings new sessions start with.
    pub fn settings(&self) -> Arc<RecorderSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn session(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        reap(&mut session);
        session
    }

    /// State of the current session, `None` when idle.
    pub fn session_state(&self) -> Option<SessionState> {
        self.session().as_ref().map(RecordingSession::state)
    }

    /// Starts a recording and returns the correlated start timecode.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] while a session is running or stopping
    /// - Any error of [`RecordingSession::start`]
    pub fn start(&self, request: StartRequest) -> Result<Timecode> {
        let mut session = self.session();
        if session.is_some() {
            return Err(Error::Busy);
        }
        self.context.ring().reset_monitors();
        let started = RecordingSession::start(&self.context, self.settings(), request)?;
        let start = started.start_timecode();
        info!("Recording started at {start}");
        *session = Some(started);
        Ok(start)
    }

    /// Stops the recording in progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRecording`] when idle or already stopping.
    pub fn stop(
        &self,
        stop: Option<Timecode>,
        post_roll: i64,
        comments: UserComments,
    ) -> Result<StopOutcome> {
        let session = self.session();
        session
            .as_ref()
            .ok_or(Error::NotRecording)?
            .stop(stop, post_roll, comments)
    }

    /// Recording flag, signal and current timecode per track; the quad track, when
    /// configured, comes last.
    pub fn tracks_status(&self) -> Vec<TrackStatus> {
        let settings = self.settings();
        let session = self.session();
        let ring = self.context.ring();
        let channel_count = ring.channel_count();
        let recording = |track: usize| {
            session
                .as_ref()
                .is_some_and(|session| session.is_recording(track))
        };

        let mut tracks: Vec<TrackStatus> = (0..channel_count)
            .filter_map(|channel| ring.channel(channel).ok())
            .map(|channel| {
                let timecode = channel.current_timecode();
                TrackStatus {
                    track: channel.index(),
                    source_name: settings.track(channel.index()).source_name,
                    recording: recording(channel.index()),
                    signal_present: channel.signal_present(),
                    timecode: (!timecode.is_null()).then(|| timecode.to_string()),
                }
            })
            .collect();

        if settings.quad.enabled || recording(channel_count) {
            let primary = tracks
                .iter()
                .take(QUAD_SOURCES)
                .rev()
                .find(|track| track.signal_present);
            tracks.push(TrackStatus {
                track: channel_count,
                source_name: settings.quad.source_name.clone(),
                recording: recording(channel_count),
                signal_present: primary.is_some(),
                timecode: primary.and_then(|track| track.timecode.clone()),
            });
        }
        tracks
    }

    /// Re-reads the settings file. A session in progress keeps its settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no file is configured or it fails to load.
    pub fn update_config(&self) -> Result<()> {
        let path = self
            .settings_path
            .as_ref()
            .ok_or_else(|| Error::Config("No settings file configured".to_string()))?;
        let settings = RecorderSettings::load(path)?;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        self.publish_source_names();
        info!("Reloaded settings from {}", path.display());
        Ok(())
    }

    /// Blocks until the current session completes and returns its report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRecording`] when there is no session to wait for.
    pub fn wait_for_completion(&self) -> Result<CompletionReport> {
        let receiver = self
            .session()
            .as_mut()
            .and_then(RecordingSession::take_completion)
            .ok_or(Error::NotRecording)?;
        let report = futures::executor::block_on(receiver)
            .map_err(|_| Error::Other("Session watcher exited without a report".to_string()))?;
        // Reaps the session.
        drop(self.session());
        Ok(report)
    }

    fn publish_source_names(&self) {
        let settings = self.settings();
        let ring = self.context.ring();
        for channel in 0..ring.channel_count() {
            if let Err(error) = ring.set_source_name(channel, &settings.track(channel).source_name)
            {
                warn!("Failed to publish source name of channel {channel}: {error}");
            }
        }
    }
}

/// Drops a completed session, logging its report if nobody collected it.
fn reap(slot: &mut Option<RecordingSession>) {
    if slot
        .as_ref()
        .is_none_or(|session| session.state() != SessionState::Completed)
    {
        return;
    }
    let Some(mut session) = slot.take() else {
        return;
    };
    let id = session.id();
    match session.take_completion() {
        Some(receiver) => match futures::executor::block_on(receiver) {
            Ok(report) => debug!(
                "Reaped session {id} (success: {}, {} job(s))",
                report.success,
                report.jobs.len()
            ),
            Err(_) => warn!("Reaped session {id} without a report"),
        },
        None => debug!("Reaped session {id}"),
    }
}
