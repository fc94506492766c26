// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Recording sessions.
//!
//! A session moves through *Configuring*, *Correlating*, *Running*, *Stopping* and
//! *Completed*. Starting correlates the enabled channels, creates one [`EncodeJob`] per
//! (track, encoding) pair and runs one worker thread per job. Stopping only publishes a
//! target duration: every worker ends on its own once it has processed that many frames.
//! A watcher thread joins the workers and delivers a [`CompletionReport`] on a oneshot
//! channel.

mod clock;
mod job;
mod worker;

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    EngineContext, Error, FrameRate, QuadCompositor, RecorderSettings, Result,
    Timecode, UserComments, VideoFormat, WriterRequest,
    correlator::Correlator,
    output::file_stem,
    quad::QUAD_SOURCES,
    settings::OutputKind,
};

pub use clock::{FrameClock, SleepClock};
pub use job::{EncodeJob, JobSource, JobStatus};
pub use worker::RING_SAFETY_MARGIN;

use worker::{Input, Outputs, QuadInput, QuadSource, Worker};

/// Lifecycle of a [`RecordingSession`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Configuring,
    Correlating,
    Running,
    Stopping,
    Completed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Configuring => "configuring",
            SessionState::Correlating => "correlating",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What to record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartRequest {
    /// Requested start timecode, `None` to start now.
    pub start_timecode: Option<Timecode>,
    /// Frames to start before the requested instant.
    pub pre_roll: i64,
    /// Per-track enable flags: one per channel, then the quad track. Missing entries
    /// take the settings' defaults.
    pub enabled: Vec<bool>,
    pub project: String,
}

/// Result of a stop request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopOutcome {
    /// Timecode of the first frame after the recording.
    pub stop_timecode: Timecode,
    /// Target duration in frames, pre- and post-roll included.
    pub duration: i64,
    pub tracks: Vec<TrackOutput>,
}

/// Files one job produces.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TrackOutput {
    pub track: usize,
    pub job: usize,
    pub source_name: String,
    pub paths: Vec<PathBuf>,
}

/// Delivered once every worker of a session has exited.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletionReport {
    pub session_id: Uuid,
    /// No output failed and no frame was dropped.
    pub success: bool,
    pub recording_ok: bool,
    pub dropped_frames: bool,
    pub jobs: Vec<JobStatus>,
}

struct StateLog {
    current: SessionState,
    history: Vec<SessionState>,
}

/// State shared by the session, its workers and its watcher.
pub(crate) struct SessionShared {
    pub(crate) id: Uuid,
    pub(crate) project: String,
    pub(crate) recorder_name: String,
    pub(crate) start_timecode: Timecode,
    pub(crate) frame_rate: FrameRate,
    /// Frames every job records; 0 while unbounded.
    target_duration: Mutex<i64>,
    recording_ok: AtomicBool,
    dropped_frames: AtomicBool,
    comments: Mutex<UserComments>,
    state: Mutex<StateLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionShared {
    fn new(project: String, recorder_name: String, frame_rate: FrameRate) -> Self {
        Self {
            id: Uuid::new_v4(),
            project,
            recorder_name,
            start_timecode: Timecode::null(),
            frame_rate,
            target_duration: Mutex::new(0),
            recording_ok: AtomicBool::new(true),
            dropped_frames: AtomicBool::new(false),
            comments: Mutex::new(UserComments::default()),
            state: Mutex::new(StateLog {
                current: SessionState::Configuring,
                history: vec![SessionState::Configuring],
            }),
        }
    }

    pub(crate) fn target_duration(&self) -> i64 {
        *lock(&self.target_duration)
    }

    pub(crate) fn note_failure(&self) {
        self.recording_ok.store(false, Ordering::Release);
    }

    pub(crate) fn note_dropped(&self) {
        self.dropped_frames.store(true, Ordering::Release);
    }

    pub(crate) fn comments(&self) -> UserComments {
        lock(&self.comments).clone()
    }

    fn recording_ok(&self) -> bool {
        self.recording_ok.load(Ordering::Acquire)
    }

    fn dropped_frames(&self) -> bool {
        self.dropped_frames.load(Ordering::Acquire)
    }

    fn transition(log: &mut StateLog, id: &Uuid, state: SessionState) {
        debug!("Session {id}: {} -> {state}", log.current);
        log.current = state;
        log.history.push(state);
    }

    fn set_state(&self, state: SessionState) {
        Self::transition(&mut lock(&self.state), &self.id, state);
    }

    fn state(&self) -> SessionState {
        lock(&self.state).current
    }
}

/// A prepared job before its worker starts.
struct Prepared {
    job: Arc<EncodeJob>,
    input: Input,
    outputs: Outputs,
}

/// One recording in progress or completed.
pub struct RecordingSession {
    shared: Arc<SessionShared>,
    jobs: Vec<Arc<EncodeJob>>,
    start_frames: Vec<Option<i64>>,
    channel_count: usize,
    completion: Option<oneshot::Receiver<CompletionReport>>,
    watcher: Option<JoinHandle<()>>,
}

impl RecordingSession {
    /// Correlates the enabled channels and starts one worker per encode job.
    ///
    /// The session is *Running* when this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::NoChannelsEnabled`] if no track is enabled or none could be correlated
    /// - [`Error::CorrelationFailed`] / [`Error::RateMismatch`] from correlation
    /// - Encoder and writer creation errors; writers already created are aborted
    pub fn start(
        context: &EngineContext,
        settings: Arc<RecorderSettings>,
        request: StartRequest,
    ) -> Result<Self> {
        let ring = context.ring().with_timecode_source(settings.timecode_source);
        let geometry = *ring.geometry();
        let channel_count = ring.channel_count();
        let mut shared = SessionShared::new(
            request.project.clone(),
            settings.recorder_name.clone(),
            geometry.frame_rate,
        );

        // Configuring
        let enabled: Vec<bool> = (0..channel_count)
            .map(|channel| {
                request
                    .enabled
                    .get(channel)
                    .copied()
                    .unwrap_or_else(|| settings.track(channel).enabled)
            })
            .collect();
        let quad_enabled = request
            .enabled
            .get(channel_count)
            .copied()
            .unwrap_or(settings.quad.enabled);
        if !enabled.iter().any(|&on| on) && !quad_enabled {
            return Err(Error::NoChannelsEnabled);
        }
        for encoding in &settings.encodings {
            std::fs::create_dir_all(&encoding.directory)?;
        }

        // Correlating
        shared.set_state(SessionState::Correlating);
        let correlator = Correlator::new(&ring, settings.search_guard);
        let mut correlated = if enabled.iter().any(|&on| on) {
            correlator.correlate(request.start_timecode, request.pre_roll, &enabled)
        } else {
            Err(Error::NoChannelsEnabled)
        };
        if quad_enabled && channel_count > 0 && matches!(correlated, Err(Error::NoChannelsEnabled)) {
            // The quad track still needs a channel to pace it.
            debug!("Session {}: pacing the quad track from channel 0", shared.id);
            let mut clock = vec![false; channel_count];
            clock[0] = true;
            correlated = correlator.correlate(request.start_timecode, request.pre_roll, &clock);
        }
        let correlation = match correlated {
            Ok(correlation) => correlation,
            Err(error) => {
                shared.set_state(SessionState::Completed);
                warn!("Session {}: start failed: {error}", shared.id);
                return Err(error);
            }
        };
        shared.start_timecode = correlation.start_timecode;
        let shared = Arc::new(shared);
        let start_frames = correlation.start_frames.clone();

        let mut sources: Vec<(JobSource, String, Input)> = Vec::new();
        for (channel, start) in correlation.resolved() {
            if enabled[channel] {
                sources.push((
                    JobSource::Channel(channel),
                    settings.track(channel).source_name,
                    Input::Channel { channel, start },
                ));
            }
        }
        if quad_enabled {
            match quad_input(&settings, &geometry, &start_frames, &enabled) {
                Ok(input) => sources.push((
                    JobSource::Quad,
                    settings.quad.source_name.clone(),
                    Input::Quad(Box::new(input)),
                )),
                Err(error) => warn!("Session {}: skipping quad track: {error}", shared.id),
            }
        }
        if sources.is_empty() {
            shared.set_state(SessionState::Completed);
            return Err(Error::NoChannelsEnabled);
        }

        let prepared = match prepare_jobs(context, &settings, &shared, sources) {
            Ok(prepared) => prepared,
            Err(error) => {
                shared.set_state(SessionState::Completed);
                error!("Session {}: failed to create outputs: {error}", shared.id);
                return Err(error);
            }
        };

        // Running
        let jobs: Vec<Arc<EncodeJob>> = prepared.iter().map(|p| p.job.clone()).collect();
        let mut handles = Vec::with_capacity(prepared.len());
        for Prepared { job, input, outputs } in prepared {
            let worker = Worker::new(
                ring.clone(),
                context.clock().clone(),
                settings.poll_interval(),
                input,
                outputs,
            );
            match std::thread::Builder::new()
                .name(format!("ringrec-job-{}", job.index))
                .spawn(move || worker.run())
            {
                Ok(handle) => handles.push(handle),
                Err(cause) => {
                    error!("Failed to start worker for job {}: {cause}", job.index);
                    shared.note_failure();
                    job.set_finished();
                }
            }
        }
        if handles.is_empty() {
            shared.set_state(SessionState::Completed);
            return Err(Error::Other("No worker could be started".to_string()));
        }
        shared.set_state(SessionState::Running);
        info!(
            "Session {} recording {} job(s) from {}",
            shared.id,
            handles.len(),
            shared.start_timecode
        );

        let (sender, receiver) = oneshot::channel();
        let watcher = {
            let shared = shared.clone();
            let jobs = jobs.clone();
            std::thread::Builder::new()
                .name("ringrec-watcher".to_string())
                .spawn(move || watch(shared, jobs, handles, sender))?
        };

        Ok(Self {
            shared,
            jobs,
            start_frames,
            channel_count,
            completion: Some(receiver),
            watcher: Some(watcher),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Timecode of every job's first frame.
    pub fn start_timecode(&self) -> Timecode {
        self.shared.start_timecode
    }

    /// Correlated start frame per channel.
    pub fn start_frames(&self) -> &[Option<i64>] {
        &self.start_frames
    }

    pub fn jobs(&self) -> &[Arc<EncodeJob>] {
        &self.jobs
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> Vec<SessionState> {
        lock(&self.shared.state).history.clone()
    }

    /// `true` while the given track has a job that has not finished.
    pub fn is_recording(&self, track: usize) -> bool {
        self.jobs
            .iter()
            .any(|job| job.source.track(self.channel_count) == track && !job.is_finished())
    }

    /// Publishes the target duration to every worker.
    ///
    /// # Arguments
    ///
    /// * `stop` - Timecode of the first frame not to record, or `None` to stop now
    /// * `post_roll` - Frames to keep recording after the stop instant
    /// * `comments` - Description and locators written with the files
    ///
    /// # Errors
    ///
    /// - [`Error::NotRecording`] unless the session is running
    /// - [`Error::RateMismatch`] if `stop` does not match the start timecode's rate
    pub fn stop(
        &self,
        stop: Option<Timecode>,
        post_roll: i64,
        comments: UserComments,
    ) -> Result<StopOutcome> {
        let mut state = lock(&self.shared.state);
        if state.current != SessionState::Running {
            return Err(Error::NotRecording);
        }
        let processed = self
            .jobs
            .iter()
            .map(|job| job.frames_processed())
            .max()
            .unwrap_or(0);
        let start = self.shared.start_timecode;
        let duration = stop_duration(&start, stop.as_ref(), post_roll, processed)?;

        *lock(&self.shared.comments) = comments;
        *lock(&self.shared.target_duration) = duration;
        SessionShared::transition(&mut state, &self.shared.id, SessionState::Stopping);
        drop(state);

        let stop_timecode = start.offset(duration);
        info!(
            "Session {} stopping at {stop_timecode} ({duration} frame(s))",
            self.shared.id
        );
        let tracks = self
            .jobs
            .iter()
            .map(|job| TrackOutput {
                track: job.source.track(self.channel_count),
                job: job.index,
                source_name: job.source_name.clone(),
                paths: job.output_paths.clone(),
            })
            .collect();
        Ok(StopOutcome {
            stop_timecode,
            duration,
            tracks,
        })
    }

    /// Takes the completion receiver, leaving the session in place.
    pub(crate) fn take_completion(&mut self) -> Option<oneshot::Receiver<CompletionReport>> {
        self.completion.take()
    }

    /// Blocks until every worker has exited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the report was already taken or the watcher died.
    pub fn wait(&mut self) -> Result<CompletionReport> {
        let receiver = self
            .completion
            .take()
            .ok_or_else(|| Error::Other("Completion already taken".to_string()))?;
        let report = futures::executor::block_on(receiver)
            .map_err(|_| Error::Other("Session watcher exited without a report".to_string()))?;
        if let Some(watcher) = self.watcher.take()
            && watcher.join().is_err()
        {
            error!("Session {} watcher panicked", self.shared.id);
        }
        Ok(report)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        if self.shared.state() == SessionState::Completed {
            if watcher.join().is_err() {
                error!("Session {} watcher panicked", self.shared.id);
            }
        } else {
            // Workers hold their own references and keep recording until the target.
            warn!(
                "Session {} dropped while {}; detaching",
                self.shared.id,
                self.shared.state()
            );
        }
    }
}

/// Target duration for a stop request.
///
/// Stopping now records as far as the furthest job has got plus the post-roll. An
/// explicit stop timecode counts from the start timecode, across midnight if needed.
/// The result is never below one frame.
pub(crate) fn stop_duration(
    start: &Timecode,
    stop: Option<&Timecode>,
    post_roll: i64,
    processed: u64,
) -> Result<i64> {
    let duration = match stop {
        None => processed as i64 + post_roll,
        Some(stop) => {
            if !stop.same_rate(start) {
                return Err(Error::RateMismatch);
            }
            let day = start.frames_per_day();
            let mut frames = stop.frames_since_midnight() - start.frames_since_midnight();
            if frames < -day / 2 {
                frames += day;
            }
            frames + post_roll
        }
    };
    Ok(duration.max(1))
}

fn quad_input(
    settings: &RecorderSettings,
    geometry: &crate::RingGeometry,
    start_frames: &[Option<i64>],
    enabled: &[bool],
) -> Result<QuadInput> {
    let sources: Vec<QuadSource> = start_frames
        .iter()
        .take(QUAD_SOURCES)
        .enumerate()
        .filter(|(channel, _)| enabled[*channel])
        .filter_map(|(channel, start)| {
            start.map(|start| QuadSource {
                quadrant: channel,
                channel,
                start: start + settings.quad.offsets[channel],
            })
        })
        .collect();
    let clock = match sources.first() {
        Some(source) => (source.channel, source.start),
        None => start_frames
            .iter()
            .enumerate()
            .find_map(|(channel, start)| start.map(|start| (channel, start)))
            .ok_or_else(|| Error::CorrelationFailed {
                channel: 0,
                target: "quad clock".to_string(),
            })?,
    };
    Ok(QuadInput {
        sources,
        clock,
        compositor: QuadCompositor::new(geometry.width, geometry.height, settings.quad.filter)?,
        silence: vec![0; geometry.audio_size],
    })
}

fn prepare_jobs(
    context: &EngineContext,
    settings: &RecorderSettings,
    shared: &Arc<SessionShared>,
    sources: Vec<(JobSource, String, Input)>,
) -> Result<Vec<Prepared>> {
    let ring = context.ring();
    let geometry = ring.geometry();
    let date = chrono::Local::now().date_naive();
    let encodings = settings.encodings.len();
    let mut prepared: Vec<Prepared> = Vec::with_capacity(sources.len() * encodings);

    // Each source needs its own input per encoding; the last encoding takes the original.
    let mut pending: Vec<(JobSource, String, Input)> = Vec::new();
    for (source, name, input) in sources {
        for _ in 1..encodings {
            pending.push((source, name.clone(), clone_input(&input, settings, geometry)?));
        }
        pending.push((source, name, input));
    }

    let result = (|| -> Result<()> {
        for (index, (source, source_name, input)) in pending.into_iter().enumerate() {
            let encoding = &settings.encodings[index % encodings];
            let format = encoding.video.chroma_format();
            let (width, height) = match (source, encoding.video) {
                (JobSource::Channel(_), VideoFormat::Yuv420) => {
                    (geometry.sec_width, geometry.sec_height)
                }
                _ => (geometry.width, geometry.height),
            };
            let encoder = format
                .map(|format| context.encoders().create(&encoding.codec, format, width, height))
                .transpose()?;
            let stem = file_stem(
                date,
                &shared.start_timecode,
                &shared.project,
                &settings.recorder_name,
                &source_name,
                index,
            );
            let request = WriterRequest {
                directory: encoding.directory.clone(),
                stem: stem.clone(),
                video_extension: encoder.as_ref().map(|encoder| encoder.extension().to_string()),
                audio_pairs: if encoding.audio { 2 } else { 0 },
                audio_sample_rate: settings.audio_sample_rate,
                staged: encoding.output == OutputKind::Staged,
            };
            let writer = context.writers().create(&request)?;
            let job = Arc::new(EncodeJob::new(
                index,
                source,
                source_name,
                encoding.clone(),
                stem,
                writer.output_paths(),
            ));
            let monitor = ring.monitor(index);
            if let Some(monitor) = &monitor {
                monitor.claim(source.channel());
            }
            debug!("Job {index}: {source:?} -> {}", request.directory.display());
            prepared.push(Prepared {
                job: job.clone(),
                input,
                outputs: Outputs {
                    shared: shared.clone(),
                    job,
                    monitor,
                    encoder,
                    writer: Some(writer),
                    video: format,
                    audio: encoding.audio,
                    burn_in: encoding.burn_timecode.then_some(settings.burn_in),
                    samples_per_frame: geometry.audio_samples_per_frame() as u32,
                },
            });
        }
        Ok(())
    })();

    match result {
        Ok(()) => Ok(prepared),
        Err(error) => {
            for mut entry in prepared {
                if let Some(mut writer) = entry.outputs.writer.take() {
                    writer.abort();
                }
                if let Some(monitor) = &entry.outputs.monitor {
                    monitor.reset();
                }
            }
            Err(error)
        }
    }
}

/// A fresh copy of `input` for another encoding of the same source.
fn clone_input(
    input: &Input,
    settings: &RecorderSettings,
    geometry: &crate::RingGeometry,
) -> Result<Input> {
    Ok(match input {
        Input::Channel { channel, start } => Input::Channel {
            channel: *channel,
            start: *start,
        },
        Input::Quad(quad) => Input::Quad(Box::new(QuadInput {
            sources: quad.sources.clone(),
            clock: quad.clock,
            compositor: QuadCompositor::new(
                geometry.width,
                geometry.height,
                settings.quad.filter,
            )?,
            silence: quad.silence.clone(),
        })),
    })
}

fn watch(
    shared: Arc<SessionShared>,
    jobs: Vec<Arc<EncodeJob>>,
    handles: Vec<JoinHandle<()>>,
    sender: oneshot::Sender<CompletionReport>,
) {
    for handle in handles {
        if handle.join().is_err() {
            error!("Session {}: a worker panicked", shared.id);
            shared.note_failure();
        }
    }
    shared.set_state(SessionState::Completed);

    let recording_ok = shared.recording_ok();
    let dropped_frames = shared.dropped_frames();
    let report = CompletionReport {
        session_id: shared.id,
        success: recording_ok && !dropped_frames,
        recording_ok,
        dropped_frames,
        jobs: jobs.iter().map(|job| job.status()).collect(),
    };
    if report.success {
        info!("Session {} completed", shared.id);
    } else {
        warn!(
            "Session {} completed with errors (recording ok: {recording_ok}, dropped frames: {dropped_frames})",
            shared.id
        );
    }
    if sender.send(report).is_err() {
        debug!("Session {}: nobody waiting for completion", shared.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_now_adds_post_roll_to_the_furthest_job() {
        let start = Timecode::from_text("10:00:00:00", 25);
        assert_eq!(stop_duration(&start, None, 10, 42).unwrap(), 52);
        assert_eq!(stop_duration(&start, None, 0, 0).unwrap(), 1);
    }

    #[test]
    fn stop_timecode_counts_from_the_start() {
        let start = Timecode::from_text("10:00:00:00", 25);
        assert_eq!(
            stop_duration(&start, Some(&start.offset(100)), 10, 0).unwrap(),
            110
        );
        // Before the start: clamped, never an error.
        assert_eq!(stop_duration(&start, Some(&start.offset(-20)), 0, 0).unwrap(), 1);
        assert!(matches!(
            stop_duration(&start, Some(&Timecode::from_text("10:00:10:00", 30)), 0, 0),
            Err(Error::RateMismatch)
        ));
    }

    #[test]
    fn quad_sources_apply_their_offsets() {
        let geometry = crate::RingGeometry::packed(5, 50, FrameRate::PAL, (16, 8), (8, 4), 4);
        let mut settings = RecorderSettings::default();
        settings.quad.offsets = [2, -1, 0, 3];

        let quad = quad_input(
            &settings,
            &geometry,
            &[Some(24), Some(20), None, Some(10), None],
            &[true, true, true, false, false],
        )
        .unwrap();
        let starts: Vec<(usize, i64)> = quad
            .sources
            .iter()
            .map(|source| (source.channel, source.start))
            .collect();
        assert_eq!(starts, vec![(0, 26), (1, 19)]);
        assert_eq!(quad.clock, (0, 26));
        assert_eq!(quad.silence.len(), geometry.audio_size);
    }

    #[test]
    fn quad_without_sources_is_paced_by_any_resolved_channel() {
        let geometry = crate::RingGeometry::packed(5, 50, FrameRate::PAL, (16, 8), (8, 4), 4);
        let settings = RecorderSettings::default();
        let quad = quad_input(
            &settings,
            &geometry,
            &[None, None, None, None, Some(7)],
            &[false, false, false, false, true],
        )
        .unwrap();
        assert!(quad.sources.is_empty());
        assert_eq!(quad.clock, (4, 7));

        assert!(matches!(
            quad_input(&settings, &geometry, &[None; 5], &[false; 5]),
            Err(Error::CorrelationFailed { .. })
        ));
    }

    #[test]
    fn stop_after_midnight_wraps() {
        let start = Timecode::from_text("23:59:59:00", 25);
        let stop = Timecode::from_text("00:00:01:00", 25);
        assert_eq!(stop_duration(&start, Some(&stop), 0, 0).unwrap(), 50);
    }
}
