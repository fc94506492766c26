// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end recording tests.
//!
//! Every test publishes a real shared region in a temporary directory with
//! [`RingProducer`] and records from it. Workers wait on a [`ProducingClock`], which
//! writes the next frame of every channel whenever a worker runs out of frames, so a
//! recording advances exactly as fast as the workers consume it.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use ringrec::{
    BLACK_LUMA, BurnInOptions, ChromaFormat, EncodingSettings, EngineContext, Error, FrameClock,
    FrameRate, JobSource, NEUTRAL_CHROMA, ProjectMetadata, QuadCompositor, Recorder,
    RecorderSettings, RecordingSession, Result, RingAccess, RingGeometry, RingProducer,
    SampleWriter, SessionState, StartRequest, TestPattern, Timecode, TimecodeSource, UserComments,
    WriterFactory, WriterRequest,
    burn::burn_timecode,
    output::{VIDEO_TRACK, wav},
};

use tracing::info;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

const RING_LEN: usize = 50;
const WIDTH: usize = 16;
const HEIGHT: usize = 8;

/// Writes frames on behalf of the capture process whenever a worker waits.
struct ProducingClock {
    producer: RingProducer,
    pattern: TestPattern,
    next: Mutex<Vec<Timecode>>,
    /// Frames written on the first wait instead of one.
    burst: Mutex<Option<usize>>,
}

impl ProducingClock {
    fn new(producer: RingProducer, first: Timecode) -> Self {
        let channels = producer.geometry().channels;
        Self {
            producer,
            pattern: TestPattern::default(),
            next: Mutex::new(vec![first; channels]),
            burst: Mutex::new(None),
        }
    }

    fn with_burst(self, frames: usize) -> Self {
        *self.burst.lock().unwrap() = Some(frames);
        self
    }

    /// Starts `channel` at `first` instead of the common timecode.
    fn with_start(self, channel: usize, first: Timecode) -> Self {
        self.next.lock().unwrap()[channel] = first;
        self
    }

    /// Writes `frames` frames on every channel.
    fn produce(&self, frames: usize) {
        let mut next = self.next.lock().unwrap();
        for _ in 0..frames {
            for (channel, timecode) in next.iter_mut().enumerate() {
                self.pattern
                    .produce(&self.producer, channel, timecode, true)
                    .unwrap();
                *timecode = timecode.offset(1);
            }
        }
    }
}

impl FrameClock for ProducingClock {
    fn wait(&self, _timeout: Duration) {
        let frames = self.burst.lock().unwrap().take().unwrap_or(1);
        self.produce(frames);
        std::thread::sleep(Duration::from_micros(200));
    }
}

/// A temporary region plus an output directory, removed on drop.
struct TestRegion {
    dir: tempfile::TempDir,
    context: EngineContext,
}

impl TestRegion {
    fn new(channels: usize) -> Self {
        Self::with_clock(channels, |clock| clock)
    }

    fn with_clock(channels: usize, configure: impl FnOnce(ProducingClock) -> ProducingClock) -> Self {
        Self::build(channels, (WIDTH, HEIGHT), configure)
    }

    fn sized(channels: usize, size: (usize, usize)) -> Self {
        Self::build(channels, size, |clock| clock)
    }

    fn build(
        channels: usize,
        (width, height): (usize, usize),
        configure: impl FnOnce(ProducingClock) -> ProducingClock,
    ) -> Self {
        LOG_ONCE.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::builder()
                        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                        .from_env_lossy(),
                )
                .init();
        });

        let dir = tempfile::tempdir().unwrap();
        let domain = dir.path().join(format!("domain_{}", uuid::Uuid::new_v4()));
        let geometry = RingGeometry::packed(
            channels,
            RING_LEN,
            FrameRate::PAL,
            (width, height),
            (width / 2, height / 2),
            4,
        );
        let producer = RingProducer::create(&domain, geometry).unwrap();
        let clock = Arc::new(configure(ProducingClock::new(
            producer,
            Timecode::from_text("10:00:00:00", 25),
        )));
        // Frames already captured before the recording starts.
        clock.produce(30);

        let ring = RingAccess::attach(&domain, TimecodeSource::Ltc, &Default::default()).unwrap();
        let context = EngineContext::new(ring).with_clock(clock);
        Self { dir, context }
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("recordings")
    }

    fn settings(&self) -> RecorderSettings {
        RecorderSettings {
            recorder_name: "test-rec".to_string(),
            domain: self.context.ring().domain().to_path_buf(),
            poll_interval_ms: 1,
            encodings: vec![EncodingSettings {
                directory: self.output_dir(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

fn frame_size() -> usize {
    ChromaFormat::Yuv422.frame_size(WIDTH, HEIGHT)
}

/// Records two channels from "now" with pre-roll and stops at an explicit timecode.
#[test]
fn two_channels_record_the_requested_duration() {
    let region = TestRegion::new(2);
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(region.settings()),
        StartRequest {
            pre_roll: 5,
            enabled: vec![true, true],
            project: "Evening News".to_string(),
            ..Default::default()
        },
    )
    .unwrap();
    let start = session.start_timecode();
    // Both channels were filled from 10:00:00:00, newest 10:00:01:04.
    assert_eq!(start, Timecode::from_text("10:00:00:24", 25));
    assert_eq!(session.start_frames(), &[Some(24), Some(24)]);
    assert_eq!(session.state(), SessionState::Running);

    let outcome = session
        .stop(Some(start.offset(100)), 10, UserComments::default())
        .unwrap();
    assert_eq!(outcome.duration, 110);
    assert_eq!(outcome.stop_timecode, start.offset(110));
    assert_eq!(outcome.tracks.len(), 2);
    assert!(matches!(
        session.stop(None, 0, UserComments::default()),
        Err(Error::NotRecording)
    ));

    let jobs = session.jobs().to_vec();
    let report = session.wait().unwrap();
    info!("Completion report: {report:?}");
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        &session.history()[2..],
        &[
            SessionState::Running,
            SessionState::Stopping,
            SessionState::Completed
        ]
    );

    assert_eq!(report.jobs.len(), 2);
    for job in &report.jobs {
        assert_eq!(job.frames_written + job.frames_dropped, 110);
        assert!(job.finished);
    }
    assert!(report.recording_ok);
    for job in jobs {
        assert!(job.is_finished());
        let video = &job.output_paths[0];
        let written = std::fs::metadata(video).unwrap().len() as usize;
        assert_eq!(written, job.frames_written() as usize * frame_size());
        let sidecar: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(job.output_paths.last().unwrap()).unwrap())
                .unwrap();
        assert_eq!(sidecar["metadata"]["project"], "Evening News");
        assert_eq!(sidecar["metadata"]["start_timecode"], "10:00:00:24");
    }
}

#[test]
fn session_states_are_recorded_in_order() {
    let region = TestRegion::new(1);
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(region.settings()),
        StartRequest::default(),
    )
    .unwrap();
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(20)), 0, UserComments::default())
        .unwrap();

    let jobs = session.jobs().to_vec();
    let report = session.wait().unwrap();
    assert_eq!(
        session.history(),
        vec![
            SessionState::Configuring,
            SessionState::Correlating,
            SessionState::Running,
            SessionState::Stopping,
            SessionState::Completed,
        ]
    );
    assert_eq!(report.session_id, session.id());
    assert!(report.success);
    assert_eq!(jobs[0].frames_written(), 20);
    assert_eq!(jobs[0].frames_dropped(), 0);
}

/// A quad track with every source channel disabled stays neutral black.
#[test]
fn quad_without_sources_is_neutral() {
    let region = TestRegion::new(2);
    let mut settings = region.settings();
    settings.quad.enabled = true;
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(settings),
        StartRequest {
            enabled: vec![false, false, true],
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(session.jobs().len(), 1);
    assert_eq!(session.jobs()[0].source, JobSource::Quad);
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(12)), 0, UserComments::default())
        .unwrap();
    let job = session.jobs()[0].clone();
    let report = session.wait().unwrap();
    assert!(report.success);

    let video = std::fs::read(&job.output_paths[0]).unwrap();
    assert_eq!(video.len(), 12 * frame_size());
    for frame in video.chunks_exact(frame_size()) {
        let (luma, chroma) = frame.split_at(WIDTH * HEIGHT);
        assert!(luma.iter().all(|&b| b == BLACK_LUMA));
        assert!(chroma.iter().all(|&b| b == NEUTRAL_CHROMA));
    }
    let audio = std::fs::read(&job.output_paths[1]).unwrap();
    assert!(audio[wav::HEADER_SIZE..].iter().all(|&b| b == 0));
}

/// A quad track with sources places each one in its quadrant.
#[test]
fn quad_places_sources_in_quadrants() {
    let region = TestRegion::new(2);
    let mut settings = region.settings();
    settings.quad.enabled = true;
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(settings),
        StartRequest {
            enabled: vec![true, true, true],
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(session.jobs().len(), 3);
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(4)), 0, UserComments::default())
        .unwrap();
    let quad = session.jobs()[2].clone();
    session.wait().unwrap();

    let video = std::fs::read(&quad.output_paths[0]).unwrap();
    let frame = &video[..frame_size()];
    // VITC lives on line 0; sample the second quarter-height row.
    let row = |y: usize| &frame[y * WIDTH..(y + 1) * WIDTH];
    let luma_0 = TestPattern::channel_luma(0);
    let luma_1 = TestPattern::channel_luma(1);
    assert_eq!(row(2)[..WIDTH / 2], vec![luma_0; WIDTH / 2][..]);
    assert_eq!(row(2)[WIDTH / 2..], vec![luma_1; WIDTH / 2][..]);
    assert!(row(HEIGHT - 1).iter().all(|&b| b == BLACK_LUMA));
}

/// The quad track burns in the timecode of its highest source, read at that source's
/// offset.
#[test]
fn quad_burns_in_the_highest_source_timecode() {
    let (width, height) = (192, 32);
    let region = TestRegion::sized(2, (width, height));
    let mut settings = region.settings();
    settings.quad.enabled = true;
    settings.quad.offsets = [0, -5, 0, 0];
    settings.encodings[0].burn_timecode = true;
    settings.burn_in = BurnInOptions {
        vertical_position: 0.5,
        scale: 1,
    };
    let (filter, burn_in) = (settings.quad.filter, settings.burn_in);
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(settings),
        StartRequest {
            enabled: vec![true, true, true],
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(session.start_frames(), &[Some(29), Some(29)]);
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(2)), 0, UserComments::default())
        .unwrap();
    let quad = session.jobs()[2].clone();
    assert_eq!(quad.source, JobSource::Quad);
    assert!(session.wait().unwrap().success);

    let ring = region.context.ring();
    let expected = |timecode: &Timecode| {
        let mut compositor = QuadCompositor::new(width, height, filter).unwrap();
        compositor
            .place(0, &ring.channel(0).unwrap().frame(29).primary())
            .unwrap();
        compositor
            .place(1, &ring.channel(1).unwrap().frame(24).primary())
            .unwrap();
        let mut picture = compositor.picture().as_ref().to_owned();
        burn_timecode(&mut picture, timecode, &burn_in);
        let picture = picture.as_ref();
        [picture.y, picture.u, picture.v].concat()
    };
    // Channel 1 is read five frames early.
    let primary = ring.timecode(1, 24).unwrap();
    assert_eq!(primary, start.offset(-5));

    let video = std::fs::read(&quad.output_paths[0]).unwrap();
    let size = ChromaFormat::Yuv422.frame_size(width, height);
    let first = &video[..size];
    assert_eq!(first, &expected(&primary)[..]);
    assert_ne!(first, &expected(&start)[..]);
}

/// A quad track without sources does not need channel 0 when another enabled channel
/// resolves.
#[test]
fn quad_is_paced_by_another_channel_when_channel_zero_lags() {
    let region = TestRegion::with_clock(5, |clock| {
        clock.with_start(0, Timecode::from_text("11:00:00:00", 25))
    });
    let mut settings = region.settings();
    settings.quad.enabled = true;
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(settings),
        StartRequest {
            enabled: vec![false, false, false, false, true, true],
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(session.start_timecode(), Timecode::from_text("10:00:01:04", 25));
    assert_eq!(
        session.start_frames(),
        &[None, None, None, None, Some(29)]
    );
    let sources: Vec<JobSource> = session.jobs().iter().map(|job| job.source).collect();
    assert_eq!(sources, vec![JobSource::Channel(4), JobSource::Quad]);

    let start = session.start_timecode();
    session
        .stop(Some(start.offset(6)), 0, UserComments::default())
        .unwrap();
    let report = session.wait().unwrap();
    assert!(report.success);
    for job in &report.jobs {
        assert_eq!(job.frames_written, 6);
    }
}

struct FailingWriterFactory {
    fail_at: usize,
    video_writes: Arc<AtomicUsize>,
    aborted: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
}

struct FailingWriter {
    fail_at: usize,
    samples: usize,
    video_writes: Arc<AtomicUsize>,
    aborted: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
}

impl WriterFactory for FailingWriterFactory {
    fn create(&self, _request: &WriterRequest) -> Result<Box<dyn SampleWriter>> {
        Ok(Box::new(FailingWriter {
            fail_at: self.fail_at,
            samples: 0,
            video_writes: self.video_writes.clone(),
            aborted: self.aborted.clone(),
            finalized: self.finalized.clone(),
        }))
    }
}

impl SampleWriter for FailingWriter {
    fn write_sample(&mut self, track: usize, _sample_count: u32, _data: &[u8]) -> Result<()> {
        if track != VIDEO_TRACK {
            return Ok(());
        }
        self.samples += 1;
        if self.samples == self.fail_at {
            return Err(Error::Write("disk full".to_string()));
        }
        self.video_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn complete_and_finalize(
        &mut self,
        _comments: &UserComments,
        _metadata: &ProjectMetadata,
    ) -> Result<()> {
        self.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// A writer failing mid-recording is disabled; the job still runs to its target.
#[test]
fn writer_failure_is_surfaced_at_completion() {
    let region = TestRegion::new(1);
    let factory = FailingWriterFactory {
        fail_at: 50,
        video_writes: Arc::new(AtomicUsize::new(0)),
        aborted: Arc::new(AtomicBool::new(false)),
        finalized: Arc::new(AtomicBool::new(false)),
    };
    let video_writes = factory.video_writes.clone();
    let aborted = factory.aborted.clone();
    let finalized = factory.finalized.clone();
    let context = region.context.clone().with_writers(Arc::new(factory));

    let mut session =
        RecordingSession::start(&context, Arc::new(region.settings()), StartRequest::default())
            .unwrap();
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(100)), 0, UserComments::default())
        .unwrap();
    let report = session.wait().unwrap();

    assert_eq!(report.jobs[0].frames_written, 100);
    assert_eq!(report.jobs[0].frames_dropped, 0);
    assert!(!report.recording_ok);
    assert!(!report.success);
    assert_eq!(video_writes.load(Ordering::SeqCst), 49);
    assert!(aborted.load(Ordering::SeqCst));
    assert!(!finalized.load(Ordering::SeqCst));

    let monitor = context.ring().monitor(0).unwrap().state();
    assert!(monitor.error);
    assert!(!monitor.recording);
    assert_eq!(monitor.frames_written, 100);
}

/// A worker a full ring behind drops exactly the frames beyond the safety margin.
#[test]
fn backlog_of_a_full_ring_drops_three_frames() {
    let region = TestRegion::with_clock(1, |clock| clock.with_burst(RING_LEN));
    let mut session = RecordingSession::start(
        &region.context,
        Arc::new(region.settings()),
        StartRequest::default(),
    )
    .unwrap();
    let start = session.start_timecode();
    session
        .stop(Some(start.offset(60)), 0, UserComments::default())
        .unwrap();
    let report = session.wait().unwrap();

    let job = &report.jobs[0];
    assert_eq!(job.frames_dropped, 3);
    assert_eq!(job.frames_written, 57);
    assert!(report.dropped_frames);
    assert!(report.recording_ok);
    assert!(!report.success);
}

#[test]
fn correlation_failure_starts_nothing() {
    let region = TestRegion::new(1);
    let result = RecordingSession::start(
        &region.context,
        Arc::new(region.settings()),
        StartRequest {
            start_timecode: Some(Timecode::from_text("09:00:00:00", 25)),
            ..Default::default()
        },
    );
    assert!(matches!(
        result,
        Err(Error::CorrelationFailed { channel: 0, .. })
    ));
    assert!(!region.context.ring().monitor(0).unwrap().state().enabled);
    assert!(is_empty(&region.output_dir()));
}

fn is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

/// The control surface: start, busy, status, stop and completion.
#[test]
fn recorder_runs_one_session_at_a_time() {
    let region = TestRegion::new(2);
    let mut settings = region.settings();
    settings.tracks = vec![
        ringrec::TrackSettings {
            source_name: "CAM 1".to_string(),
            enabled: true,
        },
        ringrec::TrackSettings {
            source_name: "CAM 2".to_string(),
            enabled: false,
        },
    ];
    let recorder = Recorder::new(region.context.clone(), settings);
    assert_eq!(region.context.ring().source_name(1).unwrap(), "CAM 2");
    assert!(matches!(
        recorder.stop(None, 0, UserComments::default()),
        Err(Error::NotRecording)
    ));

    let start = recorder.start(StartRequest::default()).unwrap();
    assert!(matches!(
        recorder.start(StartRequest::default()),
        Err(Error::Busy)
    ));
    let status = recorder.tracks_status();
    assert_eq!(status.len(), 2);
    assert!(status[0].recording);
    assert!(!status[1].recording);
    assert!(status[1].signal_present);
    assert!(status[0].timecode.is_some());

    let outcome = recorder
        .stop(Some(start.offset(10)), 0, UserComments::default())
        .unwrap();
    assert_eq!(outcome.tracks.len(), 1);
    assert_eq!(outcome.tracks[0].source_name, "CAM 1");
    let report = recorder.wait_for_completion().unwrap();
    assert!(report.success);
    assert_eq!(recorder.session_state(), None);
    assert!(!recorder.tracks_status()[0].recording);

    // Idle again: a new session may start.
    recorder.start(StartRequest::default()).unwrap();
    recorder.stop(None, 0, UserComments::default()).unwrap();
    recorder.wait_for_completion().unwrap();
}

#[test]
fn update_config_requires_a_settings_file() {
    let region = TestRegion::new(1);
    let recorder = Recorder::new(region.context.clone(), region.settings());
    assert!(matches!(recorder.update_config(), Err(Error::Config(_))));

    let path = region.dir.path().join("ringrec.json");
    std::fs::write(
        &path,
        r#"{"recorder_name": "reloaded", "tracks": [{"source_name": "Studio"}]}"#,
    )
    .unwrap();
    let recorder = recorder.with_settings_path(&path);
    recorder.update_config().unwrap();
    assert_eq!(recorder.settings().recorder_name, "reloaded");
    assert_eq!(region.context.ring().source_name(0).unwrap(), "Studio");
}
