// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-job record and encode loop.
//!
//! Each worker follows its ring(s) from the correlated start frame, drops frames when it
//! falls too far behind, and stops once the session's target duration is reached. It
//! never returns an error: faults become counters, flags and monitor fields.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, trace, warn};

use crate::{
    BurnInOptions, ChromaFormat, Encoder, FrameClock, MonitorSlot, PictureRef, ProjectMetadata,
    QuadCompositor, RingAccess, SampleWriter, Timecode,
    burn::burn_timecode,
    output::{VIDEO_TRACK, audio_track},
    session::{EncodeJob, SessionShared},
};

/// Frames kept between the producer's newest frame and the oldest frame a worker may
/// still read.
pub const RING_SAFETY_MARGIN: i64 = 3;

/// One quad quadrant's source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QuadSource {
    pub(crate) quadrant: usize,
    pub(crate) channel: usize,
    /// Correlated start frame plus the configured per-source offset.
    pub(crate) start: i64,
}

pub(crate) struct QuadInput {
    pub(crate) sources: Vec<QuadSource>,
    /// Channel pacing the composite when no source is enabled.
    pub(crate) clock: (usize, i64),
    pub(crate) compositor: QuadCompositor,
    /// Silence used for audio when no source is enabled.
    pub(crate) silence: Vec<u8>,
}

impl QuadInput {
    /// The source whose timecode and audio the composite carries: the highest enabled one.
    fn primary(&self) -> Option<&QuadSource> {
        self.sources.iter().max_by_key(|source| source.channel)
    }
}

pub(crate) enum Input {
    Channel { channel: usize, start: i64 },
    Quad(Box<QuadInput>),
}

impl Input {
    /// Frames a quad job keeps in reserve for slower peer channels.
    fn guard(&self) -> i64 {
        match self {
            Input::Channel { .. } => 1,
            Input::Quad(_) => 2,
        }
    }

    /// (channel, first frame) pairs this input reads.
    fn cursors(&self) -> Vec<(usize, i64)> {
        match self {
            Input::Channel { channel, start } => vec![(*channel, *start)],
            Input::Quad(quad) => quad
                .sources
                .iter()
                .map(|source| (source.channel, source.start))
                .chain(std::iter::once(quad.clock))
                .collect(),
        }
    }
}

/// Encoder and writer of one job, disabled independently on failure.
pub(crate) struct Outputs {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) job: Arc<EncodeJob>,
    pub(crate) monitor: Option<MonitorSlot>,
    pub(crate) encoder: Option<Box<dyn Encoder>>,
    pub(crate) writer: Option<Box<dyn SampleWriter>>,
    /// Picture format handed to the encoder, `None` for audio-only jobs.
    pub(crate) video: Option<ChromaFormat>,
    pub(crate) audio: bool,
    pub(crate) burn_in: Option<BurnInOptions>,
    pub(crate) samples_per_frame: u32,
}

impl Outputs {
    fn write_picture(&mut self, picture: &PictureRef<'_>, timecode: &Timecode) {
        let Some(format) = self.video else {
            return;
        };
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let converted = match (format, picture.format) {
            (ChromaFormat::Yuv420, ChromaFormat::Yuv422) => Some(picture.to_yuv420()),
            _ => None,
        };
        let mut burnt = match self.burn_in {
            Some(_) => Some(converted.unwrap_or_else(|| picture.to_owned())),
            None => converted,
        };
        if let (Some(options), Some(burnt)) = (&self.burn_in, burnt.as_mut()) {
            burn_timecode(burnt, timecode, options);
        }
        let picture = burnt.as_ref().map_or(*picture, |owned| owned.as_ref());

        let result = match encoder.encode(&picture) {
            Ok(bytes) => match self.writer.as_mut() {
                Some(writer) => writer
                    .write_sample(VIDEO_TRACK, 1, bytes)
                    .map_err(Fault::Writer),
                None => Ok(()),
            },
            Err(error) => Err(Fault::Encoder(error)),
        };
        if let Err(fault) = result {
            self.handle(fault);
        }
    }

    fn write_audio(&mut self, pair: usize, samples: &[u8]) {
        if !self.audio {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(error) = writer.write_sample(audio_track(pair), self.samples_per_frame, samples) {
            self.handle(Fault::Writer(error));
        }
    }

    fn handle(&mut self, fault: Fault) {
        match fault {
            Fault::Encoder(cause) => {
                error!(
                    "Job {}: encoder failed, disabling video: {cause}",
                    self.job.index
                );
                self.encoder = None;
            }
            Fault::Writer(cause) => {
                error!(
                    "Job {}: writer failed, disabling output: {cause}",
                    self.job.index
                );
                if let Some(mut writer) = self.writer.take() {
                    writer.abort();
                }
            }
        }
        self.shared.note_failure();
        if let Some(monitor) = &self.monitor {
            monitor.set_error();
        }
    }

    fn finalize(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let comments = self.shared.comments();
        let metadata = ProjectMetadata {
            session_id: self.shared.id,
            project: self.shared.project.clone(),
            recorder_name: self.shared.recorder_name.clone(),
            source_name: self.job.source_name.clone(),
            start_timecode: self.shared.start_timecode.to_string(),
            frame_rate: self.shared.frame_rate,
            frames_written: self.job.frames_written(),
            frames_dropped: self.job.frames_dropped(),
        };
        if let Err(cause) = writer.complete_and_finalize(&comments, &metadata) {
            error!("Job {}: failed to finalize output: {cause}", self.job.index);
            writer.abort();
            self.shared.note_failure();
            if let Some(monitor) = &self.monitor {
                monitor.set_error();
            }
        }
    }
}

enum Fault {
    Encoder(crate::Error),
    Writer(crate::Error),
}

/// The record loop of one encode job.
pub(crate) struct Worker {
    pub(crate) ring: RingAccess,
    pub(crate) clock: Arc<dyn FrameClock>,
    pub(crate) poll_interval: Duration,
    pub(crate) input: Input,
    pub(crate) outputs: Outputs,
    /// Frames processed (written or dropped) so far; the next frame is `start + saved`.
    pub(crate) saved: i64,
    pub(crate) last_timecode: Option<Timecode>,
}

impl Worker {
    pub(crate) fn new(
        ring: RingAccess,
        clock: Arc<dyn FrameClock>,
        poll_interval: Duration,
        input: Input,
        outputs: Outputs,
    ) -> Self {
        Self {
            ring,
            clock,
            poll_interval,
            input,
            outputs,
            saved: 0,
            last_timecode: None,
        }
    }

    /// Runs until the session's target duration is reached, then finalizes the outputs.
    pub(crate) fn run(mut self) {
        let job = self.outputs.job.clone();
        let shared = self.outputs.shared.clone();
        debug!("Job {} ({:?}) started", job.index, job.source);
        if let Some(monitor) = &self.outputs.monitor {
            monitor.set_recording(true);
        }

        let ring_len = self.ring.ring_length() as i64;
        let guard = self.input.guard();
        loop {
            let target = shared.target_duration();
            if target_reached(target, job.frames_processed()) {
                break;
            }
            let available = self.available();
            if available < guard {
                self.clock.wait(self.poll_interval);
                continue;
            }
            let mut pending = available - (guard - 1);

            let excess = overflow(pending, ring_len, remaining(target, job.frames_processed()));
            if excess > 0 {
                warn!(
                    "Job {}: {pending} frame(s) behind, dropping {excess}",
                    job.index
                );
                self.saved += excess;
                job.add_dropped(excess as u64);
                shared.note_dropped();
                self.update_monitor();
                pending -= excess;
            }

            for _ in 0..pending {
                if target_reached(shared.target_duration(), job.frames_processed()) {
                    break;
                }
                self.record_frame();
                self.saved += 1;
                job.add_written(1);
                self.update_monitor();
            }
        }

        self.outputs.finalize();
        if let Some(monitor) = &self.outputs.monitor {
            monitor.set_recording(false);
        }
        job.set_finished();
        info!(
            "Job {} finished: {} written, {} dropped",
            job.index,
            job.frames_written(),
            job.frames_dropped()
        );
    }

    /// Unprocessed frames on the slowest channel this job reads.
    fn available(&self) -> i64 {
        self.input
            .cursors()
            .into_iter()
            .map(|(channel, start)| {
                let last = self
                    .ring
                    .channel(channel)
                    .map(|ring| ring.last_frame())
                    .unwrap_or(-1);
                last - (start + self.saved - 1)
            })
            .min()
            .unwrap_or(0)
    }

    fn update_monitor(&self) {
        if let Some(monitor) = &self.outputs.monitor {
            monitor.set_counts(
                self.outputs.job.frames_written(),
                self.outputs.job.frames_dropped(),
            );
        }
    }

    fn check_continuity(&mut self, timecode: Timecode) {
        if let Some(previous) = self.last_timecode
            && !previous.is_null()
            && !timecode.is_null()
            && timecode != previous.offset(1)
        {
            warn!(
                "Job {}: timecode discontinuity {previous} -> {timecode}",
                self.outputs.job.index
            );
        }
        self.last_timecode = Some(timecode);
    }

    fn record_frame(&mut self) {
        let ring = self.ring.clone();
        let source = ring.timecode_source();
        let format = self.outputs.video.unwrap_or(ChromaFormat::Yuv422);
        match &mut self.input {
            Input::Channel { channel, start } => {
                let Ok(channel_ring) = ring.channel(*channel) else {
                    return;
                };
                let frame = channel_ring.frame(*start + self.saved);
                let timecode = frame.timecode(source);
                trace!("Job {}: frame {} at {timecode}", self.outputs.job.index, frame.number);
                self.outputs.write_picture(&frame.picture(format), &timecode);
                for pair in 0..2 {
                    self.outputs.write_audio(pair, frame.audio(pair));
                }
                self.check_continuity(timecode);
            }
            Input::Quad(quad) => {
                for source_spec in &quad.sources {
                    let Ok(channel_ring) = ring.channel(source_spec.channel) else {
                        continue;
                    };
                    let frame = channel_ring.frame(source_spec.start + self.saved);
                    if let Err(cause) = quad.compositor.place(source_spec.quadrant, &frame.primary()) {
                        warn!("Quad source {}: {cause}", source_spec.channel);
                    }
                }
                let primary = quad
                    .primary()
                    .and_then(|source| Some((ring.channel(source.channel).ok()?, source.start)));
                let timecode = match &primary {
                    Some((channel_ring, start)) => channel_ring.frame(start + self.saved).timecode(source),
                    None => self.outputs.shared.start_timecode.offset(self.saved),
                };
                self.outputs
                    .write_picture(&quad.compositor.picture().as_ref(), &timecode);
                for pair in 0..2 {
                    match &primary {
                        Some((channel_ring, start)) => {
                            let frame = channel_ring.frame(start + self.saved);
                            self.outputs.write_audio(pair, frame.audio(pair));
                        }
                        None => self.outputs.write_audio(pair, &quad.silence),
                    }
                }
                self.check_continuity(timecode);
            }
        }
    }
}

/// Returns `true` once a positive target has been met.
fn target_reached(target: i64, processed: u64) -> bool {
    target > 0 && processed as i64 >= target
}

/// Frames still needed to meet a positive target, `None` while unbounded.
fn remaining(target: i64, processed: u64) -> Option<i64> {
    (target > 0).then(|| (target - processed as i64).max(0))
}

/// Frames to drop from a backlog of `pending` so that at most `ring_len - 3` remain,
/// never dropping beyond the remaining target.
pub(crate) fn overflow(pending: i64, ring_len: i64, remaining: Option<i64>) -> i64 {
    let excess = (pending - (ring_len - RING_SAFETY_MARGIN)).max(0);
    match remaining {
        Some(remaining) => excess.min(remaining),
        None => excess,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EncodingSettings, FrameRate, QuadFilter, RingGeometry, RingProducer, SleepClock,
        TestPattern, TimecodeSource, session::JobSource,
    };
    use tracing_test::traced_test;

    /// Two channels of fifteen frames. Channel 0 jumps five seconds after its fifth
    /// frame, channel 1 runs on from 11:00:00:00.
    fn jumping_region() -> (tempfile::TempDir, RingProducer, RingAccess) {
        let dir = tempfile::tempdir().unwrap();
        let geometry = RingGeometry::packed(2, 50, FrameRate::PAL, (16, 8), (8, 4), 4);
        let producer = RingProducer::create(dir.path(), geometry).unwrap();
        let pattern = TestPattern::default();
        let before = Timecode::from_text("10:00:00:00", 25);
        let after = Timecode::from_text("10:00:05:00", 25);
        let steady = Timecode::from_text("11:00:00:00", 25);
        for i in 0..15 {
            let jumping = if i < 5 { before.offset(i) } else { after.offset(i - 5) };
            pattern.produce(&producer, 0, &jumping, true).unwrap();
            pattern.produce(&producer, 1, &steady.offset(i), true).unwrap();
        }
        let ring = RingAccess::attach(dir.path(), TimecodeSource::Ltc, &Default::default()).unwrap();
        (dir, producer, ring)
    }

    /// Runs a worker without encoder or writer until `target` frames are processed.
    fn record(ring: &RingAccess, source: JobSource, input: Input, target: i64) -> Arc<EncodeJob> {
        let shared = Arc::new(SessionShared::new(
            String::new(),
            "test-rec".to_string(),
            FrameRate::PAL,
        ));
        *shared.target_duration.lock().unwrap() = target;
        let job = Arc::new(EncodeJob::new(
            0,
            source,
            "CAM".to_string(),
            EncodingSettings::default(),
            "stem".to_string(),
            Vec::new(),
        ));
        let outputs = Outputs {
            shared,
            job: job.clone(),
            monitor: None,
            encoder: None,
            writer: None,
            video: None,
            audio: false,
            burn_in: None,
            samples_per_frame: 4,
        };
        Worker::new(
            ring.clone(),
            Arc::new(SleepClock),
            Duration::from_millis(1),
            input,
            outputs,
        )
        .run();
        job
    }

    fn quad(sources: Vec<QuadSource>) -> Input {
        let clock = sources
            .first()
            .map_or((0, 0), |source| (source.channel, source.start));
        Input::Quad(Box::new(QuadInput {
            sources,
            clock,
            compositor: QuadCompositor::new(16, 8, QuadFilter::default()).unwrap(),
            silence: vec![0; 16],
        }))
    }

    #[traced_test]
    #[test]
    fn timecode_jump_is_reported() {
        let (_dir, _producer, ring) = jumping_region();
        let job = record(
            &ring,
            JobSource::Channel(0),
            Input::Channel {
                channel: 0,
                start: 0,
            },
            10,
        );
        assert_eq!(job.frames_written(), 10);
        assert_eq!(job.frames_dropped(), 0);
        assert!(logs_contain(
            "Job 0: timecode discontinuity 10:00:00:04 -> 10:00:05:00"
        ));
    }

    /// The composite follows the highest source's timecode; a jump on a lower source
    /// goes unnoticed.
    #[traced_test]
    #[test]
    fn quad_timecode_follows_the_highest_source() {
        let (_dir, _producer, ring) = jumping_region();
        let sources = vec![
            QuadSource {
                quadrant: 0,
                channel: 0,
                start: 0,
            },
            QuadSource {
                quadrant: 1,
                channel: 1,
                start: 2,
            },
        ];
        let job = record(&ring, JobSource::Quad, quad(sources), 10);
        assert_eq!(job.frames_written(), 10);
        assert!(!logs_contain("timecode discontinuity"));
    }

    #[traced_test]
    #[test]
    fn quad_with_a_single_jumping_source_reports_it() {
        let (_dir, _producer, ring) = jumping_region();
        let sources = vec![QuadSource {
            quadrant: 0,
            channel: 0,
            start: 0,
        }];
        record(&ring, JobSource::Quad, quad(sources), 10);
        assert!(logs_contain("timecode discontinuity 10:00:00:04 -> 10:00:05:00"));
    }

    #[test]
    fn full_ring_backlog_drops_three() {
        let ring_len = 50;
        assert_eq!(overflow(ring_len, ring_len, None), 3);
        assert_eq!(overflow(ring_len - 3, ring_len, None), 0);
        assert_eq!(overflow(80, ring_len, None), 33);
    }

    #[test]
    fn drops_stop_at_the_target() {
        assert_eq!(overflow(50, 50, Some(2)), 2);
        assert_eq!(overflow(50, 50, Some(0)), 0);
        assert_eq!(remaining(0, 10), None);
        assert_eq!(remaining(12, 10), Some(2));
        assert!(target_reached(10, 10));
        assert!(!target_reached(0, 10));
    }
}
