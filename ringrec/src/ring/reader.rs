// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Read side of the shared capture region.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use ringrec_sys::{CONTROL_MAGIC, ControlBlock, JobMonitor, MAX_MONITORED_JOBS, SOURCE_NAME_LEN};
use tracing::{debug, info};

use crate::{
    Error, FrameView, Result, RingGeometry, Timecode, TimecodeSource,
    ring::region::{ControlMapping, RingMapping, control_path, ring_path},
};

/// Retry policy for [`RingAccess::attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachOptions {
    /// Total number of attempts (at least one is always made).
    pub attempts: u32,
    /// Wait after the first failed attempt; doubled after each further failure.
    pub initial_backoff: Duration,
    /// Upper bound for a single wait.
    pub max_backoff: Duration,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Internal shared state of an attached region.
///
/// Separated from [`RingAccess`] so that channel views and monitor slots can outlive the
/// handle they were created from.
pub(crate) struct RegionContext {
    pub(crate) domain: PathBuf,
    pub(crate) control: ControlMapping,
    rings: Vec<RingMapping>,
    pub(crate) geometry: RingGeometry,
}

impl RegionContext {
    pub(crate) fn block(&self) -> &ControlBlock {
        self.control.block()
    }
}

/// Read-only, thread-safe access to the producer's per-channel frame rings.
///
/// `RingAccess` owns no buffering; every accessor reads the producer's latest state. It
/// is cheaply cloneable and `Send + Sync`, so every worker holds its own clone.
///
/// # Examples
///
/// ```no_run
/// use ringrec::{AttachOptions, RingAccess, TimecodeSource};
///
/// # fn main() -> Result<(), ringrec::Error> {
/// let ring = RingAccess::attach("/dev/shm/ringrec", TimecodeSource::Ltc, &AttachOptions::default())?;
/// let channel = ring.channel(0)?;
/// let last = channel.last_frame();
/// println!("channel 0 at frame {last}, timecode {}", channel.timecode(last));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RingAccess {
    context: Arc<RegionContext>,
    source: TimecodeSource,
}

impl RingAccess {
    /// Attaches to the region published in `domain`.
    ///
    /// Retries with a doubling backoff until the control file exists, the producer has
    /// published it and every ring file is present.
    ///
    /// # Arguments
    ///
    /// * `domain` - Directory holding the `control` and `ring_<n>` files
    /// * `source` - Which stored timecode [`Self::timecode`] reports
    /// * `options` - Retry policy
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidGeometry`] if the published layout is unusable (not retried)
    /// - [`Error::AttachFailed`] once all attempts are exhausted
    pub fn attach(
        domain: impl AsRef<Path>,
        source: TimecodeSource,
        options: &AttachOptions,
    ) -> Result<Self> {
        let domain = domain.as_ref();
        let attempts = options.attempts.max(1);
        let mut backoff = options.initial_backoff;
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match Self::try_attach(domain) {
                Ok(context) => {
                    info!(
                        "Attached {} ({} channel(s), ring of {} frames at {})",
                        domain.display(),
                        context.geometry.channels,
                        context.geometry.ring_len,
                        context.geometry.frame_rate
                    );
                    return Ok(Self {
                        context: Arc::new(context),
                        source,
                    });
                }
                Err(error @ Error::InvalidGeometry(_)) => return Err(error),
                Err(error) => {
                    debug!("Attach attempt {attempt}/{attempts} failed: {error}");
                    reason = error.to_string();
                }
            }
            if attempt < attempts {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(options.max_backoff);
            }
        }
        Err(Error::AttachFailed {
            path: domain.to_path_buf(),
            attempts,
            reason,
        })
    }

    fn try_attach(domain: &Path) -> Result<RegionContext> {
        let control = ControlMapping::open(&control_path(domain))?;
        let magic = control.block().magic.load(Ordering::Acquire);
        if magic != CONTROL_MAGIC {
            return Err(Error::Other(format!(
                "region not published (magic {magic:#010x})"
            )));
        }
        let geometry = RingGeometry::from_control(control.block())?;
        let rings = (0..geometry.channels)
            .map(|channel| RingMapping::open(&ring_path(domain, channel), geometry.ring_size()))
            .collect::<Result<Vec<_>>>()?;
        Ok(RegionContext {
            domain: domain.to_path_buf(),
            control,
            rings,
            geometry,
        })
    }

    /// Directory the region was attached from.
    pub fn domain(&self) -> &Path {
        &self.context.domain
    }

    /// Frame geometry validated at attach time.
    pub fn geometry(&self) -> &RingGeometry {
        &self.context.geometry
    }

    pub fn channel_count(&self) -> usize {
        self.context.geometry.channels
    }

    pub fn ring_length(&self) -> usize {
        self.context.geometry.ring_len
    }

    /// Timecode field reported by [`ChannelRing::timecode`].
    pub fn timecode_source(&self) -> TimecodeSource {
        self.source
    }

    /// Returns a copy reading the other timecode field.
    pub fn with_timecode_source(&self, source: TimecodeSource) -> Self {
        Self {
            context: self.context.clone(),
            source,
        }
    }

    /// Returns a view of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelOutOfRange`] if the producer publishes fewer channels.
    pub fn channel(&self, channel: usize) -> Result<ChannelRing<'_>> {
        if channel >= self.channel_count() {
            return Err(Error::ChannelOutOfRange(channel));
        }
        Ok(ChannelRing {
            access: self,
            channel,
        })
    }

    /// Last fully written frame of `channel`, clamped to at least 0.
    pub fn last_frame(&self, channel: usize) -> Result<i64> {
        Ok(self.channel(channel)?.last_frame())
    }

    /// Stored timecode of `frame` on `channel`.
    pub fn timecode(&self, channel: usize, frame: i64) -> Result<Timecode> {
        Ok(self.channel(channel)?.timecode(frame))
    }

    pub fn signal_present(&self, channel: usize) -> Result<bool> {
        Ok(self.channel(channel)?.signal_present())
    }

    /// Source name the recorder published for `channel`.
    pub fn source_name(&self, channel: usize) -> Result<String> {
        self.channel(channel)?;
        let name = &self.context.block().channel[channel].source_name;
        let bytes: Vec<u8> = name
            .iter()
            .map(|byte| byte.load(Ordering::Relaxed))
            .take_while(|&byte| byte != 0)
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Publishes `name` for `channel`, truncated at a character boundary to fit.
    pub fn set_source_name(&self, channel: usize, name: &str) -> Result<()> {
        self.channel(channel)?;
        write_source_name(&self.context.block().channel[channel].source_name, name);
        Ok(())
    }

    /// Returns the monitoring slot `index`, or `None` past the last slot.
    pub fn monitor(&self, index: usize) -> Option<MonitorSlot> {
        (index < MAX_MONITORED_JOBS).then(|| MonitorSlot {
            context: self.context.clone(),
            index,
        })
    }

    /// Clears every monitoring slot.
    pub fn reset_monitors(&self) {
        for index in 0..MAX_MONITORED_JOBS {
            if let Some(slot) = self.monitor(index) {
                slot.reset();
            }
        }
    }
}

pub(crate) fn write_source_name(target: &[AtomicU8; SOURCE_NAME_LEN], name: &str) {
    let mut end = name.len().min(SOURCE_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = &name.as_bytes()[..end];
    for (index, slot) in target.iter().enumerate() {
        slot.store(bytes.get(index).copied().unwrap_or(0), Ordering::Relaxed);
    }
}

/// View of one channel's ring, validated against the channel count.
#[derive(Clone, Copy)]
pub struct ChannelRing<'a> {
    access: &'a RingAccess,
    channel: usize,
}

impl<'a> ChannelRing<'a> {
    pub fn index(&self) -> usize {
        self.channel
    }

    /// Last fully written frame, clamped to at least 0.
    ///
    /// The producer's cursor is a single atomic integer read with acquire ordering, so
    /// every frame up to the returned number is completely visible.
    pub fn last_frame(&self) -> i64 {
        self.raw_last_frame().max(0)
    }

    /// Returns `true` once the producer has written at least one frame.
    pub fn has_frames(&self) -> bool {
        self.raw_last_frame() >= 0
    }

    fn raw_last_frame(&self) -> i64 {
        self.access.context.block().channel[self.channel]
            .last_frame
            .load(Ordering::Acquire) as i64
    }

    /// Frames the capture hardware reported as lost.
    pub fn hardware_dropped(&self) -> i64 {
        self.access.context.block().channel[self.channel]
            .hw_dropped
            .load(Ordering::Relaxed) as i64
    }

    /// Frame element for `frame`; the slot is `frame mod ring_length`.
    pub fn frame(&self, frame: i64) -> FrameView<'a> {
        let context = &*self.access.context;
        let geometry = &context.geometry;
        let slot = frame.rem_euclid(geometry.ring_len as i64) as usize;
        let start = slot * geometry.element_size;
        let element = context.rings[self.channel].slot(start, geometry.element_size);
        FrameView::new(frame, element, geometry)
    }

    /// Stored timecode of `frame` from the configured source; null when unreadable.
    pub fn timecode(&self, frame: i64) -> Timecode {
        self.frame(frame).timecode(self.access.source)
    }

    /// Timecode of the last written frame.
    pub fn current_timecode(&self) -> Timecode {
        if !self.has_frames() {
            return Timecode::null();
        }
        self.timecode(self.last_frame())
    }

    /// Signal flag of the last written frame.
    pub fn signal_present(&self) -> bool {
        self.has_frames() && self.frame(self.last_frame()).signal_ok()
    }
}

/// Snapshot of a monitoring slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub enabled: bool,
    pub recording: bool,
    pub error: bool,
    pub frames_written: u32,
    pub frames_dropped: u32,
    /// Channel index, `None` for the quad composite.
    pub channel: Option<usize>,
}

/// One job's observability slot in the control block.
///
/// Only the owning worker writes to a slot; external status consumers read it.
#[derive(Clone)]
pub struct MonitorSlot {
    context: Arc<RegionContext>,
    index: usize,
}

impl MonitorSlot {
    fn slot(&self) -> &JobMonitor {
        &self.context.block().monitor[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Marks the slot as owned by a job for `channel` (`None` = quad).
    pub fn claim(&self, channel: Option<usize>) {
        let slot = self.slot();
        slot.channel.store(
            channel.map_or(-1, |channel| channel as i32),
            Ordering::Relaxed,
        );
        slot.error.store(0, Ordering::Relaxed);
        slot.frames_written.store(0, Ordering::Relaxed);
        slot.frames_dropped.store(0, Ordering::Relaxed);
        slot.recording.store(0, Ordering::Relaxed);
        slot.enabled.store(1, Ordering::Release);
    }

    pub fn set_recording(&self, recording: bool) {
        self.slot()
            .recording
            .store(recording as u32, Ordering::Relaxed);
    }

    pub fn set_error(&self) {
        self.slot().error.store(1, Ordering::Relaxed);
    }

    pub fn set_counts(&self, written: u64, dropped: u64) {
        let slot = self.slot();
        slot.frames_written
            .store(written.min(u32::MAX as u64) as u32, Ordering::Relaxed);
        slot.frames_dropped
            .store(dropped.min(u32::MAX as u64) as u32, Ordering::Relaxed);
    }

    /// Marks the slot unused.
    pub fn reset(&self) {
        let slot = self.slot();
        slot.enabled.store(0, Ordering::Release);
        slot.recording.store(0, Ordering::Relaxed);
        slot.error.store(0, Ordering::Relaxed);
    }

    pub fn state(&self) -> MonitorState {
        let slot = self.slot();
        let channel = slot.channel.load(Ordering::Relaxed);
        MonitorState {
            enabled: slot.enabled.load(Ordering::Acquire) != 0,
            recording: slot.recording.load(Ordering::Relaxed) != 0,
            error: slot.error.load(Ordering::Relaxed) != 0,
            frames_written: slot.frames_written.load(Ordering::Relaxed),
            frames_dropped: slot.frames_dropped.load(Ordering::Relaxed),
            channel: usize::try_from(channel).ok(),
        }
    }
}
