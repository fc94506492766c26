// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Cross-channel timecode correlation.
//!
//! Turns "start at this timecode" or "start now" plus a pre-roll into one canonical
//! start timecode and one start frame per channel, so that every channel's start frame
//! carries the same timecode.

use tracing::{debug, info, warn};

use crate::{ChannelRing, Error, Result, RingAccess, Timecode};

/// Ring slots kept out of the search by default, so the chosen start frame survives
/// until the workers read it.
pub const DEFAULT_SEARCH_GUARD: usize = 5;

/// Furthest a requested timecode may lie beyond the newest frame and still be
/// predicted instead of failing.
pub const MAX_LOOKAHEAD: i64 = 4;

/// Result of a successful correlation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correlation {
    /// Timecode of every resolved channel's start frame (pre-roll applied).
    pub start_timecode: Timecode,
    /// Start frame per channel; `None` for channels that are disabled or were excluded.
    pub start_frames: Vec<Option<i64>>,
}

impl Correlation {
    /// Channels that take part in the recording.
    pub fn resolved(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.start_frames
            .iter()
            .enumerate()
            .filter_map(|(channel, frame)| frame.map(|frame| (channel, frame)))
    }
}

/// Finds synchronized start frames across channels.
pub struct Correlator<'a> {
    ring: &'a RingAccess,
    search_guard: usize,
}

impl<'a> Correlator<'a> {
    pub fn new(ring: &'a RingAccess, search_guard: usize) -> Self {
        Self { ring, search_guard }
    }

    /// Correlates the channels flagged in `enabled`.
    ///
    /// # Arguments
    ///
    /// * `target` - Requested start timecode, or `None` to start now
    /// * `pre_roll` - Frames to start before the target
    /// * `enabled` - Per-channel enable flags; missing entries count as disabled
    ///
    /// When starting now, the target is the earliest current timecode across enabled
    /// channels with signal, so that no channel is asked for a frame it has not seen.
    /// A channel without signal whose target cannot be found is dropped from the
    /// recording.
    ///
    /// # Errors
    ///
    /// - [`Error::NoChannelsEnabled`] if no channel is enabled, or none could be resolved
    /// - [`Error::RateMismatch`] if `target` does not match the ring's rate
    /// - [`Error::CorrelationFailed`] if a channel with signal has no frame at the target
    pub fn correlate(
        &self,
        target: Option<Timecode>,
        pre_roll: i64,
        enabled: &[bool],
    ) -> Result<Correlation> {
        let channels: Vec<ChannelRing<'_>> = (0..self.ring.channel_count())
            .filter(|&channel| enabled.get(channel).copied().unwrap_or(false))
            .map(|channel| self.ring.channel(channel))
            .collect::<Result<_>>()?;
        if channels.is_empty() {
            return Err(Error::NoChannelsEnabled);
        }

        let target = match target {
            Some(target) => target,
            None => self.current_target(&channels)?,
        };
        if let Some(reference) = channels.iter().map(|ch| ch.current_timecode()).find(|tc| !tc.is_null())
            && !reference.same_rate(&target)
        {
            return Err(Error::RateMismatch);
        }
        let start_timecode = target.offset(-pre_roll);
        debug!("Correlating {} channel(s) at {start_timecode}", channels.len());

        let mut start_frames = vec![None; self.ring.channel_count()];
        for channel in &channels {
            match self.search(channel, &start_timecode) {
                Some(frame) => {
                    debug!("Channel {} starts at frame {frame}", channel.index());
                    start_frames[channel.index()] = Some(frame);
                }
                None if !channel.signal_present() => {
                    warn!(
                        "Channel {} has no signal and no frame at {start_timecode}; excluding it",
                        channel.index()
                    );
                }
                None => {
                    return Err(Error::CorrelationFailed {
                        channel: channel.index(),
                        target: start_timecode.to_string(),
                    });
                }
            }
        }
        if start_frames.iter().all(Option::is_none) {
            warn!("No channel could be correlated at {start_timecode}");
            return Err(Error::NoChannelsEnabled);
        }
        info!("Correlated start at {start_timecode}");
        Ok(Correlation {
            start_timecode,
            start_frames,
        })
    }

    /// Earliest current timecode across channels with signal, falling back to every
    /// channel with a readable timecode.
    ///
    /// Timecodes are ordered relative to each other around midnight, so 23:59:59:24
    /// comes before 00:00:00:10.
    fn current_target(&self, channels: &[ChannelRing<'_>]) -> Result<Timecode> {
        let earliest = |with_signal: bool| {
            channels
                .iter()
                .filter(|ch| !with_signal || ch.signal_present())
                .map(|ch| ch.current_timecode())
                .filter(|tc| !tc.is_null())
                .reduce(|earliest, tc| {
                    if tc.same_rate(&earliest) && wrapped_difference(&tc, &earliest) < 0 {
                        tc
                    } else {
                        earliest
                    }
                })
        };
        earliest(true).or_else(|| earliest(false)).ok_or_else(|| {
            Error::CorrelationFailed {
                channel: channels[0].index(),
                target: Timecode::null().to_string(),
            }
        })
    }

    /// Scans `channel` backwards from its newest frame for `target`.
    fn search(&self, channel: &ChannelRing<'_>, target: &Timecode) -> Option<i64> {
        if !channel.has_frames() {
            return None;
        }
        let last = channel.last_frame();
        let window = self
            .ring
            .ring_length()
            .saturating_sub(self.search_guard)
            .max(1) as i64;
        for back in 0..window {
            let frame = last - back;
            if frame < 0 {
                break;
            }
            if channel.timecode(frame) == *target {
                return Some(frame);
            }
        }

        // The target may not have been captured yet.
        let newest = channel.timecode(last);
        if !newest.same_rate(target) {
            return None;
        }
        let ahead = wrapped_difference(target, &newest);
        if (1..=MAX_LOOKAHEAD).contains(&ahead) {
            warn!(
                "Channel {}: {target} is {ahead} frame(s) beyond the newest frame {newest}; predicting frame {}",
                channel.index(),
                last + ahead
            );
            return Some(last + ahead);
        }
        None
    }
}

/// `later - earlier` in frames, taking the shorter way around midnight.
pub(crate) fn wrapped_difference(later: &Timecode, earlier: &Timecode) -> i64 {
    let day = later.frames_per_day();
    let diff = (later.frames_since_midnight() - earlier.frames_since_midnight()).rem_euclid(day);
    if diff >= day / 2 { diff - day } else { diff }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameRate, RingGeometry, RingProducer, TestPattern, TimecodeSource};
    use tracing_test::traced_test;

    fn region(channels: usize) -> (tempfile::TempDir, RingProducer, RingAccess) {
        let dir = tempfile::tempdir().unwrap();
        let geometry = RingGeometry::packed(channels, 50, FrameRate::PAL, (16, 8), (8, 4), 4);
        let producer = RingProducer::create(dir.path(), geometry).unwrap();
        let ring = RingAccess::attach(dir.path(), TimecodeSource::Ltc, &Default::default()).unwrap();
        (dir, producer, ring)
    }

    fn feed(producer: &RingProducer, channel: usize, first: &Timecode, count: i64, signal: bool) {
        let pattern = TestPattern::default();
        for i in 0..count {
            pattern
                .produce(producer, channel, &first.offset(i), signal)
                .unwrap();
        }
    }

    #[test]
    fn start_now_uses_the_earliest_channel() {
        let (_dir, producer, ring) = region(2);
        let start = Timecode::from_text("10:00:00:00", 25);
        feed(&producer, 0, &start, 30, true);
        feed(&producer, 1, &start.offset(2), 30, true);

        let correlation = Correlator::new(&ring, DEFAULT_SEARCH_GUARD)
            .correlate(None, 5, &[true, true])
            .unwrap();
        // Channel 0 is newest at +29, channel 1 at +31.
        assert_eq!(correlation.start_timecode, start.offset(24));
        assert_eq!(correlation.start_frames, vec![Some(24), Some(22)]);
        for (channel, frame) in correlation.resolved() {
            assert_eq!(ring.timecode(channel, frame).unwrap(), correlation.start_timecode);
        }
    }

    #[test]
    fn start_now_across_midnight() {
        let (_dir, producer, ring) = region(2);
        let start = Timecode::from_text("23:59:59:00", 25);
        feed(&producer, 0, &start, 25, true);
        feed(&producer, 1, &start, 36, true);

        // Channel 0 is newest at 23:59:59:24, channel 1 at 00:00:00:10.
        let correlation = Correlator::new(&ring, DEFAULT_SEARCH_GUARD)
            .correlate(None, 0, &[true, true])
            .unwrap();
        assert_eq!(correlation.start_timecode, Timecode::from_text("23:59:59:24", 25));
        assert_eq!(correlation.start_frames, vec![Some(24), Some(24)]);

        let reversed = Correlator::new(&ring, DEFAULT_SEARCH_GUARD)
            .correlate(None, 0, &[false, true])
            .unwrap();
        assert_eq!(reversed.start_timecode, Timecode::from_text("00:00:00:10", 25));
    }

    #[traced_test]
    #[test]
    fn missing_target_fails_only_with_signal() {
        let (_dir, producer, ring) = region(2);
        let start = Timecode::from_text("10:00:00:00", 25);
        feed(&producer, 0, &start, 30, true);
        feed(&producer, 1, &start, 30, false);
        let correlator = Correlator::new(&ring, DEFAULT_SEARCH_GUARD);

        let correlation = correlator
            .correlate(Some(start.offset(10)), 0, &[true, true])
            .unwrap();
        assert_eq!(correlation.start_frames, vec![Some(10), None]);
        assert!(logs_contain("Channel 1 has no signal"));

        assert!(matches!(
            correlator.correlate(Some(start.offset(-100)), 0, &[true, false]),
            Err(Error::CorrelationFailed { channel: 0, .. })
        ));
        assert!(matches!(
            correlator.correlate(None, 0, &[false, false]),
            Err(Error::NoChannelsEnabled)
        ));
    }

    #[test]
    fn near_future_targets_are_predicted() {
        let (_dir, producer, ring) = region(1);
        let start = Timecode::from_text("23:59:59:20", 25);
        feed(&producer, 0, &start, 10, true);
        let correlator = Correlator::new(&ring, DEFAULT_SEARCH_GUARD);

        // Newest frame 9 carries 00:00:00:04 (across midnight).
        let correlation = correlator
            .correlate(Some(start.offset(12)), 0, &[true])
            .unwrap();
        assert_eq!(correlation.start_frames, vec![Some(12)]);
        assert!(correlator.correlate(Some(start.offset(15)), 0, &[true]).is_err());
    }

    #[test]
    fn search_window_respects_the_guard() {
        let (_dir, producer, ring) = region(1);
        let start = Timecode::from_text("01:00:00:00", 25);
        feed(&producer, 0, &start, 60, true);
        let correlator = Correlator::new(&ring, DEFAULT_SEARCH_GUARD);
        // Frames 15..=59 are searchable (45 = 50 - 5), frame 14 is not.
        assert_eq!(
            correlator.correlate(Some(start.offset(15)), 0, &[true]).unwrap().start_frames,
            vec![Some(15)]
        );
        assert!(correlator.correlate(Some(start.offset(14)), 0, &[true]).is_err());
    }
}
