// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Capture simulator.
//!
//! Publishes a region and fills it with test-pattern frames the way a capture card
//! would: each frame's LTC arrives as a codeword, is decoded, and is stored with the
//! frame together with a VITC line in the picture.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use ringrec::{
    FrameRate, RingGeometry, RingProducer, TestPattern, Timecode,
    timecode::ltc::{self, CODEWORD_BYTES},
};
use tracing::{debug, info, warn};

/// What to simulate.
#[derive(Clone, Debug)]
pub struct SimulateOptions {
    pub domain: PathBuf,
    pub channels: usize,
    pub ring_len: usize,
    pub frame_rate: FrameRate,
    pub width: usize,
    pub height: usize,
    /// Timecode of channel 0's first frame.
    pub start: Timecode,
    /// Frames each channel lags behind the previous one.
    pub skew: i64,
    /// Frames to produce per channel; 0 runs forever.
    pub frames: u64,
    /// Corrupt every n-th LTC codeword (0 never), as a noisy LTC input would.
    pub ltc_dropout: u64,
    /// Pace frames at the frame rate instead of producing as fast as possible.
    pub realtime: bool,
}

impl SimulateOptions {
    /// Geometry of the simulated region: 4:2:2 primary, half-size 4:2:0 secondary.
    pub fn geometry(&self, audio_sample_rate: u32) -> RingGeometry {
        let samples = audio_sample_rate as u64 * self.frame_rate.denominator as u64
            / self.frame_rate.numerator.max(1) as u64;
        RingGeometry::packed(
            self.channels,
            self.ring_len,
            self.frame_rate,
            (self.width, self.height),
            (self.width / 2, self.height / 2),
            samples as usize,
        )
    }
}

/// Runs the simulator and returns the number of frames produced per channel.
///
/// # Errors
///
/// Returns an error if the region cannot be created or a frame cannot be written.
pub fn run(options: &SimulateOptions, pattern: &TestPattern) -> ringrec::Result<u64> {
    let producer = RingProducer::create(
        &options.domain,
        options.geometry(pattern.audio_sample_rate),
    )?;
    for channel in 0..options.channels {
        producer.set_source_name(channel, &format!("Simulated {}", channel + 1))?;
    }
    let fps = options.frame_rate.nominal_fps();
    let period = options.frame_rate.frame_duration();
    info!(
        "Simulating {} channel(s) at {} from {}",
        options.channels, options.frame_rate, options.start
    );

    let began = Instant::now();
    let mut produced = 0u64;
    while options.frames == 0 || produced < options.frames {
        for channel in 0..options.channels {
            let timecode = options
                .start
                .offset(produced as i64 - channel as i64 * options.skew);
            let mut codeword = ltc::encode_codeword(&timecode);
            if options.ltc_dropout > 0 && (produced + 1) % options.ltc_dropout == 0 {
                corrupt(&mut codeword);
            }
            match ltc::decode_codeword(&codeword, fps) {
                Some(received) => {
                    pattern.produce(&producer, channel, &received, true)?;
                }
                None => {
                    debug!("Channel {channel}: unreadable LTC at {timecode}");
                    pattern.produce(&producer, channel, &timecode, false)?;
                }
            }
        }
        produced += 1;
        if options.realtime {
            let deadline = began + period * produced.min(u32::MAX as u64) as u32;
            match deadline.checked_duration_since(Instant::now()) {
                Some(wait) => std::thread::sleep(wait),
                None if Instant::now() - deadline > Duration::from_secs(1) => {
                    warn!("Simulator running more than a second late");
                }
                None => {}
            }
        }
    }
    info!("Produced {produced} frame(s) per channel");
    Ok(produced)
}

/// Breaks the sync word.
fn corrupt(codeword: &mut [u8; CODEWORD_BYTES]) {
    codeword[CODEWORD_BYTES - 1] ^= 0xFF;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringrec::{RingAccess, TimecodeSource};

    fn options(domain: PathBuf) -> SimulateOptions {
        SimulateOptions {
            domain,
            channels: 2,
            ring_len: 16,
            frame_rate: FrameRate::PAL,
            width: 720,
            height: 8,
            start: Timecode::from_text("12:00:00:00", 25),
            skew: 2,
            frames: 10,
            ltc_dropout: 0,
            realtime: false,
        }
    }

    #[test]
    fn simulated_channels_carry_skewed_timecode() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path().join("domain"));
        assert_eq!(run(&options, &TestPattern::default()).unwrap(), 10);

        let ring = RingAccess::attach(&options.domain, TimecodeSource::Vitc, &Default::default())
            .unwrap();
        assert_eq!(ring.geometry().audio_samples_per_frame(), 1920);
        assert_eq!(ring.source_name(1).unwrap(), "Simulated 2");
        let start = options.start;
        assert_eq!(ring.channel(0).unwrap().current_timecode(), start.offset(9));
        assert_eq!(ring.channel(1).unwrap().current_timecode(), start.offset(7));
        let frame = ring.channel(0).unwrap().frame(9);
        assert_eq!(
            TestPattern::default().read_vitc(&frame, 25),
            Some(start.offset(9))
        );
    }

    #[test]
    fn ltc_dropouts_clear_the_signal_flag() {
        let dir = tempfile::tempdir().unwrap();
        let options = SimulateOptions {
            ltc_dropout: 5,
            ..options(dir.path().join("domain"))
        };
        run(&options, &TestPattern::default()).unwrap();
        let ring = RingAccess::attach(&options.domain, TimecodeSource::Ltc, &Default::default())
            .unwrap();
        let channel = ring.channel(0).unwrap();
        assert!(!channel.frame(4).signal_ok());
        assert!(channel.timecode(4).is_null());
        assert!(channel.frame(5).signal_ok());
        assert!(!channel.signal_present());
    }
}
