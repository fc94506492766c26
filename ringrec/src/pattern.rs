// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Test-pattern frames for the capture simulator and tests.

use tracing::trace;

use crate::{
    FrameView, FrameWriteAccess, NEUTRAL_CHROMA, Result, RingProducer, Timecode,
    timecode::vitc::{self, LumaLayout, VitcSampling},
};

/// Fills frames with a per-channel flat picture, a VITC line, a tone and stored timecodes.
#[derive(Clone, Debug)]
pub struct TestPattern {
    /// Scan line carrying VITC in the primary picture.
    pub vitc_line: usize,
    pub vitc_sampling: VitcSampling,
    /// Audio samples per second, used to phase the tone.
    pub audio_sample_rate: u32,
}

impl Default for TestPattern {
    fn default() -> Self {
        Self {
            vitc_line: 0,
            vitc_sampling: VitcSampling::default(),
            audio_sample_rate: 48000,
        }
    }
}

impl TestPattern {
    /// Luma level of `channel`'s flat picture.
    pub fn channel_luma(channel: usize) -> u8 {
        0x30 + 0x20 * (channel % 6) as u8
    }

    /// Writes and commits the next frame of `channel`.
    ///
    /// `signal_ok == false` stores an unreadable timecode, as capture hardware without
    /// input would.
    pub fn produce(
        &self,
        producer: &RingProducer,
        channel: usize,
        timecode: &Timecode,
        signal_ok: bool,
    ) -> Result<i64> {
        let mut frame = producer.open_frame(channel)?;
        let number = frame.number();
        let geometry = *producer.geometry();
        let stored = if signal_ok { *timecode } else { Timecode::null() };

        self.fill_picture(
            frame.primary_mut(),
            (geometry.width, geometry.height),
            channel,
            &stored,
        );
        self.fill_picture(
            frame.secondary_mut(),
            (geometry.sec_width, geometry.sec_height),
            channel,
            &stored,
        );
        self.fill_audio(&mut frame, number, geometry.audio_samples_per_frame(), channel);
        frame.set_signal_ok(signal_ok);
        frame.set_ltc(&stored);
        frame.set_vitc(&stored);
        frame.commit();
        trace!("Produced frame {number} on channel {channel} at {timecode}");
        Ok(number)
    }

    /// Decodes the VITC line of a primary picture written by [`Self::produce`].
    pub fn read_vitc(&self, frame: &FrameView<'_>, fps: u32) -> Option<Timecode> {
        let picture = frame.primary();
        let start = self.vitc_line * picture.width;
        let line = picture.y.get(start..start + picture.width)?;
        vitc::decode_line(line, LumaLayout::Planar, &self.vitc_sampling, fps)
    }

    fn fill_picture(
        &self,
        planes: &mut [u8],
        (width, height): (usize, usize),
        channel: usize,
        timecode: &Timecode,
    ) {
        let luma = width * height;
        planes[..luma].fill(Self::channel_luma(channel));
        planes[luma..].fill(NEUTRAL_CHROMA);
        if !timecode.is_null() && self.vitc_line < height {
            let line = &mut planes[self.vitc_line * width..(self.vitc_line + 1) * width];
            // A line too short for the configured sampling simply carries no VITC.
            let _ = vitc::encode_line(timecode, line, LumaLayout::Planar, &self.vitc_sampling);
        }
    }

    fn fill_audio(
        &self,
        frame: &mut FrameWriteAccess<'_>,
        number: i64,
        samples: usize,
        channel: usize,
    ) {
        // 1 kHz square wave, amplitude per channel, continuous across frames.
        let period = (self.audio_sample_rate / 1000).max(2) as i64;
        let amplitude = 2000 * (channel as i16 + 1);
        for pair in 0..2 {
            let audio = frame.audio_mut(pair);
            for (index, sample) in audio.chunks_exact_mut(4).enumerate() {
                let position = number * samples as i64 + index as i64;
                let value = if position % period < period / 2 {
                    amplitude
                } else {
                    -amplitude
                };
                sample[..2].copy_from_slice(&value.to_le_bytes());
                sample[2..].copy_from_slice(&value.to_le_bytes());
            }
        }
    }
}
