// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Vertical interval timecode (VITC) line codec.
//!
//! A VITC line carries 90 bits: nine groups of two sync bits (`1`, `0`) followed by eight
//! data bits, then a final sync pair and an 8-bit CRC. Bits are sampled from the luma of
//! one scan line at fixed sample positions; a sample above `0x7F` is a `1`.
//!
//! ```text
//! bit  0     2        12   14      22        32       42        52       62       72      80  82
//!      |sync|fr units|sync|fr tens|..|s units|..|s tens|..|m units|..|m tens|..|h units|..|h tens|..|sync|CRC|
//! ```

use serde::{Deserialize, Serialize};

use super::Timecode;

/// Number of bits on a VITC line.
pub const VITC_BITS: usize = 90;

/// Luma threshold: samples strictly above decode as `1`.
const BIT_THRESHOLD: u8 = 0x7F;

/// Luma levels used when rendering a line.
const LEVEL_ONE: u8 = 0xC0;
const LEVEL_ZERO: u8 = 0x10;

/// Bit offset of the drop-frame flag.
const DROP_FRAME_BIT: usize = 14;

/// Bit offset of the transmitted CRC.
const CRC_BIT: usize = 82;

/// How the luma samples of a line are stored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LumaLayout {
    /// One byte per sample (the Y plane of a planar frame).
    #[default]
    Planar,
    /// Packed `U Y V Y`, luma at odd bytes.
    Uyvy,
}

/// Sample positions of the VITC bits, which depend on the capture hardware.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct VitcSampling {
    /// Luma sample at the centre of bit 0.
    pub first_bit: u32,
    /// Bit period in half samples (15 = 7.5 samples).
    pub period_halves: u32,
}

impl Default for VitcSampling {
    fn default() -> Self {
        Self {
            first_bit: 28,
            period_halves: 15,
        }
    }
}

impl VitcSampling {
    /// Luma sample index at the centre of `bit`.
    fn centre(&self, bit: usize) -> usize {
        (2 * self.first_bit as usize + bit * self.period_halves as usize) / 2
    }

    /// First luma sample belonging to `bit` when rendering.
    fn boundary(&self, bit: usize) -> usize {
        (2 * self.first_bit as usize + bit * self.period_halves as usize)
            .saturating_sub(self.period_halves as usize / 2)
            / 2
    }
}

fn luma_index(layout: LumaLayout, sample: usize) -> usize {
    match layout {
        LumaLayout::Planar => sample,
        LumaLayout::Uyvy => 2 * sample + 1,
    }
}

/// Samples the 90 VITC bits from a scan line.
///
/// Returns `None` if the line is too short for the configured sampling.
pub fn read_bits(
    line: &[u8],
    layout: LumaLayout,
    sampling: &VitcSampling,
) -> Option<[bool; VITC_BITS]> {
    let mut bits = [false; VITC_BITS];
    for (bit, value) in bits.iter_mut().enumerate() {
        let sample = *line.get(luma_index(layout, sampling.centre(bit)))?;
        *value = sample > BIT_THRESHOLD;
    }
    Some(bits)
}

/// Decodes a scan line to a timecode at `fps`.
///
/// Returns `None` when the line is too short, the sync pattern or CRC does not match, or
/// the fields are out of range for `fps`.
pub fn decode_line(
    line: &[u8],
    layout: LumaLayout,
    sampling: &VitcSampling,
    fps: u32,
) -> Option<Timecode> {
    decode_bits(&read_bits(line, layout, sampling)?, fps)
}

/// Decodes 90 sampled bits to a timecode at `fps`.
pub fn decode_bits(bits: &[bool; VITC_BITS], fps: u32) -> Option<Timecode> {
    for group in 0..9 {
        if !bits[group * 10] || bits[group * 10 + 1] {
            return None;
        }
    }
    if field(bits, CRC_BIT, 8) as u8 != crc(bits) {
        return None;
    }

    let frames = field(bits, 2, 4) + 10 * field(bits, 12, 2);
    let seconds = field(bits, 22, 4) + 10 * field(bits, 32, 3);
    let minutes = field(bits, 42, 4) + 10 * field(bits, 52, 3);
    let hours = field(bits, 62, 4) + 10 * field(bits, 72, 2);
    let units_valid = [2, 22, 42, 62].iter().all(|&offset| field(bits, offset, 4) <= 9);
    if !units_valid || frames >= fps || seconds > 59 || minutes > 59 || hours > 23 {
        return None;
    }
    Some(Timecode::from_hmsf(
        hours,
        minutes,
        seconds,
        frames,
        fps,
        bits[DROP_FRAME_BIT],
    ))
}

/// Builds the 90 VITC bits for `tc`, including sync pairs and CRC.
pub fn encode_bits(tc: &Timecode) -> [bool; VITC_BITS] {
    let mut bits = [false; VITC_BITS];
    for group in 0..9 {
        bits[group * 10] = true;
    }
    set_field(&mut bits, 2, 4, tc.frames() as u32 % 10);
    set_field(&mut bits, 12, 2, tc.frames() as u32 / 10);
    bits[DROP_FRAME_BIT] = tc.drop_frame();
    set_field(&mut bits, 22, 4, tc.seconds() as u32 % 10);
    set_field(&mut bits, 32, 3, tc.seconds() as u32 / 10);
    set_field(&mut bits, 42, 4, tc.minutes() as u32 % 10);
    set_field(&mut bits, 52, 3, tc.minutes() as u32 / 10);
    set_field(&mut bits, 62, 4, tc.hours() as u32 % 10);
    set_field(&mut bits, 72, 2, tc.hours() as u32 / 10);
    let crc = crc(&bits);
    set_field(&mut bits, CRC_BIT, 8, crc as u32);
    bits
}

/// Renders `tc` into a scan line. Samples outside the VITC window are left untouched.
///
/// Returns `false` if the line is too short.
pub fn encode_line(
    tc: &Timecode,
    line: &mut [u8],
    layout: LumaLayout,
    sampling: &VitcSampling,
) -> bool {
    let last = luma_index(layout, sampling.boundary(VITC_BITS).saturating_sub(1));
    if last >= line.len() {
        return false;
    }
    for (bit, value) in encode_bits(tc).iter().enumerate() {
        let level = if *value { LEVEL_ONE } else { LEVEL_ZERO };
        for sample in sampling.boundary(bit)..sampling.boundary(bit + 1) {
            line[luma_index(layout, sample)] = level;
        }
    }
    true
}

/// Running XOR of the first ten 8-bit groups, realigned to the CRC's bit position.
///
/// The realignment folds in sync bits 80 (`1`) and 81 (`0`) and rotates by the two-bit
/// offset between bit 80 and the CRC at bit 82.
fn crc(bits: &[bool; VITC_BITS]) -> u8 {
    let mut crc = 0u8;
    for byte in 0..10 {
        crc ^= field(bits, byte * 8, 8) as u8;
    }
    (((crc & 3) ^ 1) << 6) | (crc >> 2)
}

fn field(bits: &[bool], offset: usize, width: usize) -> u32 {
    (0..width).fold(0, |value, bit| value | ((bits[offset + bit] as u32) << bit))
}

fn set_field(bits: &mut [bool], offset: usize, width: usize, value: u32) {
    for bit in 0..width {
        bits[offset + bit] = value >> bit & 1 == 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_line(layout: LumaLayout) -> Vec<u8> {
        match layout {
            LumaLayout::Planar => vec![0x10; 720],
            LumaLayout::Uyvy => [0x80, 0x10].repeat(720),
        }
    }

    #[test]
    fn rendered_lines_decode() {
        let sampling = VitcSampling::default();
        for layout in [LumaLayout::Planar, LumaLayout::Uyvy] {
            for text in ["00:00:00:00", "10:59:31:24", "23:59:59:24"] {
                let tc = Timecode::from_text(text, 25);
                let mut line = blank_line(layout);
                assert!(encode_line(&tc, &mut line, layout, &sampling));
                assert_eq!(decode_line(&line, layout, &sampling, 25), Some(tc));
            }
        }
    }

    #[test]
    fn drop_frame_flag_is_carried() {
        let tc = Timecode::from_text("01:01:00;02", 30);
        let bits = encode_bits(&tc);
        assert!(bits[DROP_FRAME_BIT]);
        assert_eq!(decode_bits(&bits, 30), Some(tc));
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let tc = Timecode::from_text("12:34:56:07", 25);
        let mut bits = encode_bits(&tc);
        bits[23] = !bits[23];
        assert_eq!(decode_bits(&bits, 25), None);
    }

    #[test]
    fn missing_sync_is_rejected() {
        let mut bits = encode_bits(&Timecode::from_text("01:00:00:00", 25));
        bits[40] = false;
        assert_eq!(decode_bits(&bits, 25), None);
        assert_eq!(decode_line(&[0u8; 100], LumaLayout::Planar, &VitcSampling::default(), 25), None);
    }

    #[test]
    fn crc_matches_reference_fold() {
        // CRC bit j must equal the parity of all earlier bits at position (82 + j) mod 8.
        let bits = encode_bits(&Timecode::from_text("07:15:42:19", 25));
        for j in 0..8 {
            let parity = (0..CRC_BIT)
                .filter(|i| i % 8 == (CRC_BIT + j) % 8)
                .fold(false, |acc, i| acc ^ bits[i]);
            assert_eq!(bits[CRC_BIT + j], parity, "crc bit {j}");
        }
    }
}
