// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Linear timecode (LTC) codeword codec.
//!
//! Works on the 80-bit codeword after bi-phase demodulation, stored as ten bytes with
//! bit `i` at `bytes[i / 8] >> (i % 8)`. Fields use the same BCD units-then-tens pattern
//! as VITC; the last 16 bits hold the sync word.

use super::Timecode;

/// Sync word in transmission order (bit 64 is the most significant).
pub const SYNC_WORD: u16 = 0x3FFD;

/// Number of bytes in a codeword.
pub const CODEWORD_BYTES: usize = 10;

const DROP_FRAME_BIT: usize = 10;
const SYNC_BIT: usize = 64;

/// Decodes an LTC codeword to a timecode at `fps`.
///
/// Returns `None` if the sync word is missing or a field is out of range.
pub fn decode_codeword(word: &[u8; CODEWORD_BYTES], fps: u32) -> Option<Timecode> {
    let sync = (0..16).fold(0u16, |value, i| value << 1 | bit(word, SYNC_BIT + i) as u16);
    if sync != SYNC_WORD {
        return None;
    }
    let units = [0, 16, 32, 48].map(|offset| field(word, offset, 4));
    if units.iter().any(|&unit| unit > 9) {
        return None;
    }
    let frames = units[0] + 10 * field(word, 8, 2);
    let seconds = units[1] + 10 * field(word, 24, 3);
    let minutes = units[2] + 10 * field(word, 40, 3);
    let hours = units[3] + 10 * field(word, 56, 2);
    if frames >= fps || seconds > 59 || minutes > 59 || hours > 23 {
        return None;
    }
    Some(Timecode::from_hmsf(
        hours,
        minutes,
        seconds,
        frames,
        fps,
        bit(word, DROP_FRAME_BIT),
    ))
}

/// Encodes `tc` as an LTC codeword with zero user bits.
pub fn encode_codeword(tc: &Timecode) -> [u8; CODEWORD_BYTES] {
    let mut word = [0u8; CODEWORD_BYTES];
    set_field(&mut word, 0, 4, tc.frames() as u32 % 10);
    set_field(&mut word, 8, 2, tc.frames() as u32 / 10);
    set_field(&mut word, DROP_FRAME_BIT, 1, tc.drop_frame() as u32);
    set_field(&mut word, 16, 4, tc.seconds() as u32 % 10);
    set_field(&mut word, 24, 3, tc.seconds() as u32 / 10);
    set_field(&mut word, 32, 4, tc.minutes() as u32 % 10);
    set_field(&mut word, 40, 3, tc.minutes() as u32 / 10);
    set_field(&mut word, 48, 4, tc.hours() as u32 % 10);
    set_field(&mut word, 56, 2, tc.hours() as u32 / 10);
    for i in 0..16 {
        set_field(&mut word, SYNC_BIT + i, 1, (SYNC_WORD >> (15 - i) & 1) as u32);
    }
    word
}

fn bit(word: &[u8; CODEWORD_BYTES], index: usize) -> bool {
    word[index / 8] >> (index % 8) & 1 == 1
}

fn field(word: &[u8; CODEWORD_BYTES], offset: usize, width: usize) -> u32 {
    (0..width).fold(0, |value, i| value | (bit(word, offset + i) as u32) << i)
}

fn set_field(word: &mut [u8; CODEWORD_BYTES], offset: usize, width: usize, value: u32) {
    for i in 0..width {
        let index = offset + i;
        if value >> i & 1 == 1 {
            word[index / 8] |= 1 << (index % 8);
        } else {
            word[index / 8] &= !(1 << (index % 8));
        }
    }
}
