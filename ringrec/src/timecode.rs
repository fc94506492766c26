// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Timecode values and frame-count arithmetic.
//!
//! This module defines:
//! - [`FrameRate`]: a rational video frame rate
//! - [`Timecode`]: an immutable time-of-day label canonicalised as frames since midnight
//! - [`FrameDuration`]: a signed frame count between two timecodes of the same rate
//! - Embedded timecode codecs ([`vitc`], [`ltc`])
//!
//! All arithmetic happens in the frame-count domain; hours, minutes, seconds and frames
//! are re-derived afterwards. Drop-frame labels are exact for 30000/1001 only.

pub mod ltc;
pub mod vitc;

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Frames in one drop-frame hour: six ten-minute blocks of nine short minutes and one full one.
const FRAMES_PER_HOUR_DF: i64 = 6 * (10 * (60 * 30 - 2) + 2);

/// Frames in one drop-frame ten-minute block.
const FRAMES_PER_TEN_MINUTES_DF: i64 = 10 * (60 * 30 - 2) + 2;

/// Frames in a drop-frame minute that skips labels 0 and 1.
const FRAMES_PER_SHORT_MINUTE_DF: i64 = 60 * 30 - 2;

/// Nominal rate of drop-frame timecode.
const DROP_FRAME_FPS: u32 = 30;

/// Rational number representation of a video frame rate.
///
/// Used for the capture rate published in the control block (e.g. 25/1 or 30000/1001).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameRate {
    /// Numerator of the rate.
    pub numerator: u32,
    /// Denominator of the rate (defaults to 1 if omitted in JSON).
    #[serde(default = "default_denominator")]
    pub denominator: u32,
}

/// Default denominator for rates.
fn default_denominator() -> u32 {
    1
}

impl FrameRate {
    /// 25 frames per second.
    pub const PAL: FrameRate = FrameRate {
        numerator: 25,
        denominator: 1,
    };

    /// 30000/1001 frames per second (29.97).
    pub const NTSC: FrameRate = FrameRate {
        numerator: 30000,
        denominator: 1001,
    };

    /// Creates a frame rate, rejecting zero terms.
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || denominator == 0 {
            return Err(Error::Other(format!(
                "Invalid frame rate {numerator}/{denominator}."
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Returns the integer frames-per-second used for timecode labels (29.97 -> 30).
    pub fn nominal_fps(&self) -> u32 {
        if self.denominator == 0 {
            return 0;
        }
        (self.numerator + self.denominator / 2) / self.denominator
    }

    /// Returns `true` for 30000/1001, the only rate with exact drop-frame labels.
    pub fn supports_drop_frame(&self) -> bool {
        self.numerator == 30000 && self.denominator == 1001
    }

    /// Returns the wall-clock duration of one frame.
    pub fn frame_duration(&self) -> std::time::Duration {
        if self.numerator == 0 {
            return std::time::Duration::ZERO;
        }
        let nanos = 1_000_000_000u64 * self.denominator as u64 / self.numerator as u64;
        std::time::Duration::from_nanos(nanos)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// A time-of-day label at an integer nominal frame rate.
///
/// The canonical value is [`Self::frames_since_midnight`], always inside
/// `[0, frames_per_day)`. Hours, minutes, seconds and frames are derived from it at
/// construction. Values are immutable; arithmetic returns new values.
///
/// A *null* timecode (see [`Self::null`]) results from malformed text and stays null
/// through arithmetic.
///
/// # Examples
///
/// ```
/// use ringrec::Timecode;
///
/// let tc = Timecode::from_text("10:00:00:00", 25);
/// let later = tc + 30;
/// assert_eq!(later.to_string(), "10:00:01:05");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timecode {
    frames_since_midnight: i64,
    fps: u32,
    drop_frame: bool,
    hours: u8,
    minutes: u8,
    seconds: u8,
    frames: u8,
    valid: bool,
}

impl Default for Timecode {
    fn default() -> Self {
        Self::null()
    }
}

impl Timecode {
    /// Returns the null timecode.
    pub const fn null() -> Self {
        Self {
            frames_since_midnight: 0,
            fps: 0,
            drop_frame: false,
            hours: 0,
            minutes: 0,
            seconds: 0,
            frames: 0,
            valid: false,
        }
    }

    /// Creates a timecode from a frame count, wrapping into one day.
    ///
    /// `drop_frame` is ignored unless `fps` is 30. A zero `fps` yields the null timecode.
    pub fn from_frames(frames: i64, fps: u32, drop_frame: bool) -> Self {
        if fps == 0 {
            return Self::null();
        }
        let drop_frame = drop_frame && fps == DROP_FRAME_FPS;
        let frames_since_midnight = frames.rem_euclid(frames_per_day(fps, drop_frame));
        let (hours, minutes, seconds, frames) = if drop_frame {
            df_frames_to_fields(frames_since_midnight)
        } else {
            ndf_frames_to_fields(frames_since_midnight, fps)
        };
        Self {
            frames_since_midnight,
            fps,
            drop_frame,
            hours,
            minutes,
            seconds,
            frames,
            valid: true,
        }
    }

    /// Creates a timecode from hours, minutes, seconds and frames.
    ///
    /// Out-of-range fields are folded into the frame count, so equivalent inputs produce
    /// the same canonical value as [`Self::from_frames`].
    pub fn from_hmsf(
        hours: u32,
        minutes: u32,
        seconds: u32,
        frames: u32,
        fps: u32,
        drop_frame: bool,
    ) -> Self {
        let drop_frame = drop_frame && fps == DROP_FRAME_FPS;
        let (h, m, s, f) = (hours as i64, minutes as i64, seconds as i64, frames as i64);
        let count = if drop_frame {
            let total_minutes = 60 * h + m;
            (3600 * h + 60 * m + s) * DROP_FRAME_FPS as i64 + f - 2 * (total_minutes - total_minutes / 10)
        } else {
            (3600 * h + 60 * m + s) * fps as i64 + f
        };
        Self::from_frames(count, fps, drop_frame)
    }

    /// Parses `hh:mm:ss:ff` (11 characters) or `hhmmssff` (8 characters).
    ///
    /// A `.` or `;` before the frames field selects drop-frame. Malformed text yields
    /// the null timecode; use [`Self::try_from_text`] to get the reason.
    pub fn from_text(text: &str, fps: u32) -> Self {
        Self::try_from_text(text, fps).unwrap_or_default()
    }

    /// Parses timecode text, reporting why it was rejected.
    pub fn try_from_text(text: &str, fps: u32) -> Result<Self> {
        let invalid = || Error::InvalidTimecode(format!("\"{text}\" at {fps} fps"));
        if !text.is_ascii() {
            return Err(invalid());
        }
        let bytes = text.as_bytes();
        let (digits, drop_frame) = match bytes.len() {
            11 => {
                if bytes[2] != b':' || bytes[5] != b':' {
                    return Err(invalid());
                }
                let drop_frame = match bytes[8] {
                    b':' => false,
                    b'.' | b';' => true,
                    _ => return Err(invalid()),
                };
                ([&text[0..2], &text[3..5], &text[6..8], &text[9..11]], drop_frame)
            }
            8 => ([&text[0..2], &text[2..4], &text[4..6], &text[6..8]], false),
            _ => return Err(invalid()),
        };
        let mut fields = [0u32; 4];
        for (field, digits) in fields.iter_mut().zip(digits) {
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *field = digits.parse().map_err(|_| invalid())?;
        }
        let [hours, minutes, seconds, frames] = fields;
        if fps == 0 || hours > 23 || minutes > 59 || seconds > 59 || frames >= fps {
            return Err(invalid());
        }
        if drop_frame {
            if fps != DROP_FRAME_FPS {
                return Err(invalid());
            }
            if is_skipped_label(minutes, seconds, frames) {
                return Err(skipped_label(text));
            }
        }
        Ok(Self::from_hmsf(hours, minutes, seconds, frames, fps, drop_frame))
    }

    /// Parses timecode text captured at `rate`.
    ///
    /// At 30000/1001 the label is always read as drop-frame, whatever its separator, so
    /// it compares with the timecodes stored in the ring.
    pub fn try_from_text_at(text: &str, rate: FrameRate) -> Result<Self> {
        let parsed = Self::try_from_text(text, rate.nominal_fps())?;
        if !rate.supports_drop_frame() || parsed.drop_frame {
            return Ok(parsed);
        }
        let (minutes, seconds, frames) = (
            parsed.minutes as u32,
            parsed.seconds as u32,
            parsed.frames as u32,
        );
        if is_skipped_label(minutes, seconds, frames) {
            return Err(skipped_label(text));
        }
        Ok(Self::from_hmsf(
            parsed.hours as u32,
            minutes,
            seconds,
            frames,
            DROP_FRAME_FPS,
            true,
        ))
    }

    /// Returns `true` for the null timecode.
    pub fn is_null(&self) -> bool {
        !self.valid
    }

    /// Canonical frame count, in `[0, frames_per_day)`.
    pub fn frames_since_midnight(&self) -> i64 {
        self.frames_since_midnight
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    pub fn frames(&self) -> u8 {
        self.frames
    }

    /// Nominal frames per second (0 for the null timecode).
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn drop_frame(&self) -> bool {
        self.drop_frame
    }

    /// Number of distinct labels in one day at this timecode's rate.
    pub fn frames_per_day(&self) -> i64 {
        frames_per_day(self.fps, self.drop_frame)
    }

    /// Returns this timecode moved by `frames` (negative moves backwards), wrapping at midnight.
    pub fn offset(&self, frames: i64) -> Self {
        if self.is_null() {
            return *self;
        }
        Self::from_frames(self.frames_since_midnight + frames, self.fps, self.drop_frame)
    }

    /// Returns `true` if both timecodes are valid and share rate and drop-frame mode.
    pub fn same_rate(&self, other: &Timecode) -> bool {
        self.valid && other.valid && self.fps == other.fps && self.drop_frame == other.drop_frame
    }

    /// Signed frame difference `self - earlier`, without wrapping at midnight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateMismatch`] if either value is null or the rates differ.
    pub fn duration_since(&self, earlier: &Timecode) -> Result<FrameDuration> {
        if !self.same_rate(earlier) {
            return Err(Error::RateMismatch);
        }
        Ok(FrameDuration {
            frames: self.frames_since_midnight - earlier.frames_since_midnight,
            fps: self.fps,
        })
    }

    /// Formats as `hhmmssff`, suitable for file names.
    pub fn to_compact_string(&self) -> String {
        if self.is_null() {
            return "00000000".to_string();
        }
        format!(
            "{:02}{:02}{:02}{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "--:--:--:--");
        }
        let separator = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, separator, self.frames
        )
    }
}

impl Add<i64> for Timecode {
    type Output = Timecode;

    fn add(self, frames: i64) -> Timecode {
        self.offset(frames)
    }
}

impl Sub<i64> for Timecode {
    type Output = Timecode;

    fn sub(self, frames: i64) -> Timecode {
        self.offset(frames.wrapping_neg())
    }
}

impl AddAssign<i64> for Timecode {
    fn add_assign(&mut self, frames: i64) {
        *self = self.offset(frames);
    }
}

impl SubAssign<i64> for Timecode {
    fn sub_assign(&mut self, frames: i64) {
        *self = self.offset(frames.wrapping_neg());
    }
}

/// Signed number of frames between two timecodes of the same rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameDuration {
    frames: i64,
    fps: u32,
}

impl FrameDuration {
    /// Creates a duration of `frames` at `fps`.
    pub fn new(frames: i64, fps: u32) -> Self {
        Self { frames, fps }
    }

    pub fn frames(&self) -> i64 {
        self.frames
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

impl fmt::Display for FrameDuration {
    /// Formats as `[-]hh:mm:ss:ff` using non-drop-frame radix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.frames < 0 { "-" } else { "" };
        let fps = self.fps.max(1) as i64;
        let total = self.frames.abs();
        write!(
            f,
            "{sign}{:02}:{:02}:{:02}:{:02}",
            total / (fps * 3600),
            total / (fps * 60) % 60,
            total / fps % 60,
            total % fps
        )
    }
}

/// Drop-frame skips labels 0 and 1 at the start of every minute not divisible by ten.
fn is_skipped_label(minutes: u32, seconds: u32, frames: u32) -> bool {
    seconds == 0 && frames < 2 && minutes % 10 != 0
}

fn skipped_label(text: &str) -> Error {
    Error::InvalidTimecode(format!("\"{text}\" is a skipped drop-frame label"))
}

fn frames_per_day(fps: u32, drop_frame: bool) -> i64 {
    if drop_frame {
        24 * FRAMES_PER_HOUR_DF
    } else {
        fps.max(1) as i64 * 86_400
    }
}

fn ndf_frames_to_fields(count: i64, fps: u32) -> (u8, u8, u8, u8) {
    let fps = fps as i64;
    (
        (count / (fps * 3600)) as u8,
        (count / (fps * 60) % 60) as u8,
        (count / fps % 60) as u8,
        (count % fps) as u8,
    )
}

/// Derives drop-frame labels from a non-negative frame count.
///
/// Within a ten-minute block the first minute has 1800 frames and the other nine have
/// 1798. Shifting by two before dividing by the short-minute length, then adding the two
/// back, makes every minute except the first of the block start at label 2. The signed
/// (truncating) division keeps offsets 0 and 1 of the block in minute 0.
fn df_frames_to_fields(count: i64) -> (u8, u8, u8, u8) {
    let hours = count / FRAMES_PER_HOUR_DF;
    let in_hour = count % FRAMES_PER_HOUR_DF;
    let ten_minutes = in_hour / FRAMES_PER_TEN_MINUTES_DF;
    let in_ten_minutes = in_hour % FRAMES_PER_TEN_MINUTES_DF;
    let unit_minutes = (in_ten_minutes - 2) / FRAMES_PER_SHORT_MINUTE_DF;
    let in_minute = (in_ten_minutes - 2) % FRAMES_PER_SHORT_MINUTE_DF + 2;
    (
        hours as u8,
        (ten_minutes * 10 + unit_minutes) as u8,
        (in_minute / DROP_FRAME_FPS as i64) as u8,
        (in_minute % DROP_FRAME_FPS as i64) as u8,
    )
}
