// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Timecode burn-in.
//!
//! Renders a timecode label with a built-in 5x7 dot font into the luma plane of a planar
//! picture, on a dark box with neutral chroma. Workers burn into an owned copy of the
//! ring frame; the shared ring is never written.

use serde::{Deserialize, Serialize};

use crate::{BLACK_LUMA, NEUTRAL_CHROMA, Picture, Timecode};

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;
/// Glyph advance and line height in font dots.
const CELL_WIDTH: usize = GLYPH_WIDTH + 1;
const CELL_HEIGHT: usize = GLYPH_HEIGHT + 1;
/// Box margin around the text, in font dots.
const MARGIN: usize = 1;

const WHITE_LUMA: u8 = 0xEB;

/// Placement of the burnt-in label.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct BurnInOptions {
    /// Top of the box as a fraction of the picture height.
    pub vertical_position: f32,
    /// Pixels per font dot; 0 picks one from the picture height.
    pub scale: usize,
}

impl Default for BurnInOptions {
    fn default() -> Self {
        Self {
            vertical_position: 0.8,
            scale: 0,
        }
    }
}

/// Rows of a glyph, most significant of the low five bits is the leftmost dot.
fn glyph(c: char) -> [u8; GLYPH_HEIGHT] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ';' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; GLYPH_HEIGHT],
    }
}

/// Burns `timecode` into `picture`, horizontally centred.
///
/// Parts of the box falling outside the picture are clipped.
pub fn burn_timecode(picture: &mut Picture, timecode: &Timecode, options: &BurnInOptions) {
    burn_text(picture, &timecode.to_string(), options);
}

/// Burns arbitrary text made of digits, `:`, `;` and `-`.
pub fn burn_text(picture: &mut Picture, text: &str, options: &BurnInOptions) {
    let (width, height) = (picture.width(), picture.height());
    if width == 0 || height == 0 {
        return;
    }
    let scale = if options.scale == 0 {
        (height / (CELL_HEIGHT * 18)).max(1)
    } else {
        options.scale
    };
    let chars = text.chars().count();
    let box_width = (chars * CELL_WIDTH + 2 * MARGIN) * scale;
    let box_height = (CELL_HEIGHT + 2 * MARGIN) * scale;
    let left = width.saturating_sub(box_width) / 2;
    let top = ((height as f32 * options.vertical_position.clamp(0.0, 1.0)) as usize)
        .min(height.saturating_sub(box_height));
    let right = (left + box_width).min(width);
    let bottom = (top + box_height).min(height);

    let format = picture.format();
    let (chroma_width, chroma_height) = format.chroma_size(width, height);
    let (x_ratio, y_ratio) = (width / chroma_width.max(1), height / chroma_height.max(1));
    let (y_plane, u_plane, v_plane) = picture.planes_mut();

    for row in top..bottom {
        y_plane[row * width + left..row * width + right].fill(BLACK_LUMA);
    }
    for row in top / y_ratio..bottom.div_ceil(y_ratio).min(chroma_height) {
        let span = row * chroma_width + left / x_ratio
            ..row * chroma_width + right.div_ceil(x_ratio).min(chroma_width);
        u_plane[span.clone()].fill(NEUTRAL_CHROMA);
        v_plane[span].fill(NEUTRAL_CHROMA);
    }

    for (index, c) in text.chars().enumerate() {
        let origin_x = left + (MARGIN + index * CELL_WIDTH) * scale;
        let origin_y = top + MARGIN * scale;
        for (dot_row, bits) in glyph(c).iter().enumerate() {
            for dot_col in 0..GLYPH_WIDTH {
                if bits >> (GLYPH_WIDTH - 1 - dot_col) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    let y = origin_y + dot_row * scale + dy;
                    if y >= bottom {
                        break;
                    }
                    let x0 = origin_x + dot_col * scale;
                    let x1 = (x0 + scale).min(right);
                    if x0 < x1 {
                        y_plane[y * width + x0..y * width + x1].fill(WHITE_LUMA);
                    }
                }
            }
        }
    }
}
