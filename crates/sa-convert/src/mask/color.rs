// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Instance palette and color helpers.
//!
//! Two independent schemes live here:
//!
//! - The **blue mask palette**: color `k` is `(k + 1) * 15` packed as
//!   `0xRRGGBB`, so the first colors only differ in the blue channel.
//!   Background (`0`) is never produced. The sequence is a pure function of
//!   the index, so `generate_colors(m)` starts with `generate_colors(n)` for
//!   every `m >= n`.
//! - The **panoptic id** scheme: `id = r + 256 * g + 65536 * b`, used only
//!   for COCO panoptic PNGs.

use crate::Error;

const PALETTE_STEP: u32 = 15;

/// Number of distinct blue mask colors. Longer sequences wrap around and
/// repeat earlier colors.
pub const PALETTE_SIZE: usize = (0x00ff_ffff / PALETTE_STEP) as usize;

fn palette_value(k: usize) -> u32 {
    ((k as u32).wrapping_add(1).wrapping_mul(PALETTE_STEP)) & 0x00ff_ffff
}

fn unpack(value: u32) -> [u8; 3] {
    [
        ((value >> 16) & 0xff) as u8,
        ((value >> 8) & 0xff) as u8,
        (value & 0xff) as u8,
    ]
}

/// The first `n` palette colors as `#rrggbb` strings.
pub fn generate_colors(n: usize) -> Vec<String> {
    generate_rgb(n).iter().map(rgb_to_hex).collect()
}

/// The first `n` palette colors as `[r, g, b]`.
pub fn generate_rgb(n: usize) -> Vec<[u8; 3]> {
    (0..n).map(|k| unpack(palette_value(k))).collect()
}

/// The first `n` palette colors, refusing sequences that would repeat a
/// color.
pub fn palette_rgb(n: usize) -> Result<Vec<[u8; 3]>, Error> {
    if n > PALETTE_SIZE {
        return Err(Error::InvalidParameters(format!(
            "{} parts exceed the {} colors of the blue mask palette",
            n, PALETTE_SIZE
        )));
    }
    Ok(generate_rgb(n))
}

/// Palette position of a color, `None` for background and foreign colors.
pub fn color_index(rgb: [u8; 3]) -> Option<usize> {
    let value = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
    if value == 0 || value % PALETTE_STEP != 0 {
        return None;
    }
    Some((value / PALETTE_STEP - 1) as usize)
}

/// Parse `#RRGGBB` (case-insensitive, leading `#` optional).
pub fn hex_to_rgb(s: &str) -> Result<[u8; 3], Error> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidColor(s.to_string()));
    }

    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| Error::InvalidColor(s.to_string()))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Format a color as lowercase `#rrggbb`.
pub fn rgb_to_hex(rgb: &[u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Panoptic segment id to color.
pub fn id_to_rgb(id: u32) -> [u8; 3] {
    [(id % 256) as u8, (id / 256 % 256) as u8, (id / 65536 % 256) as u8]
}

/// Panoptic color to segment id.
pub fn rgb_to_id(rgb: [u8; 3]) -> u32 {
    rgb[0] as u32 + 256 * rgb[1] as u32 + 65536 * rgb[2] as u32
}
