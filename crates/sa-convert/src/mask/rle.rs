// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! COCO run-length encoding.
//!
//! **CRITICAL**: RLE runs are defined over the **column-major** (Fortran)
//! flattening of the mask. Row-major flattening produces counts that decode
//! without error but describe a transposed shape.
//!
//! Runs alternate background/foreground and always start with background,
//! so a mask whose first pixel is foreground begins with a zero-length run.

use super::BinaryMask;
use crate::Error;
use serde::{Deserialize, Serialize};

/// Uncompressed RLE with an explicit counts array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
    /// Run-length counts: `[bg_run, fg_run, bg_run, fg_run, ...]`
    pub counts: Vec<u32>,
    /// Mask size as `[height, width]` (NOT `[width, height]`!)
    pub size: [u32; 2],
}

/// RLE whose counts are packed into the COCO ASCII alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedRle {
    /// Counts string as produced by [`counts_to_string`].
    pub counts: String,
    /// Mask size as `[height, width]`.
    pub size: [u32; 2],
}

impl Rle {
    pub fn height(&self) -> u32 {
        self.size[0]
    }

    pub fn width(&self) -> u32 {
        self.size[1]
    }

    /// Number of foreground pixels (sum of the odd runs).
    pub fn area(&self) -> u64 {
        self.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
    }

    /// Check that the runs cover exactly `height * width` pixels.
    pub fn validate(&self) -> Result<(), Error> {
        let total = self.height() as u64 * self.width() as u64;
        let sum: u64 = self.counts.iter().map(|&c| c as u64).sum();
        if sum != total {
            return Err(Error::DecodeError(format!(
                "RLE counts sum {} does not match mask size {}x{} = {}",
                sum,
                self.width(),
                self.height(),
                total
            )));
        }
        Ok(())
    }

    /// Pack the counts into the compressed string form.
    pub fn compress(&self) -> CompressedRle {
        CompressedRle {
            counts: counts_to_string(&self.counts),
            size: self.size,
        }
    }
}

impl CompressedRle {
    /// Unpack the counts string and validate the result against `size`.
    pub fn decompress(&self) -> Result<Rle, Error> {
        let rle = Rle {
            counts: string_to_counts(&self.counts)?,
            size: self.size,
        };
        rle.validate()?;
        Ok(rle)
    }
}

/// Encode a binary mask as RLE in column-major order.
pub fn mask_to_rle(mask: &BinaryMask) -> Rle {
    let mut counts = Vec::new();
    let mut current = false;
    let mut run = 0u32;

    for x in 0..mask.width() {
        for y in 0..mask.height() {
            let value = mask.get(x, y);
            if value != current {
                counts.push(run);
                run = 0;
                current = value;
            }
            run += 1;
        }
    }
    counts.push(run);

    Rle {
        counts,
        size: [mask.height(), mask.width()],
    }
}

/// Decode RLE back into a row-major binary mask.
pub fn rle_to_mask(rle: &Rle) -> Result<BinaryMask, Error> {
    rle.validate()?;

    let height = rle.height() as usize;
    let width = rle.width() as usize;
    let mut data = vec![0u8; width * height];
    let mut pos = 0usize;

    for (i, &count) in rle.counts.iter().enumerate() {
        let count = count as usize;
        if i % 2 == 1 {
            for col_idx in pos..pos + count {
                let (x, y) = (col_idx / height, col_idx % height);
                data[y * width + x] = 1;
            }
        }
        pos += count;
    }

    BinaryMask::from_vec(rle.width(), rle.height(), data)
}

/// Pack RLE counts into the COCO LEB128-like string alphabet.
///
/// From index 3 on each count is stored as the difference to the count two
/// positions earlier, which keeps typical strings short.
pub fn counts_to_string(counts: &[u32]) -> String {
    let mut s = String::new();
    for (i, &count) in counts.iter().enumerate() {
        let mut x = count as i64;
        if i > 2 {
            x -= counts[i - 2] as i64;
        }
        encode_value(&mut s, x);
    }
    s
}

fn encode_value(s: &mut String, mut x: i64) {
    loop {
        let mut c = (x & 0x1f) as u8;
        x >>= 5;
        let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
        if more {
            c |= 0x20;
        }
        s.push((c + 48) as char);
        if !more {
            break;
        }
    }
}

/// Unpack a COCO counts string.
///
/// Characters outside `'0'..='o'`, a string ending inside a value, values
/// wider than 60 bits and negative counts are rejected with
/// [`Error::DecodeError`].
pub fn string_to_counts(s: &str) -> Result<Vec<u32>, Error> {
    // 12 chars of 5 bits each keep the sign shift below 64.
    const MAX_CHARS: u32 = 12;

    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut p = 0usize;

    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0u32;
        let mut more = true;

        while more {
            let Some(&byte) = bytes.get(p) else {
                return Err(Error::DecodeError(format!(
                    "counts string truncated inside value {}",
                    counts.len()
                )));
            };
            if !(48..=111).contains(&byte) {
                return Err(Error::DecodeError(format!(
                    "invalid character {:?} at offset {}",
                    byte as char, p
                )));
            }
            if k == MAX_CHARS {
                return Err(Error::DecodeError(format!(
                    "value {} exceeds {} characters",
                    counts.len(),
                    MAX_CHARS
                )));
            }

            let c = (byte - 48) as i64;
            x |= (c & 0x1f) << (5 * k);
            more = c & 0x20 != 0;
            p += 1;
            k += 1;
            if !more && c & 0x10 != 0 {
                x |= -1i64 << (5 * k);
            }
        }

        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        let count = u32::try_from(x).map_err(|_| {
            Error::DecodeError(format!("run {} decodes to {}", counts.len(), x))
        })?;
        counts.push(count);
    }

    Ok(counts)
}

/// Encode a mask straight into its compressed string form.
pub fn rle_to_string(mask: &BinaryMask) -> CompressedRle {
    mask_to_rle(mask).compress()
}

/// Decode a compressed counts string for a `height × width` mask.
pub fn rle_from_string(s: &str, height: u32, width: u32) -> Result<BinaryMask, Error> {
    let compressed = CompressedRle {
        counts: s.to_string(),
        size: [height, width],
    };
    rle_to_mask(&compressed.decompress()?)
}
