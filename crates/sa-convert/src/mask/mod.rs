// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Mask Conversion Core
//!
//! Binary masks, the COCO run-length codec, contour tracing and the
//! "blue mask" instance codec shared by every pixel-based converter.
//!
//! ## Layers
//!
//! 1. [`rle`]: lossless `BinaryMask` ↔ RLE ↔ compressed counts string
//! 2. [`geometry`]: contours with hole hierarchy, polygon scan conversion,
//!    bounding box and area
//! 3. [`color`]: deterministic instance palette and hex/rgb helpers
//! 4. [`blue_mask`]: paints polygon/mask instances into one RGBA raster and
//!    decomposes such a raster back into per-instance polygons
//!
//! All functions here are pure; file handling lives in the converters.
//!
//! ## Example
//!
//! ```rust
//! use sa_convert::mask::{BinaryMask, mask_to_rle, rle_to_mask};
//!
//! let mut mask = BinaryMask::new(4, 4);
//! mask.set(1, 1, true);
//! mask.set(2, 1, true);
//!
//! let rle = mask_to_rle(&mask);
//! assert_eq!(rle.size, [4, 4]);
//! assert_eq!(rle_to_mask(&rle)?, mask);
//! # Ok::<(), sa_convert::Error>(())
//! ```

pub mod blue_mask;
pub mod color;
pub mod geometry;
pub mod rle;

pub use blue_mask::{
    BlueMask, ContourMode, DecodedShape, PartShape, decode_instances, encode_instances,
    instance_masks,
};
pub use color::{
    PALETTE_SIZE, color_index, generate_colors, generate_rgb, hex_to_rgb, id_to_rgb, palette_rgb,
    rgb_to_hex, rgb_to_id,
};
pub use geometry::{
    BorderType, Contour, PolygonWithHoles, area, bbox, find_contours, mask_to_external_polygons,
    mask_to_polygons, merge, polygon_bbox, polygon_to_mask, polygon_with_holes_to_mask,
    shoelace_area,
};
pub use rle::{
    CompressedRle, Rle, counts_to_string, mask_to_rle, rle_from_string, rle_to_mask,
    rle_to_string, string_to_counts,
};

/// A binary mask of `height × width` pixels stored row-major as 0/1 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BinaryMask {
    /// Create an all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Wrap row-major pixel data; any non-zero byte counts as foreground.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self, crate::Error> {
        if data.len() != width as usize * height as usize {
            return Err(crate::Error::InvalidParameters(format!(
                "Mask data length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }

        let data = data.into_iter().map(|v| u8::from(v != 0)).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(u8::from(f(x, y)));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major 0/1 pixel data.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns true when `(x, y)` is inside the mask and foreground.
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[self.index(x, y)] != 0
    }

    /// Set a pixel; writes outside the mask are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.data[idx] = u8::from(value);
        }
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    /// Returns true when no pixel is foreground.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Iterate over `(x, y)` of foreground pixels in row-major order.
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
