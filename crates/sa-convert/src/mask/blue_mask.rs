// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Blue mask instance codec.
//!
//! A blue mask is an RGBA raster in which every instance part is painted with
//! its own palette color (see [`super::color`]). Encoding paints instances in
//! input order, so where instances overlap the later one wins. Decoding
//! rebuilds one membership mask per instance and traces it back into
//! polygons.

use super::{
    BinaryMask,
    color::palette_rgb,
    geometry::{
        bbox, mask_to_external_polygons, mask_to_polygons, polygon_to_mask,
        polygon_with_holes_to_mask, PolygonWithHoles,
    },
    rgb_to_hex,
};
use crate::Error;
use image::{Rgba, RgbaImage};
use log::debug;
use std::collections::HashMap;

/// Geometry of one instance part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartShape {
    /// One or more polygons painted with the same color.
    Polygons(Vec<Vec<f64>>),
    /// A binary mask with the raster's dimensions.
    Mask(BinaryMask),
}

/// Which borders [`decode_instances`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContourMode {
    /// Outermost borders only; holes are filled.
    #[default]
    External,
    /// Outer borders with their holes.
    WithHoles,
}

/// A painted raster and the colors assigned to each instance's parts.
#[derive(Debug, Clone)]
pub struct BlueMask {
    pub raster: RgbaImage,
    pub colors: Vec<Vec<[u8; 3]>>,
}

impl BlueMask {
    /// Per-instance part colors as `#rrggbb` tokens.
    pub fn color_tokens(&self) -> Vec<Vec<String>> {
        self.colors
            .iter()
            .map(|parts| parts.iter().map(rgb_to_hex).collect())
            .collect()
    }
}

/// One traced contour of a decoded instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedShape {
    /// Index into the instance list passed to [`decode_instances`].
    pub instance: usize,
    pub polygon: Vec<f64>,
    pub holes: Vec<Vec<f64>>,
    /// `[x, y, w, h]` of the pixels this contour covers.
    pub bbox: [u32; 4],
    pub area: u64,
}

/// Paint instances into a fresh `width × height` raster.
///
/// Colors are handed out from the palette in order, one per part, so the
/// first part of the first instance always gets palette color 0. More parts
/// than [`PALETTE_SIZE`](super::PALETTE_SIZE) is `InvalidParameters`.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all, fields(instances = instances.len())))]
pub fn encode_instances(
    width: u32,
    height: u32,
    instances: &[Vec<PartShape>],
) -> Result<BlueMask, Error> {
    let total: usize = instances.iter().map(Vec::len).sum();
    let mut palette = palette_rgb(total)?.into_iter();
    let mut raster = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let mut colors = Vec::with_capacity(instances.len());

    for parts in instances {
        let mut assigned = Vec::with_capacity(parts.len());
        for (part, rgb) in parts.iter().zip(palette.by_ref()) {
            let mask = match part {
                PartShape::Polygons(polygons) => {
                    let mut mask = BinaryMask::new(width, height);
                    for polygon in polygons {
                        for (x, y) in polygon_to_mask(polygon, height, width).foreground() {
                            mask.set(x, y, true);
                        }
                    }
                    mask
                }
                PartShape::Mask(mask) => {
                    if mask.width() != width || mask.height() != height {
                        return Err(Error::InvalidParameters(format!(
                            "Part mask is {}x{} but the raster is {}x{}",
                            mask.width(),
                            mask.height(),
                            width,
                            height
                        )));
                    }
                    mask.clone()
                }
            };

            let pixel = Rgba([rgb[0], rgb[1], rgb[2], 255]);
            for (x, y) in mask.foreground() {
                raster.put_pixel(x, y, pixel);
            }
            assigned.push(rgb);
        }
        colors.push(assigned);
    }

    Ok(BlueMask { raster, colors })
}

fn pixel_key(pixel: &Rgba<u8>) -> u32 {
    let [r, g, b, a] = pixel.0;
    if a == 0 {
        return 0;
    }
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Pixels of every instance, in input order. Each pixel belongs to at most
/// one instance, so the lists together hold at most one entry per pixel.
fn instance_pixels(raster: &RgbaImage, instances: &[Vec<[u8; 3]>]) -> Vec<Vec<(u32, u32)>> {
    let mut owner: HashMap<u32, usize> = HashMap::new();
    for (idx, parts) in instances.iter().enumerate() {
        for rgb in parts {
            let key = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
            owner.entry(key).or_insert(idx);
        }
    }

    let mut pixels = vec![Vec::new(); instances.len()];
    for (x, y, pixel) in raster.enumerate_pixels() {
        let key = pixel_key(pixel);
        if key == 0 {
            continue;
        }
        if let Some(&idx) = owner.get(&key) {
            pixels[idx].push((x, y));
        }
    }

    pixels
}

/// Membership mask of every instance, in input order.
///
/// A pixel belongs to an instance when its color is one of the instance's
/// part colors. Transparent pixels never belong to any instance. Masks are
/// built one at a time as the iterator advances.
pub fn instance_masks(
    raster: &RgbaImage,
    instances: &[Vec<[u8; 3]>],
) -> impl Iterator<Item = BinaryMask> + use<> {
    let (width, height) = raster.dimensions();
    instance_pixels(raster, instances)
        .into_iter()
        .map(move |pixels| {
            let mut mask = BinaryMask::new(width, height);
            for (x, y) in pixels {
                mask.set(x, y, true);
            }
            mask
        })
}

/// The bounding box of an instance's pixels, used to trace and rasterize
/// on a small mask instead of the whole raster.
struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Crop {
    fn around(pixels: &[(u32, u32)]) -> Option<Self> {
        let (&(x, y), rest) = pixels.split_first()?;
        let (x0, y0, x1, y1) = rest.iter().fold((x, y, x, y), |(x0, y0, x1, y1), &(x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        });
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
    }

    fn mask(&self, pixels: &[(u32, u32)]) -> BinaryMask {
        let mut mask = BinaryMask::new(self.width, self.height);
        for &(x, y) in pixels {
            mask.set(x - self.x, y - self.y, true);
        }
        mask
    }

    /// Translate flat crop coordinates back into the raster.
    fn offset(&self, mut polygon: Vec<f64>) -> Vec<f64> {
        for (k, v) in polygon.iter_mut().enumerate() {
            let shift = if k % 2 == 0 { self.x } else { self.y };
            *v += shift as f64;
        }
        polygon
    }
}

fn intersect(a: &BinaryMask, b: &BinaryMask) -> BinaryMask {
    BinaryMask::from_fn(a.width(), a.height(), |x, y| a.get(x, y) && b.get(x, y))
}

/// Trace every instance of a blue mask back into polygons.
///
/// Instances whose pixels were painted over entirely, or whose contours are
/// degenerate, produce no records.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all, fields(instances = instances.len())))]
pub fn decode_instances(
    raster: &RgbaImage,
    instances: &[Vec<[u8; 3]>],
    mode: ContourMode,
) -> Vec<DecodedShape> {
    let mut shapes = Vec::new();

    for (instance, pixels) in instance_pixels(raster, instances).into_iter().enumerate() {
        let Some(crop) = Crop::around(&pixels) else {
            debug!("instance {} has no visible pixels", instance);
            continue;
        };
        let membership = crop.mask(&pixels);

        let polygons = match mode {
            ContourMode::External => mask_to_external_polygons(&membership)
                .into_iter()
                .map(|outer| PolygonWithHoles {
                    outer,
                    holes: Vec::new(),
                })
                .collect(),
            ContourMode::WithHoles => mask_to_polygons(&membership),
        };

        for polygon in polygons {
            let covered = match mode {
                ContourMode::External => {
                    polygon_to_mask(&polygon.outer, crop.height, crop.width)
                }
                ContourMode::WithHoles => {
                    polygon_with_holes_to_mask(&polygon, crop.height, crop.width)
                }
            };
            let covered = intersect(&covered, &membership);
            let Ok([x, y, w, h]) = bbox(&covered) else {
                continue;
            };

            shapes.push(DecodedShape {
                instance,
                area: covered.count(),
                bbox: [x + crop.x, y + crop.y, w, h],
                polygon: crop.offset(polygon.outer),
                holes: polygon
                    .holes
                    .into_iter()
                    .map(|hole| crop.offset(hole))
                    .collect(),
            });
        }
    }

    shapes
}
