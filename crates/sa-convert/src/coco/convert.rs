// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Geometry conversion between COCO segmentations and the mask core.
//!
//! ## Coordinate Systems
//!
//! - **COCO bbox**: `[x, y, w, h]` in pixels, top-left origin
//! - **COCO polygon**: flat pixel coordinates `[x0, y0, x1, y1, ...]`
//! - **COCO RLE**: column-major runs over a `[height, width]` grid

use super::types::Segmentation;
use crate::{
    Error,
    mask::{
        BinaryMask, mask_to_external_polygons, mask_to_rle, merge, polygon_bbox, polygon_to_mask,
        rle_to_mask, shoelace_area,
    },
};

/// How masks are written into `segmentation` on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentationEncoding {
    /// External contours as polygon rings.
    #[default]
    Polygon,
    /// Compressed RLE counts string.
    Rle,
}

impl std::str::FromStr for SegmentationEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "polygon" => Ok(SegmentationEncoding::Polygon),
            "rle" => Ok(SegmentationEncoding::Rle),
            other => Err(Error::InvalidParameters(format!(
                "Unknown segmentation encoding '{}'",
                other
            ))),
        }
    }
}

impl Segmentation {
    /// Rasterize into a `height × width` mask.
    ///
    /// RLE segmentations must already have the requested size.
    pub fn to_mask(&self, height: u32, width: u32) -> Result<BinaryMask, Error> {
        let rle = match self {
            Segmentation::Polygon(polygons) => {
                let masks: Vec<_> = polygons
                    .iter()
                    .filter(|p| p.len() >= 6)
                    .map(|p| polygon_to_mask(p, height, width))
                    .collect();
                if masks.is_empty() {
                    return Ok(BinaryMask::new(width, height));
                }
                return merge(&masks);
            }
            Segmentation::Rle(rle) => rle.clone(),
            Segmentation::CompressedRle(compressed) => compressed.decompress()?,
        };

        if rle.size != [height, width] {
            return Err(Error::SchemaError(format!(
                "RLE size {:?} does not match image size [{}, {}]",
                rle.size, height, width
            )));
        }
        rle_to_mask(&rle)
    }

    /// Polygon rings of the segmentation.
    ///
    /// Polygons pass through (rings with fewer than 3 points dropped); RLE is
    /// decoded and traced with external contours, so holes are lost.
    pub fn to_polygons(&self, height: u32, width: u32) -> Result<Vec<Vec<f64>>, Error> {
        match self {
            Segmentation::Polygon(polygons) => Ok(polygons
                .iter()
                .filter(|p| p.len() >= 6)
                .map(|p| p[..p.len() & !1].to_vec())
                .collect()),
            _ => Ok(mask_to_external_polygons(&self.to_mask(height, width)?)),
        }
    }

    /// Area in pixels²: shoelace sum for polygons, foreground count for RLE.
    pub fn area(&self) -> Result<f64, Error> {
        match self {
            Segmentation::Polygon(polygons) => Ok(polygons.iter().map(|p| shoelace_area(p)).sum()),
            Segmentation::Rle(rle) => {
                rle.validate()?;
                Ok(rle.area() as f64)
            }
            Segmentation::CompressedRle(compressed) => Ok(compressed.decompress()?.area() as f64),
        }
    }

    /// Encode a mask; `None` when polygon encoding finds no usable contour.
    pub fn from_mask(mask: &BinaryMask, encoding: SegmentationEncoding) -> Option<Self> {
        match encoding {
            SegmentationEncoding::Polygon => {
                let polygons = mask_to_external_polygons(mask);
                (!polygons.is_empty()).then_some(Segmentation::Polygon(polygons))
            }
            SegmentationEncoding::Rle => {
                Some(Segmentation::CompressedRle(mask_to_rle(mask).compress()))
            }
        }
    }
}

/// Bounding box `[x, y, w, h]` enclosing all polygon rings.
pub fn polygons_bbox(polygons: &[Vec<f64>]) -> Option<[f64; 4]> {
    polygons
        .iter()
        .filter_map(|p| polygon_bbox(p))
        .map(|[x, y, w, h]| [x, y, x + w, y + h])
        .reduce(|a, b| [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])])
        .map(|[x1, y1, x2, y2]| [x1, y1, x2 - x1, y2 - y1])
}

/// Validate that a COCO bounding box is within image bounds.
pub fn validate_coco_bbox(
    bbox: &[f64; 4],
    image_width: u32,
    image_height: u32,
) -> Result<(), Error> {
    let [x, y, w, h] = *bbox;

    if w <= 0.0 || h <= 0.0 {
        return Err(Error::SchemaError(format!(
            "Width and height must be positive: w={}, h={}",
            w, h
        )));
    }

    // Allow slight overflow for floating point precision
    let epsilon = 1.0;
    if x < -epsilon || y < -epsilon {
        return Err(Error::SchemaError(format!(
            "Bbox has negative coordinates: x={}, y={}",
            x, y
        )));
    }

    if x + w > (image_width as f64) + epsilon || y + h > (image_height as f64) + epsilon {
        return Err(Error::SchemaError(format!(
            "Bbox exceeds image bounds: [{}, {}, {}, {}] for {}x{} image",
            x, y, w, h, image_width, image_height
        )));
    }

    Ok(())
}
