// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! COCO JSON data structures for serde serialization/deserialization.
//!
//! Covers object detection, instance segmentation and panoptic segmentation
//! annotation files. Keypoints and captions are NOT supported.

use crate::mask::{CompressedRle, Rle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level COCO dataset structure.
///
/// This is the root structure for COCO annotation files like `instances_train2017.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoDataset {
    /// Dataset metadata (optional but commonly present).
    #[serde(default)]
    pub info: CocoInfo,
    /// License information for the images.
    #[serde(default)]
    pub licenses: Vec<CocoLicense>,
    /// List of images in the dataset.
    pub images: Vec<CocoImage>,
    /// List of annotations (one per object instance).
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    /// List of object categories/classes.
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

/// Dataset metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoInfo {
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contributor: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

/// License information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoLicense {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Image metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoImage {
    /// Unique image ID.
    pub id: u64,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Filename (relative path within the images folder).
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coco_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_captured: Option<String>,
}

/// Category definition.
///
/// Panoptic files additionally mark categories as things or stuff and may
/// carry a display color.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoCategory {
    /// Unique category ID.
    pub id: u32,
    /// Category name (e.g., "person", "car").
    pub name: String,
    /// Parent category name (e.g., "human" for "person").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isthing: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

/// Annotation for object detection and instance segmentation.
///
/// Each annotation represents a single object instance in an image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoAnnotation {
    /// Unique annotation ID.
    pub id: u64,
    /// ID of the image containing this object.
    pub image_id: u64,
    /// Category ID of this object.
    pub category_id: u32,
    /// Bounding box: `[x, y, width, height]` in pixels (top-left corner).
    pub bbox: [f64; 4],
    /// Area of the segmentation mask in pixels².
    #[serde(default)]
    pub area: f64,
    /// Whether this is a crowd annotation (0 = single instance, 1 = crowd).
    #[serde(default)]
    pub iscrowd: u8,
    /// Segmentation mask (polygon or RLE format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
}

/// Segmentation format: polygon array or RLE.
///
/// The JSON field is untagged; serde picks the variant from its shape:
/// - **Polygon**: `[[x1,y1,x2,y2,...], [x3,y3,...]]`, several rings describe
///   disjoint regions of the same object
/// - **Rle**: `{"counts": [..], "size": [h, w]}`
/// - **CompressedRle**: `{"counts": "..", "size": [h, w]}`
///
/// Converters match on this once (see [`Segmentation::to_mask`] and
/// [`Segmentation::to_polygons`]) instead of inspecting the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    Polygon(Vec<Vec<f64>>),
    Rle(Rle),
    CompressedRle(CompressedRle),
}

/// Top-level COCO panoptic structure (`panoptic_*.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoPanopticDataset {
    #[serde(default)]
    pub info: CocoInfo,
    #[serde(default)]
    pub licenses: Vec<CocoLicense>,
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<PanopticAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

/// Segments of one image; pixels live in the PNG named `file_name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanopticAnnotation {
    pub image_id: u64,
    pub file_name: String,
    #[serde(default)]
    pub segments_info: Vec<SegmentInfo>,
}

/// One panoptic segment. Its pixels are those whose color encodes `id`
/// (see [`crate::mask::rgb_to_id`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub id: u32,
    pub category_id: u32,
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub bbox: [f64; 4],
    #[serde(default)]
    pub iscrowd: u8,
}

/// Lookup tables for efficient COCO data access.
///
/// Builds indexes from a `CocoDataset` for O(1) lookups.
#[derive(Debug, Clone)]
pub struct CocoIndex {
    /// `image_id` → `CocoImage`
    pub images: HashMap<u64, CocoImage>,
    /// `category_id` → `CocoCategory`
    pub categories: HashMap<u32, CocoCategory>,
    /// `image_id` → `Vec<CocoAnnotation>`
    pub annotations_by_image: HashMap<u64, Vec<CocoAnnotation>>,
}

impl CocoIndex {
    /// Build lookup index from a `CocoDataset`.
    pub fn from_dataset(dataset: &CocoDataset) -> Self {
        let images: HashMap<_, _> = dataset
            .images
            .iter()
            .map(|img| (img.id, img.clone()))
            .collect();

        let categories: HashMap<_, _> = dataset
            .categories
            .iter()
            .map(|cat| (cat.id, cat.clone()))
            .collect();

        let mut annotations_by_image: HashMap<u64, Vec<CocoAnnotation>> = HashMap::new();
        for ann in &dataset.annotations {
            annotations_by_image
                .entry(ann.image_id)
                .or_default()
                .push(ann.clone());
        }

        Self {
            images,
            categories,
            annotations_by_image,
        }
    }

    /// Get annotations for an image.
    pub fn annotations_for_image(&self, image_id: u64) -> &[CocoAnnotation] {
        self.annotations_by_image
            .get(&image_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
