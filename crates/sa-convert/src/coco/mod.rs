// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # COCO Dataset Format Support
//!
//! Bidirectional conversion between COCO annotation files and native
//! projects.
//!
//! ## Supported Workflows
//!
//! 1. **COCO → vector project**: bboxes (object detection) or polygons
//!    (instance segmentation, RLE traced into polygons)
//! 2. **COCO → pixel project**: polygons and RLE painted into blue masks
//! 3. **COCO panoptic → pixel project**: segment PNGs decoded by segment id
//! 4. **Vector/pixel project → COCO**, including panoptic PNG output
//!
//! Keypoints and captions are not supported.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sa_convert::coco::{CocoReader, Segmentation};
//!
//! let reader = CocoReader::new();
//! let dataset = reader.read("annotations/instances_val2017.json")?;
//! let image = &dataset.images[0];
//!
//! for ann in dataset.annotations.iter().filter(|a| a.image_id == image.id) {
//!     if let Some(segmentation) = &ann.segmentation {
//!         let mask = segmentation.to_mask(image.height, image.width)?;
//!         println!("annotation {} covers {} pixels", ann.id, mask.count());
//!     }
//! }
//! # Ok::<(), sa_convert::Error>(())
//! ```

mod convert;
mod export;
mod import;
mod reader;
mod types;
mod writer;

pub use types::{
    CocoAnnotation, CocoCategory, CocoDataset, CocoImage, CocoIndex, CocoInfo, CocoLicense,
    CocoPanopticDataset, PanopticAnnotation, SegmentInfo, Segmentation,
};

pub use reader::{CocoReadOptions, CocoReader, validate_dataset};
pub use writer::{CocoDatasetBuilder, CocoWriteOptions, CocoWriter, default_info};

pub use convert::{SegmentationEncoding, polygons_bbox, validate_coco_bbox};

pub use import::{
    CategoryNames, categories_to_classes, category_names, coco_panoptic_to_pixel, coco_to_pixel,
    coco_to_vector, import_panoptic, import_pixel, import_vector, panoptic_png_dir,
};

pub use export::{
    ExportedAnnotation, ExportedImage, PanopticImage, assemble, export_panoptic, export_pixel,
    export_vector, panoptic_image, pixel_image, pixel_to_coco, pixel_to_coco_panoptic,
    vector_image, vector_to_coco,
};

#[cfg(test)]
mod tests;
