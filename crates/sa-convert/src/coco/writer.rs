// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! COCO JSON writers.

use super::types::{
    CocoAnnotation, CocoCategory, CocoDataset, CocoImage, CocoInfo, Segmentation,
};
use crate::Error;
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::Path};

/// Options for COCO writing.
#[derive(Debug, Clone, Default)]
pub struct CocoWriteOptions {
    /// Pretty-print JSON with indentation.
    pub pretty: bool,
}

/// COCO writer for generating JSON files.
///
/// # Example
///
/// ```rust,no_run
/// use sa_convert::coco::{CocoDataset, CocoWriter};
///
/// let writer = CocoWriter::new();
/// let dataset = CocoDataset::default();
/// writer.write_json(&dataset, "annotations.json")?;
/// # Ok::<(), sa_convert::Error>(())
/// ```
pub struct CocoWriter {
    options: CocoWriteOptions,
}

impl CocoWriter {
    /// Create a new COCO writer with default options.
    pub fn new() -> Self {
        Self {
            options: CocoWriteOptions::default(),
        }
    }

    /// Create a new COCO writer with custom options.
    pub fn with_options(options: CocoWriteOptions) -> Self {
        Self { options }
    }

    /// Write a COCO document (instances or panoptic) to a JSON file,
    /// creating the parent directory if needed.
    pub fn write_json<T: Serialize, P: AsRef<Path>>(
        &self,
        dataset: &T,
        path: P,
    ) -> Result<(), Error> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path.as_ref())?;
        let writer = BufWriter::with_capacity(64 * 1024, file);

        if self.options.pretty {
            serde_json::to_writer_pretty(writer, dataset)?;
        } else {
            serde_json::to_writer(writer, dataset)?;
        }

        Ok(())
    }
}

impl Default for CocoWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// `info` block stamped with today's date.
pub fn default_info() -> CocoInfo {
    let now = Utc::now();
    CocoInfo {
        year: Some(now.year() as u32),
        version: Some("1.0".to_string()),
        description: Some(format!("Converted by sa-convert {}", env!("CARGO_PKG_VERSION"))),
        contributor: None,
        url: None,
        date_created: Some(now.format("%Y/%m/%d").to_string()),
    }
}

/// Builder for constructing a COCO dataset.
///
/// Provides a convenient API for incrementally building a COCO dataset.
#[derive(Debug)]
pub struct CocoDatasetBuilder {
    dataset: CocoDataset,
    next_image_id: u64,
    next_annotation_id: u64,
}

impl Default for CocoDatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CocoDatasetBuilder {
    /// Create a new dataset builder with a dated `info` block.
    pub fn new() -> Self {
        Self {
            dataset: CocoDataset {
                info: default_info(),
                ..Default::default()
            },
            next_image_id: 1,
            next_annotation_id: 1,
        }
    }

    /// Add a category under a fixed ID, returning the ID already assigned to
    /// `name` if it exists.
    pub fn add_category_with_id(
        &mut self,
        id: u32,
        name: &str,
        supercategory: Option<&str>,
    ) -> u32 {
        if let Some(cat) = self.dataset.categories.iter().find(|c| c.name == name) {
            return cat.id;
        }

        self.dataset.categories.push(CocoCategory {
            id,
            name: name.to_string(),
            supercategory: supercategory.map(String::from),
            ..Default::default()
        });

        id
    }

    /// Add an image, returning its ID.
    pub fn add_image(&mut self, file_name: &str, width: u32, height: u32) -> u64 {
        let id = self.next_image_id;
        self.next_image_id += 1;

        self.dataset.images.push(CocoImage {
            id,
            width,
            height,
            file_name: file_name.to_string(),
            ..Default::default()
        });

        id
    }

    /// Add an annotation with a precomputed area, returning its ID.
    pub fn add_annotation_with_area(
        &mut self,
        image_id: u64,
        category_id: u32,
        bbox: [f64; 4],
        area: f64,
        segmentation: Option<Segmentation>,
    ) -> u64 {
        let id = self.next_annotation_id;
        self.next_annotation_id += 1;

        self.dataset.annotations.push(CocoAnnotation {
            id,
            image_id,
            category_id,
            bbox,
            area,
            iscrowd: 0,
            segmentation,
        });

        id
    }

    /// Build the final dataset.
    pub fn build(self) -> CocoDataset {
        self.dataset
    }
}
