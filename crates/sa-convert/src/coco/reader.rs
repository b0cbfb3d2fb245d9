// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! COCO JSON/ZIP readers.
//!
//! Annotation files are read from plain JSON or from a ZIP archive holding
//! one or more annotation JSON files, which are merged.

use super::{convert::validate_coco_bbox, types::*};
use crate::Error;
use log::debug;
use serde_json::error::Category;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Options for COCO reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CocoReadOptions {
    /// If true, validate all annotations during reading.
    pub validate: bool,
    /// Filter by category names (empty = all).
    pub category_filter: Vec<String>,
}

/// COCO annotation reader.
///
/// # Example
///
/// ```rust,no_run
/// use sa_convert::coco::CocoReader;
///
/// let reader = CocoReader::new();
/// let dataset = reader.read("annotations/instances_val2017.json")?;
/// println!("Loaded {} images", dataset.images.len());
/// # Ok::<(), sa_convert::Error>(())
/// ```
pub struct CocoReader {
    options: CocoReadOptions,
}

impl CocoReader {
    /// Create a new COCO reader with default options.
    pub fn new() -> Self {
        Self {
            options: CocoReadOptions::default(),
        }
    }

    /// Create a new COCO reader with custom options.
    pub fn with_options(options: CocoReadOptions) -> Self {
        Self { options }
    }

    /// Read a dataset, choosing ZIP or JSON by the file extension.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<CocoDataset, Error> {
        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
        {
            self.read_annotations_zip(path)
        } else {
            self.read_json(path)
        }
    }

    /// Read COCO dataset from a JSON file.
    pub fn read_json<P: AsRef<Path>>(&self, path: P) -> Result<CocoDataset, Error> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        let dataset: CocoDataset = serde_json::from_reader(reader).map_err(parse_error)?;

        if self.options.validate {
            validate_dataset(&dataset)?;
        }

        Ok(self.apply_filters(dataset))
    }

    /// Read COCO annotations from a ZIP file.
    ///
    /// Every `*.json` entry in the archive is parsed and merged; images and
    /// categories are deduplicated by id.
    pub fn read_annotations_zip<P: AsRef<Path>>(&self, path: P) -> Result<CocoDataset, Error> {
        let file = File::open(path.as_ref())?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut merged = CocoDataset::default();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();

            if name.ends_with(".json") && !entry.is_dir() {
                debug!("Reading {} from {:?}", name, path.as_ref());
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;

                let dataset: CocoDataset =
                    serde_json::from_str(&contents).map_err(parse_error)?;
                merge_datasets(&mut merged, dataset);
            }
        }

        if self.options.validate {
            validate_dataset(&merged)?;
        }

        Ok(self.apply_filters(merged))
    }

    /// Read a COCO panoptic JSON file.
    pub fn read_panoptic_json<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<CocoPanopticDataset, Error> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        let mut dataset: CocoPanopticDataset =
            serde_json::from_reader(reader).map_err(parse_error)?;

        if self.options.validate {
            validate_panoptic(&dataset)?;
        }

        if !self.options.category_filter.is_empty() {
            let keep = self.category_ids(&dataset.categories);
            dataset
                .categories
                .retain(|c| self.options.category_filter.contains(&c.name));
            for ann in &mut dataset.annotations {
                ann.segments_info.retain(|s| keep.contains(&s.category_id));
            }
        }

        Ok(dataset)
    }

    fn category_ids(&self, categories: &[CocoCategory]) -> HashSet<u32> {
        categories
            .iter()
            .filter(|c| self.options.category_filter.contains(&c.name))
            .map(|c| c.id)
            .collect()
    }

    /// Apply filters from options to the dataset.
    fn apply_filters(&self, mut dataset: CocoDataset) -> CocoDataset {
        if !self.options.category_filter.is_empty() {
            let category_ids = self.category_ids(&dataset.categories);

            dataset
                .categories
                .retain(|c| self.options.category_filter.contains(&c.name));
            dataset
                .annotations
                .retain(|a| category_ids.contains(&a.category_id));
        }

        dataset
    }
}

impl Default for CocoReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Syntax errors stay `JsonError`; well-formed JSON that does not match the
/// COCO layout (missing `category_id`, wrong field types) is a `SchemaError`.
fn parse_error(err: serde_json::Error) -> Error {
    match err.classify() {
        Category::Data => Error::SchemaError(err.to_string()),
        _ => Error::JsonError(err),
    }
}

/// Validate a COCO dataset for consistency.
///
/// Every annotation must reference an existing image and category, and its
/// bbox must have positive size and lie within the image.
pub fn validate_dataset(dataset: &CocoDataset) -> Result<(), Error> {
    let images: HashMap<_, _> = dataset.images.iter().map(|i| (i.id, i)).collect();
    let category_ids: HashSet<_> = dataset.categories.iter().map(|c| c.id).collect();

    for ann in &dataset.annotations {
        let Some(image) = images.get(&ann.image_id) else {
            return Err(Error::SchemaError(format!(
                "Annotation {} references non-existent image_id {}",
                ann.id, ann.image_id
            )));
        };

        if !category_ids.contains(&ann.category_id) {
            return Err(Error::SchemaError(format!(
                "Annotation {} references non-existent category_id {}",
                ann.id, ann.category_id
            )));
        }

        validate_coco_bbox(&ann.bbox, image.width, image.height).map_err(|err| {
            Error::SchemaError(format!("Annotation {} bbox rejected: {}", ann.id, err))
        })?;
    }

    Ok(())
}

fn validate_panoptic(dataset: &CocoPanopticDataset) -> Result<(), Error> {
    let image_ids: HashSet<_> = dataset.images.iter().map(|i| i.id).collect();
    let category_ids: HashSet<_> = dataset.categories.iter().map(|c| c.id).collect();

    for ann in &dataset.annotations {
        if !image_ids.contains(&ann.image_id) {
            return Err(Error::SchemaError(format!(
                "Panoptic annotation {} references non-existent image_id {}",
                ann.file_name, ann.image_id
            )));
        }
        if let Some(segment) = ann
            .segments_info
            .iter()
            .find(|s| !category_ids.contains(&s.category_id))
        {
            return Err(Error::SchemaError(format!(
                "Segment {} in {} references non-existent category_id {}",
                segment.id, ann.file_name, segment.category_id
            )));
        }
    }

    Ok(())
}

/// Merge a source dataset into a target dataset.
fn merge_datasets(target: &mut CocoDataset, source: CocoDataset) {
    // Take info if not set
    if target.info.description.is_none() {
        target.info = source.info;
    }

    // Merge images (deduplicate by id)
    let existing_ids: HashSet<_> = target.images.iter().map(|i| i.id).collect();
    for image in source.images {
        if !existing_ids.contains(&image.id) {
            target.images.push(image);
        }
    }

    // Merge categories (deduplicate by id)
    let existing_cats: HashSet<_> = target.categories.iter().map(|c| c.id).collect();
    for cat in source.categories {
        if !existing_cats.contains(&cat.id) {
            target.categories.push(cat);
        }
    }

    // IDs should be globally unique
    target.annotations.extend(source.annotations);

    let existing_licenses: HashSet<_> = target.licenses.iter().map(|l| l.id).collect();
    for lic in source.licenses {
        if !existing_licenses.contains(&lic.id) {
            target.licenses.push(lic);
        }
    }
}
