// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Format/task dispatch for project import and export.
//!
//! | format | task                  | import          | export          |
//! |--------|-----------------------|-----------------|-----------------|
//! | COCO   | instance segmentation | vector, pixel   | vector, pixel   |
//! | COCO   | object detection      | vector          | vector          |
//! | COCO   | panoptic segmentation | pixel           | pixel           |
//! | VOC    | instance segmentation | vector, pixel   |                 |
//! | VOC    | object detection      | vector          |                 |
//! | YOLO   | instance segmentation | vector          | vector          |
//! | YOLO   | object detection      | vector          | vector          |
//!
//! Any other combination fails with [`Error::UnsupportedFormat`] before any
//! file is touched.

use crate::{
    BatchReport, ConvertConfig, Error, Progress,
    annotation::ProjectType,
    coco::{self, CocoReadOptions, SegmentationEncoding},
    voc, yolo,
};
use std::{fmt, path::Path, str::FromStr};
use tokio::sync::mpsc::Sender;

/// Foreign dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Coco,
    Voc,
    Yolo,
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetFormat::Coco => "coco",
            DatasetFormat::Voc => "voc",
            DatasetFormat::Yolo => "yolo",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DatasetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coco" => Ok(DatasetFormat::Coco),
            "voc" | "pascal-voc" => Ok(DatasetFormat::Voc),
            "yolo" => Ok(DatasetFormat::Yolo),
            other => Err(Error::UnsupportedFormat(format!(
                "Unknown dataset format '{}'",
                other
            ))),
        }
    }
}

/// Annotation task a dataset was labeled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    InstanceSegmentation,
    ObjectDetection,
    PanopticSegmentation,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::InstanceSegmentation => "instance-segmentation",
            Task::ObjectDetection => "object-detection",
            Task::PanopticSegmentation => "panoptic-segmentation",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "instance-segmentation" => Ok(Task::InstanceSegmentation),
            "object-detection" => Ok(Task::ObjectDetection),
            "panoptic-segmentation" => Ok(Task::PanopticSegmentation),
            other => Err(Error::InvalidParameters(format!("Unknown task '{}'", other))),
        }
    }
}

/// Settings shared by every converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Items converted concurrently.
    pub max_workers: usize,
    /// Pretty-print written JSON.
    pub pretty: bool,
    /// How masks are written into COCO `segmentation`.
    pub segmentation: SegmentationEncoding,
    /// Validation and category filtering applied when reading COCO input.
    pub coco: CocoReadOptions,
}

impl From<&ConvertConfig> for ConvertOptions {
    fn from(config: &ConvertConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            pretty: config.pretty,
            segmentation: SegmentationEncoding::default(),
            coco: CocoReadOptions::default(),
        }
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from(&ConvertConfig::default())
    }
}

fn unsupported(
    direction: &str,
    format: DatasetFormat,
    task: Task,
    project_type: ProjectType,
) -> Error {
    Error::UnsupportedFormat(format!(
        "{} of {} {} into a {} project is not supported",
        direction, format, task, project_type
    ))
}

/// Convert a foreign dataset at `input` into a native project at `output`.
///
/// `input` is a COCO JSON/ZIP file, a VOC root directory (with
/// `Annotations/`, `SegmentationObject/`, `SegmentationClass/`) or a YOLO
/// labels directory.
pub async fn import_annotations(
    format: DatasetFormat,
    task: Task,
    project_type: ProjectType,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    use DatasetFormat::*;
    use ProjectType::*;
    use Task::*;

    match (format, task, project_type) {
        (Coco, InstanceSegmentation | ObjectDetection, Vector) => {
            coco::import_vector(input, output, task, options, progress).await
        }
        (Coco, InstanceSegmentation, Pixel) => {
            coco::import_pixel(input, output, options, progress).await
        }
        (Coco, PanopticSegmentation, Pixel) => {
            coco::import_panoptic(input, output, options, progress).await
        }
        (Voc, ObjectDetection, Vector) => {
            voc::import_detection(input, output, options, progress).await
        }
        (Voc, InstanceSegmentation, _) => {
            voc::import_segmentation(input, output, project_type, options, progress).await
        }
        (Yolo, InstanceSegmentation | ObjectDetection, Vector) => {
            yolo::import(input, output, options, progress).await
        }
        _ => Err(unsupported("Import", format, task, project_type)),
    }
}

/// Convert the native project at `input` into a foreign dataset.
///
/// COCO writes a single JSON file at `output` (plus a PNG directory next to
/// it for panoptic); YOLO writes a labels directory.
pub async fn export_annotations(
    format: DatasetFormat,
    task: Task,
    project_type: ProjectType,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    use DatasetFormat::*;
    use ProjectType::*;
    use Task::*;

    match (format, task, project_type) {
        (Coco, InstanceSegmentation | ObjectDetection, Vector) => {
            coco::export_vector(input, output, task, options, progress).await
        }
        (Coco, InstanceSegmentation, Pixel) => {
            coco::export_pixel(input, output, options, progress).await
        }
        (Coco, PanopticSegmentation, Pixel) => {
            coco::export_panoptic(input, output, options, progress).await
        }
        (Yolo, InstanceSegmentation | ObjectDetection, Vector) => {
            yolo::export(input, output, task, options, progress).await
        }
        _ => Err(unsupported("Export", format, task, project_type)),
    }
}
