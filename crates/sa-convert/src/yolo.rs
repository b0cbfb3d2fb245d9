// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! YOLO text labels ↔ vector projects.
//!
//! One `<stem>.txt` per image, one object per line, coordinates normalized
//! to the image size:
//!
//! ```text
//! <class> <cx> <cy> <w> <h>          # bounding box
//! <class> <x1> <y1> <x2> <y2> ...    # polygon
//! ```
//!
//! Class indices are 0-based positions in `classes.txt`.

use crate::{
    BatchReport, Error, Progress,
    annotation::{
        AnnotationDocument, ClassMap, Instance, ProjectType, Shape, classes_from_names,
        document_items, document_path, read_classes, read_document, write_classes,
        write_document,
    },
    batch::run_batch,
    convert::{ConvertOptions, Task},
    mask::polygon_bbox,
};
use itertools::Itertools;
use log::{debug, info};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc::Sender;
use walkdir::WalkDir;

pub const CLASSES_TXT: &str = "classes.txt";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// Class names from `classes.txt`, one per line. Blank lines are skipped.
pub fn read_class_names(dir: &Path) -> Result<Vec<String>, Error> {
    let path = dir.join(CLASSES_TXT);
    if !path.is_file() {
        return Err(Error::MissingClasses(path));
    }

    Ok(std::fs::read_to_string(&path)?
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse one label line into its class index and a shape in pixels.
pub fn parse_line(line: &str, width: u32, height: u32) -> Result<(usize, Shape), Error> {
    let mut tokens = line.split_whitespace();
    let class = tokens
        .next()
        .ok_or_else(|| Error::SchemaError("Empty label line".to_string()))?
        .parse::<usize>()?;
    let values = tokens.map(str::parse::<f64>).collect::<Result<Vec<_>, _>>()?;
    let (w, h) = (width as f64, height as f64);

    let shape = match values.len() {
        4 => {
            let (cx, cy) = (values[0] * w, values[1] * h);
            let (bw, bh) = (values[2] * w, values[3] * h);
            Shape::bbox_from_xywh([cx - bw / 2.0, cy - bh / 2.0, bw, bh])
        }
        n if n >= 6 && n % 2 == 0 => Shape::polygon(
            values
                .iter()
                .tuples()
                .flat_map(|(x, y)| [x * w, y * h])
                .collect(),
        ),
        n => {
            return Err(Error::SchemaError(format!(
                "Label line has {} coordinates, expected 4 or an even number >= 6",
                n
            )));
        }
    };

    Ok((class, shape))
}

/// Format a shape as a label line for the given task.
///
/// Object detection writes boxes (polygons by their bounding box); instance
/// segmentation writes polygons (boxes by their corners). Other shapes give
/// `None`.
pub fn format_line(
    class: usize,
    shape: &Shape,
    width: u32,
    height: u32,
    task: Task,
) -> Option<String> {
    let (w, h) = (width as f64, height as f64);

    let values: Vec<f64> = match (task, shape) {
        (Task::ObjectDetection, Shape::Bbox { points }) => xywh_center(points.to_xywh()),
        (Task::ObjectDetection, Shape::Polygon { points, .. }) => {
            xywh_center(polygon_bbox(points)?)
        }
        (Task::InstanceSegmentation, Shape::Bbox { points }) => points.to_polygon(),
        (Task::InstanceSegmentation, Shape::Polygon { points, .. }) if points.len() >= 6 => {
            points.clone()
        }
        _ => return None,
    };

    let normalized = values
        .iter()
        .tuples()
        .flat_map(|(x, y)| [x / w, y / h])
        .map(|v| format!("{:.6}", v))
        .join(" ");
    Some(format!("{} {}", class, normalized))
}

fn xywh_center([x, y, w, h]: [f64; 4]) -> Vec<f64> {
    vec![x + w / 2.0, y + h / 2.0, w, h]
}

/// Vector document from the contents of a label file.
///
/// Instances carry the class name and its 1-based id.
pub fn yolo_to_vector(
    name: &str,
    width: u32,
    height: u32,
    labels: &str,
    classes: &[String],
) -> Result<AnnotationDocument, Error> {
    let mut document = AnnotationDocument::new(name, width, height);

    for line in labels.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (class, shape) = parse_line(line, width, height)?;
        let class_name = classes.get(class).ok_or_else(|| {
            Error::SchemaError(format!(
                "{}: class index {} is outside classes.txt ({} classes)",
                name,
                class,
                classes.len()
            ))
        })?;
        let mut instance = Instance::vector(shape, class_name.clone());
        instance.class_id = Some(class as i64 + 1);
        document.instances.push(instance);
    }

    Ok(document)
}

/// Label file contents for a vector document, one line per exportable
/// instance.
///
/// `indices` maps class names to their line in `classes.txt`.
pub fn vector_to_yolo(
    document: &AnnotationDocument,
    width: u32,
    height: u32,
    classes: &ClassMap,
    indices: &HashMap<String, usize>,
    task: Task,
) -> Result<String, Error> {
    let mut lines = Vec::new();

    for instance in &document.instances {
        let Some(shape) = instance.shape() else {
            continue;
        };
        let class = classes
            .resolve(instance)
            .and_then(|name| indices.get(name))
            .ok_or_else(|| {
                Error::SchemaError(format!(
                    "{}: instance class {:?} is not in the class list",
                    document.metadata.name, instance.class_name
                ))
            })?;

        match format_line(*class, shape, width, height, task) {
            Some(line) => lines.push(line),
            None => debug!(
                "{}: {} shape is not exported as {}",
                document.metadata.name,
                shape.kind(),
                task
            ),
        }
    }

    Ok(lines.into_iter().map(|line| line + "\n").collect())
}

/// Image file for a label stem, looked up in each of `dirs` in turn.
fn find_image(dirs: &[PathBuf], stem: &str) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            IMAGE_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{}.{}", stem, ext)))
        })
        .find(|path| path.is_file())
}

fn image_size(path: &Path) -> Result<(u32, u32), Error> {
    let size = imagesize::size(path).map_err(|err| Error::UnreadableImage {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok((size.width as u32, size.height as u32))
}

fn label_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().is_some_and(|e| e == "txt")
            && path.file_name().is_some_and(|n| n != CLASSES_TXT)
            && let Some(stem) = path.file_stem()
        {
            files.push((stem.to_string_lossy().to_string(), entry.into_path()));
        }
    }
    Ok(files)
}

/// Import a YOLO directory into a vector project.
///
/// Labels are read from `input/labels/` when it exists, else from `input`.
/// Each label needs an image with the same stem beside it or in
/// `input/images/`; its size comes from the image header.
pub async fn import(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let names = read_class_names(input)?;
    write_classes(output, &classes_from_names(&names), options.pretty)?;
    info!("Importing YOLO labels with {} classes", names.len());

    let labels_dir = match input.join("labels") {
        dir if dir.is_dir() => dir,
        _ => input.to_path_buf(),
    };
    let image_dirs = vec![labels_dir.clone(), input.join("images")];
    let output_dir = output.to_path_buf();
    let pretty = options.pretty;

    let items = label_files(&labels_dir)?
        .into_iter()
        .map(|(stem, path)| (stem.clone(), (stem, path)))
        .collect();

    run_batch(
        items,
        options.max_workers,
        progress,
        move |(stem, path): (String, PathBuf)| {
            let image = find_image(&image_dirs, &stem).ok_or_else(|| Error::UnreadableImage {
                path: path.clone(),
                reason: "no image found for label file".to_string(),
            })?;
            let (width, height) = image_size(&image)?;
            let name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or(stem);

            let labels = std::fs::read_to_string(&path)?;
            let document = yolo_to_vector(&name, width, height, &labels, &names)?;
            write_document(
                &document_path(&output_dir, &name, ProjectType::Vector),
                &document,
                pretty,
            )
        },
    )
    .await
}

/// Export a vector project as YOLO labels plus `classes.txt` in `output`.
///
/// Image sizes come from the document metadata, or from the image file next
/// to the document when the metadata has none.
pub async fn export(
    input: &Path,
    output: &Path,
    task: Task,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    if task == Task::PanopticSegmentation {
        return Err(Error::InvalidParameters(
            "YOLO labels cannot hold panoptic segmentation".to_string(),
        ));
    }

    let classes = ClassMap::new(&read_classes(input)?);
    let indices: HashMap<String, usize> = classes
        .classes()
        .iter()
        .enumerate()
        .map(|(idx, class)| (class.name.clone(), idx))
        .collect();

    std::fs::create_dir_all(output)?;
    let names: String = classes
        .classes()
        .iter()
        .map(|class| format!("{}\n", class.name))
        .collect();
    std::fs::write(output.join(CLASSES_TXT), names)?;

    let input_dir = input.to_path_buf();
    let output_dir = output.to_path_buf();

    run_batch(
        document_items(input, ProjectType::Vector)?,
        options.max_workers,
        progress,
        move |path: PathBuf| {
            let document = read_document(&path)?;
            let name = &document.metadata.name;
            let (width, height) = match (document.metadata.width, document.metadata.height) {
                (Some(w), Some(h)) => (w, h),
                _ => image_size(&input_dir.join(name))?,
            };
            if width == 0 || height == 0 {
                return Err(Error::SchemaError(format!("{}: image size is zero", name)));
            }

            let labels = vector_to_yolo(&document, width, height, &classes, &indices, task)?;
            let stem = Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());
            std::fs::write(output_dir.join(format!("{}.txt", stem)), labels)?;
            Ok(())
        },
    )
    .await
}
