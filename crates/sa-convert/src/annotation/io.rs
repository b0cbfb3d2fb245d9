// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Reading and writing native project files.

use super::types::{AnnotationDocument, ClassDef, ProjectType};
use crate::Error;
use image::RgbaImage;
use log::debug;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Suffix of vector annotation documents.
pub const VECTOR_SUFFIX: &str = "___objects.json";
/// Suffix of pixel annotation documents.
pub const PIXEL_SUFFIX: &str = "___pixel.json";
/// Suffix of the blue mask paired with a pixel document.
pub const MASK_SUFFIX: &str = "___save.png";
/// Directory holding `classes.json` inside a project.
pub const CLASSES_DIR: &str = "classes";
pub const CLASSES_FILE: &str = "classes.json";

impl ProjectType {
    /// File name suffix of this project's documents.
    pub fn suffix(&self) -> &'static str {
        match self {
            ProjectType::Vector => VECTOR_SUFFIX,
            ProjectType::Pixel => PIXEL_SUFFIX,
        }
    }
}

/// Path of the document for `image_name` inside `dir`.
pub fn document_path(dir: &Path, image_name: &str, project_type: ProjectType) -> PathBuf {
    dir.join(format!("{}{}", image_name, project_type.suffix()))
}

/// Path of the blue mask for `image_name` inside `dir`.
pub fn mask_path(dir: &Path, image_name: &str) -> PathBuf {
    dir.join(format!("{}{}", image_name, MASK_SUFFIX))
}

/// Path of `classes/classes.json` inside a project directory.
pub fn classes_path(dir: &Path) -> PathBuf {
    dir.join(CLASSES_DIR).join(CLASSES_FILE)
}

/// Image name of a document path, `None` when the suffix does not match.
pub fn image_name(path: &Path, project_type: ProjectType) -> Option<String> {
    path.file_name()?
        .to_str()?
        .strip_suffix(project_type.suffix())
        .map(str::to_string)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_document(path: &Path) -> Result<AnnotationDocument, Error> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_document(path: &Path, document: &AnnotationDocument, pretty: bool) -> Result<(), Error> {
    write_json(path, document, pretty)
}

/// Read `classes/classes.json` from a project directory.
pub fn read_classes(dir: &Path) -> Result<Vec<ClassDef>, Error> {
    let path = classes_path(dir);
    if !path.is_file() {
        return Err(Error::MissingClasses(path));
    }

    let reader = BufReader::new(File::open(&path)?);
    let classes: Vec<ClassDef> = serde_json::from_reader(reader)?;
    debug!("Loaded {} classes from {:?}", classes.len(), path);
    Ok(classes)
}

/// Write `classes/classes.json` into a project directory.
pub fn write_classes(dir: &Path, classes: &[ClassDef], pretty: bool) -> Result<(), Error> {
    write_json(&classes_path(dir), classes, pretty)
}

/// Load an image as RGBA. Any failure is reported as
/// [`Error::UnreadableImage`] so callers can skip the item.
pub fn read_mask(path: &Path) -> Result<RgbaImage, Error> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|err| Error::UnreadableImage {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

pub fn write_mask(path: &Path, raster: &RgbaImage) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    raster.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

/// Read a pixel document and its blue mask, checking that their sizes agree.
///
/// Missing `width`/`height` in the metadata are filled from the raster.
pub fn read_pixel_document(
    dir: &Path,
    image_name: &str,
) -> Result<(AnnotationDocument, RgbaImage), Error> {
    let mut document = read_document(&document_path(dir, image_name, ProjectType::Pixel))?;
    let raster = read_mask(&mask_path(dir, image_name))?;
    let (width, height) = raster.dimensions();

    let metadata = &mut document.metadata;
    if metadata.width.is_some_and(|w| w != width) || metadata.height.is_some_and(|h| h != height)
    {
        return Err(Error::SchemaError(format!(
            "{}: metadata size {:?}x{:?} does not match mask {}x{}",
            image_name, metadata.width, metadata.height, width, height
        )));
    }
    metadata.width = Some(width);
    metadata.height = Some(height);

    Ok((document, raster))
}

/// Write a pixel document and its blue mask. The metadata size is taken from
/// the raster.
pub fn write_pixel_document(
    dir: &Path,
    image_name: &str,
    document: &mut AnnotationDocument,
    raster: &RgbaImage,
    pretty: bool,
) -> Result<(), Error> {
    document.metadata.width = Some(raster.width());
    document.metadata.height = Some(raster.height());
    write_document(
        &document_path(dir, image_name, ProjectType::Pixel),
        document,
        pretty,
    )?;
    write_mask(&mask_path(dir, image_name), raster)
}

/// Document files of the given project type directly inside `dir`, sorted
/// by name.
pub fn list_documents(dir: &Path, project_type: ProjectType) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Input directory {:?} does not exist", dir),
        )));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && image_name(entry.path(), project_type).is_some() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    debug!(
        "Found {} {} documents in {:?}",
        paths.len(),
        project_type,
        dir
    );
    Ok(paths)
}

/// [`list_documents`] keyed by image name.
pub fn document_items(
    dir: &Path,
    project_type: ProjectType,
) -> Result<Vec<(String, PathBuf)>, Error> {
    Ok(list_documents(dir, project_type)?
        .into_iter()
        .filter_map(|path| Some((image_name(&path, project_type)?, path)))
        .collect())
}
