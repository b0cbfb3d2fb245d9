// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Conversion between the platform's own pixel and vector projects.
//!
//! Pixel → vector is the one path that traces holes: each outer contour
//! becomes a polygon whose holes go to `exclude`. Vector → pixel paints
//! outer rings only.

use crate::{
    BatchReport, Error, Progress,
    annotation::{
        AnnotationDocument, Geometry, Instance, Part, ProjectType, Shape, document_items,
        document_path, read_classes, read_document, read_pixel_document, write_classes,
        write_document, write_pixel_document,
    },
    batch::run_batch,
    convert::ConvertOptions,
    mask::{ContourMode, PartShape, decode_instances, encode_instances, hex_to_rgb},
};
use image::RgbaImage;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Sender;

/// `template` with its geometry replaced.
fn reshaped(template: &Instance, geometry: Geometry) -> Instance {
    Instance {
        geometry,
        ..template.clone()
    }
}

/// Trace a pixel document into polygons.
///
/// Instances with several contours are split into polygons sharing a new
/// `groupId`; single-contour instances keep their own. Instances with no
/// visible pixels are dropped.
pub fn pixel_to_vector(
    document: &AnnotationDocument,
    raster: &RgbaImage,
) -> Result<AnnotationDocument, Error> {
    let colors = document
        .instances
        .iter()
        .map(|instance| {
            instance
                .parts()
                .iter()
                .map(|part| hex_to_rgb(&part.color))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let shapes = decode_instances(raster, &colors, ContourMode::WithHoles);
    let mut next_group = document
        .instances
        .iter()
        .map(|instance| instance.group_id)
        .max()
        .unwrap_or(0)
        + 1;

    let mut vector = AnnotationDocument {
        instances: Vec::with_capacity(shapes.len()),
        ..document.clone()
    };
    vector.metadata.width = Some(raster.width());
    vector.metadata.height = Some(raster.height());

    for (index, template) in document.instances.iter().enumerate() {
        let contours: Vec<_> = shapes.iter().filter(|s| s.instance == index).collect();
        let group_id = match contours.len() {
            0 => continue,
            1 => template.group_id,
            _ => {
                next_group += 1;
                next_group - 1
            }
        };

        for contour in contours {
            let shape = Shape::Polygon {
                points: contour.polygon.clone(),
                exclude: contour.holes.clone(),
            };
            let mut instance = reshaped(template, Geometry::Vector(shape));
            instance.group_id = group_id;
            vector.instances.push(instance);
        }
    }

    Ok(vector)
}

/// Outer ring of a shape that can be painted.
fn outer_ring(shape: &Shape) -> Option<Vec<f64>> {
    match shape {
        Shape::Bbox { points } => Some(points.to_polygon()),
        Shape::Polygon { points, .. } => Some(points.clone()),
        _ => None,
    }
}

/// Paint a vector document into a blue mask.
///
/// Members of a group become the parts of one pixel instance, which takes
/// its fields from the first member. Shapes other than boxes and polygons
/// are skipped. Holes listed in `exclude` are filled.
pub fn vector_to_pixel(
    document: &AnnotationDocument,
) -> Result<(AnnotationDocument, RgbaImage), Error> {
    let metadata = &document.metadata;
    let (Some(width), Some(height)) = (metadata.width, metadata.height) else {
        return Err(Error::SchemaError(format!(
            "{}: vector document has no image size",
            metadata.name
        )));
    };

    // (template, parts) in first-appearance order
    let mut merged: Vec<(&Instance, Vec<PartShape>)> = Vec::new();
    for instance in &document.instances {
        let Some(shape) = instance.shape() else {
            continue;
        };
        let Some(ring) = outer_ring(shape) else {
            debug!("{}: {} is not painted", metadata.name, shape.kind());
            continue;
        };
        let part = PartShape::Polygons(vec![ring]);

        let existing = match instance.group_id {
            0 => None,
            group => merged
                .iter_mut()
                .find(|(template, _)| template.group_id == group),
        };
        match existing {
            Some((_, parts)) => parts.push(part),
            None => merged.push((instance, vec![part])),
        }
    }

    let shapes: Vec<_> = merged.iter().map(|(_, parts)| parts.clone()).collect();
    let blue = encode_instances(width, height, &shapes)?;

    let mut pixel = AnnotationDocument {
        instances: Vec::with_capacity(merged.len()),
        ..document.clone()
    };
    for ((template, _), colors) in merged.iter().zip(blue.color_tokens()) {
        let parts = colors.into_iter().map(|color| Part { color }).collect();
        let mut instance = reshaped(template, Geometry::Pixel { parts });
        instance.group_id = 0;
        pixel.instances.push(instance);
    }

    Ok((pixel, blue.raster))
}

fn copy_classes(input: &Path, output: &Path, pretty: bool) -> Result<(), Error> {
    let classes = read_classes(input)?;
    write_classes(output, &classes, pretty)?;
    info!("Copied {} classes", classes.len());
    Ok(())
}

/// Convert every pixel document of a project into a vector project.
pub async fn pixel_project_to_vector(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    copy_classes(input, output, options.pretty)?;

    let input_dir = input.to_path_buf();
    let output_dir = output.to_path_buf();
    let pretty = options.pretty;

    let items = document_items(input, ProjectType::Pixel)?
        .into_iter()
        .map(|(name, _)| (name.clone(), name))
        .collect();

    run_batch(items, options.max_workers, progress, move |name: String| {
        let (document, raster) = read_pixel_document(&input_dir, &name)?;
        let vector = pixel_to_vector(&document, &raster)?;
        write_document(
            &document_path(&output_dir, &name, ProjectType::Vector),
            &vector,
            pretty,
        )
    })
    .await
}

/// Convert every vector document of a project into a pixel project.
pub async fn vector_project_to_pixel(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    copy_classes(input, output, options.pretty)?;

    let output_dir = output.to_path_buf();
    let pretty = options.pretty;

    run_batch(
        document_items(input, ProjectType::Vector)?,
        options.max_workers,
        progress,
        move |path: PathBuf| {
            let document = read_document(&path)?;
            let (mut pixel, raster) = vector_to_pixel(&document)?;
            let name = document.metadata.name.clone();
            write_pixel_document(&output_dir, &name, &mut pixel, &raster, pretty)
        },
    )
    .await
}
