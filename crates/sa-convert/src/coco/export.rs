// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Native project → COCO conversion.
//!
//! Documents are read and converted concurrently; the resulting annotations
//! are assembled into one dataset in document name order, so image and
//! annotation ids are stable across runs.

use super::{
    convert::{SegmentationEncoding, polygons_bbox},
    import::panoptic_png_dir,
    types::{
        CocoCategory, CocoDataset, CocoImage, CocoPanopticDataset, PanopticAnnotation,
        SegmentInfo, Segmentation,
    },
    writer::{CocoDatasetBuilder, CocoWriteOptions, CocoWriter, default_info},
};
use crate::{
    BatchReport, Error, Progress,
    annotation::{
        AnnotationDocument, ClassDef, ClassMap, Instance, ProjectType, Shape, document_items,
        read_classes, read_document, read_pixel_document,
    },
    batch::run_batch,
    convert::{ConvertOptions, Task},
    mask::{self, BinaryMask, hex_to_rgb, id_to_rgb, instance_masks},
};
use image::{Rgba, RgbaImage};
use log::{debug, info};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::mpsc::Sender;

/// One COCO annotation before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedAnnotation {
    pub category_id: u32,
    pub bbox: [f64; 4],
    pub area: f64,
    pub segmentation: Option<Segmentation>,
}

/// Annotations of one image before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub annotations: Vec<ExportedAnnotation>,
}

fn document_size(document: &AnnotationDocument) -> Result<(u32, u32), Error> {
    match (document.metadata.width, document.metadata.height) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(Error::SchemaError(format!(
            "{}: metadata has no width/height",
            document.metadata.name
        ))),
    }
}

fn category_of(classes: &ClassMap, instance: &Instance) -> Option<u32> {
    let name = classes.resolve(instance)?;
    classes.id_of(name).and_then(|id| u32::try_from(id).ok())
}

fn outline(shape: &Shape) -> Option<Vec<f64>> {
    match shape {
        Shape::Bbox { points } => Some(points.to_polygon()),
        Shape::Polygon { points, .. } if points.len() >= 6 => Some(points.clone()),
        _ => None,
    }
}

/// COCO annotations of one vector document.
///
/// Bbox and polygon instances are exported; other shapes and instances of
/// unknown classes are skipped. Instances sharing a non-zero `groupId`
/// become one annotation with several polygons, classed by the first
/// member. Object detection keeps only the bbox.
pub fn vector_image(
    document: &AnnotationDocument,
    classes: &ClassMap,
    task: Task,
) -> Result<ExportedImage, Error> {
    let (width, height) = document_size(document)?;

    let mut pending: Vec<(u32, Vec<Vec<f64>>)> = Vec::new();
    let mut groups: HashMap<u32, usize> = HashMap::new();

    for instance in &document.instances {
        let Some(polygon) = instance.shape().and_then(outline) else {
            debug!(
                "{}: skipping {} instance",
                document.metadata.name,
                instance.shape().map(Shape::kind).unwrap_or("pixel")
            );
            continue;
        };
        let Some(category_id) = category_of(classes, instance) else {
            debug!(
                "{}: skipping instance of unknown class {:?}",
                document.metadata.name, instance.class_name
            );
            continue;
        };

        match instance.group_id {
            0 => pending.push((category_id, vec![polygon])),
            group => match groups.get(&group) {
                Some(&slot) => pending[slot].1.push(polygon),
                None => {
                    groups.insert(group, pending.len());
                    pending.push((category_id, vec![polygon]));
                }
            },
        }
    }

    let annotations = pending
        .into_iter()
        .filter_map(|(category_id, polygons)| {
            let bbox = polygons_bbox(&polygons)?;
            if bbox[2] <= 0.0 || bbox[3] <= 0.0 {
                return None;
            }
            let (area, segmentation) = match task {
                Task::ObjectDetection => (bbox[2] * bbox[3], None),
                _ => {
                    let area = polygons.iter().map(|p| mask::shoelace_area(p)).sum();
                    (area, Some(Segmentation::Polygon(polygons)))
                }
            };
            Some(ExportedAnnotation {
                category_id,
                bbox,
                area,
                segmentation,
            })
        })
        .collect();

    Ok(ExportedImage {
        file_name: document.metadata.name.clone(),
        width,
        height,
        annotations,
    })
}

fn instance_colors(document: &AnnotationDocument) -> Result<Vec<Vec<[u8; 3]>>, Error> {
    document
        .instances
        .iter()
        .map(|instance| {
            instance
                .parts()
                .iter()
                .map(|part| hex_to_rgb(&part.color))
                .collect()
        })
        .collect()
}

fn mask_bbox(mask: &BinaryMask) -> Result<[f64; 4], Error> {
    let [x, y, w, h] = mask::bbox(mask)?;
    Ok([x as f64, y as f64, w as f64, h as f64])
}

/// COCO annotations of one pixel document and its blue mask.
///
/// Each instance's membership mask is written as polygons or compressed RLE;
/// the area is its pixel count. Instances with no visible pixels are
/// skipped.
pub fn pixel_image(
    document: &AnnotationDocument,
    raster: &RgbaImage,
    classes: &ClassMap,
    encoding: SegmentationEncoding,
) -> Result<ExportedImage, Error> {
    let masks = instance_masks(raster, &instance_colors(document)?);

    let mut annotations = Vec::new();
    for (instance, mask) in document.instances.iter().zip(masks) {
        let Some(category_id) = category_of(classes, instance) else {
            debug!(
                "{}: skipping instance of unknown class {:?}",
                document.metadata.name, instance.class_name
            );
            continue;
        };
        if mask.is_empty() {
            continue;
        }
        let Some(segmentation) = Segmentation::from_mask(&mask, encoding) else {
            debug!("{}: instance traces to no polygon", document.metadata.name);
            continue;
        };

        annotations.push(ExportedAnnotation {
            category_id,
            bbox: mask_bbox(&mask)?,
            area: mask::area(&mask) as f64,
            segmentation: Some(segmentation),
        });
    }

    Ok(ExportedImage {
        file_name: document.metadata.name.clone(),
        width: raster.width(),
        height: raster.height(),
        annotations,
    })
}

fn class_category_id(index: usize, class: &ClassDef) -> u32 {
    class
        .id
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(index as u32 + 1)
}

/// Assemble converted images into a dataset. Categories are the project
/// classes with their ids; ids of images and annotations count from 1.
pub fn assemble(classes: &[ClassDef], images: Vec<ExportedImage>) -> CocoDataset {
    let mut builder = CocoDatasetBuilder::new();
    for (index, class) in classes.iter().enumerate() {
        builder.add_category_with_id(class_category_id(index, class), &class.name, None);
    }

    for image in images {
        let image_id = builder.add_image(&image.file_name, image.width, image.height);
        for ann in image.annotations {
            builder.add_annotation_with_area(
                image_id,
                ann.category_id,
                ann.bbox,
                ann.area,
                ann.segmentation,
            );
        }
    }

    builder.build()
}

/// Convert vector documents into a COCO dataset.
pub fn vector_to_coco(
    documents: &[AnnotationDocument],
    classes: &[ClassDef],
    task: Task,
) -> Result<CocoDataset, Error> {
    let map = ClassMap::new(classes);
    let images = documents
        .iter()
        .map(|document| vector_image(document, &map, task))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(classes, images))
}

/// Convert pixel documents and their blue masks into a COCO dataset.
pub fn pixel_to_coco(
    documents: &[(AnnotationDocument, RgbaImage)],
    classes: &[ClassDef],
    encoding: SegmentationEncoding,
) -> Result<CocoDataset, Error> {
    let map = ClassMap::new(classes);
    let images = documents
        .iter()
        .map(|(document, raster)| pixel_image(document, raster, &map, encoding))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(classes, images))
}

/// Panoptic segments of one image and the PNG encoding them.
#[derive(Debug, Clone)]
pub struct PanopticImage {
    pub file_name: String,
    pub png_name: String,
    pub png: RgbaImage,
    pub segments: Vec<SegmentInfo>,
}

/// Panoptic segments of one pixel document.
///
/// Visible instances get segment ids `1, 2, …` in instance order; the PNG
/// paints each segment's pixels with [`id_to_rgb`] of its id and leaves
/// unlabeled pixels at id 0.
pub fn panoptic_image(
    document: &AnnotationDocument,
    raster: &RgbaImage,
    classes: &ClassMap,
) -> Result<PanopticImage, Error> {
    let masks = instance_masks(raster, &instance_colors(document)?);
    let mut png = RgbaImage::from_pixel(raster.width(), raster.height(), Rgba([0, 0, 0, 255]));
    let mut segments = Vec::new();

    for (instance, mask) in document.instances.iter().zip(masks) {
        let Some(category_id) = category_of(classes, instance) else {
            continue;
        };
        if mask.is_empty() {
            continue;
        }

        let id = segments.len() as u32 + 1;
        let [r, g, b] = id_to_rgb(id);
        for (x, y) in mask.foreground() {
            png.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
        segments.push(SegmentInfo {
            id,
            category_id,
            area: mask::area(&mask) as f64,
            bbox: mask_bbox(&mask)?,
            iscrowd: 0,
        });
    }

    let stem = Path::new(&document.metadata.name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| document.metadata.name.clone());

    Ok(PanopticImage {
        file_name: document.metadata.name.clone(),
        png_name: format!("{}.png", stem),
        png,
        segments,
    })
}

/// Assemble panoptic images into a dataset; every class is a thing category
/// carrying its display color.
pub fn pixel_to_coco_panoptic(
    classes: &[ClassDef],
    images: &[PanopticImage],
) -> CocoPanopticDataset {
    let categories = classes
        .iter()
        .enumerate()
        .map(|(index, class)| CocoCategory {
            id: class_category_id(index, class),
            name: class.name.clone(),
            isthing: Some(1),
            color: hex_to_rgb(&class.color).ok(),
            ..Default::default()
        })
        .collect();

    let mut dataset = CocoPanopticDataset {
        info: default_info(),
        categories,
        ..Default::default()
    };

    for (idx, image) in images.iter().enumerate() {
        let image_id = idx as u64 + 1;
        dataset.images.push(CocoImage {
            id: image_id,
            width: image.png.width(),
            height: image.png.height(),
            file_name: image.file_name.clone(),
            ..Default::default()
        });
        dataset.annotations.push(PanopticAnnotation {
            image_id,
            file_name: image.png_name.clone(),
            segments_info: image.segments.clone(),
        });
    }

    dataset
}

fn write_dataset<T: serde::Serialize>(
    dataset: &T,
    output: &Path,
    pretty: bool,
) -> Result<(), Error> {
    CocoWriter::with_options(CocoWriteOptions { pretty }).write_json(dataset, output)?;
    info!("Wrote {:?}", output);
    Ok(())
}

/// Export a vector project as a COCO instances file.
pub async fn export_vector(
    input: &Path,
    output: &Path,
    task: Task,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let classes = read_classes(input)?;
    let map = Arc::new(ClassMap::new(&classes));

    let report = run_batch(
        document_items(input, ProjectType::Vector)?,
        options.max_workers,
        progress,
        move |path: PathBuf| vector_image(&read_document(&path)?, &map, task),
    )
    .await?;

    let (report, images) = report.take_results();
    write_dataset(&assemble(&classes, images), output, options.pretty)?;
    Ok(report)
}

/// Export a pixel project as a COCO instances file.
pub async fn export_pixel(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let classes = read_classes(input)?;
    let map = Arc::new(ClassMap::new(&classes));
    let dir = input.to_path_buf();
    let encoding = options.segmentation;

    let items = document_items(input, ProjectType::Pixel)?
        .into_iter()
        .map(|(name, _)| (name.clone(), name))
        .collect();

    let report = run_batch(items, options.max_workers, progress, move |name: String| {
        let (document, raster) = read_pixel_document(&dir, &name)?;
        pixel_image(&document, &raster, &map, encoding)
    })
    .await?;

    let (report, images) = report.take_results();
    write_dataset(&assemble(&classes, images), output, options.pretty)?;
    Ok(report)
}

/// Export a pixel project as a COCO panoptic file. The PNGs are written to
/// the directory named after the output file's stem.
pub async fn export_panoptic(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let classes = read_classes(input)?;
    let map = Arc::new(ClassMap::new(&classes));
    let dir = input.to_path_buf();
    let png_dir = panoptic_png_dir(output);
    std::fs::create_dir_all(&png_dir)?;

    let items = document_items(input, ProjectType::Pixel)?
        .into_iter()
        .map(|(name, _)| (name.clone(), name))
        .collect();

    let report = run_batch(items, options.max_workers, progress, move |name: String| {
        let (document, raster) = read_pixel_document(&dir, &name)?;
        let mut image = panoptic_image(&document, &raster, &map)?;
        image.png.save_with_format(png_dir.join(&image.png_name), image::ImageFormat::Png)?;
        // Pixels are on disk; keep only the size.
        image.png = RgbaImage::new(raster.width(), raster.height());
        Ok(image)
    })
    .await?;

    let (report, images) = report.take_results();
    write_dataset(&pixel_to_coco_panoptic(&classes, &images), output, options.pretty)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        annotation::classes_from_names,
        mask::{PartShape, encode_instances, rgb_to_id},
    };

    fn classes() -> Vec<ClassDef> {
        classes_from_names(&["cat", "dog"])
    }

    fn vector_document() -> AnnotationDocument {
        let mut document = AnnotationDocument::new("img.jpg", 20, 20);
        let mut a = Instance::vector(Shape::polygon(vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0]), "cat");
        a.group_id = 3;
        let mut b = Instance::vector(
            Shape::polygon(vec![10.0, 10.0, 12.0, 10.0, 12.0, 14.0]),
            "dog",
        );
        b.group_id = 3;
        let c = Instance::vector(Shape::bbox_from_xywh([5.0, 6.0, 2.0, 3.0]), "dog");
        let d = Instance::vector(Shape::Point { x: 1.0, y: 1.0 }, "cat");
        let e = Instance::vector(Shape::bbox_from_xywh([1.0, 1.0, 1.0, 1.0]), "bird");
        document.instances = vec![a, b, c, d, e];
        document
    }

    #[test]
    fn test_vector_groups_merge() {
        let dataset =
            vector_to_coco(&[vector_document()], &classes(), Task::InstanceSegmentation).unwrap();

        assert_eq!(dataset.categories.len(), 2);
        assert_eq!(dataset.images[0].file_name, "img.jpg");
        assert_eq!(dataset.annotations.len(), 2);

        let group = &dataset.annotations[0];
        assert_eq!(group.category_id, 1);
        assert_eq!(group.bbox, [0.0, 0.0, 12.0, 14.0]);
        assert_eq!(group.area, 8.0 + 4.0);
        let Some(Segmentation::Polygon(polygons)) = &group.segmentation else {
            panic!("expected polygons");
        };
        assert_eq!(polygons.len(), 2);

        let bbox = &dataset.annotations[1];
        assert_eq!(bbox.category_id, 2);
        assert_eq!(bbox.bbox, [5.0, 6.0, 2.0, 3.0]);
        assert_eq!(bbox.area, 6.0);
    }

    #[test]
    fn test_vector_detection_has_no_segmentation() {
        let dataset =
            vector_to_coco(&[vector_document()], &classes(), Task::ObjectDetection).unwrap();
        assert!(dataset.annotations.iter().all(|a| a.segmentation.is_none()));
        assert_eq!(dataset.annotations[0].area, 12.0 * 14.0);
    }

    #[test]
    fn test_vector_missing_size() {
        let mut document = vector_document();
        document.metadata.width = None;
        let result = vector_to_coco(&[document], &classes(), Task::ObjectDetection);
        assert!(matches!(result, Err(Error::SchemaError(_))));
    }

    fn pixel_document() -> (AnnotationDocument, RgbaImage) {
        let square = |x0: u32, y0: u32, n: u32| {
            PartShape::Mask(BinaryMask::from_fn(12, 10, move |x, y| {
                (x0..x0 + n).contains(&x) && (y0..y0 + n).contains(&y)
            }))
        };
        let blue = encode_instances(
            12,
            10,
            &[vec![square(1, 1, 3)], vec![square(6, 2, 4), square(0, 8, 2)]],
        )
        .unwrap();

        let mut document = AnnotationDocument::new("img.png", 12, 10);
        document.instances = blue
            .color_tokens()
            .into_iter()
            .zip(["cat", "dog"])
            .map(|(colors, name)| Instance::pixel(colors, name))
            .collect();
        (document, blue.raster)
    }

    #[test]
    fn test_pixel_to_coco_rle() {
        let dataset = pixel_to_coco(&[pixel_document()], &classes(), SegmentationEncoding::Rle)
            .unwrap();
        assert_eq!(dataset.annotations.len(), 2);

        let dog = &dataset.annotations[1];
        assert_eq!(dog.category_id, 2);
        assert_eq!(dog.area, 16.0 + 4.0);
        assert_eq!(dog.bbox, [0.0, 2.0, 10.0, 8.0]);
        let mask = dog.segmentation.as_ref().unwrap().to_mask(10, 12).unwrap();
        assert_eq!(mask::area(&mask), 20);
    }

    #[test]
    fn test_pixel_to_coco_polygons() {
        let dataset =
            pixel_to_coco(&[pixel_document()], &classes(), SegmentationEncoding::Polygon).unwrap();
        let Some(Segmentation::Polygon(polygons)) = &dataset.annotations[1].segmentation else {
            panic!("expected polygons");
        };
        assert_eq!(polygons.len(), 2);
        assert_eq!(dataset.annotations[0].area, 9.0);
    }

    #[test]
    fn test_panoptic_image() {
        let (document, raster) = pixel_document();
        let image = panoptic_image(&document, &raster, &ClassMap::new(&classes())).unwrap();

        assert_eq!(image.png_name, "img.png");
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.segments[1].id, 2);
        assert_eq!(image.segments[1].area, 20.0);

        let id_at = |x, y| {
            let p: &Rgba<u8> = image.png.get_pixel(x, y);
            rgb_to_id([p[0], p[1], p[2]])
        };
        assert_eq!(id_at(2, 2), 1);
        assert_eq!(id_at(7, 3), 2);
        assert_eq!(id_at(11, 0), 0);

        let dataset = pixel_to_coco_panoptic(&classes(), &[image]);
        assert_eq!(dataset.annotations[0].image_id, 1);
        assert_eq!(dataset.categories[0].isthing, Some(1));
        assert!(dataset.categories[0].color.is_some());
    }
}
