// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! COCO → native project conversion.
//!
//! Every COCO image becomes one native document named after the image file.
//! Categories become `classes/classes.json` with their COCO ids kept.

use super::{
    reader::CocoReader,
    types::{
        CocoAnnotation, CocoCategory, CocoDataset, CocoImage, CocoIndex, PanopticAnnotation,
        Segmentation,
    },
};
use crate::{
    BatchReport, Error, Progress,
    annotation::{
        AnnotationDocument, ClassDef, Instance, ProjectType, Shape, class_color, document_path,
        read_mask, write_classes, write_document, write_pixel_document,
    },
    batch::run_batch,
    convert::{ConvertOptions, Task},
    mask::{BinaryMask, PartShape, encode_instances, rgb_to_hex, rgb_to_id},
};
use image::RgbaImage;
use log::{debug, info};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::mpsc::Sender;

/// Category id → name.
pub type CategoryNames = HashMap<u32, String>;

/// Class definitions for COCO categories, keeping their ids. Panoptic
/// category colors are kept; other classes get a color seeded by their id.
pub fn categories_to_classes(categories: &[CocoCategory]) -> Vec<ClassDef> {
    categories
        .iter()
        .map(|category| ClassDef {
            id: Some(category.id as i64),
            name: category.name.clone(),
            color: category
                .color
                .map(|rgb| rgb_to_hex(&rgb))
                .unwrap_or_else(|| class_color(category.id as i64)),
            attribute_groups: Vec::new(),
        })
        .collect()
}

pub fn category_names(categories: &[CocoCategory]) -> CategoryNames {
    categories.iter().map(|c| (c.id, c.name.clone())).collect()
}

/// Document name for a COCO `file_name`, which may carry directories.
pub(crate) fn image_key(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

fn class_of(names: &CategoryNames, category_id: u32, owner: &str) -> Result<String, Error> {
    names.get(&category_id).cloned().ok_or_else(|| {
        Error::SchemaError(format!(
            "{} references unknown category_id {}",
            owner, category_id
        ))
    })
}

fn classified(geometry: Instance, category_id: u32) -> Instance {
    Instance {
        class_id: Some(category_id as i64),
        ..geometry
    }
}

/// Vector document for one image.
///
/// Object detection keeps the annotation bbox. Instance segmentation keeps
/// the polygons (RLE is traced with external contours); an annotation made
/// of several polygons becomes several instances sharing a `groupId`.
pub fn coco_to_vector(
    image: &CocoImage,
    annotations: &[CocoAnnotation],
    names: &CategoryNames,
    task: Task,
) -> Result<AnnotationDocument, Error> {
    let mut document = AnnotationDocument::new(image_key(&image.file_name), image.width, image.height);
    let mut next_group = 1;

    for ann in annotations {
        let class = class_of(names, ann.category_id, &format!("Annotation {}", ann.id))?;

        if task == Task::ObjectDetection {
            let instance = Instance::vector(Shape::bbox_from_xywh(ann.bbox), class);
            document.instances.push(classified(instance, ann.category_id));
            continue;
        }

        let polygons = match &ann.segmentation {
            Some(segmentation) => segmentation.to_polygons(image.height, image.width)?,
            None => Vec::new(),
        };
        if polygons.is_empty() {
            debug!("Annotation {} has no usable segmentation", ann.id);
            continue;
        }

        let group_id = if polygons.len() > 1 {
            next_group += 1;
            next_group - 1
        } else {
            0
        };

        for polygon in polygons {
            let mut instance = classified(
                Instance::vector(Shape::polygon(polygon), class.clone()),
                ann.category_id,
            );
            instance.group_id = group_id;
            document.instances.push(instance);
        }
    }

    Ok(document)
}

fn pixel_document(
    image: &CocoImage,
    instances: Vec<(String, u32, Vec<PartShape>)>,
) -> Result<(AnnotationDocument, RgbaImage), Error> {
    let shapes: Vec<_> = instances.iter().map(|(_, _, parts)| parts.clone()).collect();
    let blue = encode_instances(image.width, image.height, &shapes)?;

    let mut document = AnnotationDocument::new(image_key(&image.file_name), image.width, image.height);
    document.instances = blue
        .color_tokens()
        .into_iter()
        .zip(instances)
        .map(|(colors, (class, category_id, _))| {
            classified(Instance::pixel(colors, class), category_id)
        })
        .collect();

    Ok((document, blue.raster))
}

/// Pixel document and blue mask for one image.
///
/// Every polygon ring becomes its own part; an RLE segmentation is one part.
pub fn coco_to_pixel(
    image: &CocoImage,
    annotations: &[CocoAnnotation],
    names: &CategoryNames,
) -> Result<(AnnotationDocument, RgbaImage), Error> {
    let mut instances = Vec::new();

    for ann in annotations {
        let class = class_of(names, ann.category_id, &format!("Annotation {}", ann.id))?;
        let parts: Vec<PartShape> = match &ann.segmentation {
            Some(Segmentation::Polygon(polygons)) => polygons
                .iter()
                .filter(|p| p.len() >= 6)
                .map(|p| PartShape::Polygons(vec![p.clone()]))
                .collect(),
            Some(segmentation) => {
                vec![PartShape::Mask(segmentation.to_mask(image.height, image.width)?)]
            }
            None => Vec::new(),
        };

        if parts.is_empty() {
            debug!("Annotation {} has no usable segmentation", ann.id);
            continue;
        }
        instances.push((class, ann.category_id, parts));
    }

    pixel_document(image, instances)
}

/// Pixel document and blue mask for one panoptic image.
///
/// `segments` is the panoptic PNG in which every pixel's color encodes its
/// segment id. Each segment becomes one single-part instance.
pub fn coco_panoptic_to_pixel(
    image: &CocoImage,
    annotation: &PanopticAnnotation,
    segments: &RgbaImage,
    names: &CategoryNames,
) -> Result<(AnnotationDocument, RgbaImage), Error> {
    if segments.dimensions() != (image.width, image.height) {
        return Err(Error::SchemaError(format!(
            "{}: panoptic PNG is {}x{} but the image is {}x{}",
            annotation.file_name,
            segments.width(),
            segments.height(),
            image.width,
            image.height
        )));
    }

    let slots: HashMap<u32, usize> = annotation
        .segments_info
        .iter()
        .enumerate()
        .map(|(idx, segment)| (segment.id, idx))
        .collect();

    let mut masks =
        vec![BinaryMask::new(image.width, image.height); annotation.segments_info.len()];
    for (x, y, pixel) in segments.enumerate_pixels() {
        let id = rgb_to_id([pixel[0], pixel[1], pixel[2]]);
        if let Some(&idx) = slots.get(&id) {
            masks[idx].set(x, y, true);
        }
    }

    let mut instances = Vec::new();
    for (segment, mask) in annotation.segments_info.iter().zip(masks) {
        let class = class_of(names, segment.category_id, &format!("Segment {}", segment.id))?;
        if mask.is_empty() {
            debug!(
                "Segment {} of {} has no pixels",
                segment.id, annotation.file_name
            );
            continue;
        }
        instances.push((class, segment.category_id, vec![PartShape::Mask(mask)]));
    }

    pixel_document(image, instances)
}

type ImageItem = (CocoImage, Vec<CocoAnnotation>);

fn image_items(dataset: &CocoDataset) -> Vec<(String, ImageItem)> {
    let index = CocoIndex::from_dataset(dataset);
    dataset
        .images
        .iter()
        .map(|image| {
            (
                image.file_name.clone(),
                (
                    image.clone(),
                    index.annotations_for_image(image.id).to_vec(),
                ),
            )
        })
        .collect()
}

fn read_dataset(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<CocoDataset, Error> {
    let dataset = CocoReader::with_options(options.coco.clone()).read(input)?;
    info!(
        "Loaded {} images, {} annotations and {} categories from {:?}",
        dataset.images.len(),
        dataset.annotations.len(),
        dataset.categories.len(),
        input
    );
    write_classes(
        output,
        &categories_to_classes(&dataset.categories),
        options.pretty,
    )?;
    Ok(dataset)
}

/// Import a COCO instances file into a vector project.
pub async fn import_vector(
    input: &Path,
    output: &Path,
    task: Task,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let dataset = read_dataset(input, output, options)?;
    let names = Arc::new(category_names(&dataset.categories));
    let output = output.to_path_buf();
    let pretty = options.pretty;

    run_batch(
        image_items(&dataset),
        options.max_workers,
        progress,
        move |(image, annotations)| {
            let document = coco_to_vector(&image, &annotations, &names, task)?;
            let path = document_path(&output, &document.metadata.name, ProjectType::Vector);
            write_document(&path, &document, pretty)
        },
    )
    .await
}

/// Import a COCO instances file into a pixel project.
pub async fn import_pixel(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let dataset = read_dataset(input, output, options)?;
    let names = Arc::new(category_names(&dataset.categories));
    let output = output.to_path_buf();
    let pretty = options.pretty;

    run_batch(
        image_items(&dataset),
        options.max_workers,
        progress,
        move |(image, annotations)| {
            let (mut document, raster) = coco_to_pixel(&image, &annotations, &names)?;
            let name = document.metadata.name.clone();
            write_pixel_document(&output, &name, &mut document, &raster, pretty)
        },
    )
    .await
}

/// Directory holding the PNGs of a panoptic JSON: a sibling directory named
/// after the file stem, e.g. `panoptic_val.json` → `panoptic_val/`.
pub fn panoptic_png_dir(json: &Path) -> PathBuf {
    let stem = json.file_stem().unwrap_or_default();
    json.parent().unwrap_or(Path::new("")).join(stem)
}

/// Import a COCO panoptic file and its PNGs into a pixel project.
pub async fn import_panoptic(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let dataset = CocoReader::with_options(options.coco.clone()).read_panoptic_json(input)?;
    write_classes(
        output,
        &categories_to_classes(&dataset.categories),
        options.pretty,
    )?;

    let png_dir = panoptic_png_dir(input);
    if !png_dir.is_dir() {
        return Err(Error::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Panoptic PNG directory {:?} does not exist", png_dir),
        )));
    }

    let images: HashMap<u64, CocoImage> = dataset
        .images
        .iter()
        .map(|image| (image.id, image.clone()))
        .collect();
    let items = dataset
        .annotations
        .iter()
        .map(|annotation| {
            let image = images.get(&annotation.image_id).cloned();
            (annotation.file_name.clone(), (image, annotation.clone()))
        })
        .collect();

    let names = Arc::new(category_names(&dataset.categories));
    let output = output.to_path_buf();
    let pretty = options.pretty;

    run_batch(
        items,
        options.max_workers,
        progress,
        move |(image, annotation): (Option<CocoImage>, PanopticAnnotation)| {
            let image = image.ok_or_else(|| {
                Error::SchemaError(format!(
                    "{} references unknown image_id {}",
                    annotation.file_name, annotation.image_id
                ))
            })?;
            let segments = read_mask(&png_dir.join(&annotation.file_name))?;
            let (mut document, raster) =
                coco_panoptic_to_pixel(&image, &annotation, &segments, &names)?;
            let name = document.metadata.name.clone();
            write_pixel_document(&output, &name, &mut document, &raster, pretty)
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coco::SegmentInfo,
        mask::{CompressedRle, area, hex_to_rgb, id_to_rgb, instance_masks},
    };
    use image::Rgba;

    fn image(width: u32, height: u32) -> CocoImage {
        CocoImage {
            id: 1,
            width,
            height,
            file_name: "train/img.jpg".to_string(),
            ..Default::default()
        }
    }

    fn names() -> CategoryNames {
        HashMap::from([(1, "cat".to_string()), (4, "dog".to_string())])
    }

    fn annotation(id: u64, category_id: u32, segmentation: Option<Segmentation>) -> CocoAnnotation {
        CocoAnnotation {
            id,
            image_id: 1,
            category_id,
            bbox: [1.0, 1.0, 4.0, 4.0],
            segmentation,
            ..Default::default()
        }
    }

    fn part_masks(document: &AnnotationDocument, raster: &RgbaImage) -> Vec<BinaryMask> {
        let colors: Vec<Vec<[u8; 3]>> = document
            .instances
            .iter()
            .map(|i| i.parts().iter().map(|p| hex_to_rgb(&p.color).unwrap()).collect())
            .collect();
        instance_masks(raster, &colors).collect()
    }

    #[test]
    fn test_categories_to_classes() {
        let classes = categories_to_classes(&[
            CocoCategory {
                id: 4,
                name: "road".to_string(),
                color: Some([255, 0, 16]),
                ..Default::default()
            },
            CocoCategory {
                id: 9,
                name: "car".to_string(),
                ..Default::default()
            },
        ]);
        assert_eq!(classes[0].id, Some(4));
        assert_eq!(classes[0].color, "#ff0010");
        assert_eq!(classes[1].color, class_color(9));
    }

    #[test]
    fn test_vector_groups_multi_polygon_annotations() {
        let annotations = vec![
            annotation(
                1,
                1,
                Some(Segmentation::Polygon(vec![
                    vec![0.0, 0.0, 3.0, 0.0, 3.0, 3.0],
                    vec![5.0, 5.0, 8.0, 5.0, 8.0, 8.0],
                ])),
            ),
            annotation(
                2,
                4,
                Some(Segmentation::Polygon(vec![vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0]])),
            ),
            annotation(3, 4, None),
        ];

        let document =
            coco_to_vector(&image(10, 10), &annotations, &names(), Task::InstanceSegmentation)
                .unwrap();
        assert_eq!(document.metadata.name, "img.jpg");
        assert_eq!(document.instances.len(), 3);
        assert_eq!(document.instances[0].group_id, 1);
        assert_eq!(document.instances[1].group_id, 1);
        assert_eq!(document.instances[2].group_id, 0);
        assert_eq!(document.instances[2].class_name.as_deref(), Some("dog"));
        assert_eq!(document.instances[2].class_id, Some(4));
    }

    #[test]
    fn test_vector_rle_is_traced() {
        let mask = BinaryMask::from_fn(8, 8, |x, y| (2..=5).contains(&x) && (1..=6).contains(&y));
        let rle = crate::mask::rle_to_string(&mask);
        let annotations = vec![annotation(1, 1, Some(Segmentation::CompressedRle(rle)))];

        let document =
            coco_to_vector(&image(8, 8), &annotations, &names(), Task::InstanceSegmentation)
                .unwrap();
        assert_eq!(document.instances.len(), 1);
        let Some(Shape::Polygon { points, .. }) = document.instances[0].shape() else {
            panic!("expected a polygon");
        };
        let mut corners: Vec<(i64, i64)> = points
            .chunks(2)
            .map(|c| (c[0] as i64, c[1] as i64))
            .collect();
        corners.sort();
        assert_eq!(corners, vec![(2, 1), (2, 6), (5, 1), (5, 6)]);
    }

    #[test]
    fn test_detection_keeps_bbox() {
        let annotations = vec![annotation(1, 1, None)];
        let document =
            coco_to_vector(&image(10, 10), &annotations, &names(), Task::ObjectDetection).unwrap();
        assert_eq!(
            document.instances[0].shape(),
            Some(&Shape::bbox_from_xywh([1.0, 1.0, 4.0, 4.0]))
        );
    }

    #[test]
    fn test_unknown_category() {
        let annotations = vec![annotation(1, 77, None)];
        let result = coco_to_vector(&image(10, 10), &annotations, &names(), Task::ObjectDetection);
        assert!(matches!(result, Err(Error::SchemaError(_))));
    }

    #[test]
    fn test_pixel_parts() {
        let rle = Segmentation::CompressedRle(crate::mask::rle_to_string(&BinaryMask::from_fn(
            10,
            10,
            |x, y| x >= 7 && y >= 7,
        )));
        let annotations = vec![
            annotation(
                1,
                1,
                Some(Segmentation::Polygon(vec![
                    vec![0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0],
                    vec![4.0, 0.0, 5.0, 0.0, 5.0, 1.0, 4.0, 1.0],
                ])),
            ),
            annotation(2, 4, Some(rle)),
        ];

        let (document, raster) = coco_to_pixel(&image(10, 10), &annotations, &names()).unwrap();
        assert_eq!(document.instances.len(), 2);
        assert_eq!(document.instances[0].parts().len(), 2);
        assert_eq!(document.instances[1].parts().len(), 1);
        assert_eq!(document.instances[0].parts()[0].color, "#00000f");

        let masks = part_masks(&document, &raster);
        assert_eq!(area(&masks[0]), 9 + 4);
        assert_eq!(area(&masks[1]), 9);
    }

    #[test]
    fn test_pixel_rle_size_mismatch_fails() {
        let rle = CompressedRle {
            counts: "0".to_string(),
            size: [3, 3],
        };
        let annotations = vec![annotation(1, 1, Some(Segmentation::CompressedRle(rle)))];
        assert!(coco_to_pixel(&image(10, 10), &annotations, &names()).is_err());
    }

    #[test]
    fn test_panoptic_segments() {
        let mut segments = RgbaImage::from_pixel(6, 4, Rgba([0, 0, 0, 255]));
        for x in 0..3 {
            for y in 0..4 {
                let [r, g, b] = id_to_rgb(300);
                segments.put_pixel(x, y, Rgba([r, g, b, 255]));
            }
        }
        let [r, g, b] = id_to_rgb(7);
        segments.put_pixel(5, 0, Rgba([r, g, b, 255]));

        let annotation = PanopticAnnotation {
            image_id: 1,
            file_name: "img.png".to_string(),
            segments_info: vec![
                SegmentInfo {
                    id: 300,
                    category_id: 1,
                    ..Default::default()
                },
                SegmentInfo {
                    id: 7,
                    category_id: 4,
                    ..Default::default()
                },
                SegmentInfo {
                    id: 9,
                    category_id: 4,
                    ..Default::default()
                },
            ],
        };

        let (document, raster) =
            coco_panoptic_to_pixel(&image(6, 4), &annotation, &segments, &names()).unwrap();
        assert_eq!(document.instances.len(), 2);
        let masks = part_masks(&document, &raster);
        assert_eq!(area(&masks[0]), 12);
        assert_eq!(area(&masks[1]), 1);
        assert!(masks[1].get(5, 0));
    }

    #[test]
    fn test_panoptic_png_dir() {
        assert_eq!(
            panoptic_png_dir(Path::new("/data/annotations/panoptic_val.json")),
            PathBuf::from("/data/annotations/panoptic_val")
        );
    }
}
