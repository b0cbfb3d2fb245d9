// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Pascal VOC → native project conversion.
//!
//! A VOC root directory holds:
//!
//! - `Annotations/<stem>.xml`: object bounding boxes
//! - `SegmentationObject/<stem>.png`: palette PNG of instance indices
//! - `SegmentationClass/<stem>.png`: palette PNG of class indices
//!
//! Segmentation PNGs are read as raw palette indices; index `0` is
//! background and `220`/`255` mark object borders and void pixels.

use crate::{
    BatchReport, Error, Progress,
    annotation::{
        AnnotationDocument, BboxPoints, Instance, ProjectType, Shape, classes_from_names,
        document_path, write_classes, write_document, write_pixel_document,
    },
    batch::run_batch,
    convert::ConvertOptions,
    mask::{BinaryMask, PartShape, encode_instances, mask_to_external_polygons},
};
use log::{debug, info};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc::Sender;
use walkdir::WalkDir;

/// The 20 VOC object classes; class index `n` names `VOC_CLASSES[n - 1]`.
pub const VOC_CLASSES: [&str; 20] = [
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

/// Indices that never denote an instance or a class.
pub const RESERVED_INDICES: [u8; 3] = [0, 220, 255];

/// `<annotation>` element of a VOC XML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocAnnotation {
    pub filename: String,
    pub size: VocSize,
    #[serde(rename = "object", default)]
    pub objects: Vec<VocObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VocSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocObject {
    pub name: String,
    pub bndbox: VocBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VocBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

pub fn parse_annotation(xml: &str) -> Result<VocAnnotation, Error> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Class name of a VOC class index.
pub fn class_name(index: u8) -> String {
    match index {
        1..=20 => VOC_CLASSES[index as usize - 1].to_string(),
        _ => format!("class_{}", index),
    }
}

/// Vector document with one bbox instance per object.
pub fn voc_to_vector(annotation: &VocAnnotation) -> AnnotationDocument {
    let mut document = AnnotationDocument::new(
        annotation.filename.clone(),
        annotation.size.width,
        annotation.size.height,
    );
    document.instances = annotation
        .objects
        .iter()
        .map(|object| {
            let b = object.bndbox;
            let shape = Shape::Bbox {
                points: BboxPoints {
                    x1: b.xmin,
                    y1: b.ymin,
                    x2: b.xmax,
                    y2: b.ymax,
                },
            };
            Instance::vector(shape, object.name.clone())
        })
        .collect();
    document
}

/// A single-channel 8-bit PNG read without palette expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl IndexPlane {
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let unreadable = |reason: String| Error::UnreadableImage {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|err| unreadable(err.to_string()))?;
        let mut decoder = png::Decoder::new(BufReader::new(file));
        decoder.set_transformations(png::Transformations::IDENTITY);
        let mut reader = decoder.read_info()?;
        let mut data = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut data)?;

        if info.bit_depth != png::BitDepth::Eight
            || !matches!(
                info.color_type,
                png::ColorType::Indexed | png::ColorType::Grayscale
            )
        {
            return Err(unreadable(format!(
                "expected an 8-bit palette PNG, found {:?} {:?}",
                info.color_type, info.bit_depth
            )));
        }
        data.truncate(info.buffer_size());

        Ok(Self {
            width: info.width,
            height: info.height,
            data,
        })
    }
}

/// One object instance of a segmentation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VocInstance {
    pub index: u8,
    pub class_name: String,
    pub mask: BinaryMask,
}

/// Split an object/class PNG pair into instances, in ascending instance
/// index order.
///
/// Each instance takes the most frequent non-reserved class index under its
/// pixels (ties go to the lower index); instances with no classed pixels are
/// dropped.
pub fn segmentation_instances(
    objects: &IndexPlane,
    classes: &IndexPlane,
) -> Result<Vec<VocInstance>, Error> {
    if (objects.width, objects.height) != (classes.width, classes.height) {
        return Err(Error::SchemaError(format!(
            "Object PNG is {}x{} but class PNG is {}x{}",
            objects.width, objects.height, classes.width, classes.height
        )));
    }

    let mut masks: BTreeMap<u8, BinaryMask> = BTreeMap::new();
    let mut votes: HashMap<u8, BTreeMap<u8, u64>> = HashMap::new();

    for y in 0..objects.height {
        for x in 0..objects.width {
            let index = objects.get(x, y);
            if RESERVED_INDICES.contains(&index) {
                continue;
            }
            masks
                .entry(index)
                .or_insert_with(|| BinaryMask::new(objects.width, objects.height))
                .set(x, y, true);

            let class = classes.get(x, y);
            if !RESERVED_INDICES.contains(&class) {
                *votes.entry(index).or_default().entry(class).or_default() += 1;
            }
        }
    }

    let mut instances = Vec::new();
    for (index, mask) in masks {
        let winner = votes.get(&index).and_then(|counts| {
            counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(&class, _)| class)
        });
        let Some(class) = winner else {
            debug!("Instance {} has no class pixels", index);
            continue;
        };
        instances.push(VocInstance {
            index,
            class_name: class_name(class),
            mask,
        });
    }

    Ok(instances)
}

/// Vector document: external polygons of every instance; instances split
/// into several polygons share a `groupId`.
pub fn instances_to_vector(
    name: &str,
    width: u32,
    height: u32,
    instances: &[VocInstance],
) -> AnnotationDocument {
    let mut document = AnnotationDocument::new(name, width, height);
    let mut next_group = 1;

    for instance in instances {
        let polygons = mask_to_external_polygons(&instance.mask);
        let group_id = match polygons.len() {
            0 => {
                debug!("{}: instance {} is degenerate", name, instance.index);
                continue;
            }
            1 => 0,
            _ => {
                next_group += 1;
                next_group - 1
            }
        };
        for polygon in polygons {
            let mut shape = Instance::vector(Shape::polygon(polygon), instance.class_name.clone());
            shape.group_id = group_id;
            document.instances.push(shape);
        }
    }

    document
}

/// Pixel document and blue mask with one single-part instance per object.
pub fn instances_to_pixel(
    name: &str,
    width: u32,
    height: u32,
    instances: &[VocInstance],
) -> Result<(AnnotationDocument, image::RgbaImage), Error> {
    let shapes: Vec<_> = instances
        .iter()
        .map(|instance| vec![PartShape::Mask(instance.mask.clone())])
        .collect();
    let blue = encode_instances(width, height, &shapes)?;

    let mut document = AnnotationDocument::new(name, width, height);
    document.instances = blue
        .color_tokens()
        .into_iter()
        .zip(instances)
        .map(|(colors, instance)| Instance::pixel(colors, instance.class_name.clone()))
        .collect();

    Ok((document, blue.raster))
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>, Error> {
    if !dir.is_dir() {
        return Err(Error::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory {:?} does not exist", dir),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            && let Some(stem) = path.file_stem()
        {
            files.push((stem.to_string_lossy().to_string(), entry.into_path()));
        }
    }
    Ok(files)
}

fn write_used_classes<'a>(
    output: &Path,
    base: &[&str],
    used: impl IntoIterator<Item = &'a Vec<String>>,
    pretty: bool,
) -> Result<(), Error> {
    let mut names: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    let extra: BTreeSet<&String> = used
        .into_iter()
        .flatten()
        .filter(|name| !base.contains(&name.as_str()))
        .collect();
    names.extend(extra.into_iter().cloned());
    info!("Writing {} classes", names.len());
    write_classes(output, &classes_from_names(&names), pretty)
}

/// Import `Annotations/*.xml` into a vector project of bbox instances.
///
/// Classes are the object names found, sorted.
pub async fn import_detection(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let items = files_with_extension(&input.join("Annotations"), "xml")?;
    let output_dir = output.to_path_buf();
    let pretty = options.pretty;

    let report = run_batch(items, options.max_workers, progress, move |path: PathBuf| {
        let annotation = parse_annotation(&std::fs::read_to_string(&path)?)?;
        let document = voc_to_vector(&annotation);
        let path = document_path(&output_dir, &document.metadata.name, ProjectType::Vector);
        write_document(&path, &document, pretty)?;
        Ok(annotation.objects.into_iter().map(|o| o.name).collect::<Vec<_>>())
    })
    .await?;

    let (report, used) = report.take_results();
    write_used_classes(output, &[], &used, options.pretty)?;
    Ok(report)
}

/// Import `SegmentationObject/` + `SegmentationClass/` PNG pairs.
///
/// Classes are the 20 VOC classes (ids 1–20) followed by any other class
/// index found, named `class_<n>`.
pub async fn import_segmentation(
    input: &Path,
    output: &Path,
    project_type: ProjectType,
    options: &ConvertOptions,
    progress: Option<Sender<Progress>>,
) -> Result<BatchReport<()>, Error> {
    let items = files_with_extension(&input.join("SegmentationObject"), "png")?;
    let class_dir = input.join("SegmentationClass");
    let output_dir = output.to_path_buf();
    let pretty = options.pretty;

    let report = run_batch(
        items.into_iter().map(|(stem, path)| (stem.clone(), (stem, path))).collect(),
        options.max_workers,
        progress,
        move |(stem, path): (String, PathBuf)| {
            let objects = IndexPlane::read(&path)?;
            let classes = IndexPlane::read(&class_dir.join(format!("{}.png", stem)))?;
            let instances = segmentation_instances(&objects, &classes)?;
            let name = format!("{}.jpg", stem);

            match project_type {
                ProjectType::Vector => {
                    let document =
                        instances_to_vector(&name, objects.width, objects.height, &instances);
                    let path = document_path(&output_dir, &name, ProjectType::Vector);
                    write_document(&path, &document, pretty)?;
                }
                ProjectType::Pixel => {
                    let (mut document, raster) =
                        instances_to_pixel(&name, objects.width, objects.height, &instances)?;
                    write_pixel_document(&output_dir, &name, &mut document, &raster, pretty)?;
                }
            }

            Ok(instances.into_iter().map(|i| i.class_name).collect::<Vec<_>>())
        },
    )
    .await?;

    let (report, used) = report.take_results();
    write_used_classes(output, &VOC_CLASSES, &used, options.pretty)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{read_classes, read_document, read_pixel_document};
    use crate::mask::{area, hex_to_rgb, instance_masks};
    use tempfile::TempDir;

    const XML: &str = r#"<annotation>
        <folder>VOC2012</folder>
        <filename>2007_000027.jpg</filename>
        <size><width>486</width><height>500</height><depth>3</depth></size>
        <segmented>0</segmented>
        <object>
            <name>person</name>
            <pose>Unspecified</pose>
            <truncated>0</truncated>
            <difficult>0</difficult>
            <bndbox><xmin>174</xmin><ymin>101</ymin><xmax>349</xmax><ymax>351</ymax></bndbox>
        </object>
        <object>
            <name>dog</name>
            <bndbox><xmin>1.5</xmin><ymin>2</ymin><xmax>30</xmax><ymax>40</ymax></bndbox>
        </object>
    </annotation>"#;

    fn plane(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> IndexPlane {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        IndexPlane {
            width,
            height,
            data,
        }
    }

    fn write_palette_png(path: &Path, plane: &IndexPlane) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), plane.width, plane.height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette((0..=255u8).flat_map(|i| [i, i, i]).collect::<Vec<_>>());
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&plane.data).unwrap();
    }

    #[test]
    fn test_parse_annotation() {
        let annotation = parse_annotation(XML).unwrap();
        assert_eq!(annotation.filename, "2007_000027.jpg");
        assert_eq!(annotation.size.width, 486);
        assert_eq!(annotation.objects.len(), 2);
        assert_eq!(annotation.objects[1].bndbox.xmin, 1.5);

        let document = voc_to_vector(&annotation);
        assert_eq!(document.metadata.height, Some(500));
        let Some(Shape::Bbox { points }) = document.instances[0].shape() else {
            panic!("expected a bbox");
        };
        assert_eq!(points.to_xywh(), [174.0, 101.0, 175.0, 250.0]);
        assert_eq!(document.instances[1].class_name.as_deref(), Some("dog"));
    }

    #[test]
    fn test_parse_annotation_without_objects() {
        let xml = "<annotation><filename>a.jpg</filename>\
                   <size><width>2</width><height>3</height></size></annotation>";
        assert!(parse_annotation(xml).unwrap().objects.is_empty());
        assert!(matches!(
            parse_annotation("<annotation><filename>a.jpg</filename></annotation>"),
            Err(Error::XmlError(_))
        ));
    }

    #[test]
    fn test_reserved_indices_are_skipped() {
        // Instance 1 on the left with a void border, instance 2 on the right
        let objects = plane(8, 4, |x, _| match x {
            0..=2 => 1,
            3 => 220,
            4 => 255,
            _ => 2,
        });
        let classes = plane(8, 4, |x, y| match x {
            0..=2 if y == 0 => 12,
            0..=2 => 15,
            3 | 4 => 255,
            _ => 0,
        });

        let instances = segmentation_instances(&objects, &classes).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].index, 1);
        assert_eq!(instances[0].class_name, "person");
        assert_eq!(area(&instances[0].mask), 12);
    }

    #[test]
    fn test_class_vote_tie_prefers_lower_index() {
        let objects = plane(2, 1, |_, _| 3);
        let classes = plane(2, 1, |x, _| if x == 0 { 8 } else { 7 });
        let instances = segmentation_instances(&objects, &classes).unwrap();
        assert_eq!(instances[0].class_name, "car");
        assert_eq!(class_name(21), "class_21");
    }

    #[test]
    fn test_size_mismatch() {
        let result = segmentation_instances(&plane(2, 2, |_, _| 1), &plane(3, 2, |_, _| 1));
        assert!(matches!(result, Err(Error::SchemaError(_))));
    }

    #[test]
    fn test_split_instance_is_grouped() {
        let objects = plane(10, 4, |x, _| if x < 3 || x > 6 { 1 } else { 0 });
        let classes = plane(10, 4, |_, _| 8);
        let instances = segmentation_instances(&objects, &classes).unwrap();

        let document = instances_to_vector("a.jpg", 10, 4, &instances);
        assert_eq!(document.instances.len(), 2);
        assert!(document.instances.iter().all(|i| i.group_id == 1));
        assert!(document.instances.iter().all(|i| i.class_name.as_deref() == Some("cat")));
    }

    #[tokio::test]
    async fn test_import_segmentation_pixel() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("VOC");
        std::fs::create_dir_all(root.join("SegmentationObject")).unwrap();
        std::fs::create_dir_all(root.join("SegmentationClass")).unwrap();

        let objects = plane(6, 6, |x, y| match (x, y) {
            (0..=2, 0..=2) => 1,
            (4..=5, _) => 2,
            _ => 0,
        });
        let classes = plane(6, 6, |x, y| match (x, y) {
            (0..=2, 0..=2) => 15,
            (4..=5, _) => 40,
            _ => 0,
        });
        write_palette_png(&root.join("SegmentationObject/img.png"), &objects);
        write_palette_png(&root.join("SegmentationClass/img.png"), &classes);
        // No class PNG: reported, not fatal
        write_palette_png(&root.join("SegmentationObject/orphan.png"), &objects);

        let project = dir.path().join("project");
        let options = ConvertOptions::default();
        let report = import_segmentation(&root, &project, ProjectType::Pixel, &options, None)
            .await
            .unwrap();
        assert_eq!(report.converted, vec!["img"]);
        assert_eq!(report.not_converted, vec!["orphan"]);

        let classes = read_classes(&project).unwrap();
        assert_eq!(classes.len(), 21);
        assert_eq!(classes[20].name, "class_40");

        let (document, raster) = read_pixel_document(&project, "img.jpg").unwrap();
        assert_eq!(document.instances.len(), 2);
        let colors: Vec<Vec<[u8; 3]>> = document
            .instances
            .iter()
            .map(|i| i.parts().iter().map(|p| hex_to_rgb(&p.color).unwrap()).collect())
            .collect();
        let masks: Vec<_> = instance_masks(&raster, &colors).collect();
        assert_eq!(area(&masks[0]), 9);
        assert_eq!(area(&masks[1]), 12);
    }

    #[tokio::test]
    async fn test_import_detection() {
        let dir = TempDir::new().unwrap();
        let annotations = dir.path().join("VOC/Annotations");
        std::fs::create_dir_all(&annotations).unwrap();
        std::fs::write(annotations.join("2007_000027.xml"), XML).unwrap();
        std::fs::write(annotations.join("broken.xml"), "<annotation>").unwrap();

        let project = dir.path().join("project");
        let report = import_detection(
            &dir.path().join("VOC"),
            &project,
            &ConvertOptions::default(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(report.converted, vec!["2007_000027"]);
        assert_eq!(report.not_converted, vec!["broken"]);

        let names: Vec<_> = read_classes(&project)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["dog", "person"]);

        let document = read_document(&document_path(
            &project,
            "2007_000027.jpg",
            ProjectType::Vector,
        ))
        .unwrap();
        assert_eq!(document.instances.len(), 2);
    }
}
