// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Integration tests for COCO format support.

#[cfg(test)]
mod integration_tests {
    use super::super::*;
    use crate::{
        annotation::{ProjectType, document_path, read_classes, read_document},
        convert::{ConvertOptions, Task},
        mask::{BinaryMask, CompressedRle, id_to_rgb, rgb_to_id, rle_to_string},
    };
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn options(segmentation: SegmentationEncoding) -> ConvertOptions {
        ConvertOptions {
            max_workers: 2,
            pretty: true,
            segmentation,
            ..ConvertOptions::default()
        }
    }

    fn image(id: u64, file_name: &str) -> CocoImage {
        CocoImage {
            id,
            width: 20,
            height: 16,
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }

    fn category(id: u32, name: &str) -> CocoCategory {
        CocoCategory {
            id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn annotation(id: u64, image_id: u64, category_id: u32, segmentation: Segmentation) -> CocoAnnotation {
        CocoAnnotation {
            id,
            image_id,
            category_id,
            bbox: [0.0, 0.0, 1.0, 1.0],
            segmentation: Some(segmentation),
            ..Default::default()
        }
    }

    fn square_rle(x0: u32, y0: u32, n: u32) -> Segmentation {
        let mask = BinaryMask::from_fn(20, 16, |x, y| {
            (x0..x0 + n).contains(&x) && (y0..y0 + n).contains(&y)
        });
        Segmentation::CompressedRle(rle_to_string(&mask))
    }

    fn instances_dataset() -> CocoDataset {
        CocoDataset {
            images: vec![image(1, "train/a.jpg"), image(2, "b.jpg")],
            categories: vec![category(3, "cat"), category(8, "dog")],
            annotations: vec![
                annotation(
                    10,
                    1,
                    3,
                    Segmentation::Polygon(vec![vec![1.0, 1.0, 6.0, 1.0, 6.0, 5.0, 1.0, 5.0]]),
                ),
                annotation(
                    11,
                    1,
                    8,
                    Segmentation::Polygon(vec![
                        vec![10.0, 2.0, 13.0, 2.0, 13.0, 4.0, 10.0, 4.0],
                        vec![15.0, 10.0, 18.0, 10.0, 18.0, 14.0, 15.0, 14.0],
                    ]),
                ),
                annotation(12, 2, 8, square_rle(4, 4, 5)),
            ],
            ..Default::default()
        }
    }

    fn write(dataset: &impl serde::Serialize, path: &Path) {
        CocoWriter::new().write_json(dataset, path).unwrap();
    }

    #[tokio::test]
    async fn test_vector_import_export_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("instances.json");
        let project = dir.path().join("project");
        let output = dir.path().join("export/instances.json");
        write(&instances_dataset(), &input);

        let opts = options(SegmentationEncoding::Polygon);
        let report = import_vector(&input, &project, Task::InstanceSegmentation, &opts, None)
            .await
            .unwrap();
        assert_eq!(report.converted.len(), 2);
        assert!(report.not_converted.is_empty());

        let classes = read_classes(&project).unwrap();
        assert_eq!(classes[1].id, Some(8));
        let document =
            read_document(&document_path(&project, "a.jpg", ProjectType::Vector)).unwrap();
        assert_eq!(document.instances.len(), 3);
        assert_eq!(document.metadata.width, Some(20));

        let report = export_vector(&project, &output, Task::InstanceSegmentation, &opts, None)
            .await
            .unwrap();
        assert_eq!(report.converted.len(), 2);

        let exported = CocoReader::new().read(&output).unwrap();
        assert_eq!(exported.images.len(), 2);
        assert_eq!(exported.annotations.len(), 3);
        assert_eq!(
            exported.categories.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![3, 8]
        );

        let a = exported.images.iter().find(|i| i.file_name == "a.jpg").unwrap();
        let on_a: Vec<_> = exported
            .annotations
            .iter()
            .filter(|ann| ann.image_id == a.id)
            .collect();
        assert_eq!(on_a[0].bbox, [1.0, 1.0, 5.0, 4.0]);
        assert_eq!(on_a[1].category_id, 8);
        let Some(Segmentation::Polygon(parts)) = &on_a[1].segmentation else {
            panic!("expected a grouped polygon annotation");
        };
        assert_eq!(parts.len(), 2);

        // RLE was traced into a polygon that covers the same pixels
        let b = exported.images.iter().find(|i| i.file_name == "b.jpg").unwrap();
        let on_b = exported
            .annotations
            .iter()
            .find(|ann| ann.image_id == b.id)
            .unwrap();
        let restored = on_b.segmentation.as_ref().unwrap().to_mask(16, 20).unwrap();
        assert_eq!(restored, square_rle(4, 4, 5).to_mask(16, 20).unwrap());
    }

    #[tokio::test]
    async fn test_pixel_import_export_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("instances.json");
        let project = dir.path().join("project");
        let output = dir.path().join("export.json");
        let dataset = instances_dataset();
        write(&dataset, &input);

        let opts = options(SegmentationEncoding::Rle);
        import_pixel(&input, &project, &opts, None).await.unwrap();
        assert!(project.join("a.jpg___save.png").is_file());
        assert!(project.join("a.jpg___pixel.json").is_file());

        let report = export_pixel(&project, &output, &opts, None).await.unwrap();
        assert_eq!(report.converted.len(), 2);

        let exported = CocoReader::new().read(&output).unwrap();
        assert_eq!(exported.annotations.len(), 3);

        // Instances do not overlap, so every mask survives unchanged
        let exported_masks: Vec<BinaryMask> = exported
            .annotations
            .iter()
            .map(|ann| ann.segmentation.as_ref().unwrap().to_mask(16, 20).unwrap())
            .collect();
        for original in &dataset.annotations {
            let mask = original
                .segmentation
                .as_ref()
                .unwrap()
                .to_mask(16, 20)
                .unwrap();
            assert!(exported_masks.contains(&mask));
        }
        assert!(exported.annotations.iter().all(|ann| matches!(
            ann.segmentation,
            Some(Segmentation::CompressedRle(CompressedRle { size: [16, 20], .. }))
        )));
    }

    #[tokio::test]
    async fn test_panoptic_import_export_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("panoptic_val.json");
        let png_dir = dir.path().join("panoptic_val");
        std::fs::create_dir_all(&png_dir).unwrap();

        let mut png = RgbImage::new(8, 6);
        for (x, y, pixel) in png.enumerate_pixels_mut() {
            let id = if y < 2 { 1001 } else if x < 3 { 42 } else { 0 };
            *pixel = Rgb(id_to_rgb(id));
        }
        png.save(png_dir.join("a.png")).unwrap();

        let dataset = CocoPanopticDataset {
            images: vec![CocoImage {
                id: 5,
                width: 8,
                height: 6,
                file_name: "a.jpg".to_string(),
                ..Default::default()
            }],
            categories: vec![
                CocoCategory {
                    id: 1,
                    name: "sky".to_string(),
                    isthing: Some(0),
                    color: Some([70, 130, 180]),
                    ..Default::default()
                },
                category(2, "person"),
            ],
            annotations: vec![PanopticAnnotation {
                image_id: 5,
                file_name: "a.png".to_string(),
                segments_info: vec![
                    SegmentInfo {
                        id: 1001,
                        category_id: 1,
                        ..Default::default()
                    },
                    SegmentInfo {
                        id: 42,
                        category_id: 2,
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        write(&dataset, &input);

        let project = dir.path().join("project");
        let opts = options(SegmentationEncoding::Polygon);
        let report = import_panoptic(&input, &project, &opts, None).await.unwrap();
        assert_eq!(report.converted, vec!["a.png"]);
        assert_eq!(read_classes(&project).unwrap()[0].color, "#4682b4");

        let output = dir.path().join("out/panoptic.json");
        export_panoptic(&project, &output, &opts, None).await.unwrap();

        let exported = CocoReader::new().read_panoptic_json(&output).unwrap();
        let segments = &exported.annotations[0].segments_info;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].category_id, 1);
        assert_eq!(segments[0].area, 16.0);
        assert_eq!(segments[1].category_id, 2);
        assert_eq!(segments[1].area, 12.0);
        assert_eq!(segments[1].bbox, [0.0, 2.0, 3.0, 4.0]);

        let written = image::open(dir.path().join("out/panoptic/a.png"))
            .unwrap()
            .to_rgb8();
        let id_at = |x, y| {
            let p = written.get_pixel(x, y);
            rgb_to_id([p[0], p[1], p[2]])
        };
        assert_eq!(id_at(7, 0), segments[0].id);
        assert_eq!(id_at(0, 5), segments[1].id);
        assert_eq!(id_at(7, 5), 0);
    }

    #[tokio::test]
    async fn test_bad_image_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("instances.json");
        let mut dataset = instances_dataset();
        dataset.annotations[2].category_id = 99;
        write(&dataset, &input);

        let project = dir.path().join("project");
        let report = import_vector(
            &input,
            &project,
            Task::ObjectDetection,
            &options(SegmentationEncoding::Polygon),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.converted, vec!["train/a.jpg"]);
        assert_eq!(report.not_converted, vec!["b.jpg"]);
        assert!(!document_path(&project, "b.jpg", ProjectType::Vector).exists());
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_the_batch() {
        let dir = TempDir::new().unwrap();
        let result = import_vector(
            &dir.path().join("missing.json"),
            dir.path(),
            Task::ObjectDetection,
            &options(SegmentationEncoding::Polygon),
            None,
        )
        .await;
        assert!(matches!(result, Err(crate::Error::IoError(_))));
    }

    #[tokio::test]
    async fn test_import_applies_read_options() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("instances.json");
        write(&instances_dataset(), &input);

        let mut opts = options(SegmentationEncoding::Polygon);
        opts.coco = CocoReadOptions {
            category_filter: vec!["dog".to_string()],
            ..Default::default()
        };
        let project = dir.path().join("dogs");
        let report = import_vector(&input, &project, Task::InstanceSegmentation, &opts, None)
            .await
            .unwrap();
        assert_eq!(report.converted.len(), 2);

        let classes = read_classes(&project).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, Some(8));
        let document =
            read_document(&document_path(&project, "a.jpg", ProjectType::Vector)).unwrap();
        assert_eq!(document.instances.len(), 2);

        let mut dangling = instances_dataset();
        dangling.annotations[2].image_id = 42;
        write(&dangling, &input);
        opts.coco = CocoReadOptions {
            validate: true,
            ..Default::default()
        };
        let result = import_vector(
            &input,
            &dir.path().join("strict"),
            Task::InstanceSegmentation,
            &opts,
            None,
        )
        .await;
        assert!(matches!(result, Err(crate::Error::SchemaError(_))));
    }

    #[tokio::test]
    async fn test_extreme_polygon_does_not_stall_pixel_import() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("instances.json");
        let mut dataset = instances_dataset();
        dataset.annotations[0].segmentation = Some(Segmentation::Polygon(vec![vec![
            -1e19, 0.0, 1e19, 0.0, 0.0, 5.0,
        ]]));
        write(&dataset, &input);

        let project = dir.path().join("project");
        let report = import_pixel(&input, &project, &options(SegmentationEncoding::Polygon), None)
            .await
            .unwrap();
        assert_eq!(report.converted.len(), 2);
        assert!(report.not_converted.is_empty());
    }

    /// Test COCO dataset parsing with real-world structure
    #[test]
    fn test_coco_dataset_parsing() {
        let json = r#"{
            "info": {
                "year": 2017,
                "version": "1.0",
                "description": "COCO 2017 Dataset"
            },
            "licenses": [
                {"id": 1, "name": "CC BY 4.0", "url": "https://creativecommons.org/licenses/by/4.0/"}
            ],
            "images": [
                {"id": 397133, "width": 640, "height": 427, "file_name": "000000397133.jpg"}
            ],
            "annotations": [
                {
                    "id": 1768,
                    "image_id": 397133,
                    "category_id": 18,
                    "bbox": [473.07, 395.93, 38.65, 28.67],
                    "area": 702.1,
                    "iscrowd": 0,
                    "segmentation": [[510.66, 423.01, 511.72, 420.03, 510.45, 416.17]]
                },
                {
                    "id": 1769,
                    "image_id": 397133,
                    "category_id": 18,
                    "bbox": [0, 0, 2, 2],
                    "area": 4,
                    "iscrowd": 1,
                    "segmentation": {"counts": [0, 2, 425, 2, 272851], "size": [427, 640]}
                }
            ],
            "categories": [
                {"id": 18, "name": "dog", "supercategory": "animal"}
            ]
        }"#;

        let dataset: CocoDataset = serde_json::from_str(json).unwrap();

        assert_eq!(dataset.info.year, Some(2017));
        assert_eq!(dataset.images[0].id, 397133);
        assert_eq!(dataset.categories[0].name, "dog");

        match &dataset.annotations[0].segmentation {
            Some(Segmentation::Polygon(polys)) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].len(), 6);
            }
            _ => panic!("Expected polygon segmentation"),
        }

        let crowd = dataset.annotations[1].segmentation.as_ref().unwrap();
        assert!(matches!(crowd, Segmentation::Rle(_)));
        assert_eq!(crowd.area().unwrap(), 4.0);
        let mask = crowd.to_mask(427, 640).unwrap();
        assert!(mask.get(0, 0) && mask.get(1, 1));
    }

    /// Test CocoIndex efficient lookups
    #[test]
    fn test_coco_index_lookups() {
        let dataset = CocoDataset {
            images: vec![image(1, "a.jpg"), image(2, "b.jpg")],
            categories: vec![category(10, "zebra"), category(20, "apple")],
            annotations: vec![
                CocoAnnotation {
                    id: 100,
                    image_id: 1,
                    category_id: 10,
                    ..Default::default()
                },
                CocoAnnotation {
                    id: 101,
                    image_id: 1,
                    category_id: 20,
                    ..Default::default()
                },
                CocoAnnotation {
                    id: 102,
                    image_id: 2,
                    category_id: 10,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let index = CocoIndex::from_dataset(&dataset);

        assert!(index.images.contains_key(&1));
        assert!(!index.images.contains_key(&999));

        assert_eq!(index.categories[&10].name, "zebra");

        assert_eq!(index.annotations_for_image(1).len(), 2);
        assert_eq!(index.annotations_for_image(2).len(), 1);
        assert_eq!(index.annotations_for_image(999).len(), 0);
    }
}
