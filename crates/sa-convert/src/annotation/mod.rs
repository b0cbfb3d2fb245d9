// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Native Annotation Model
//!
//! Typed representation of the platform's project files:
//!
//! - `<image>___objects.json`: vector document
//! - `<image>___pixel.json` + `<image>___save.png`: pixel document and its
//!   blue mask
//! - `classes/classes.json`: class definitions
//!
//! Instances are a closed set of shapes ([`Shape`]) or, in pixel projects, a
//! list of blue-mask part colors.

mod io;
mod types;

pub use io::{
    CLASSES_DIR, CLASSES_FILE, MASK_SUFFIX, PIXEL_SUFFIX, VECTOR_SUFFIX, classes_path,
    document_items, document_path, image_name, list_documents, mask_path, read_classes,
    read_document, read_mask, read_pixel_document, write_classes, write_document, write_mask,
    write_pixel_document,
};
pub use types::{
    AnnotationDocument, Attribute, AttributeGroup, BboxPoints, ClassAttribute, ClassDef, ClassMap,
    CuboidPoints, Geometry, Instance, Metadata, Part, Point2, ProjectType, Shape,
    TemplateConnection, TemplatePoint, class_color, classes_from_names,
};
