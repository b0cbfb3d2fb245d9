// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Native annotation JSON data structures.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::mask::rgb_to_hex;

/// Annotation project flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    /// `___objects.json` documents with vector shapes.
    Vector,
    /// `___pixel.json` documents paired with a `___save.png` blue mask.
    Pixel,
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectType::Vector => write!(f, "vector"),
            ProjectType::Pixel => write!(f, "pixel"),
        }
    }
}

impl std::str::FromStr for ProjectType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(ProjectType::Vector),
            "pixel" => Ok(ProjectType::Pixel),
            other => Err(crate::Error::InvalidParameters(format!(
                "Unknown project type '{}'",
                other
            ))),
        }
    }
}

/// One annotated image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationDocument {
    pub metadata: Metadata,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub comments: Vec<serde_json::Value>,
}

impl AnnotationDocument {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                width: Some(width),
                height: Some(height),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Document metadata. Keys this crate does not know about are kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An annotated object: geometry plus class and bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub group_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Instance {
    /// A vector instance of the given class.
    pub fn vector(shape: Shape, class_name: impl Into<String>) -> Self {
        Self::with_geometry(Geometry::Vector(shape), class_name)
    }

    /// A pixel instance whose parts are the given `#rrggbb` colors.
    pub fn pixel(colors: Vec<String>, class_name: impl Into<String>) -> Self {
        let parts = colors.into_iter().map(|color| Part { color }).collect();
        Self::with_geometry(Geometry::Pixel { parts }, class_name)
    }

    fn with_geometry(geometry: Geometry, class_name: impl Into<String>) -> Self {
        Self {
            geometry,
            class_name: Some(class_name.into()),
            class_id: None,
            attributes: Vec::new(),
            group_id: 0,
            probability: Some(100.0),
            locked: false,
            visible: true,
        }
    }

    /// Shape of a vector instance.
    pub fn shape(&self) -> Option<&Shape> {
        match &self.geometry {
            Geometry::Vector(shape) => Some(shape),
            Geometry::Pixel { .. } => None,
        }
    }

    /// Part colors of a pixel instance.
    pub fn parts(&self) -> &[Part] {
        match &self.geometry {
            Geometry::Pixel { parts } => parts,
            Geometry::Vector(_) => &[],
        }
    }
}

/// Pixel parts or a vector shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    Pixel { parts: Vec<Part> },
    Vector(Shape),
}

/// One blue-mask color owned by a pixel instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub color: String,
}

/// Vector shapes, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Bbox {
        points: BboxPoints,
    },
    Polygon {
        points: Vec<f64>,
        /// Hole rings cut out of the polygon.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<Vec<f64>>,
    },
    Point {
        x: f64,
        y: f64,
    },
    Ellipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
        #[serde(default)]
        angle: f64,
    },
    Polyline {
        points: Vec<f64>,
    },
    Template {
        points: Vec<TemplatePoint>,
        #[serde(default)]
        connections: Vec<TemplateConnection>,
        #[serde(rename = "templateId", default, skip_serializing_if = "Option::is_none")]
        template_id: Option<i64>,
    },
    Cuboid {
        points: CuboidPoints,
    },
}

impl Shape {
    /// Axis-aligned box from `[x, y, w, h]`.
    pub fn bbox_from_xywh(bbox: [f64; 4]) -> Self {
        Shape::Bbox {
            points: BboxPoints {
                x1: bbox[0],
                y1: bbox[1],
                x2: bbox[0] + bbox[2],
                y2: bbox[1] + bbox[3],
            },
        }
    }

    /// Polygon without holes.
    pub fn polygon(points: Vec<f64>) -> Self {
        Shape::Polygon {
            points,
            exclude: Vec::new(),
        }
    }

    /// Type tag as written in `"type"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Bbox { .. } => "bbox",
            Shape::Polygon { .. } => "polygon",
            Shape::Point { .. } => "point",
            Shape::Ellipse { .. } => "ellipse",
            Shape::Polyline { .. } => "polyline",
            Shape::Template { .. } => "template",
            Shape::Cuboid { .. } => "cuboid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BboxPoints {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BboxPoints {
    /// `[x, y, w, h]` with corners normalized.
    pub fn to_xywh(&self) -> [f64; 4] {
        let (x1, x2) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (y1, y2) = (self.y1.min(self.y2), self.y1.max(self.y2));
        [x1, y1, x2 - x1, y2 - y1]
    }

    /// Corner polygon, clockwise from the top-left.
    pub fn to_polygon(&self) -> Vec<f64> {
        let [x, y, w, h] = self.to_xywh();
        vec![x, y, x + w, y, x + w, y + h, x, y + h]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePoint {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConnection {
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// Front and rear faces of a 2D cuboid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CuboidPoints {
    pub f1: Point2,
    pub f2: Point2,
    pub r1: Point2,
    pub r2: Point2,
}

/// Attribute selected on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub name: String,
    pub group_name: String,
}

/// Entry of `classes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub attribute_groups: Vec<AttributeGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_multiselect: bool,
    #[serde(default)]
    pub attributes: Vec<ClassAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

// Older exports write is_multiselect as 0/1.
fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// Deterministic class color seeded by the class id.
pub fn class_color(id: i64) -> String {
    let mut rng = StdRng::seed_from_u64(id as u64);
    let rgb: [u8; 3] = rng.r#gen();
    rgb_to_hex(&rgb)
}

/// Class definitions for the given names with ids `1..=n`.
pub fn classes_from_names<S: AsRef<str>>(names: &[S]) -> Vec<ClassDef> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let id = idx as i64 + 1;
            ClassDef {
                id: Some(id),
                name: name.as_ref().to_string(),
                color: class_color(id),
                attribute_groups: Vec::new(),
            }
        })
        .collect()
}

/// Class name ↔ id lookup.
///
/// Classes without an explicit id get their 1-based position.
#[derive(Debug, Clone, Default)]
pub struct ClassMap {
    classes: Vec<ClassDef>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<i64, usize>,
}

impl ClassMap {
    pub fn new(classes: &[ClassDef]) -> Self {
        let mut map = Self::default();
        for (idx, class) in classes.iter().enumerate() {
            let mut class = class.clone();
            let id = *class.id.get_or_insert(idx as i64 + 1);
            map.by_name.entry(class.name.clone()).or_insert(idx);
            map.by_id.entry(id).or_insert(idx);
            map.classes.push(class);
        }
        map
    }

    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.by_name.get(name).map(|&idx| &self.classes[idx])
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|c| c.id)
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(|&idx| self.classes[idx].name.as_str())
    }

    /// Class name of an instance, falling back to its class id.
    pub fn resolve<'a>(&'a self, instance: &'a Instance) -> Option<&'a str> {
        instance
            .class_name
            .as_deref()
            .filter(|name| self.by_name.contains_key(*name))
            .or_else(|| instance.class_id.and_then(|id| self.name_of(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_instance_deserialize() {
        let json = r#"{
            "type": "polygon",
            "classId": 3,
            "className": "car",
            "points": [1, 2, 3, 4, 5, 6],
            "attributes": [{"id": 1, "groupId": 2, "name": "red", "groupName": "color"}],
            "probability": 100,
            "locked": false,
            "visible": true,
            "groupId": 0
        }"#;
        let instance: Instance = serde_json::from_str(json).unwrap();

        assert_eq!(instance.class_name.as_deref(), Some("car"));
        assert_eq!(instance.class_id, Some(3));
        assert_eq!(instance.attributes[0].group_name, "color");
        match instance.shape() {
            Some(Shape::Polygon { points, exclude }) => {
                assert_eq!(points.len(), 6);
                assert!(exclude.is_empty());
            }
            other => panic!("Expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_pixel_instance_deserialize() {
        let json = r##"{"className": "person", "parts": [{"color": "#00000f"}, {"color": "#00001e"}]}"##;
        let instance: Instance = serde_json::from_str(json).unwrap();

        assert!(instance.shape().is_none());
        assert_eq!(instance.parts().len(), 2);
        assert_eq!(instance.parts()[1].color, "#00001e");
        assert!(instance.visible);
    }

    #[test]
    fn test_all_shapes_roundtrip() {
        let shapes = vec![
            Shape::bbox_from_xywh([1.0, 2.0, 3.0, 4.0]),
            Shape::Polygon {
                points: vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0],
                exclude: vec![vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0]],
            },
            Shape::Point { x: 1.0, y: 2.0 },
            Shape::Ellipse {
                cx: 5.0,
                cy: 5.0,
                rx: 2.0,
                ry: 1.0,
                angle: 30.0,
            },
            Shape::Polyline {
                points: vec![0.0, 0.0, 1.0, 1.0],
            },
            Shape::Template {
                points: vec![
                    TemplatePoint { id: 1, x: 1.0, y: 1.0 },
                    TemplatePoint { id: 2, x: 3.0, y: 3.0 },
                ],
                connections: vec![TemplateConnection { from: 1, to: 2 }],
                template_id: Some(7),
            },
            Shape::Cuboid {
                points: CuboidPoints {
                    f1: Point2 { x: 0.0, y: 0.0 },
                    f2: Point2 { x: 2.0, y: 2.0 },
                    r1: Point2 { x: 1.0, y: 1.0 },
                    r2: Point2 { x: 3.0, y: 3.0 },
                },
            },
        ];

        for shape in shapes {
            let instance = Instance::vector(shape.clone(), "thing");
            let json = serde_json::to_value(&instance).unwrap();
            assert_eq!(json["type"], shape.kind());
            let restored: Instance = serde_json::from_value(json).unwrap();
            assert_eq!(restored, instance);
        }
    }

    #[test]
    fn test_metadata_keeps_unknown_keys() {
        let json = r#"{
            "metadata": {"name": "a.jpg", "width": 10, "height": 20, "lastAction": {"email": "x"}},
            "instances": []
        }"#;
        let doc: AnnotationDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.metadata.width, Some(10));
        assert!(doc.metadata.extra.contains_key("lastAction"));

        let out = serde_json::to_value(&doc).unwrap();
        assert_eq!(out["metadata"]["lastAction"]["email"], "x");
    }

    #[test]
    fn test_classes_multiselect_bool_or_int() {
        let json = r##"[
            {"id": 1, "name": "car", "color": "#ff0000", "attribute_groups": [
                {"name": "color", "is_multiselect": 1, "attributes": [{"name": "red"}]},
                {"name": "state", "is_multiselect": false, "attributes": []}
            ]},
            {"name": "person", "color": "#00ff00"}
        ]"##;
        let classes: Vec<ClassDef> = serde_json::from_str(json).unwrap();
        assert!(classes[0].attribute_groups[0].is_multiselect);
        assert!(!classes[0].attribute_groups[1].is_multiselect);
        assert!(classes[1].attribute_groups.is_empty());
    }

    #[test]
    fn test_class_map_lookup() {
        let classes = vec![
            ClassDef {
                id: Some(7),
                name: "car".to_string(),
                color: "#ff0000".to_string(),
                attribute_groups: Vec::new(),
            },
            ClassDef {
                id: None,
                name: "person".to_string(),
                color: "#00ff00".to_string(),
                attribute_groups: Vec::new(),
            },
        ];
        let map = ClassMap::new(&classes);

        assert_eq!(map.id_of("car"), Some(7));
        assert_eq!(map.id_of("person"), Some(2));
        assert_eq!(map.name_of(7), Some("car"));
        assert_eq!(map.id_of("bus"), None);

        let mut instance = Instance::vector(Shape::Point { x: 0.0, y: 0.0 }, "unknown");
        instance.class_id = Some(2);
        assert_eq!(map.resolve(&instance), Some("person"));
    }

    #[test]
    fn test_classes_from_names_deterministic() {
        let a = classes_from_names(&["cat", "dog"]);
        let b = classes_from_names(&["cat", "dog", "bird"]);
        assert_eq!(a[..], b[..2]);
        assert_eq!(a[1].id, Some(2));
        assert!(a[0].color.starts_with('#') && a[0].color.len() == 7);
    }

    #[test]
    fn test_bbox_points() {
        let points = BboxPoints {
            x1: 10.0,
            y1: 20.0,
            x2: 4.0,
            y2: 30.0,
        };
        assert_eq!(points.to_xywh(), [4.0, 20.0, 6.0, 10.0]);
        assert_eq!(points.to_polygon(), vec![4.0, 20.0, 10.0, 20.0, 10.0, 30.0, 4.0, 30.0]);
    }

    #[test]
    fn test_project_type_parse() {
        assert_eq!("Pixel".parse::<ProjectType>().unwrap(), ProjectType::Pixel);
        assert!("raster".parse::<ProjectType>().is_err());
        assert_eq!(ProjectType::Vector.to_string(), "vector");
    }
}
