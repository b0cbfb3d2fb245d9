// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Mask ↔ polygon geometry.
//!
//! ## Contours
//!
//! [`find_contours`] runs `imageproc`'s Suzuki–Abe border following
//! (8-connected foreground). Every border is tagged outer or hole and points
//! at its parent border, which gives two ways to read the result:
//!
//! - [`mask_to_polygons`]: each outer border with its immediate holes.
//! - [`mask_to_external_polygons`]: only the outermost borders. Holes are
//!   lost. Every converter except the pixel → vector upgrade uses this one.
//!
//! Contour points are pixel indices, compressed to the points where the
//! tracing direction changes.
//!
//! ## Rasterization
//!
//! [`polygon_to_mask`] fills a polygon with the even-odd rule sampled at
//! integer pixel coordinates and then draws its outline, so a traced contour
//! rasterizes back to the pixels it was traced from.

use super::BinaryMask;
use crate::Error;
use image::{GrayImage, Luma};
use imageproc::point::Point;
use itertools::Itertools;
use std::collections::HashMap;

pub use imageproc::contours::{BorderType, Contour};

/// An outer ring and the holes directly inside it, as flat coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonWithHoles {
    pub outer: Vec<f64>,
    pub holes: Vec<Vec<f64>>,
}

/// Trace all borders of the mask.
///
/// Points are border pixels `(x, y)` in tracing order. `parent` indexes the
/// enclosing contour and is `None` for borders touching the background
/// around the image.
pub fn find_contours(mask: &BinaryMask) -> Vec<Contour<i32>> {
    #[cfg(feature = "profiling")]
    let _span = crate::instrument::debug_span!(
        "find_contours",
        width = mask.width(),
        height = mask.height()
    )
    .entered();

    let image = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get(x, y) { 255 } else { 0 }])
    });
    imageproc::contours::find_contours::<i32>(&image)
}

/// Keep only the points where the tracing direction changes.
fn compress_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    (0..n)
        .filter(|&k| {
            let prev = points[(k + n - 1) % n];
            let cur = points[k];
            let next = points[(k + 1) % n];
            (cur.x - prev.x, cur.y - prev.y) != (next.x - cur.x, next.y - cur.y)
        })
        .map(|k| points[k])
        .collect()
}

fn flatten(points: &[Point<i32>]) -> Vec<f64> {
    compress_chain(points)
        .into_iter()
        .flat_map(|p| [p.x as f64, p.y as f64])
        .collect()
}

/// Outer borders with their immediate holes.
///
/// Outer borders nested inside a hole are reported as separate polygons.
/// Rings with fewer than 3 points are discarded.
pub fn mask_to_polygons(mask: &BinaryMask) -> Vec<PolygonWithHoles> {
    let contours = find_contours(mask);
    let mut polygons: Vec<PolygonWithHoles> = Vec::new();
    let mut slots = HashMap::new();

    for (idx, contour) in contours.iter().enumerate() {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let outer = flatten(&contour.points);
        if outer.len() < 6 {
            continue;
        }
        slots.insert(idx, polygons.len());
        polygons.push(PolygonWithHoles {
            outer,
            holes: Vec::new(),
        });
    }

    for contour in contours.iter().filter(|c| c.border_type == BorderType::Hole) {
        if let Some(&slot) = contour.parent.and_then(|p| slots.get(&p)) {
            let hole = flatten(&contour.points);
            if hole.len() >= 6 {
                polygons[slot].holes.push(hole);
            }
        }
    }

    polygons
}

/// Outermost borders only, as flat `[x0, y0, x1, y1, ...]` polygons.
pub fn mask_to_external_polygons(mask: &BinaryMask) -> Vec<Vec<f64>> {
    find_contours(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| flatten(&c.points))
        .filter(|polygon| polygon.len() > 4)
        .collect()
}

fn points_of(polygon: &[f64]) -> Vec<(f64, f64)> {
    polygon.iter().copied().tuples().collect()
}

/// Points for rasterization. Vertices with NaN or infinite coordinates are
/// dropped.
fn finite_points(polygon: &[f64]) -> Vec<(f64, f64)> {
    points_of(polygon)
        .into_iter()
        .filter(|p| p.0.is_finite() && p.1.is_finite())
        .collect()
}

fn scan_fill(mask: &mut BinaryMask, points: &[(f64, f64)], value: bool) {
    if points.len() < 3 {
        return;
    }

    let mut xs = Vec::new();
    for y in 0..mask.height() {
        let yf = y as f64;
        xs.clear();

        for (p, q) in points.iter().circular_tuple_windows() {
            if p.1 == q.1 {
                continue;
            }
            let (lo, hi) = if p.1 < q.1 { (p.1, q.1) } else { (q.1, p.1) };
            if yf >= lo && yf < hi {
                let t = (yf - p.1) / (q.1 - p.1);
                xs.push(p.0 + t * (q.0 - p.0));
            }
        }

        xs.sort_by(|a, b| a.total_cmp(b));
        for pair in xs.chunks_exact(2) {
            let from = pair[0].ceil().max(0.0);
            let to = pair[1].floor().min(mask.width() as f64 - 1.0);
            if from > to {
                continue;
            }
            for x in from as u32..=to as u32 {
                mask.set(x, y, value);
            }
        }
    }
}

/// Clip a segment to the rectangle `[x0, x1] × [y0, y1]` (Liang–Barsky).
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    (x0, y0, x1, y1): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);

    for (p, q) in [
        (-dx, from.0 - x0),
        (dx, x1 - from.0),
        (-dy, from.1 - y0),
        (dy, y1 - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    // Large coordinates lose precision in the interpolation
    let at = |t: f64| {
        (
            (from.0 + t * dx).clamp(x0, x1),
            (from.1 + t * dy).clamp(y0, y1),
        )
    };
    Some((at(t0), at(t1)))
}

/// Bresenham line, limited to the mask plus a one pixel margin so the step
/// count is bounded by the mask size.
fn draw_line(mask: &mut BinaryMask, from: (f64, f64), to: (f64, f64), value: bool) {
    let bounds = (-1.0, -1.0, mask.width() as f64, mask.height() as f64);
    let Some((from, to)) = clip_segment(from, to, bounds) else {
        return;
    };

    let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
    let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 {
            mask.set(x0 as u32, y0 as u32, value);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_outline(mask: &mut BinaryMask, points: &[(f64, f64)], value: bool) {
    match points {
        [] => {}
        [p] => draw_line(mask, *p, *p, value),
        _ => {
            for (p, q) in points.iter().circular_tuple_windows() {
                draw_line(mask, *p, *q, value);
            }
        }
    }
}

/// Rasterize a closed polygon (flat coordinates) into a `height × width`
/// mask. The outline is part of the filled region.
pub fn polygon_to_mask(polygon: &[f64], height: u32, width: u32) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    let points = finite_points(polygon);
    scan_fill(&mut mask, &points, true);
    draw_outline(&mut mask, &points, true);
    mask
}

/// Rasterize an outer ring minus the interiors of its holes. Hole outlines
/// stay foreground since traced hole borders run along foreground pixels.
pub fn polygon_with_holes_to_mask(
    polygon: &PolygonWithHoles,
    height: u32,
    width: u32,
) -> BinaryMask {
    let mut mask = polygon_to_mask(&polygon.outer, height, width);

    for hole in &polygon.holes {
        let points = finite_points(hole);
        let mut interior = BinaryMask::new(width, height);
        scan_fill(&mut interior, &points, true);
        draw_outline(&mut interior, &points, false);
        for (x, y) in interior.foreground() {
            mask.set(x, y, false);
        }
    }

    mask
}

/// Tight bounding box `[x, y, w, h]` of the foreground pixels.
pub fn bbox(mask: &BinaryMask) -> Result<[u32; 4], Error> {
    let (xmin, ymin, xmax, ymax) = mask
        .foreground()
        .fold(None, |acc: Option<(u32, u32, u32, u32)>, (x, y)| {
            Some(match acc {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            })
        })
        .ok_or(Error::EmptyMask)?;

    Ok([xmin, ymin, xmax - xmin + 1, ymax - ymin + 1])
}

/// Foreground pixel count.
pub fn area(mask: &BinaryMask) -> u64 {
    mask.count()
}

/// Union of masks with identical dimensions.
pub fn merge(masks: &[BinaryMask]) -> Result<BinaryMask, Error> {
    let Some(first) = masks.first() else {
        return Err(Error::InvalidParameters(
            "Cannot merge an empty list of masks".to_string(),
        ));
    };

    let mut merged = first.clone();
    for mask in &masks[1..] {
        if mask.width() != first.width() || mask.height() != first.height() {
            return Err(Error::InvalidParameters(format!(
                "Mask size {}x{} does not match {}x{}",
                mask.width(),
                mask.height(),
                first.width(),
                first.height()
            )));
        }
        for (x, y) in mask.foreground() {
            merged.set(x, y, true);
        }
    }

    Ok(merged)
}

/// Bounding box `[x, y, w, h]` of flat polygon coordinates.
pub fn polygon_bbox(polygon: &[f64]) -> Option<[f64; 4]> {
    let points = points_of(polygon);
    let (xmin, xmax) = points
        .iter()
        .map(|p| p.0)
        .minmax_by(|a, b| a.total_cmp(b))
        .into_option()?;
    let (ymin, ymax) = points
        .iter()
        .map(|p| p.1)
        .minmax_by(|a, b| a.total_cmp(b))
        .into_option()?;
    Some([xmin, ymin, xmax - xmin, ymax - ymin])
}

/// Polygon area using the shoelace formula.
pub fn shoelace_area(polygon: &[f64]) -> f64 {
    if polygon.len() < 6 {
        return 0.0;
    }

    let points = points_of(polygon);
    let area: f64 = points
        .iter()
        .circular_tuple_windows()
        .map(|(p, q)| p.0 * q.1 - q.0 * p.1)
        .sum();

    (area / 2.0).abs()
}
