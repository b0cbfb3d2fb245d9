// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # sa-convert
//!
//! Conversion between the annotation platform's native project files and
//! third-party dataset formats.
//!
//! The core is a pixel-mask pipeline shared by every converter:
//!
//! - [`mask::rle`]: COCO run-length encoding and its compressed string form
//! - [`mask::geometry`]: contour tracing, polygon rasterization, bbox and
//!   area
//! - [`mask::color`]: the blue-mask palette and panoptic id colors
//! - [`mask::blue_mask`]: painting instances into a raster and tracing them
//!   back out
//!
//! On top of it sit the format converters ([`coco`], [`voc`], [`yolo`] and
//! the pixel ↔ vector project converter in [`sa`]), all driven by a
//! concurrent batch runner that reports progress over a channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sa_convert::{ConvertOptions, DatasetFormat, Error, Task, annotation::ProjectType};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let report = sa_convert::import_annotations(
//!         DatasetFormat::Coco,
//!         Task::InstanceSegmentation,
//!         ProjectType::Pixel,
//!         Path::new("annotations/instances_val2017.json"),
//!         Path::new("project"),
//!         &ConvertOptions::default(),
//!         None,
//!     )
//!     .await?;
//!
//!     println!(
//!         "{} converted, {} not converted",
//!         report.converted.len(),
//!         report.not_converted.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `profiling`: `tracing` spans on the codec entry points

pub mod annotation;
mod batch;
pub mod coco;
mod config;
mod convert;
mod error;
mod instrument;
pub mod mask;
pub mod sa;
pub mod voc;
pub mod yolo;

pub use crate::{
    batch::{BatchReport, Progress, run_batch},
    config::{ConvertConfig, ENV_PREFIX, default_config_path},
    convert::{ConvertOptions, DatasetFormat, Task, export_annotations, import_annotations},
    error::Error,
};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .init();
    }
}
