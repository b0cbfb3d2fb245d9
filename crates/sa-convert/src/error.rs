// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use std::path::PathBuf;
use tokio::sync::AcquireError;

/// Error type for annotation conversion operations.
///
/// The first group of variants covers the conversion core (mask codecs,
/// geometry, foreign schemas). The remaining variants wrap errors from the
/// I/O, serialization and runtime layers.
#[derive(Debug)]
pub enum Error {
    /// Malformed RLE counts string or counts array.
    DecodeError(String),
    /// Bounding box requested on a mask without foreground pixels.
    EmptyMask,
    /// A referenced image or mask file could not be loaded.
    UnreadableImage { path: PathBuf, reason: String },
    /// A foreign-format document is missing required keys or is inconsistent.
    SchemaError(String),
    /// Color string is not a `#RRGGBB` hex value.
    InvalidColor(String),
    /// The classes file is missing from the input project.
    MissingClasses(PathBuf),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// Unsupported format or format/task combination.
    UnsupportedFormat(String),
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// Image decoding or encoding error.
    ImageError(image::ImageError),
    /// Raw PNG decoding error.
    PngError(png::DecodingError),
    /// XML deserialization error.
    XmlError(quick_xml::DeError),
    /// ZIP archive error.
    ZipError(zip::result::ZipError),
    /// Semaphore acquisition error for concurrent operations.
    SemaphoreError(AcquireError),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// Integer parsing error.
    ParseIntError(std::num::ParseIntError),
    /// Float parsing error.
    ParseFloatError(std::num::ParseFloatError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageError(err)
    }
}

impl From<png::DecodingError> for Error {
    fn from(err: png::DecodingError) -> Self {
        Error::PngError(err)
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Error::XmlError(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipError(err)
    }
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        Error::SemaphoreError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseIntError(err)
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseFloatError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DecodeError(s) => write!(f, "RLE decode error: {}", s),
            Error::EmptyMask => write!(f, "Mask has no foreground pixels"),
            Error::UnreadableImage { path, reason } => {
                write!(f, "Unreadable image {:?}: {}", path, reason)
            }
            Error::SchemaError(s) => write!(f, "Schema error: {}", s),
            Error::InvalidColor(s) => write!(f, "Invalid color: {}", s),
            Error::MissingClasses(p) => write!(f, "Missing classes file: {:?}", p),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            Error::UnsupportedFormat(s) => write!(f, "Unsupported format: {}", s),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::ImageError(e) => write!(f, "Image error: {}", e),
            Error::PngError(e) => write!(f, "PNG error: {}", e),
            Error::XmlError(e) => write!(f, "XML error: {}", e),
            Error::ZipError(e) => write!(f, "ZIP error: {}", e),
            Error::SemaphoreError(e) => write!(f, "Semaphore error: {}", e),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::ParseIntError(e) => write!(f, "Integer parse error: {}", e),
            Error::ParseFloatError(e) => write!(f, "Float parse error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::ImageError(e) => Some(e),
            Error::PngError(e) => Some(e),
            Error::XmlError(e) => Some(e),
            Error::ZipError(e) => Some(e),
            Error::SemaphoreError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            Error::ParseIntError(e) => Some(e),
            Error::ParseFloatError(e) => Some(e),
            _ => None,
        }
    }
}
