// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Runtime settings.
//!
//! Settings are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (see
//!    [`default_config_path`])
//! 3. `SA_CONVERT_*` environment variables, e.g. `SA_CONVERT_MAX_WORKERS=4`

use crate::Error;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SA_CONVERT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConvertConfig {
    /// Items converted concurrently by the batch runner.
    pub max_workers: usize,
    /// Pretty-print written JSON.
    pub pretty: bool,
}

fn default_workers() -> usize {
    // Half the CPUs, minimum 2, maximum 8
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus / 2).clamp(2, 8)
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            pretty: false,
        }
    }
}

/// `config.toml` in the user config directory, e.g.
/// `~/.config/sa-convert/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sa-convert").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl ConvertConfig {
    /// Load from the default config file and the environment.
    pub fn load() -> Result<Self, Error> {
        Self::load_from(default_config_path().as_deref())
    }

    /// Load from an explicit config file (missing files are ignored) and the
    /// environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self, Error> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("max_workers", defaults.max_workers as u64)?
            .set_default("pretty", defaults.pretty)?;

        if let Some(path) = path {
            debug!("Reading settings from {:?}", path);
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        if settings.max_workers == 0 {
            return Err(Error::InvalidParameters(
                "max_workers must be at least 1".to_string(),
            ));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Single test so the environment is not mutated concurrently.
    #[test]
    fn test_layered_loading() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");

        let defaults = ConvertConfig::load_from(Some(&missing)).unwrap();
        assert_eq!(defaults, ConvertConfig::default());
        assert!((2..=8).contains(&defaults.max_workers));

        let file = dir.path().join("config.toml");
        std::fs::write(&file, "max_workers = 3\npretty = true\n").unwrap();
        let from_file = ConvertConfig::load_from(Some(&file)).unwrap();
        assert_eq!(from_file.max_workers, 3);
        assert!(from_file.pretty);

        unsafe { std::env::set_var("SA_CONVERT_MAX_WORKERS", "5") };
        let from_env = ConvertConfig::load_from(Some(&file));
        unsafe { std::env::remove_var("SA_CONVERT_MAX_WORKERS") };
        let from_env = from_env.unwrap();
        assert_eq!(from_env.max_workers, 5);
        assert!(from_env.pretty);

        std::fs::write(&file, "max_workers = 0\n").unwrap();
        assert!(matches!(
            ConvertConfig::load_from(Some(&file)),
            Err(Error::InvalidParameters(_))
        ));
    }
}
