//! Filesystem layout for the capture station
//!
//! Resolves the photos and camera-config directories once at startup and
//! guarantees they exist, so the capture paths never have to care.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved application directories. Construct once, share by `Arc`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    photos_dir: PathBuf,
    camera_config_dir: PathBuf,
}

impl AppPaths {
    /// Resolve from `PHOTOS_DIR` / `CAMERA_CONFIG_DIR` env or defaults
    pub fn from_env() -> Result<Self> {
        let photos = std::env::var("PHOTOS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/photos"));
        let config = std::env::var("CAMERA_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/camera-config"));
        Self::new(photos, config)
    }

    pub fn new(photos_dir: PathBuf, camera_config_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&photos_dir)
            .with_context(|| format!("cannot create photos dir {}", photos_dir.display()))?;
        fs::create_dir_all(&camera_config_dir).with_context(|| {
            format!(
                "cannot create camera-config dir {}",
                camera_config_dir.display()
            )
        })?;
        Ok(Self {
            photos_dir,
            camera_config_dir,
        })
    }

    /// Lay both directories out under one root (test fixtures, portable installs)
    pub fn under_root(root: &Path) -> Result<Self> {
        Self::new(root.join("photos"), root.join("camera-config"))
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    pub fn camera_config_dir(&self) -> &Path {
        &self.camera_config_dir
    }

    /// Directory holding the per-profile JSON files
    pub fn profiles_dir(&self) -> PathBuf {
        self.camera_config_dir.join("profiles")
    }

    /// File backing the key-value settings store
    pub fn settings_file(&self) -> PathBuf {
        self.camera_config_dir.join("settings.json")
    }
}
