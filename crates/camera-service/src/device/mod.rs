//! Polymorphic capture devices
//!
//! One uniform operation surface (connect / disconnect / capture /
//! preview / settings) over three structurally different native control
//! paths. Variants are a closed enum, dispatched by match — no trait
//! objects at this layer, the seams live one level down in `backend`.

mod depth;
mod tethered;
mod webcam;

pub use depth::DepthSensorDevice;
pub use tethered::TetheredDevice;
pub use webcam::WebcamDevice;

use crate::error::CameraError;
use crate::profile::ConfigProfile;
use crate::types::{
    merge_settings, CaptureOptions, CaptureResult, DeviceKind, DeviceSummary, HardwareFacts,
    SettingsMap,
};
use common::imaging;
use image::RgbImage;
use std::path::Path;
use tracing::{info, warn};

/// Shared identity and mutable state for one managed device
#[derive(Debug, Clone)]
pub struct DeviceCore {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub connected: bool,
    pub settings: SettingsMap,
    pub last_error: Option<String>,
}

impl DeviceCore {
    pub(crate) fn from_profile(facts: &HardwareFacts, profile: &ConfigProfile) -> Self {
        let mut settings = crate::profile::default_settings_for(facts.kind);
        merge_settings(&mut settings, &profile.settings);
        let name = if facts.model.trim().is_empty() {
            profile.name.clone()
        } else {
            facts.model.clone()
        };
        Self {
            id: facts.device_id(),
            name,
            kind: facts.kind,
            connected: false,
            settings,
            last_error: None,
        }
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            connected: self.connected,
            settings: self.settings.clone(),
        }
    }

    pub(crate) fn record_error(&mut self, err: &CameraError) {
        self.last_error = Some(err.to_string());
    }
}

/// Closed set of device variants; the registry dispatches through here
pub enum CaptureDevice {
    Webcam(WebcamDevice),
    Tethered(TetheredDevice),
    DepthSensor(DepthSensorDevice),
}

impl CaptureDevice {
    pub fn core(&self) -> &DeviceCore {
        match self {
            Self::Webcam(d) => d.core(),
            Self::Tethered(d) => d.core(),
            Self::DepthSensor(d) => d.core(),
        }
    }

    pub fn id(&self) -> &str {
        &self.core().id
    }

    pub fn is_connected(&self) -> bool {
        self.core().connected
    }

    pub fn to_summary(&self) -> DeviceSummary {
        self.core().summary()
    }

    pub fn connect(&mut self) -> Result<(), CameraError> {
        match self {
            Self::Webcam(d) => d.connect(),
            Self::Tethered(d) => d.connect(),
            Self::DepthSensor(d) => d.connect(),
        }
    }

    pub fn disconnect(&mut self) -> Result<(), CameraError> {
        match self {
            Self::Webcam(d) => d.disconnect(),
            Self::Tethered(d) => d.disconnect(),
            Self::DepthSensor(d) => d.disconnect(),
        }
    }

    pub fn capture(
        &mut self,
        photos_dir: &Path,
        options: &CaptureOptions,
    ) -> Result<CaptureResult, CameraError> {
        match self {
            Self::Webcam(d) => d.capture(photos_dir, options),
            Self::Tethered(d) => d.capture(photos_dir, options),
            Self::DepthSensor(d) => d.capture(photos_dir, options),
        }
    }

    pub fn preview_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        match self {
            Self::Webcam(d) => d.preview_frame(),
            Self::Tethered(d) => d.preview_frame(),
            Self::DepthSensor(d) => d.preview_frame(),
        }
    }

    pub fn update_settings(&mut self, patch: &SettingsMap) -> Result<(), CameraError> {
        match self {
            Self::Webcam(d) => d.update_settings(patch),
            Self::Tethered(d) => d.update_settings(patch),
            Self::DepthSensor(d) => d.update_settings(patch),
        }
    }
}

const THUMBNAIL_QUALITY: u8 = 80;

pub(crate) fn timestamp_filename(prefix: Option<&str>, extension: &str) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f");
    let prefix = match prefix {
        Some(p) if !p.trim().is_empty() => p,
        _ => "capture",
    };
    format!("{prefix}_{stamp}.{extension}")
}

/// Write a decoded frame as the capture file, plus an optional thumbnail
pub(crate) fn write_capture_image(
    photos_dir: &Path,
    img: &RgbImage,
    options: &CaptureOptions,
    quality: u8,
) -> Result<CaptureResult, CameraError> {
    std::fs::create_dir_all(photos_dir)
        .map_err(|e| CameraError::Capture(format!("photos dir: {e}")))?;
    let filename = timestamp_filename(options.filename_prefix.as_deref(), "jpg");
    let filepath = photos_dir.join(&filename);
    imaging::write_image(img, &filepath, quality)
        .map_err(|e| CameraError::Capture(e.to_string()))?;

    let thumbnail_path = if options.thumbnail {
        write_thumbnail(photos_dir, &filename, img)
    } else {
        None
    };

    info!(file = %filepath.display(), "capture written");
    Ok(CaptureResult {
        filepath,
        filename,
        thumbnail_path,
    })
}

/// Write camera-produced bytes verbatim as the capture file. The
/// thumbnail is decoded from the bytes when possible (raw formats are
/// skipped with a warning).
pub(crate) fn write_capture_bytes(
    photos_dir: &Path,
    data: &[u8],
    source_name: &str,
    options: &CaptureOptions,
) -> Result<CaptureResult, CameraError> {
    std::fs::create_dir_all(photos_dir)
        .map_err(|e| CameraError::Capture(format!("photos dir: {e}")))?;
    let extension = Path::new(source_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "jpg".to_string());
    let filename = timestamp_filename(options.filename_prefix.as_deref(), &extension);
    let filepath = photos_dir.join(&filename);
    std::fs::write(&filepath, data)
        .map_err(|e| CameraError::Capture(format!("write {}: {e}", filepath.display())))?;

    let thumbnail_path = if options.thumbnail {
        match imaging::decode(data) {
            Ok(img) => write_thumbnail(photos_dir, &filename, &img),
            Err(e) => {
                warn!(file = %filename, error = %e, "cannot decode capture for thumbnail");
                None
            }
        }
    } else {
        None
    };

    info!(file = %filepath.display(), "capture written");
    Ok(CaptureResult {
        filepath,
        filename,
        thumbnail_path,
    })
}

/// Isotropic downscale into the 320x240 bounding box. Best-effort: a
/// failed thumbnail never fails the capture that produced it.
fn write_thumbnail(photos_dir: &Path, filename: &str, img: &RgbImage) -> Option<std::path::PathBuf> {
    let thumb = imaging::resize_keep_aspect(
        img,
        imaging::THUMBNAIL_MAX_WIDTH,
        imaging::THUMBNAIL_MAX_HEIGHT,
    );
    let thumb_name = format!("thumb_{}", replace_extension(filename, "jpg"));
    let thumb_path = photos_dir.join(&thumb_name);
    match imaging::write_image(&thumb, &thumb_path, THUMBNAIL_QUALITY) {
        Ok(()) => Some(thumb_path),
        Err(e) => {
            warn!(file = %thumb_name, error = %e, "thumbnail write failed");
            None
        }
    }
}

fn replace_extension(filename: &str, extension: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{extension}"),
        None => format!("{filename}.{extension}"),
    }
}
