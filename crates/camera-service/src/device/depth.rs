//! Depth-sensor camera: a streaming pipeline with color and optional
//! depth sub-streams
//!
//! Image output always comes from the color sub-stream; depth data rides
//! along for consumers that want it. Advanced controls go through the
//! sensor's dedicated option surface, not the config-node resolver.

use super::{write_capture_image, DeviceCore};
use crate::backend::{DepthBackend, DepthControl, DepthPipeline, FrameBundle, StreamConfig};
use crate::error::CameraError;
use crate::profile::ConfigProfile;
use crate::types::{
    bool_setting, merge_settings, overlay, u32_setting, CaptureOptions, CaptureResult,
    HardwareFacts, SettingsMap,
};
use common::imaging;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const BUNDLE_TIMEOUT: Duration = Duration::from_secs(2);
/// The first bundles after pipeline start are commonly incomplete while
/// the sensor syncs its sub-streams.
const BUNDLE_ATTEMPTS: u32 = 5;
const BUNDLE_RETRY_DELAY: Duration = Duration::from_millis(150);

pub struct DepthSensorDevice {
    core: DeviceCore,
    facts: HardwareFacts,
    backend: Arc<dyn DepthBackend>,
    pipeline: Option<Box<dyn DepthPipeline>>,
    advanced: SettingsMap,
}

impl DepthSensorDevice {
    pub fn new(
        facts: HardwareFacts,
        profile: &ConfigProfile,
        backend: Arc<dyn DepthBackend>,
    ) -> Self {
        Self {
            core: DeviceCore::from_profile(&facts, profile),
            facts,
            backend,
            pipeline: None,
            advanced: profile.advanced.clone(),
        }
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            width: u32_setting(&self.core.settings, "resolution_width", 1280),
            height: u32_setting(&self.core.settings, "resolution_height", 720),
            frame_rate: u32_setting(&self.core.settings, "frame_rate", 30),
            enable_depth: bool_setting(&self.core.settings, "depth_enabled", false),
        }
    }

    pub fn connect(&mut self) -> Result<(), CameraError> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let mut pipeline = match self.backend.start(&self.facts, &self.stream_config()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let err = CameraError::Connect(e.cause());
                self.core.record_error(&err);
                error!(device_id = %self.core.id, error = %err, "depth pipeline start failed");
                return Err(err);
            }
        };
        apply_controls(pipeline.as_mut(), &self.advanced, &self.core.id);
        self.pipeline = Some(pipeline);
        self.core.connected = true;
        self.core.last_error = None;
        info!(device_id = %self.core.id, backend = self.backend.name(), "depth sensor streaming");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), CameraError> {
        if self.pipeline.take().is_some() {
            info!(device_id = %self.core.id, "depth sensor stopped");
        }
        self.core.connected = false;
        Ok(())
    }

    fn wait_bundle(&mut self) -> Result<FrameBundle, CameraError> {
        let device_id = self.core.id.clone();
        let pipeline = self.pipeline.as_mut().ok_or(CameraError::NotConnected)?;
        let mut last: Option<CameraError> = None;
        for attempt in 1..=BUNDLE_ATTEMPTS {
            match pipeline.wait_frames(BUNDLE_TIMEOUT) {
                Ok(bundle) => return Ok(bundle),
                Err(e) => {
                    debug!(device_id = %device_id, attempt, error = %e, "frame bundle not ready");
                    last = Some(e);
                    std::thread::sleep(BUNDLE_RETRY_DELAY);
                }
            }
        }
        Err(last.unwrap_or_else(|| CameraError::Capture("no frame bundle".to_string())))
    }

    pub fn capture(
        &mut self,
        photos_dir: &Path,
        options: &CaptureOptions,
    ) -> Result<CaptureResult, CameraError> {
        let settings = overlay(&self.core.settings, &options.overrides);
        let bundle = self
            .wait_bundle()
            .map_err(|e| match e {
                CameraError::NotConnected => CameraError::NotConnected,
                other => CameraError::Capture(other.cause()),
            })?;
        let color = bundle.color;
        let img = imaging::from_raw_rgb(color.width, color.height, color.pixels)
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let quality = u32_setting(&settings, "jpeg_quality", 92).min(100) as u8;
        write_capture_image(photos_dir, &img, options, quality)
    }

    pub fn preview_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        let quality = u32_setting(&self.core.settings, "preview_quality", 70).min(100) as u8;
        let bundle = self.wait_bundle().map_err(|e| match e {
            CameraError::NotConnected => CameraError::NotConnected,
            other => CameraError::Preview(other.cause()),
        })?;
        let color = bundle.color;
        let img = imaging::from_raw_rgb(color.width, color.height, color.pixels)
            .map_err(|e| CameraError::Preview(e.to_string()))?;
        imaging::encode_jpeg(&img, quality).map_err(|e| CameraError::Preview(e.to_string()))
    }

    pub fn update_settings(&mut self, patch: &SettingsMap) -> Result<(), CameraError> {
        merge_settings(&mut self.core.settings, patch);
        // control-surface keys take effect immediately on a live pipeline;
        // stream geometry applies on the next connect
        let device_id = self.core.id.clone();
        for (key, value) in patch {
            if control_for_key(key).is_some() {
                self.advanced.insert(key.clone(), value.clone());
            }
        }
        if let Some(pipeline) = self.pipeline.as_mut() {
            apply_controls(pipeline.as_mut(), patch, &device_id);
        }
        Ok(())
    }
}

fn control_for_key(key: &str) -> Option<DepthControl> {
    match key {
        "emitter_enabled" => Some(DepthControl::EmitterEnabled),
        "laser_power" => Some(DepthControl::LaserPower),
        "depth_units" => Some(DepthControl::DepthUnits),
        _ => None,
    }
}

/// Apply advanced sensor controls, each independently and non-fatally
fn apply_controls(pipeline: &mut dyn DepthPipeline, entries: &SettingsMap, device_id: &str) {
    for (key, value) in entries {
        let Some(control) = control_for_key(key) else {
            continue;
        };
        let numeric = match value {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => match other.as_f64() {
                Some(v) => v,
                None => {
                    warn!(device_id = %device_id, key = %key, "non-numeric control value, skipping");
                    continue;
                }
            },
        };
        match pipeline.set_control(control, numeric) {
            Ok(()) => debug!(device_id = %device_id, key = %key, value = numeric, "sensor control applied"),
            Err(e) => warn!(device_id = %device_id, key = %key, error = %e, "failed to apply sensor control"),
        }
    }
}
