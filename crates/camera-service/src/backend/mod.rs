//! Native control-path seams
//!
//! The three hardware classes this subsystem drives have structurally
//! different native APIs with incompatible settings vocabularies: webcams
//! are frame-grabbing sessions, tethered bodies are command/response PTP
//! endpoints with a config-node tree, depth sensors are streaming
//! pipelines with a dedicated option surface. Each sits behind its own
//! trait pair so the device layer stays uniform and the native glue stays
//! thin and feature-gated.

pub mod virtual_cam;

#[cfg(feature = "gphoto2")]
pub mod ptp;
#[cfg(feature = "realsense")]
pub mod realsense;
#[cfg(feature = "v4l")]
pub mod uvc;

use crate::error::CameraError;
use crate::nodes::SettingsTree;
use crate::types::{DeviceKind, HardwareFacts};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One raw RGB8 frame as delivered by a frame-grabbing session
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Depth sub-frame of a synchronized bundle (Z16 plus unit scale)
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
    /// Meters per depth unit
    pub depth_units: f32,
}

/// Synchronized color (+ optional depth) bundle from a depth sensor
#[derive(Debug, Clone)]
pub struct FrameBundle {
    pub color: RawFrame,
    pub depth: Option<DepthFrame>,
}

/// File object produced by a tethered shutter release
#[derive(Debug, Clone)]
pub struct CapturedFile {
    /// Name the camera gave the file (extension matters, data may be raw)
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub enable_depth: bool,
}

/// Controls a depth sensor exposes on its dedicated surface (these do not
/// go through the config-node resolver)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthControl {
    EmitterEnabled,
    LaserPower,
    DepthUnits,
}

pub trait WebcamBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError>;
    fn open(
        &self,
        facts: &HardwareFacts,
        config: &FrameConfig,
    ) -> Result<Box<dyn FrameSession>, CameraError>;
}

pub trait FrameSession: Send {
    /// Re-apply resolution and frame rate on a live session
    fn configure(&mut self, config: &FrameConfig) -> Result<(), CameraError>;
    fn grab_frame(&mut self, timeout: Duration) -> Result<RawFrame, CameraError>;
}

pub trait TetheredBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError>;
    fn open(&self, facts: &HardwareFacts) -> Result<Box<dyn TetheredHandle>, CameraError>;
}

pub trait TetheredHandle: Send {
    fn settings_tree(&mut self) -> Result<SettingsTree, CameraError>;
    /// Write one node by its native name. Rejected values and read-only
    /// nodes surface as `Settings` errors; callers treat them as
    /// per-setting, non-fatal.
    fn set_node(&mut self, node_name: &str, value: &Value) -> Result<(), CameraError>;
    /// Fire the shutter and retrieve the resulting file object
    fn trigger_capture(&mut self, timeout: Duration) -> Result<CapturedFile, CameraError>;
    /// One encoded live-view frame
    fn preview_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, CameraError>;
}

pub trait DepthBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError>;
    fn start(
        &self,
        facts: &HardwareFacts,
        config: &StreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError>;
}

pub trait DepthPipeline: Send {
    /// Wait for the next synchronized frame bundle
    fn wait_frames(&mut self, timeout: Duration) -> Result<FrameBundle, CameraError>;
    fn set_control(&mut self, control: DepthControl, value: f64) -> Result<(), CameraError>;
}

/// Which native control paths this process can drive. Recorded once at
/// startup; an absent backend means zero devices of that kind, not
/// per-device errors.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackendAvailability {
    pub webcam: bool,
    pub tethered: bool,
    pub depth: bool,
}

impl BackendAvailability {
    pub fn supports(&self, kind: DeviceKind) -> bool {
        match kind {
            DeviceKind::Webcam => self.webcam,
            DeviceKind::Tethered => self.tethered,
            DeviceKind::DepthSensor => self.depth,
        }
    }
}

/// The set of live backends handed to the registry at construction
#[derive(Default)]
pub struct Backends {
    pub webcam: Vec<Arc<dyn WebcamBackend>>,
    pub tethered: Option<Arc<dyn TetheredBackend>>,
    pub depth: Option<Arc<dyn DepthBackend>>,
}

impl Backends {
    /// Compiled-in native backends plus the env-enabled virtual camera
    /// (`VIRTUAL_CAMERA=1`)
    pub fn detect() -> Self {
        let mut backends = Self::default();

        if env_flag("VIRTUAL_CAMERA") {
            info!("virtual camera backend enabled");
            backends.webcam.push(Arc::new(virtual_cam::VirtualWebcamBackend));
        }

        #[cfg(feature = "v4l")]
        backends.webcam.push(Arc::new(uvc::UvcBackend));
        #[cfg(feature = "gphoto2")]
        {
            backends.tethered = Some(Arc::new(ptp::PtpBackend));
        }
        #[cfg(feature = "realsense")]
        {
            backends.depth = Some(Arc::new(realsense::RealSenseBackend));
        }

        backends
    }

    pub fn availability(&self) -> BackendAvailability {
        BackendAvailability {
            webcam: !self.webcam.is_empty(),
            tethered: self.tethered.is_some(),
            depth: self.depth.is_some(),
        }
    }

    pub fn with_webcam(mut self, backend: Arc<dyn WebcamBackend>) -> Self {
        self.webcam.push(backend);
        self
    }

    pub fn with_tethered(mut self, backend: Arc<dyn TetheredBackend>) -> Self {
        self.tethered = Some(backend);
        self
    }

    pub fn with_depth(mut self, backend: Arc<dyn DepthBackend>) -> Self {
        self.depth = Some(backend);
        self
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
