//! Intel RealSense depth-sensor glue
//!
//! Starts a pipeline with a color stream and, when asked, a depth stream.
//! Sensor options go through `set_control` — this hardware class does not
//! expose a gphoto2-style config tree.

use super::{DepthBackend, DepthControl, DepthFrame, DepthPipeline, FrameBundle, RawFrame, StreamConfig};
use crate::error::CameraError;
use crate::types::{DeviceKind, HardwareFacts};
use realsense_rust::config::Config;
use realsense_rust::context::Context;
use realsense_rust::frame::{ColorFrame, DepthFrame as RsDepthFrame, PixelKind};
use realsense_rust::kind::{Rs2CameraInfo, Rs2Format, Rs2Option, Rs2StreamKind};
use realsense_rust::pipeline::{ActivePipeline, InactivePipeline};
use std::collections::HashSet;
use std::ffi::CString;
use std::time::Duration;
use tracing::warn;

#[derive(Default)]
pub struct RealSenseBackend;

impl DepthBackend for RealSenseBackend {
    fn name(&self) -> &'static str {
        "realsense"
    }

    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
        let context = Context::new()
            .map_err(|e| CameraError::BackendUnavailable(format!("realsense context: {e}")))?;
        let mut out = Vec::new();
        for device in context.query_devices(HashSet::new()) {
            let name = info_string(&device, Rs2CameraInfo::Name);
            let serial = info_string(&device, Rs2CameraInfo::SerialNumber);
            out.push(HardwareFacts {
                vendor: "Intel".to_string(),
                model: name.clone(),
                product: name,
                kind: DeviceKind::DepthSensor,
                address: serial.clone(),
                serial: Some(serial),
            });
        }
        Ok(out)
    }

    fn start(
        &self,
        facts: &HardwareFacts,
        config: &StreamConfig,
    ) -> Result<Box<dyn DepthPipeline>, CameraError> {
        let context = Context::new()
            .map_err(|e| CameraError::BackendUnavailable(format!("realsense context: {e}")))?;
        let serial = CString::new(facts.address.clone())
            .map_err(|_| CameraError::Connect("serial contains NUL".to_string()))?;

        let mut rs_config = Config::new();
        rs_config
            .enable_device_from_serial(&serial)
            .map_err(|e| CameraError::Connect(format!("select device: {e}")))?;
        rs_config
            .enable_stream(
                Rs2StreamKind::Color,
                None,
                config.width as usize,
                config.height as usize,
                Rs2Format::Rgb8,
                config.frame_rate as usize,
            )
            .map_err(|e| CameraError::Connect(format!("enable color stream: {e}")))?;
        if config.enable_depth {
            rs_config
                .enable_stream(
                    Rs2StreamKind::Depth,
                    None,
                    config.width as usize,
                    config.height as usize,
                    Rs2Format::Z16,
                    config.frame_rate as usize,
                )
                .map_err(|e| CameraError::Connect(format!("enable depth stream: {e}")))?;
        }

        let inactive = InactivePipeline::try_from(&context)
            .map_err(|e| CameraError::Connect(format!("pipeline: {e}")))?;
        let pipeline = inactive
            .start(Some(rs_config))
            .map_err(|e| CameraError::Connect(format!("start pipeline: {e}")))?;

        Ok(Box::new(RealSensePipeline { pipeline }))
    }
}

struct RealSensePipeline {
    pipeline: ActivePipeline,
}

impl DepthPipeline for RealSensePipeline {
    fn wait_frames(&mut self, timeout: Duration) -> Result<FrameBundle, CameraError> {
        let frames = self
            .pipeline
            .wait(Some(timeout))
            .map_err(|e| CameraError::Capture(format!("frame wait: {e}")))?;

        let color_frames: Vec<ColorFrame> = frames.frames_of_type();
        let color_frame = color_frames
            .first()
            .ok_or_else(|| CameraError::Capture("bundle carries no color frame".to_string()))?;
        let color = color_to_raw(color_frame)?;

        let depth_frames: Vec<RsDepthFrame> = frames.frames_of_type();
        let depth = depth_frames.first().map(depth_to_raw);

        Ok(FrameBundle { color, depth })
    }

    fn set_control(&mut self, control: DepthControl, value: f64) -> Result<(), CameraError> {
        let option = match control {
            DepthControl::EmitterEnabled => Rs2Option::EmitterEnabled,
            DepthControl::LaserPower => Rs2Option::LaserPower,
            DepthControl::DepthUnits => Rs2Option::DepthUnits,
        };
        let mut applied = false;
        for mut sensor in self.pipeline.profile().device().sensors() {
            if !sensor.supports_option(option) {
                continue;
            }
            sensor
                .set_option(option, value as f32)
                .map_err(|e| CameraError::Settings(format!("{option:?}: {e}")))?;
            applied = true;
        }
        if !applied {
            warn!(?option, "no sensor supports this control");
        }
        Ok(())
    }
}

fn color_to_raw(frame: &ColorFrame) -> Result<RawFrame, CameraError> {
    let width = frame.width() as u32;
    let height = frame.height() as u32;
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for pixel in frame.iter() {
        match pixel {
            PixelKind::Rgb8 { r, g, b } => pixels.extend_from_slice(&[*r, *g, *b]),
            PixelKind::Bgr8 { b, g, r } => pixels.extend_from_slice(&[*r, *g, *b]),
            _ => {
                return Err(CameraError::Capture(
                    "unexpected color pixel format".to_string(),
                ))
            }
        }
    }
    Ok(RawFrame {
        width,
        height,
        pixels,
    })
}

fn depth_to_raw(frame: &RsDepthFrame) -> DepthFrame {
    let width = frame.width() as u32;
    let height = frame.height() as u32;
    let mut data = Vec::with_capacity((width * height) as usize);
    for pixel in frame.iter() {
        if let PixelKind::Z16 { depth } = pixel {
            data.push(*depth);
        }
    }
    DepthFrame {
        width,
        height,
        data,
        depth_units: frame.depth_units().unwrap_or(0.001),
    }
}

fn info_string(device: &realsense_rust::device::Device, info: Rs2CameraInfo) -> String {
    device
        .info(info)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
