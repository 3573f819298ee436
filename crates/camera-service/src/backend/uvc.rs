//! V4L2 webcam glue (Linux)
//!
//! Frames are requested as MJPG and decoded to RGB here so the device
//! layer only ever sees raw frames.

use super::{FrameConfig, FrameSession, RawFrame, WebcamBackend};
use crate::error::CameraError;
use crate::types::{DeviceKind, HardwareFacts};
use std::time::Duration;
use tracing::warn;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Debug, Default)]
pub struct UvcBackend;

impl WebcamBackend for UvcBackend {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
        let mut out = Vec::new();
        for node in v4l::context::enum_devices() {
            let index = node.index();
            let dev = match Device::new(index) {
                Ok(dev) => dev,
                Err(e) => {
                    warn!(index, error = %e, "cannot open video node, skipping");
                    continue;
                }
            };
            let caps = match dev.query_caps() {
                Ok(caps) => caps,
                Err(e) => {
                    warn!(index, error = %e, "cannot query caps, skipping");
                    continue;
                }
            };
            out.push(HardwareFacts {
                vendor: caps.driver.clone(),
                model: caps.card.clone(),
                product: caps.card.clone(),
                kind: DeviceKind::Webcam,
                address: format!("video{index}"),
                serial: None,
            });
        }
        Ok(out)
    }

    fn open(
        &self,
        facts: &HardwareFacts,
        config: &FrameConfig,
    ) -> Result<Box<dyn FrameSession>, CameraError> {
        let index: usize = facts
            .address
            .trim_start_matches("video")
            .parse()
            .map_err(|_| CameraError::Connect(format!("bad v4l2 address {}", facts.address)))?;
        let dev = Device::new(index)
            .map_err(|e| CameraError::Connect(format!("open /dev/video{index}: {e}")))?;
        let mut session = UvcSession { dev };
        session.configure(config)?;
        Ok(Box::new(session))
    }
}

struct UvcSession {
    dev: Device,
}

impl FrameSession for UvcSession {
    fn configure(&mut self, config: &FrameConfig) -> Result<(), CameraError> {
        let mut fmt = self
            .dev
            .format()
            .map_err(|e| CameraError::Settings(format!("query format: {e}")))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(b"MJPG");
        self.dev
            .set_format(&fmt)
            .map_err(|e| CameraError::Settings(format!("set format: {e}")))?;
        let params = v4l::video::capture::Parameters::with_fps(config.frame_rate);
        self.dev
            .set_params(&params)
            .map_err(|e| CameraError::Settings(format!("set frame rate: {e}")))?;
        Ok(())
    }

    fn grab_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CameraError> {
        // one-shot mmap stream; the driver's own read timeout bounds this
        let mut stream = MmapStream::with_buffers(&self.dev, Type::VideoCapture, 2)
            .map_err(|e| CameraError::Capture(format!("mmap stream: {e}")))?;
        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::Capture(format!("frame read: {e}")))?;
        let img = common::imaging::decode(buf)
            .map_err(|e| CameraError::Capture(format!("mjpeg decode: {e}")))?;
        Ok(RawFrame {
            width: img.width(),
            height: img.height(),
            pixels: img.into_raw(),
        })
    }
}
