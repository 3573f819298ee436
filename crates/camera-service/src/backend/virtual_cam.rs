//! Synthetic webcam backend
//!
//! Generates test-pattern frames entirely in software. Ships as the demo
//! mode for hosts without camera hardware and keeps the full capture
//! pipeline exercisable in CI.

use super::{FrameConfig, FrameSession, RawFrame, WebcamBackend};
use crate::error::CameraError;
use crate::types::{DeviceKind, HardwareFacts};
use std::time::Duration;

pub const VIRTUAL_VENDOR: &str = "Shutterbox";
pub const VIRTUAL_MODEL: &str = "Virtual Camera";

#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualWebcamBackend;

impl WebcamBackend for VirtualWebcamBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
        Ok(vec![HardwareFacts {
            vendor: VIRTUAL_VENDOR.to_string(),
            model: VIRTUAL_MODEL.to_string(),
            product: VIRTUAL_MODEL.to_string(),
            kind: DeviceKind::Webcam,
            address: "virtual-0".to_string(),
            serial: None,
        }])
    }

    fn open(
        &self,
        _facts: &HardwareFacts,
        config: &FrameConfig,
    ) -> Result<Box<dyn FrameSession>, CameraError> {
        Ok(Box::new(VirtualSession {
            config: *config,
            tick: 0,
        }))
    }
}

struct VirtualSession {
    config: FrameConfig,
    tick: u64,
}

impl FrameSession for VirtualSession {
    fn configure(&mut self, config: &FrameConfig) -> Result<(), CameraError> {
        self.config = *config;
        Ok(())
    }

    fn grab_frame(&mut self, _timeout: Duration) -> Result<RawFrame, CameraError> {
        self.tick = self.tick.wrapping_add(1);
        Ok(test_pattern(self.config.width, self.config.height, self.tick))
    }
}

/// Color ramp with a moving vertical bar so consecutive frames differ and
/// a live preview visibly animates
fn test_pattern(width: u32, height: u32, tick: u64) -> RawFrame {
    let w = width.max(1);
    let h = height.max(1);
    let bar = (tick % u64::from(w)) as u32;
    let mut pixels = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            if x == bar {
                pixels.extend_from_slice(&[255, 255, 255]);
            } else {
                let r = (x * 255 / w) as u8;
                let g = (y * 255 / h) as u8;
                pixels.extend_from_slice(&[r, g, 96]);
            }
        }
    }
    RawFrame {
        width: w,
        height: h,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_configured_dimensions() {
        let backend = VirtualWebcamBackend;
        let facts = backend.enumerate().unwrap().remove(0);
        let config = FrameConfig {
            width: 320,
            height: 240,
            frame_rate: 30,
        };
        let mut session = backend.open(&facts, &config).unwrap();
        let frame = session.grab_frame(Duration::from_secs(1)).unwrap();
        assert_eq!((frame.width, frame.height), (320, 240));
        assert_eq!(frame.pixels.len(), 320 * 240 * 3);
    }

    #[test]
    fn consecutive_frames_differ() {
        let backend = VirtualWebcamBackend;
        let facts = backend.enumerate().unwrap().remove(0);
        let mut session = backend.open(&facts, &FrameConfig::default()).unwrap();
        let a = session.grab_frame(Duration::from_secs(1)).unwrap();
        let b = session.grab_frame(Duration::from_secs(1)).unwrap();
        assert_ne!(a.pixels, b.pixels);
    }

    #[test]
    fn reconfigure_changes_frame_size() {
        let backend = VirtualWebcamBackend;
        let facts = backend.enumerate().unwrap().remove(0);
        let mut session = backend.open(&facts, &FrameConfig::default()).unwrap();
        session
            .configure(&FrameConfig {
                width: 640,
                height: 480,
                frame_rate: 15,
            })
            .unwrap();
        let frame = session.grab_frame(Duration::from_secs(1)).unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
    }
}
