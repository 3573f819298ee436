//! USB webcam device: a frame-grabbing session per connection

use super::{write_capture_image, DeviceCore};
use crate::backend::{FrameConfig, FrameSession, WebcamBackend};
use crate::error::CameraError;
use crate::profile::ConfigProfile;
use crate::types::{
    merge_settings, overlay, u32_setting, CaptureOptions, CaptureResult, HardwareFacts,
    SettingsMap,
};
use common::imaging;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

pub struct WebcamDevice {
    core: DeviceCore,
    facts: HardwareFacts,
    backend: Arc<dyn WebcamBackend>,
    session: Option<Box<dyn FrameSession>>,
}

impl WebcamDevice {
    pub fn new(
        facts: HardwareFacts,
        profile: &ConfigProfile,
        backend: Arc<dyn WebcamBackend>,
    ) -> Self {
        Self {
            core: DeviceCore::from_profile(&facts, profile),
            facts,
            backend,
            session: None,
        }
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            width: u32_setting(&self.core.settings, "resolution_width", 1280),
            height: u32_setting(&self.core.settings, "resolution_height", 720),
            frame_rate: u32_setting(&self.core.settings, "frame_rate", 30),
        }
    }

    pub fn connect(&mut self) -> Result<(), CameraError> {
        if self.session.is_some() {
            return Ok(());
        }
        match self.backend.open(&self.facts, &self.frame_config()) {
            Ok(session) => {
                self.session = Some(session);
                self.core.connected = true;
                self.core.last_error = None;
                info!(device_id = %self.core.id, backend = self.backend.name(), "webcam connected");
                Ok(())
            }
            Err(e) => {
                let err = CameraError::Connect(e.cause());
                self.core.record_error(&err);
                error!(device_id = %self.core.id, error = %err, "webcam connect failed");
                Err(err)
            }
        }
    }

    pub fn disconnect(&mut self) -> Result<(), CameraError> {
        if self.session.take().is_some() {
            info!(device_id = %self.core.id, "webcam disconnected");
        }
        self.core.connected = false;
        Ok(())
    }

    pub fn capture(
        &mut self,
        photos_dir: &Path,
        options: &CaptureOptions,
    ) -> Result<CaptureResult, CameraError> {
        let settings = overlay(&self.core.settings, &options.overrides);
        let session = self.session.as_mut().ok_or(CameraError::NotConnected)?;
        let frame = session
            .grab_frame(FRAME_TIMEOUT)
            .map_err(|e| CameraError::Capture(e.cause()))?;
        let img = imaging::from_raw_rgb(frame.width, frame.height, frame.pixels)
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let quality = u32_setting(&settings, "jpeg_quality", 92).min(100) as u8;
        write_capture_image(photos_dir, &img, options, quality)
    }

    pub fn preview_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        let quality = u32_setting(&self.core.settings, "preview_quality", 70).min(100) as u8;
        let session = self.session.as_mut().ok_or(CameraError::NotConnected)?;
        let frame = session
            .grab_frame(FRAME_TIMEOUT)
            .map_err(|e| CameraError::Preview(e.cause()))?;
        let img = imaging::from_raw_rgb(frame.width, frame.height, frame.pixels)
            .map_err(|e| CameraError::Preview(e.to_string()))?;
        imaging::encode_jpeg(&img, quality).map_err(|e| CameraError::Preview(e.to_string()))
    }

    pub fn update_settings(&mut self, patch: &SettingsMap) -> Result<(), CameraError> {
        merge_settings(&mut self.core.settings, patch);
        let config = self.frame_config();
        if let Some(session) = self.session.as_mut() {
            session
                .configure(&config)
                .map_err(|e| CameraError::Settings(e.cause()))?;
            info!(device_id = %self.core.id, width = config.width, height = config.height, "frame config reapplied");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::virtual_cam::VirtualWebcamBackend;
    use crate::types::DeviceKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn virtual_facts() -> HardwareFacts {
        HardwareFacts {
            vendor: "Shutterbox".into(),
            model: "Virtual Camera".into(),
            product: "Virtual Camera".into(),
            kind: DeviceKind::Webcam,
            address: "virtual-0".into(),
            serial: None,
        }
    }

    fn device_with(backend: Arc<dyn WebcamBackend>) -> WebcamDevice {
        let profile = ConfigProfile::builtin_default(DeviceKind::Webcam);
        WebcamDevice::new(virtual_facts(), &profile, backend)
    }

    /// Counts native opens so handle-leak behavior is observable
    struct CountingBackend {
        inner: VirtualWebcamBackend,
        opens: AtomicUsize,
    }

    impl WebcamBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
            self.inner.enumerate()
        }
        fn open(
            &self,
            facts: &HardwareFacts,
            config: &FrameConfig,
        ) -> Result<Box<dyn FrameSession>, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(facts, config)
        }
    }

    #[test]
    fn connect_is_idempotent_and_opens_one_handle() {
        let backend = Arc::new(CountingBackend {
            inner: VirtualWebcamBackend,
            opens: AtomicUsize::new(0),
        });
        let mut device = device_with(backend.clone());
        device.connect().unwrap();
        device.connect().unwrap();
        assert!(device.core().connected);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capture_requires_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        let err = device
            .capture(dir.path(), &CaptureOptions::default())
            .unwrap_err();
        assert!(matches!(err, CameraError::NotConnected));
    }

    #[test]
    fn capture_writes_file_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        device.connect().unwrap();
        let result = device
            .capture(dir.path(), &CaptureOptions::default())
            .unwrap();
        assert!(result.filepath.is_file());
        let thumb = result.thumbnail_path.unwrap();
        assert!(thumb.is_file());

        let img = common::imaging::decode(&std::fs::read(&result.filepath).unwrap()).unwrap();
        assert_eq!(img.dimensions(), (1280, 720));
        let thumb_img = common::imaging::decode(&std::fs::read(&thumb).unwrap()).unwrap();
        assert!(thumb_img.width() <= 320 && thumb_img.height() <= 240);
    }

    #[test]
    fn capture_overrides_do_not_mutate_stored_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        device.connect().unwrap();
        let options = CaptureOptions {
            overrides: SettingsMap::from([("jpeg_quality".to_string(), json!(10))]),
            ..Default::default()
        };
        device.capture(dir.path(), &options).unwrap();
        assert_eq!(u32_setting(&device.core().settings, "jpeg_quality", 0), 92);
    }

    #[test]
    fn preview_returns_jpeg_bytes() {
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        device.connect().unwrap();
        let frame = device.preview_frame().unwrap();
        assert_eq!(&frame[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn update_settings_reconfigures_live_session() {
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        device.connect().unwrap();
        let patch = SettingsMap::from([
            ("resolution_width".to_string(), json!(640)),
            ("resolution_height".to_string(), json!(480)),
        ]);
        device.update_settings(&patch).unwrap();
        let frame = device.preview_frame().unwrap();
        let img = common::imaging::decode(&frame).unwrap();
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut device = device_with(Arc::new(VirtualWebcamBackend));
        device.connect().unwrap();
        device.disconnect().unwrap();
        device.disconnect().unwrap();
        assert!(!device.core().connected);
    }
}
