//! Device table, active slot, and the outward operation surface
//!
//! All registry state is owned here and mutated only through these
//! methods, behind one async mutex — no two operations ever race against
//! the same native handle. Enumeration rebuilds the device table
//! wholesale; handles of replaced devices are released as they drop.

use crate::backend::{BackendAvailability, Backends};
use crate::device::{CaptureDevice, DepthSensorDevice, TetheredDevice, WebcamDevice};
use crate::error::CameraError;
use crate::matcher;
use crate::preview::{self, PreviewStream};
use crate::profile::ConfigProfile;
use crate::store::ProfileStore;
use crate::types::{CaptureOptions, CaptureResult, DeviceSummary, HardwareFacts, SettingsMap};
use common::paths::AppPaths;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct DeviceRegistry {
    backends: Backends,
    availability: BackendAvailability,
    profiles: Arc<ProfileStore>,
    paths: Arc<AppPaths>,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<String, CaptureDevice>,
    active: Option<String>,
    preview_cancel: Option<CancellationToken>,
}

impl DeviceRegistry {
    pub fn new(backends: Backends, profiles: Arc<ProfileStore>, paths: Arc<AppPaths>) -> Self {
        let availability = backends.availability();
        info!(
            webcam = availability.webcam,
            tethered = availability.tethered,
            depth = availability.depth,
            "backend availability recorded"
        );
        Self {
            backends,
            availability,
            profiles,
            paths,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn availability(&self) -> BackendAvailability {
        self.availability
    }

    /// Discover hardware across every available backend and rebuild the
    /// device table from scratch. Never auto-connects; clears the active
    /// slot because replaced devices start disconnected.
    pub async fn enumerate(&self) -> Vec<DeviceSummary> {
        let candidates = self.profiles.candidates().await;
        let active_profile = self.profiles.get_active().await;

        let mut devices: HashMap<String, CaptureDevice> = HashMap::new();

        // one backend failing during discovery must not hide the others
        for backend in &self.backends.webcam {
            match backend.enumerate() {
                Ok(found) => {
                    for facts in found {
                        let profile =
                            self.resolve_profile(&facts, &candidates, active_profile.as_ref());
                        let device = CaptureDevice::Webcam(WebcamDevice::new(
                            facts,
                            &profile,
                            Arc::clone(backend),
                        ));
                        devices.insert(device.id().to_string(), device);
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "webcam enumeration failed")
                }
            }
        }
        if let Some(backend) = &self.backends.tethered {
            match backend.enumerate() {
                Ok(found) => {
                    for facts in found {
                        let profile =
                            self.resolve_profile(&facts, &candidates, active_profile.as_ref());
                        let device = CaptureDevice::Tethered(TetheredDevice::new(
                            facts,
                            &profile,
                            Arc::clone(backend),
                        ));
                        devices.insert(device.id().to_string(), device);
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "tethered enumeration failed")
                }
            }
        }
        if let Some(backend) = &self.backends.depth {
            match backend.enumerate() {
                Ok(found) => {
                    for facts in found {
                        let profile =
                            self.resolve_profile(&facts, &candidates, active_profile.as_ref());
                        let device = CaptureDevice::DepthSensor(DepthSensorDevice::new(
                            facts,
                            &profile,
                            Arc::clone(backend),
                        ));
                        devices.insert(device.id().to_string(), device);
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "depth enumeration failed")
                }
            }
        }

        let mut inner = self.inner.lock().await;
        self.stop_preview(&mut inner);
        inner.active = None;
        let old = std::mem::replace(&mut inner.devices, devices);
        for (id, mut device) in old {
            if device.is_connected() {
                if let Err(e) = device.disconnect() {
                    warn!(device_id = %id, error = %e, "failed to release replaced device");
                }
            }
        }

        let mut summaries: Vec<DeviceSummary> =
            inner.devices.values().map(CaptureDevice::to_summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        info!(count = summaries.len(), "device table rebuilt");
        summaries
    }

    fn resolve_profile(
        &self,
        facts: &HardwareFacts,
        candidates: &[ConfigProfile],
        active: Option<&ConfigProfile>,
    ) -> ConfigProfile {
        if let Some(profile) = matcher::match_profile(facts, candidates, &self.availability) {
            return profile.clone();
        }
        if let Some(profile) = active {
            if profile.profile_type.device_kind() == facts.kind {
                debug!(profile_id = %profile.id, device = %facts.model, "falling back to active profile");
                return profile.clone();
            }
        }
        ConfigProfile::builtin_default(facts.kind)
    }

    /// Connect a device and make it the active one. Only one device is
    /// active at a time; connecting another overwrites the pointer but
    /// deliberately leaves the previous device connected.
    pub async fn connect(&self, id: &str) -> Result<DeviceSummary, CameraError> {
        let mut inner = self.inner.lock().await;
        let device = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| CameraError::NotFound(format!("device {id}")))?;
        device.connect()?;
        let summary = device.to_summary();
        inner.active = Some(id.to_string());
        info!(device_id = %id, "device is now active");
        Ok(summary)
    }

    /// Disconnect a device (the active one when `id` is `None`). If the
    /// target was active the pointer is cleared and any running preview
    /// loop is stopped.
    pub async fn disconnect(&self, id: Option<&str>) -> Result<DeviceSummary, CameraError> {
        let mut inner = self.inner.lock().await;
        let target = match id {
            Some(id) => id.to_string(),
            None => inner.active.clone().ok_or(CameraError::NoActiveDevice)?,
        };
        let device = inner
            .devices
            .get_mut(&target)
            .ok_or_else(|| CameraError::NotFound(format!("device {target}")))?;
        device.disconnect()?;
        let summary = device.to_summary();
        if inner.active.as_deref() == Some(target.as_str()) {
            inner.active = None;
            self.stop_preview(&mut inner);
        }
        Ok(summary)
    }

    pub async fn capture(&self, options: &CaptureOptions) -> Result<CaptureResult, CameraError> {
        let photos_dir = self.paths.photos_dir().to_path_buf();
        let mut inner = self.inner.lock().await;
        let device = active_device(&mut inner)?;
        device.capture(&photos_dir, options)
    }

    pub async fn preview_frame(&self) -> Result<Vec<u8>, CameraError> {
        let mut inner = self.inner.lock().await;
        let device = active_device(&mut inner)?;
        device.preview_frame()
    }

    pub async fn update_settings(&self, patch: &SettingsMap) -> Result<(), CameraError> {
        let mut inner = self.inner.lock().await;
        let device = active_device(&mut inner)?;
        device.update_settings(patch)
    }

    pub async fn get_settings(&self) -> Result<SettingsMap, CameraError> {
        let mut inner = self.inner.lock().await;
        let device = active_device(&mut inner)?;
        Ok(device.core().settings.clone())
    }

    pub async fn summaries(&self) -> Vec<DeviceSummary> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<DeviceSummary> =
            inner.devices.values().map(CaptureDevice::to_summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub async fn active_device_id(&self) -> Option<String> {
        self.inner.lock().await.active.clone()
    }

    /// Start (or restart) the continuous preview producer for the active
    /// device. The loop retries transient frame errors with a short
    /// backoff and stops promptly on cancellation or when the consumer
    /// goes away.
    pub async fn start_preview_stream(self: Arc<Self>) -> Result<PreviewStream, CameraError> {
        let token = CancellationToken::new();
        {
            let mut inner = self.inner.lock().await;
            if inner.active.is_none() {
                return Err(CameraError::NoActiveDevice);
            }
            self.stop_preview(&mut inner);
            inner.preview_cancel = Some(token.clone());
        }
        let (tx, rx) = mpsc::channel(preview::CHANNEL_DEPTH);
        let loop_token = token.clone();
        tokio::spawn(async move {
            preview::run_preview_loop(self, tx, loop_token).await;
        });
        Ok(PreviewStream::new(rx, token))
    }

    fn stop_preview(&self, inner: &mut RegistryInner) {
        if let Some(token) = inner.preview_cancel.take() {
            token.cancel();
            info!("preview stream cancelled");
        }
    }
}

fn active_device(inner: &mut RegistryInner) -> Result<&mut CaptureDevice, CameraError> {
    let id = inner.active.clone().ok_or(CameraError::NoActiveDevice)?;
    inner.devices.get_mut(&id).ok_or(CameraError::NoActiveDevice)
}
