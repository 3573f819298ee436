//! Tethered PTP still camera: command/response control over USB
//!
//! The body shoots to its own sensor pipeline; we trigger the shutter,
//! pull the produced file object and save it locally. Settings go through
//! the vendor config-node tree via the canonical-name resolver.

use super::{write_capture_bytes, DeviceCore};
use crate::backend::{TetheredBackend, TetheredHandle};
use crate::error::CameraError;
use crate::nodes;
use crate::profile::ConfigProfile;
use crate::types::{merge_settings, CaptureOptions, CaptureResult, HardwareFacts, SettingsMap};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);
const PREVIEW_TIMEOUT: Duration = Duration::from_secs(2);
/// The first live-view frames after connect are commonly rejected while
/// the body settles, so single-frame reads retry a bounded handful.
const PREVIEW_ATTEMPTS: u32 = 5;
const PREVIEW_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Node name/value pairs tried in sequence to switch a body into
/// live-view mode. Not every model exposes any of these.
const LIVE_VIEW_NODES: &[(&str, &str)] = &[
    ("viewfinder", "1"),
    ("liveview", "1"),
    ("eosviewfinder", "1"),
    ("evfmode", "1"),
    ("output", "PC"),
];

/// Settings keys consumed by the capture path itself, never pushed to the
/// camera's config tree.
const NON_NODE_KEYS: &[&str] = &["jpeg_quality", "preview_quality"];

pub struct TetheredDevice {
    core: DeviceCore,
    facts: HardwareFacts,
    backend: Arc<dyn TetheredBackend>,
    handle: Option<Box<dyn TetheredHandle>>,
}

impl TetheredDevice {
    pub fn new(
        facts: HardwareFacts,
        profile: &ConfigProfile,
        backend: Arc<dyn TetheredBackend>,
    ) -> Self {
        let mut core = DeviceCore::from_profile(&facts, profile);
        // vendor node values ride along with the canonical settings; both
        // are applied through the resolver on connect
        merge_settings(&mut core.settings, &profile.advanced);
        Self {
            core,
            facts,
            backend,
            handle: None,
        }
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    pub fn connect(&mut self) -> Result<(), CameraError> {
        if self.handle.is_some() {
            return Ok(());
        }
        let mut handle = match self.backend.open(&self.facts) {
            Ok(handle) => handle,
            Err(e) => {
                let err = CameraError::Connect(e.cause());
                self.core.record_error(&err);
                error!(device_id = %self.core.id, error = %err, "tethered connect failed");
                return Err(err);
            }
        };

        // best-effort live view; silently continue, not all bodies support it
        for (node, value) in LIVE_VIEW_NODES {
            match handle.set_node(node, &Value::String((*value).to_string())) {
                Ok(()) => {
                    debug!(device_id = %self.core.id, node = %node, "live view enabled");
                    break;
                }
                Err(_) => continue,
            }
        }

        apply_node_settings(handle.as_mut(), &self.core.settings, &self.core.id);

        self.handle = Some(handle);
        self.core.connected = true;
        self.core.last_error = None;
        info!(device_id = %self.core.id, backend = self.backend.name(), "tethered camera connected");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), CameraError> {
        if self.handle.take().is_some() {
            info!(device_id = %self.core.id, "tethered camera disconnected");
        }
        self.core.connected = false;
        Ok(())
    }

    pub fn capture(
        &mut self,
        photos_dir: &Path,
        options: &CaptureOptions,
    ) -> Result<CaptureResult, CameraError> {
        let device_id = self.core.id.clone();
        let handle = self.handle.as_mut().ok_or(CameraError::NotConnected)?;
        if !options.overrides.is_empty() {
            // per-call overrides reach the body before the shutter fires
            apply_node_settings(handle.as_mut(), &options.overrides, &device_id);
        }
        let file = handle.trigger_capture(CAPTURE_TIMEOUT).map_err(|e| {
            let err = CameraError::Capture(e.cause());
            error!(device_id = %device_id, error = %err, "shutter release failed");
            err
        })?;
        write_capture_bytes(photos_dir, &file.data, &file.file_name, options)
    }

    pub fn preview_frame(&mut self) -> Result<Vec<u8>, CameraError> {
        let device_id = self.core.id.clone();
        let handle = self.handle.as_mut().ok_or(CameraError::NotConnected)?;
        let mut last: Option<CameraError> = None;
        for attempt in 1..=PREVIEW_ATTEMPTS {
            match handle.preview_frame(PREVIEW_TIMEOUT) {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    debug!(device_id = %device_id, attempt, error = %e, "preview frame not ready");
                    last = Some(e);
                    std::thread::sleep(PREVIEW_RETRY_DELAY);
                }
            }
        }
        Err(CameraError::Preview(
            last.map(|e| e.cause())
                .unwrap_or_else(|| "no preview frame".to_string()),
        ))
    }

    pub fn update_settings(&mut self, patch: &SettingsMap) -> Result<(), CameraError> {
        merge_settings(&mut self.core.settings, patch);
        let device_id = self.core.id.clone();
        if let Some(handle) = self.handle.as_mut() {
            apply_node_settings(handle.as_mut(), patch, &device_id);
        }
        Ok(())
    }
}

/// Push settings into the vendor tree, each key independently: an
/// unresolvable or rejected key is logged and skipped, never fatal.
fn apply_node_settings(handle: &mut dyn TetheredHandle, entries: &SettingsMap, device_id: &str) {
    if entries.keys().all(|k| NON_NODE_KEYS.contains(&k.as_str())) {
        return;
    }
    let tree = match handle.settings_tree() {
        Ok(tree) => tree,
        Err(e) => {
            warn!(device_id = %device_id, error = %e, "settings tree unavailable");
            return;
        }
    };
    for (key, value) in entries {
        if NON_NODE_KEYS.contains(&key.as_str()) {
            continue;
        }
        match nodes::resolve(&tree, key) {
            Some(node) => {
                if node.read_only {
                    warn!(device_id = %device_id, key = %key, node = %node.name, "config node is read-only");
                    continue;
                }
                match handle.set_node(&node.name, value) {
                    Ok(()) => debug!(device_id = %device_id, key = %key, node = %node.name, "config node set"),
                    Err(e) => {
                        warn!(device_id = %device_id, key = %key, node = %node.name, error = %e, "failed to set config node")
                    }
                }
            }
            None => warn!(device_id = %device_id, key = %key, "no config node for setting"),
        }
    }
}
