use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Free-form settings bag. Keys are canonical setting names; values keep
/// their JSON shape so profiles can carry vendor-specific payloads.
pub type SettingsMap = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Webcam,
    Tethered,
    DepthSensor,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webcam => "webcam",
            Self::Tethered => "tethered",
            Self::DepthSensor => "depth-sensor",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw identification facts for one discovered unit. Rebuilt on every
/// enumeration pass and compared by content only, never by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareFacts {
    pub vendor: String,
    pub model: String,
    pub product: String,
    pub kind: DeviceKind,
    /// Backend-specific bus address or device index
    pub address: String,
    pub serial: Option<String>,
}

impl HardwareFacts {
    /// Device id, stable for one process lifetime: kind plus serial
    /// (preferred) or bus address.
    pub fn device_id(&self) -> String {
        let tail = self
            .serial
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.address);
        format!("{}-{}", self.kind.as_str(), common::validation::slugify(tail))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub connected: bool,
    pub settings: SettingsMap,
}

fn default_true() -> bool {
    true
}

/// Per-call capture parameters. `overrides` is overlaid on the device
/// settings for this capture only and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOptions {
    #[serde(default)]
    pub filename_prefix: Option<String>,
    /// Produce a 320x240-bounded thumbnail next to the capture
    #[serde(default = "default_true")]
    pub thumbnail: bool,
    #[serde(default)]
    pub overrides: SettingsMap,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            filename_prefix: None,
            thumbnail: true,
            overrides: SettingsMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    pub filepath: PathBuf,
    pub filename: String,
    pub thumbnail_path: Option<PathBuf>,
}

pub fn merge_settings(base: &mut SettingsMap, patch: &SettingsMap) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Merged copy of `base` with `patch` overlaid, leaving `base` untouched
pub fn overlay(base: &SettingsMap, patch: &SettingsMap) -> SettingsMap {
    let mut merged = base.clone();
    merge_settings(&mut merged, patch);
    merged
}

pub fn u32_setting(map: &SettingsMap, key: &str, default: u32) -> u32 {
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

pub fn bool_setting(map: &SettingsMap, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn f64_setting(map: &SettingsMap, key: &str, default: f64) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(serial: Option<&str>) -> HardwareFacts {
        HardwareFacts {
            vendor: "Logitech".into(),
            model: "C920".into(),
            product: "HD Pro Webcam C920".into(),
            kind: DeviceKind::Webcam,
            address: "video0".into(),
            serial: serial.map(String::from),
        }
    }

    #[test]
    fn device_id_prefers_serial() {
        assert_eq!(facts(Some("ABC 123")).device_id(), "webcam-abc-123");
        assert_eq!(facts(None).device_id(), "webcam-video0");
        assert_eq!(facts(Some("  ")).device_id(), "webcam-video0");
    }

    #[test]
    fn overlay_leaves_base_untouched() {
        let mut base = SettingsMap::new();
        base.insert("jpeg_quality".into(), json!(92));
        let mut patch = SettingsMap::new();
        patch.insert("jpeg_quality".into(), json!(70));
        patch.insert("frame_rate".into(), json!(15));

        let merged = overlay(&base, &patch);
        assert_eq!(u32_setting(&merged, "jpeg_quality", 0), 70);
        assert_eq!(u32_setting(&merged, "frame_rate", 0), 15);
        assert_eq!(u32_setting(&base, "jpeg_quality", 0), 92);
        assert!(!base.contains_key("frame_rate"));
    }

    #[test]
    fn setting_helpers_fall_back_on_wrong_type() {
        let mut map = SettingsMap::new();
        map.insert("frame_rate".into(), json!("fast"));
        assert_eq!(u32_setting(&map, "frame_rate", 30), 30);
        assert!(bool_setting(&map, "missing", true));
    }
}
