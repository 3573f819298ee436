//! Named device-configuration profiles and their detection rules

use crate::types::{DeviceKind, SettingsMap};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Webcam,
    TetheredPtp,
    TetheredMirrorless,
    DepthSensor,
}

impl ProfileType {
    /// The hardware class a profile of this type binds to
    pub fn device_kind(self) -> DeviceKind {
        match self {
            Self::Webcam => DeviceKind::Webcam,
            Self::TetheredPtp | Self::TetheredMirrorless => DeviceKind::Tethered,
            Self::DepthSensor => DeviceKind::DepthSensor,
        }
    }
}

/// Wildcard marker accepted at the end of a `brand_model` pattern
pub const MODEL_WILDCARD: char = '*';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DetectionRule {
    /// Case-insensitive substring containment of both fields
    VendorProduct { vendor: String, product: String },
    /// Brand containment in the vendor string; model pattern with an
    /// optional trailing `*` matched against the model string
    BrandModel { brand: String, model_pattern: String },
    /// Always matches; evaluated after every non-auto rule
    Auto,
}

impl DetectionRule {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Detection rule plus its explicit evaluation priority.
///
/// Higher priorities are evaluated first; `auto` rules sort after
/// non-`auto` rules of equal priority, and listed order breaks any
/// remaining tie. Matching never depends on list order alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub rule: DetectionRule,
    #[serde(default)]
    pub priority: i32,
}

impl Detection {
    pub fn auto() -> Self {
        Self {
            rule: DetectionRule::Auto,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub profile_type: ProfileType,
    #[serde(default = "Detection::auto")]
    pub detection: Detection,
    #[serde(default)]
    pub settings: SettingsMap,
    /// Vendor-specific parameters: config-node values for tethered
    /// bodies, sensor controls for depth cameras
    #[serde(default)]
    pub advanced: SettingsMap,
}

impl ConfigProfile {
    /// Synthesized defaults used when no authored profile matches a unit
    pub fn builtin_default(kind: DeviceKind) -> Self {
        let (id, name, profile_type, settings) = match kind {
            DeviceKind::Webcam => (
                "builtin-webcam",
                "Default webcam",
                ProfileType::Webcam,
                default_webcam_settings(),
            ),
            DeviceKind::Tethered => (
                "builtin-tethered",
                "Default tethered camera",
                ProfileType::TetheredPtp,
                default_tethered_settings(),
            ),
            DeviceKind::DepthSensor => (
                "builtin-depth-sensor",
                "Default depth sensor",
                ProfileType::DepthSensor,
                default_depth_settings(),
            ),
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            profile_type,
            detection: Detection::auto(),
            settings,
            advanced: SettingsMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub profile_type: ProfileType,
    pub active: bool,
}

pub fn default_webcam_settings() -> SettingsMap {
    SettingsMap::from([
        ("resolution_width".to_string(), json!(1280)),
        ("resolution_height".to_string(), json!(720)),
        ("frame_rate".to_string(), json!(30)),
        ("jpeg_quality".to_string(), json!(92)),
        ("preview_quality".to_string(), json!(70)),
    ])
}

pub fn default_tethered_settings() -> SettingsMap {
    SettingsMap::from([
        ("jpeg_quality".to_string(), json!(95)),
        ("preview_quality".to_string(), json!(70)),
    ])
}

pub fn default_depth_settings() -> SettingsMap {
    SettingsMap::from([
        ("resolution_width".to_string(), json!(1280)),
        ("resolution_height".to_string(), json!(720)),
        ("frame_rate".to_string(), json!(30)),
        ("depth_enabled".to_string(), json!(false)),
        ("jpeg_quality".to_string(), json!(92)),
        ("preview_quality".to_string(), json!(70)),
    ])
}

/// Default settings for the device kind a profile binds to
pub fn default_settings_for(kind: DeviceKind) -> SettingsMap {
    match kind {
        DeviceKind::Webcam => default_webcam_settings(),
        DeviceKind::Tethered => default_tethered_settings(),
        DeviceKind::DepthSensor => default_depth_settings(),
    }
}
