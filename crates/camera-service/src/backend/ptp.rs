//! libgphoto2 tethered-camera glue
//!
//! Converts the libgphoto2 widget tree into a `SettingsTree` once per
//! settings pass; all name resolution happens in `nodes::resolve`, never
//! here.

use super::{CapturedFile, TetheredBackend, TetheredHandle};
use crate::error::CameraError;
use crate::nodes::{SettingsNode, SettingsTree};
use crate::types::{DeviceKind, HardwareFacts};
use gphoto2::widget::{Widget, WidgetValue};
use gphoto2::{Camera, Context};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

#[derive(Default)]
pub struct PtpBackend;

impl TetheredBackend for PtpBackend {
    fn name(&self) -> &'static str {
        "gphoto2"
    }

    fn enumerate(&self) -> Result<Vec<HardwareFacts>, CameraError> {
        let context = Context::new()
            .map_err(|e| CameraError::BackendUnavailable(format!("gphoto2 context: {e}")))?;
        let mut out = Vec::new();
        let cameras = context
            .list_cameras()
            .wait()
            .map_err(|e| CameraError::Connect(format!("camera autodetect: {e}")))?;
        for descriptor in cameras {
            // "Canon EOS 90D" style model strings; the brand is the first word
            let model = descriptor.model.to_string();
            let vendor = model
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            out.push(HardwareFacts {
                vendor,
                model: model.clone(),
                product: model,
                kind: DeviceKind::Tethered,
                address: descriptor.port.to_string(),
                serial: None,
            });
        }
        Ok(out)
    }

    fn open(&self, facts: &HardwareFacts) -> Result<Box<dyn TetheredHandle>, CameraError> {
        let context = Context::new()
            .map_err(|e| CameraError::BackendUnavailable(format!("gphoto2 context: {e}")))?;
        let cameras = context
            .list_cameras()
            .wait()
            .map_err(|e| CameraError::Connect(format!("camera autodetect: {e}")))?;
        let descriptor = cameras
            .into_iter()
            .find(|d| d.port.to_string() == facts.address)
            .ok_or_else(|| {
                CameraError::Connect(format!("no camera on port {}", facts.address))
            })?;
        let camera = context
            .get_camera(&descriptor)
            .wait()
            .map_err(|e| CameraError::Connect(format!("camera init: {e}")))?;
        Ok(Box::new(PtpHandle { context, camera }))
    }
}

struct PtpHandle {
    context: Context,
    camera: Camera,
}

impl TetheredHandle for PtpHandle {
    fn settings_tree(&mut self) -> Result<SettingsTree, CameraError> {
        let root = self
            .camera
            .config()
            .wait()
            .map_err(|e| CameraError::Settings(format!("read config tree: {e}")))?;
        Ok(SettingsTree {
            root: convert_widget(&root.into()),
        })
    }

    fn set_node(&mut self, node_name: &str, value: &Value) -> Result<(), CameraError> {
        let widget = self
            .camera
            .config_key::<Widget>(node_name)
            .wait()
            .map_err(|e| CameraError::Settings(format!("config node {node_name}: {e}")))?;
        let widget_value = match value {
            Value::Bool(b) => WidgetValue::Toggle(*b),
            Value::Number(n) => WidgetValue::Range(n.as_f64().unwrap_or_default() as f32),
            other => WidgetValue::Text(value_as_text(other)),
        };
        widget
            .set_value(widget_value)
            .map_err(|e| CameraError::Settings(format!("set {node_name}: {e}")))?;
        self.camera
            .set_config(&widget)
            .wait()
            .map_err(|e| CameraError::Settings(format!("apply {node_name}: {e}")))
    }

    fn trigger_capture(&mut self, _timeout: Duration) -> Result<CapturedFile, CameraError> {
        let path = self
            .camera
            .capture_image()
            .wait()
            .map_err(|e| CameraError::Capture(format!("shutter release: {e}")))?;
        let folder = path.folder().to_string();
        let name = path.name().to_string();
        let file = self
            .camera
            .fs()
            .download(&folder, &name)
            .wait()
            .map_err(|e| CameraError::Capture(format!("download {name}: {e}")))?;
        let data = file
            .get_data(&self.context)
            .wait()
            .map_err(|e| CameraError::Capture(format!("read file data: {e}")))?;
        // leave the copy on the card alone; deleting is a user decision
        Ok(CapturedFile {
            file_name: name,
            data: data.into_vec(),
        })
    }

    fn preview_frame(&mut self, _timeout: Duration) -> Result<Vec<u8>, CameraError> {
        let file = self
            .camera
            .capture_preview()
            .wait()
            .map_err(|e| CameraError::Preview(format!("live view frame: {e}")))?;
        let data = file
            .get_data(&self.context)
            .wait()
            .map_err(|e| CameraError::Preview(format!("read frame data: {e}")))?;
        Ok(data.into_vec())
    }
}

fn convert_widget(widget: &Widget) -> SettingsNode {
    let mut node = SettingsNode {
        name: widget.name().to_string(),
        label: Some(widget.label().to_string()),
        value: widget_value_json(widget),
        read_only: widget.readonly(),
        children: Vec::new(),
    };
    if let Ok(children) = widget.children_iter() {
        for child in children {
            node.children.push(convert_widget(&child));
        }
    }
    node
}

fn widget_value_json(widget: &Widget) -> Value {
    match widget.value() {
        Ok((Some(WidgetValue::Text(s)), _)) => Value::String(s),
        Ok((Some(WidgetValue::Menu(s)), _)) => Value::String(s),
        Ok((Some(WidgetValue::Toggle(b)), _)) => Value::Bool(b),
        Ok((Some(WidgetValue::Range(v)), _)) => {
            serde_json::Number::from_f64(f64::from(v)).map(Value::Number).unwrap_or(Value::Null)
        }
        Ok(_) => Value::Null,
        Err(e) => {
            warn!(widget = %widget.name(), error = %e, "unreadable widget value");
            Value::Null
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
