//! Hyprland monitor introspection
//!
//! Hyprland does not report per-monitor scale reliably through the generic
//! output query, so on Hyprland the desktop geometry comes from
//! `hyprctl monitors -j` instead.

use async_trait::async_trait;
use deskgrab_core::{round_px, CaptureError, CaptureResult, DesktopGeometry, OutputDescriptor, Rect};
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Source of the monitor list as raw JSON
#[async_trait]
pub trait MonitorIntrospection: Send + Sync {
    async fn monitors_json(&self) -> CaptureResult<Vec<u8>>;
}

/// Runs `hyprctl monitors -j`
#[derive(Debug, Clone)]
pub struct Hyprctl {
    program: String,
    timeout: Duration,
}

impl Hyprctl {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for Hyprctl {
    fn default() -> Self {
        Self::new("hyprctl", Duration::from_secs(1))
    }
}

#[async_trait]
impl MonitorIntrospection for Hyprctl {
    async fn monitors_json(&self) -> CaptureResult<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(["monitors", "-j"])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                CaptureError::GeometryIntrospection(format!(
                    "{} did not answer within {} ms",
                    self.program,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                CaptureError::GeometryIntrospection(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(CaptureError::GeometryIntrospection(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// Parse the monitor array into output descriptors.
///
/// Entries that are not objects, or whose width, height or scale is not
/// positive, are skipped. A missing scale means 1.0.
pub fn parse_monitors(json: &[u8]) -> CaptureResult<Vec<OutputDescriptor>> {
    let doc: Value = serde_json::from_slice(json).map_err(|e| {
        CaptureError::GeometryIntrospection(format!("failed to parse monitor output: {}", e))
    })?;
    let monitors = doc.as_array().ok_or_else(|| {
        CaptureError::GeometryIntrospection("monitor output is not a JSON array".to_string())
    })?;

    let number = |obj: &serde_json::Map<String, Value>, key: &str, default: f64| {
        obj.get(key).and_then(Value::as_f64).unwrap_or(default)
    };

    let mut outputs = Vec::new();
    for (index, obj) in monitors.iter().filter_map(Value::as_object).enumerate() {
        let width = number(obj, "width", 0.0);
        let height = number(obj, "height", 0.0);
        let scale = number(obj, "scale", 1.0);
        if width <= 0.0 || height <= 0.0 || scale <= 0.0 {
            debug!("Skipping monitor entry {}x{} scale {}", width, height, scale);
            continue;
        }

        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(index as u32);
        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default();
        let rect = Rect::new(
            round_px(number(obj, "x", 0.0)),
            round_px(number(obj, "y", 0.0)),
            round_px(width),
            round_px(height),
        );
        outputs.push(OutputDescriptor::new(id, name, rect, scale));
    }
    Ok(outputs)
}

/// Physical and logical unions of Hyprland monitors.
///
/// Unlike the generic path, each logical value is rounded on its own
/// before the union. Returns `None` for an empty list.
pub fn monitor_geometry(outputs: &[OutputDescriptor]) -> Option<DesktopGeometry> {
    if outputs.is_empty() {
        return None;
    }

    let mut physical = Rect::default();
    let mut logical = Rect::default();
    for output in outputs {
        let r = output.rect;
        let s = output.scale;
        physical = physical.united(&r);
        logical = logical.united(&Rect::new(
            round_px(f64::from(r.x) / s),
            round_px(f64::from(r.y) / s),
            round_px(f64::from(r.width) / s),
            round_px(f64::from(r.height) / s),
        ));
    }
    Some(DesktopGeometry { physical, logical })
}
