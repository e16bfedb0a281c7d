//! Desktop geometry unification across outputs

use crate::hyprland::{monitor_geometry, parse_monitors, Hyprctl, MonitorIntrospection};
use crate::output::OutputSource;
use crate::reconcile::reconcile;
use deskgrab_core::{CapturedImage, DesktopGeometry, DesktopSession, OutputDescriptor, Rect};
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes the physical and logical bounding rectangles of the desktop.
///
/// Every query enumerates outputs afresh. On Hyprland the monitor list is
/// taken from the introspection tool, falling back to the generic output
/// query whenever that tool fails or reports nothing usable.
#[derive(Clone)]
pub struct GeometryUnifier {
    session: DesktopSession,
    outputs: Arc<dyn OutputSource>,
    introspection: Arc<dyn MonitorIntrospection>,
}

impl GeometryUnifier {
    pub fn new(session: DesktopSession, outputs: Arc<dyn OutputSource>) -> Self {
        Self {
            session,
            outputs,
            introspection: Arc::new(Hyprctl::default()),
        }
    }

    /// Replace the Hyprland introspection source
    pub fn with_introspection(mut self, introspection: Arc<dyn MonitorIntrospection>) -> Self {
        self.introspection = introspection;
        self
    }

    /// Both geometry variants from a single enumeration
    pub async fn desktop_geometry(&self) -> DesktopGeometry {
        self.snapshot().await.1
    }

    /// Union of output rectangles in device pixels
    pub async fn physical_desktop_geometry(&self) -> Rect {
        self.desktop_geometry().await.physical
    }

    /// Union of scale-normalised output rectangles
    pub async fn logical_desktop_geometry(&self) -> Rect {
        self.desktop_geometry().await.logical
    }

    /// Outputs together with the geometry computed from them.
    ///
    /// On Hyprland both come from the introspection tool, so output
    /// rectangles and the desktop union share one coordinate space.
    pub async fn snapshot(&self) -> (Vec<OutputDescriptor>, DesktopGeometry) {
        if self.session.is_hyprland() {
            if let Some(snapshot) = self.hyprland_snapshot().await {
                return snapshot;
            }
        }
        let outputs = self.outputs();
        let geometry = DesktopGeometry::from_outputs(&outputs);
        (outputs, geometry)
    }

    /// Current outputs from the generic source, empty when the windowing
    /// system cannot be queried
    pub fn outputs(&self) -> Vec<OutputDescriptor> {
        match self.outputs.outputs() {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("Unable to enumerate outputs: {}", e);
                Vec::new()
            }
        }
    }

    /// Session-wide device pixel ratio reported by the windowing system
    pub fn device_pixel_ratio(&self) -> f64 {
        self.outputs.device_pixel_ratio()
    }

    /// Stamp a freshly captured image with the scale matching the current
    /// desktop geometry
    pub async fn reconcile(&self, image: CapturedImage) -> CapturedImage {
        let geometry = self.desktop_geometry().await;
        reconcile(image, &geometry, self.device_pixel_ratio())
    }

    async fn hyprland_snapshot(&self) -> Option<(Vec<OutputDescriptor>, DesktopGeometry)> {
        let json = match self.introspection.monitors_json().await {
            Ok(json) => json,
            Err(e) => {
                warn!("Unable to query Hyprland monitors via hyprctl: {}", e);
                return None;
            }
        };

        let outputs = match parse_monitors(&json) {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };

        match monitor_geometry(&outputs) {
            Some(geometry) => {
                debug!(
                    "Hyprland geometry: physical {}, logical {}",
                    geometry.physical, geometry.logical
                );
                Some((outputs, geometry))
            }
            None => {
                debug!("hyprctl reported no usable monitors, using generic geometry");
                None
            }
        }
    }
}
