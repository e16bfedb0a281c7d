//! Capture dispatch: picks the backend for the running session
//!
//! X11 sessions are grabbed output by output straight from the server.
//! Wayland sessions go through the desktop portal or the helper tool
//! depending on the window-manager family and configuration.

use crate::advisory::{AdvisorySink, TracingAdvisor};
use crate::geometry::GeometryUnifier;
use crate::helper_capture::HelperToolBackend;
use crate::hyprland::{Hyprctl, MonitorIntrospection};
use crate::output::{DirectGrab, OutputSource, StaticOutputs};
use crate::portal_capture::{PermissionBrokerBackend, PortalBus, ZbusPortal};
use crate::x11_capture::X11Display;
use deskgrab_core::{
    round_px, BackendResult, CaptureConfig, CaptureError, CaptureResult, CapturedImage,
    DesktopGeometry, DesktopSession, Rect,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DETECTION_HINT: &str = "Hint: try setting the XDG_CURRENT_DESKTOP environment variable.";
const CAPTURE_FAILED: &str = "Unable to capture screen";

/// Top-level entry point for desktop and per-output screenshots
pub struct ScreenGrabber {
    session: DesktopSession,
    config: CaptureConfig,
    advisor: Arc<dyn AdvisorySink>,
    unifier: GeometryUnifier,
    portal_bus: Option<Arc<dyn PortalBus>>,
    direct: Option<Arc<dyn DirectGrab>>,
    helper_output_path: Option<PathBuf>,
}

impl ScreenGrabber {
    /// Create a grabber over an already connected output source.
    ///
    /// No portal bus or direct grab is attached; see [`ScreenGrabber::connect`]
    /// for the usual wiring.
    pub fn new(session: DesktopSession, config: CaptureConfig, outputs: Arc<dyn OutputSource>) -> Self {
        let introspection = Hyprctl::new(
            config.monitor_query_program.clone(),
            Duration::from_millis(config.monitor_query_timeout_ms),
        );
        let unifier = GeometryUnifier::new(session, outputs).with_introspection(Arc::new(introspection));
        Self {
            session,
            config,
            advisor: Arc::new(TracingAdvisor),
            unifier,
            portal_bus: None,
            direct: None,
            helper_output_path: None,
        }
    }

    /// Connect to the windowing system and, under Wayland, the session bus.
    ///
    /// On X11 an unreachable display is an error. Under Wayland the X
    /// server (XWayland) only feeds output enumeration, so its absence
    /// leaves the grabber with an empty output list.
    pub async fn connect(session: DesktopSession, config: CaptureConfig) -> CaptureResult<Self> {
        let display = match X11Display::connect() {
            Ok(display) => Some(Arc::new(display)),
            Err(e) if !session.wayland => return Err(e),
            Err(e) => {
                warn!("No X11 display for output enumeration: {}", e);
                None
            }
        };

        let outputs: Arc<dyn OutputSource> = match &display {
            Some(display) => display.clone() as Arc<dyn OutputSource>,
            None => Arc::new(StaticOutputs::default()),
        };
        let mut grabber = Self::new(session, config, outputs);

        if session.wayland {
            match ZbusPortal::session().await {
                Ok(portal) => grabber = grabber.with_portal_bus(Arc::new(portal)),
                Err(e) => warn!("Unable to connect to the session bus: {}", e),
            }
        } else if let Some(display) = display {
            grabber = grabber.with_direct_grab(display);
        }

        info!(
            "Capture session: {}, window manager {}",
            if session.wayland { "Wayland" } else { "X11" },
            session
                .window_manager
                .map(|wm| wm.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        Ok(grabber)
    }

    /// Send advisories somewhere other than the log
    pub fn with_advisor(mut self, advisor: Arc<dyn AdvisorySink>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn with_portal_bus(mut self, bus: Arc<dyn PortalBus>) -> Self {
        self.portal_bus = Some(bus);
        self
    }

    pub fn with_direct_grab(mut self, direct: Arc<dyn DirectGrab>) -> Self {
        self.direct = Some(direct);
        self
    }

    /// Replace the Hyprland monitor query
    pub fn with_introspection(mut self, introspection: Arc<dyn MonitorIntrospection>) -> Self {
        self.unifier = self.unifier.with_introspection(introspection);
        self
    }

    /// Where the helper tool writes its image
    pub fn with_helper_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.helper_output_path = Some(path.into());
        self
    }

    /// Replace the configuration used by subsequent captures
    pub fn set_config(&mut self, config: CaptureConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn session(&self) -> DesktopSession {
        self.session
    }

    pub fn geometry(&self) -> &GeometryUnifier {
        &self.unifier
    }

    /// Capture every output as one image covering the physical desktop
    pub async fn capture_desktop(&self) -> BackendResult {
        let config = self.config.clone();

        let result = if self.session.wayland {
            self.capture_brokered(&config).await
        } else {
            self.capture_direct()
        };

        if !result.ok() {
            self.advisor.error(CAPTURE_FAILED);
        }
        result
    }

    /// Capture one output.
    ///
    /// X11 grabs the output on its own. Under Wayland the whole desktop is
    /// captured and cropped to the output's rectangle.
    pub async fn capture_output(&self, index: usize) -> BackendResult {
        let (outputs, geometry) = self.unifier.snapshot().await;
        let Some(output) = outputs.into_iter().nth(index) else {
            self.advisor.error(&format!("No screen with index {}", index));
            return BackendResult::failure();
        };

        if !self.session.wayland {
            let Some(direct) = self.direct.as_deref() else {
                self.advisor.error("No X11 display connection for direct capture");
                return BackendResult::failure();
            };
            return match direct.grab_output(&output) {
                Ok(mut image) => {
                    image.scale = output.scale;
                    BackendResult::success(image)
                }
                Err(e) => {
                    self.advisor.error(&format!("{}: {}", CAPTURE_FAILED, e));
                    BackendResult::failure()
                }
            };
        }

        let Some(desktop) = self.capture_desktop().await.into_image() else {
            return BackendResult::failure();
        };
        let rect = crop_rect(&output.rect, &geometry.physical, desktop.width());
        debug!("Cropping {} to {} for {}", geometry.physical, rect, output.name);
        BackendResult::success(desktop.cropped(rect))
    }

    /// Rectangle of one output in physical pixels
    pub async fn output_geometry(&self, index: usize) -> Option<Rect> {
        let (outputs, _) = self.unifier.snapshot().await;
        outputs.get(index).map(|output| output.rect)
    }

    async fn capture_brokered(&self, config: &CaptureConfig) -> BackendResult {
        let Some(window_manager) = self.session.window_manager else {
            self.advisor.error(&format!(
                "{} (GNOME? KDE? Qtile? Sway? ...)",
                CaptureError::EnvironmentDetection
            ));
            self.advisor.error(DETECTION_HINT);
            return BackendResult::failure();
        };

        if window_manager.requires_portal() {
            return self.portal(config).request_screenshot(&self.unifier).await;
        }

        if config.prefer_helper_tool {
            if !config.suppress_helper_warnings {
                self.advisor.warning(&format!(
                    "{}'s screen capture is implemented on wlroots protocols, \
                     it may not work in GNOME or similar desktop environments",
                    config.helper_program
                ));
            }
            self.helper(config).run_helper_capture(&self.unifier).await
        } else {
            if !config.suppress_helper_warnings {
                self.advisor.warning(&format!(
                    "The helper tool adapter is not enabled, so the D-Bus portal will be used. \
                     Using the portal under {} is not recommended; enable `prefer_helper_tool` \
                     in the configuration to use the {}-based adapter instead",
                    window_manager, config.helper_program
                ));
            }
            self.portal(config).request_screenshot(&self.unifier).await
        }
    }

    fn capture_direct(&self) -> BackendResult {
        let Some(direct) = self.direct.as_deref() else {
            self.advisor.error("No X11 display connection for direct capture");
            return BackendResult::failure();
        };
        BackendResult::success(self.compose(direct))
    }

    /// Grab each output into a canvas the size of the physical desktop.
    /// Outputs that fail to grab stay black.
    fn compose(&self, direct: &dyn DirectGrab) -> CapturedImage {
        let outputs = self.unifier.outputs();
        let physical = DesktopGeometry::from_outputs(&outputs).physical;
        let mut canvas = CapturedImage::blank(physical.width.max(0) as u32, physical.height.max(0) as u32);

        for output in &outputs {
            match direct.grab_output(output) {
                Ok(shot) => image::imageops::replace(
                    canvas.pixels_mut(),
                    shot.pixels(),
                    i64::from(output.rect.x - physical.x),
                    i64::from(output.rect.y - physical.y),
                ),
                Err(e) => error!("Failed to grab {}: {}", output.name, e),
            }
        }

        canvas.scale = self.unifier.device_pixel_ratio();
        canvas
    }

    fn portal(&self, config: &CaptureConfig) -> PermissionBrokerBackend {
        PermissionBrokerBackend::from_config(self.portal_bus.clone(), config, self.advisor.clone())
    }

    fn helper(&self, config: &CaptureConfig) -> HelperToolBackend {
        let backend = HelperToolBackend::from_config(config, self.advisor.clone());
        match &self.helper_output_path {
            Some(path) => backend.with_output_path(path),
            None => backend,
        }
    }
}

/// Map an output rectangle into the pixel space of a desktop capture whose
/// width is `image_width` and which covers `physical`
pub fn crop_rect(output: &Rect, physical: &Rect, image_width: u32) -> Rect {
    let factor = if physical.width > 0 {
        f64::from(image_width) / f64::from(physical.width)
    } else {
        1.0
    };
    let local = output.translated(-physical.x, -physical.y);
    Rect::new(
        round_px(f64::from(local.x) * factor),
        round_px(f64::from(local.y) * factor),
        round_px(f64::from(local.width) * factor),
        round_px(f64::from(local.height) * factor),
    )
}
