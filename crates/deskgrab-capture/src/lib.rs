//! deskgrab Capture - Screenshots on X11 and Wayland desktops
//!
//! [`ScreenGrabber`] chooses how to capture for the running session:
//! - X11: direct framebuffer grabs per output (xcb/RandR)
//! - GNOME, KDE, COSMIC: the XDG Desktop Portal screenshot interface
//! - other Wayland compositors: the portal, or an external helper (grim)
//!   when configured
//!
//! Every captured image is stamped with the device pixel ratio matching the
//! desktop geometry it was taken against.

pub mod advisory;
pub mod geometry;
pub mod grabber;
pub mod helper_capture;
pub mod hyprland;
pub mod output;
pub mod portal_capture;
pub mod reconcile;
pub mod x11_capture;

#[cfg(test)]
mod testing;

pub use advisory::{AdvisoryLevel, AdvisorySink, TracingAdvisor};
pub use geometry::GeometryUnifier;
pub use grabber::ScreenGrabber;
pub use helper_capture::HelperToolBackend;
pub use hyprland::{Hyprctl, MonitorIntrospection};
pub use output::{DirectGrab, OutputSource, StaticOutputs};
pub use portal_capture::{PermissionBrokerBackend, PortalBus, PortalRequest, RequestToken, ZbusPortal};
pub use reconcile::reconcile;
pub use x11_capture::X11Display;
