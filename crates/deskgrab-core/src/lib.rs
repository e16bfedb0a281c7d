//! deskgrab Core - Shared types for desktop capture
//!
//! This crate provides the foundational types used by the capture crate and
//! the command-line front end.

pub mod config;
pub mod desktop;
pub mod error;
pub mod frame;
pub mod geometry;

pub use config::CaptureConfig;
pub use desktop::{DesktopSession, WindowManager};
pub use error::{CaptureError, CaptureResult};
pub use frame::{BackendResult, CapturedImage};
pub use geometry::{round_px, DesktopGeometry, OutputDescriptor, Rect, RectF};
