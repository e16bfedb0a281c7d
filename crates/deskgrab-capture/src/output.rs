//! Windowing-system seams: output enumeration and direct framebuffer grabs

use deskgrab_core::{CaptureResult, CapturedImage, OutputDescriptor};

/// Enumerates the connected outputs.
///
/// Implementations must query the windowing system on every call; nothing
/// is cached between captures.
pub trait OutputSource: Send + Sync {
    fn outputs(&self) -> CaptureResult<Vec<OutputDescriptor>>;

    /// Device pixel ratio the windowing system reports for the session as a
    /// whole: the highest ratio among its outputs
    fn device_pixel_ratio(&self) -> f64 {
        self.outputs()
            .ok()
            .and_then(|outputs| {
                outputs
                    .iter()
                    .map(|o| o.scale)
                    .filter(|s| *s > 0.0)
                    .reduce(f64::max)
            })
            .unwrap_or(1.0)
    }
}

/// Reads one output's framebuffer directly from the windowing system
pub trait DirectGrab: Send + Sync {
    fn grab_output(&self, output: &OutputDescriptor) -> CaptureResult<CapturedImage>;
}

/// A fixed output list, for sessions where the layout is already known
#[derive(Debug, Clone, Default)]
pub struct StaticOutputs {
    outputs: Vec<OutputDescriptor>,
}

impl StaticOutputs {
    pub fn new(outputs: Vec<OutputDescriptor>) -> Self {
        Self { outputs }
    }
}

impl OutputSource for StaticOutputs {
    fn outputs(&self) -> CaptureResult<Vec<OutputDescriptor>> {
        Ok(self.outputs.clone())
    }
}
