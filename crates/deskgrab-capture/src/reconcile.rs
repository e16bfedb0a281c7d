//! Device pixel ratio reconciliation for captured images
//!
//! Backends hand back raw buffers whose pixel size may match the physical
//! desktop, the logical desktop, or neither (when the compositor
//! under-reports scale). This is a best-effort heuristic, not an exact
//! inverse: a buffer matching neither geometry gets its scale estimated
//! from the height ratio, and a mismatch is never treated as an error.

use deskgrab_core::{CapturedImage, DesktopGeometry};
use tracing::debug;

/// Stamp `image` with the scale that maps its pixels onto the desktop.
///
/// * pixel size equals the physical geometry: `ambient_scale`, the windowing
///   system's own ratio, is trusted
/// * pixel size equals the logical geometry: scale 1
/// * otherwise: `image.height / logical.height`
pub fn reconcile(mut image: CapturedImage, geometry: &DesktopGeometry, ambient_scale: f64) -> CapturedImage {
    let size = image.size();
    if size == geometry.physical.size() {
        image.scale = ambient_scale;
    } else if size == geometry.logical.size() {
        image.scale = 1.0;
    } else if geometry.logical.height > 0 {
        image.scale = f64::from(image.height()) / f64::from(geometry.logical.height);
        debug!(
            "Image {}x{} matches neither {} nor {}, estimated scale {:.3}",
            size.0, size.1, geometry.physical, geometry.logical, image.scale
        );
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskgrab_core::Rect;

    fn geometry(physical: (i32, i32), logical: (i32, i32)) -> DesktopGeometry {
        DesktopGeometry {
            physical: Rect::new(0, 0, physical.0, physical.1),
            logical: Rect::new(0, 0, logical.0, logical.1),
        }
    }

    #[test]
    fn test_physical_size_keeps_ambient_scale() {
        let g = geometry((3840, 2160), (1920, 1080));
        let image = reconcile(CapturedImage::blank(3840, 2160), &g, 2.0);
        assert_eq!(image.scale, 2.0);
    }

    #[test]
    fn test_logical_size_is_unscaled() {
        let g = geometry((3840, 2160), (1920, 1080));
        let mut image = CapturedImage::blank(1920, 1080);
        image.scale = 3.0;
        let image = reconcile(image, &g, 2.0);
        assert_eq!(image.scale, 1.0);
    }

    #[test]
    fn test_mismatch_uses_height_ratio() {
        let g = geometry((1920, 1080), (1600, 1000));
        let image = reconcile(CapturedImage::blank(3200, 2000), &g, 1.0);
        assert_eq!(image.scale, 2.0);
    }

    #[test]
    fn test_empty_logical_geometry_leaves_scale() {
        let g = DesktopGeometry::default();
        let image = reconcile(CapturedImage::blank(100, 100), &g, 1.5);
        assert_eq!(image.scale, 1.0);
    }
}
