//! X11 output enumeration (RandR) and direct framebuffer grabs

use crate::output::{DirectGrab, OutputSource};
use deskgrab_core::{CaptureError, CaptureResult, CapturedImage, OutputDescriptor, Rect};
use tracing::{debug, info};
use xcb::Xid;

/// Connection to the X server used for both output queries and grabs.
///
/// Under Wayland this talks to XWayland, which is how the generic geometry
/// path sees the compositor's outputs.
pub struct X11Display {
    conn: xcb::Connection,
    screen_num: i32,
}

impl X11Display {
    /// Connect to `$DISPLAY` with RandR 1.5 available
    pub fn connect() -> CaptureResult<Self> {
        let (conn, screen_num) =
            xcb::Connection::connect_with_extensions(None, &[xcb::Extension::RandR], &[])
                .map_err(|e| CaptureError::X11Connection(e.to_string()))?;

        let cookie = conn.send_request(&xcb::randr::QueryVersion {
            major_version: 1,
            minor_version: 5,
        });
        let version = conn
            .wait_for_reply(cookie)
            .map_err(|e| CaptureError::X11Connection(format!("RandR unavailable: {:?}", e)))?;
        info!(
            "Connected to X11 display, RandR {}.{}",
            version.major_version(),
            version.minor_version()
        );

        Ok(Self { conn, screen_num })
    }

    fn root(&self) -> CaptureResult<(xcb::x::Window, Rect)> {
        let setup = self.conn.get_setup();
        let screen = setup
            .roots()
            .nth(self.screen_num as usize)
            .ok_or_else(|| CaptureError::X11Connection("Invalid screen".to_string()))?;
        let bounds = Rect::new(
            0,
            0,
            i32::from(screen.width_in_pixels()),
            i32::from(screen.height_in_pixels()),
        );
        Ok((screen.root(), bounds))
    }

    fn atom_name(&self, atom: xcb::x::Atom) -> Option<String> {
        let cookie = self.conn.send_request(&xcb::x::GetAtomName { atom });
        self.conn
            .wait_for_reply(cookie)
            .ok()
            .map(|reply| reply.name().to_utf8().into_owned())
    }
}

impl OutputSource for X11Display {
    fn outputs(&self) -> CaptureResult<Vec<OutputDescriptor>> {
        let (root, bounds) = self.root()?;
        let cookie = self.conn.send_request(&xcb::randr::GetMonitors {
            window: root,
            get_active: true,
        });
        let reply = self
            .conn
            .wait_for_reply(cookie)
            .map_err(|e| CaptureError::X11Connection(format!("GetMonitors failed: {:?}", e)))?;

        let mut outputs: Vec<OutputDescriptor> = reply
            .monitors()
            .map(|monitor| {
                let atom = monitor.name();
                OutputDescriptor::new(
                    atom.resource_id(),
                    self.atom_name(atom).unwrap_or_default(),
                    Rect::new(
                        i32::from(monitor.x()),
                        i32::from(monitor.y()),
                        i32::from(monitor.width()),
                        i32::from(monitor.height()),
                    ),
                    1.0,
                )
            })
            .collect();

        if outputs.is_empty() {
            debug!("RandR reported no monitors, using the root window");
            outputs.push(OutputDescriptor::new(root.resource_id(), "root", bounds, 1.0));
        }
        Ok(outputs)
    }
}

impl DirectGrab for X11Display {
    fn grab_output(&self, output: &OutputDescriptor) -> CaptureResult<CapturedImage> {
        let (root, _) = self.root()?;
        let rect = output.rect;
        let cookie = self.conn.send_request(&xcb::x::GetImage {
            format: xcb::x::ImageFormat::ZPixmap,
            drawable: xcb::x::Drawable::Window(root),
            x: rect.x as i16,
            y: rect.y as i16,
            width: rect.width as u16,
            height: rect.height as u16,
            plane_mask: !0,
        });
        let reply = self
            .conn
            .wait_for_reply(cookie)
            .map_err(|e| CaptureError::Image(format!("GetImage failed: {:?}", e)))?;

        debug!("Grabbed {} at {}", output.name, rect);
        bgrx_to_rgba(reply.data(), rect.width as u32, rect.height as u32)
    }
}

/// Convert a 32-bit ZPixmap (B, G, R, pad) buffer to RGBA
pub fn bgrx_to_rgba(data: &[u8], width: u32, height: u32) -> CaptureResult<CapturedImage> {
    let expected = width as usize * height as usize * 4;
    if data.len() < expected {
        return Err(CaptureError::Image(format!(
            "expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            data.len()
        )));
    }
    let rgba = data[..expected]
        .chunks_exact(4)
        .flat_map(|px| [px[2], px[1], px[0], 255])
        .collect();
    CapturedImage::from_rgba(width, height, rgba)
        .ok_or_else(|| CaptureError::Image("pixel buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgrx_conversion() {
        let data = [1, 2, 3, 0, 10, 20, 30, 0];
        let image = bgrx_to_rgba(&data, 2, 1).unwrap();
        assert_eq!(image.pixels().get_pixel(0, 0).0, [3, 2, 1, 255]);
        assert_eq!(image.pixels().get_pixel(1, 0).0, [30, 20, 10, 255]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(bgrx_to_rgba(&[0; 12], 2, 2).is_err());
    }
}
