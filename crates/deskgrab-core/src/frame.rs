//! Captured screen images and backend results

use crate::error::CaptureResult;
use crate::geometry::Rect;
use image::RgbaImage;
use std::path::Path;

/// A captured pixel buffer tagged with its device pixel ratio.
///
/// `width() / scale` is the logical width the image covers.
#[derive(Clone)]
pub struct CapturedImage {
    pixels: RgbaImage,
    /// Device pixel ratio
    pub scale: f64,
}

impl CapturedImage {
    /// Wrap a pixel buffer with a scale of 1.0
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels, scale: 1.0 }
    }

    /// Build from tightly packed RGBA bytes
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(Self::new)
    }

    /// An opaque black image of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])))
    }

    /// Decode an image file (format guessed from its contents)
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let decoded = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Pixel size as signed integers, comparable with [`Rect::size`]
    pub fn size(&self) -> (i32, i32) {
        (self.width() as i32, self.height() as i32)
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Copy out the part of the image inside `rect` (pixel coordinates),
    /// clipped to the image bounds
    pub fn cropped(&self, rect: Rect) -> Self {
        let bounds = Rect::new(0, 0, self.width() as i32, self.height() as i32);
        let clip = bounds.intersected(&rect);
        let pixels = if clip.is_empty() {
            RgbaImage::new(0, 0)
        } else {
            image::imageops::crop_imm(
                &self.pixels,
                clip.x as u32,
                clip.y as u32,
                clip.width as u32,
                clip.height as u32,
            )
            .to_image()
        };
        Self {
            pixels,
            scale: self.scale,
        }
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("scale", &self.scale)
            .finish()
    }
}

/// Outcome of a capture attempt.
///
/// A failed result never carries an image.
#[derive(Debug, Clone)]
pub struct BackendResult {
    image: Option<CapturedImage>,
}

impl BackendResult {
    pub fn success(image: CapturedImage) -> Self {
        Self { image: Some(image) }
    }

    pub fn failure() -> Self {
        Self { image: None }
    }

    pub fn ok(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    pub fn into_image(self) -> Option<CapturedImage> {
        self.image
    }
}

impl From<Option<CapturedImage>> for BackendResult {
    fn from(image: Option<CapturedImage>) -> Self {
        Self { image }
    }
}
