//! Rectangle algebra and display output descriptions

use serde::{Deserialize, Serialize};

/// Integer rectangle in pixels. `x + width` is the exclusive right edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle with no area contributes nothing to a union
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Smallest rectangle containing both `self` and `other`
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Overlap of `self` and `other`, empty when they do not intersect
    pub fn intersected(&self, other: &Rect) -> Rect {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return Rect::default();
        }
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Shift the rectangle by `(dx, dy)`
    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Floating-point rectangle used while accumulating scaled geometry
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `rect` with every component divided by `scale`
    pub fn scaled_down(rect: &Rect, scale: f64) -> Self {
        Self::new(
            f64::from(rect.x) / scale,
            f64::from(rect.y) / scale,
            f64::from(rect.width) / scale,
            f64::from(rect.height) / scale,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn united(&self, other: &RectF) -> RectF {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        RectF::new(left, top, right - left, bottom - top)
    }

    /// Smallest integer rectangle that encloses this one
    pub fn to_aligned_rect(&self) -> Rect {
        if self.is_empty() {
            return Rect::default();
        }
        let left = self.x.floor() as i32;
        let top = self.y.floor() as i32;
        let right = (self.x + self.width).ceil() as i32;
        let bottom = (self.y + self.height).ceil() as i32;
        Rect::new(left, top, right - left, bottom - top)
    }
}

/// Round half away from zero. All scaled geometry goes through this.
pub fn round_px(value: f64) -> i32 {
    value.round() as i32
}

/// One physical display as reported by the windowing system.
///
/// Enumerated fresh for every geometry query; outputs can be hot-plugged
/// between captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Stable handle from the windowing system
    pub id: u32,
    /// Human readable connector name, when known
    pub name: String,
    /// Output rectangle in device pixels
    pub rect: Rect,
    /// Device pixel ratio of this output
    pub scale: f64,
}

impl OutputDescriptor {
    pub fn new(id: u32, name: impl Into<String>, rect: Rect, scale: f64) -> Self {
        Self {
            id,
            name: name.into(),
            rect,
            scale,
        }
    }

    /// This output's rectangle with origin and size divided by its scale
    pub fn logical_rect(&self) -> RectF {
        RectF::scaled_down(&self.rect, self.scale)
    }
}

/// Physical and logical extent of the whole desktop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesktopGeometry {
    /// Union of output rectangles in device pixels
    pub physical: Rect,
    /// Union of scale-normalised output rectangles
    pub logical: Rect,
}

impl DesktopGeometry {
    /// Union geometry of a set of outputs.
    ///
    /// The logical union is accumulated in floating point and then aligned
    /// outward to integer pixels.
    pub fn from_outputs(outputs: &[OutputDescriptor]) -> Self {
        let mut physical = Rect::default();
        let mut logical = RectF::default();
        for output in outputs {
            physical = physical.united(&output.rect);
            if output.scale > 0.0 {
                logical = logical.united(&output.logical_rect());
            }
        }
        Self {
            physical,
            logical: logical.to_aligned_rect(),
        }
    }
}
