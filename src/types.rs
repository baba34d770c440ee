//! Geometry and color value types shared by the window and surface layers.
//!
//! Integer types (`Rect`, `Point`, `Size`) describe window placement in
//! screen pixels. Float types (`RectF`, `PointF`, `SizeF`, `Color`) describe
//! drawing coordinates on a render surface.

use serde::{Deserialize, Serialize};

// ============================================================================
// Integer Geometry (window placement)
// ============================================================================

/// A rectangle with integer coordinates.
///
/// Uses left/top/right/bottom format where right and bottom are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Create a new rectangle from left, top, right, bottom coordinates
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from x, y, width, height.
    ///
    /// The far edges saturate at `i32::MAX`, so extents that do not fit in
    /// screen coordinates are cut short rather than wrapping.
    pub fn from_xywh(x: i32, y: i32, width: u32, height: u32) -> Self {
        let extent = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        Self {
            left: x,
            top: y,
            right: x.saturating_add(extent(width)),
            bottom: y.saturating_add(extent(height)),
        }
    }

    /// Get the width of the rectangle
    pub fn width(&self) -> u32 {
        (self.right as i64 - self.left as i64).max(0) as u32
    }

    /// Get the height of the rectangle
    pub fn height(&self) -> u32 {
        (self.bottom as i64 - self.top as i64).max(0) as u32
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Same size, new origin
    pub fn with_origin(&self, x: i32, y: i32) -> Self {
        Self::from_xywh(x, y, self.width(), self.height())
    }

    /// Same origin, new size
    pub fn with_size(&self, width: u32, height: u32) -> Self {
        Self::from_xywh(self.left, self.top, width, height)
    }

    /// Check if a point is inside the rectangle (exclusive of right/bottom edges)
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// A point with integer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ============================================================================
// Float Geometry (drawing)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A drawing rectangle, left/top/right/bottom.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Grow the rectangle by `amount` on every side
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            left: self.left - amount,
            top: self.top - amount,
            right: self.right + amount,
            bottom: self.bottom + amount,
        }
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        Self {
            left: r.left as f32,
            top: r.top as f32,
            right: r.right as f32,
            bottom: r.bottom as f32,
        }
    }
}

// ============================================================================
// Color
// ============================================================================

/// Straight-alpha RGBA color with components in 0.0..=1.0
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build a color from 8-bit channels
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }
}
