//! Window configuration.
//!
//! Everything the message-loop thread needs to create the native window.
//! The controller snapshots this before the thread starts; later changes go
//! through the controller's mutators instead.

use serde::{Deserialize, Serialize};

use crate::types::Rect;

/// Initial placement and attributes of an overlay window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowOptions {
    /// Screen X of the top-left corner.
    pub x: i32,

    /// Screen Y of the top-left corner.
    pub y: i32,

    /// Width in pixels (at least 1).
    pub width: u32,

    /// Height in pixels (at least 1).
    pub height: u32,

    /// Window title. None = generated.
    pub title: Option<String>,

    /// Window class name. None = generated (unique per window).
    pub class_name: Option<String>,

    /// Keep the window above non-topmost windows.
    pub topmost: bool,

    /// Show the window as soon as it is created.
    pub visible: bool,

    /// Whole-window layered alpha (255 = per-pixel alpha only).
    pub alpha: u8,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            title: None,
            class_name: None,
            topmost: true,
            visible: true,
            alpha: 255,
        }
    }
}

impl WindowOptions {
    /// Options for a window covering the given bounds.
    pub fn with_bounds(bounds: Rect) -> Self {
        Self {
            x: bounds.left,
            y: bounds.top,
            width: bounds.width(),
            height: bounds.height(),
            ..Default::default()
        }
    }

    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.width = self.width.max(1);
        self.height = self.height.max(1);
        if self.class_name.as_deref().is_some_and(|c| c.trim().is_empty()) {
            self.class_name = None;
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}
