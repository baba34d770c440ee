//! Render surface and frame pump configuration.

use serde::{Deserialize, Serialize};

/// Upper bound for the pump's target frame rate.
pub const MAX_FRAME_RATE: u32 = 1000;

/// How a render surface is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurfaceOptions {
    /// Wait for vertical blank on present.
    pub vsync: bool,

    /// Per-primitive antialiasing for shapes.
    pub antialiasing: bool,

    /// Grayscale antialiasing for text.
    pub text_antialiasing: bool,

    /// Count presented frames and report FPS once per second.
    pub measure_fps: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            vsync: false,
            antialiasing: true,
            text_antialiasing: true,
            measure_fps: false,
        }
    }
}

/// How a frame pump drives its handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PumpOptions {
    /// Target frames per second (0 = uncapped).
    pub frame_rate: u32,

    /// Options for the surface the pump binds.
    pub surface: SurfaceOptions,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            surface: SurfaceOptions::default(),
        }
    }
}

impl PumpOptions {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.frame_rate = self.frame_rate.min(MAX_FRAME_RATE);
    }
}
