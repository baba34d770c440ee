//! Overlay configuration.
//!
//! Typed, serde-backed settings for windows, surfaces, frame pumps and
//! logging, plus a process-wide default behind `parking_lot::RwLock`.
//!
//! ## Architecture
//!
//! - `WindowOptions`: initial placement and attributes of an overlay window
//! - `SurfaceOptions`: vsync, antialiasing, FPS measurement
//! - `PumpOptions`: frame rate plus the surface options the pump binds with
//! - `LoggingConfig`: filter and optional log directory
//! - `OverlayConfig`: all of the above, loadable from JSON

pub mod render;
pub mod window;

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

pub use render::{PumpOptions, SurfaceOptions, MAX_FRAME_RATE};
pub use window::WindowOptions;

/// Logging filter and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// `env_logger` filter string, e.g. "info" or "clearpane=debug".
    pub level: String,

    /// Directory for dated log files. None = stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Complete overlay configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    pub window: WindowOptions,
    pub pump: PumpOptions,
    pub logging: LoggingConfig,
}

impl OverlayConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> OverlayResult<Self> {
        let mut config: OverlayConfig = serde_json::from_str(json)?;
        config.validate();
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_file(path: &Path) -> OverlayResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| OverlayError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        Self::from_json_str(&json)
    }

    /// Validate and clamp every section.
    pub fn validate(&mut self) {
        self.window.validate();
        self.pump.validate();
        if self.logging.level.trim().is_empty() {
            self.logging.level = LoggingConfig::default().level;
        }
    }
}

lazy_static! {
    /// Global default overlay configuration.
    ///
    /// Used by `WindowController::with_defaults` and `FramePump` constructors
    /// that don't take explicit options.
    ///
    /// # Example
    /// ```ignore
    /// {
    ///     let mut config = OVERLAY_CONFIG.write();
    ///     config.pump.frame_rate = 30;
    /// }
    /// ```
    pub static ref OVERLAY_CONFIG: RwLock<OverlayConfig> = RwLock::new(OverlayConfig::default());
}

/// Snapshot of the global default window options.
pub fn default_window_options() -> WindowOptions {
    OVERLAY_CONFIG.read().window.clone()
}

/// Snapshot of the global default pump options.
pub fn default_pump_options() -> PumpOptions {
    OVERLAY_CONFIG.read().pump.clone()
}
