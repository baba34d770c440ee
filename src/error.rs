//! Central error types for clearpane.
//!
//! Errors fall into three groups:
//! - construction failures (window, class, surface) that abort startup,
//! - runtime presentation failures,
//! - misuse errors (calling an operation in the wrong lifecycle state).
//!
//! Device loss is not an error at this level: the render surface recovers
//! from it internally.

use thiserror::Error;

/// Main error type for clearpane operations.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// A null or otherwise unusable native window handle was supplied
    #[error("Invalid window handle")]
    InvalidHandle,

    /// Window class registration failed (collision retries exhausted or native failure)
    #[error("Window class registration failed: {0}")]
    ClassRegistration(String),

    /// Native window creation failed
    #[error("Window creation failed: {0}")]
    WindowCreation(String),

    /// The window message-loop thread could not be started or died unexpectedly
    #[error("Window thread error: {0}")]
    WindowThread(String),

    /// Render surface creation failed (including pixel format fallback)
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Render surface could not be recreated after device loss
    #[error("Device recreation failed: {0}")]
    DeviceRecreation(String),

    /// Presentation failed for a reason other than device loss
    #[error("Present failed: {0}")]
    Present(String),

    /// Brush, font, image, geometry or text layout creation failed
    #[error("Resource error: {0}")]
    Resource(String),

    /// Window state accessed before the window finished initializing
    #[error("Window is not initialized")]
    NotInitialized,

    /// `create()` called while the window already exists
    #[error("Window already created")]
    AlreadyCreated,

    /// Surface operation before `bind()`
    #[error("Render surface is not bound to a window")]
    NotBound,

    /// Drawing operation outside of begin_scene/end_scene
    #[error("{0} called outside of a scene")]
    NotDrawing(&'static str),

    /// Resource created by an earlier surface generation
    #[error("Resource belongs to surface generation {resource}, current generation is {current}")]
    StaleResource { resource: u64, current: u64 },

    /// `start()` on a frame pump that is already running
    #[error("Frame pump is already running")]
    AlreadyRunning,

    /// Operation requires a running frame pump
    #[error("Frame pump is not running")]
    NotRunning,

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// File system operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl OverlayError {
    /// True for errors caused by calling an operation in the wrong state.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            OverlayError::NotInitialized
                | OverlayError::AlreadyCreated
                | OverlayError::NotBound
                | OverlayError::NotDrawing(_)
                | OverlayError::StaleResource { .. }
                | OverlayError::AlreadyRunning
                | OverlayError::NotRunning
        )
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for OverlayError {
    fn from(err: windows::core::Error) -> Self {
        OverlayError::Other(format!("{} (0x{:08X})", err.message(), err.code().0))
    }
}

impl From<String> for OverlayError {
    fn from(msg: String) -> Self {
        OverlayError::Other(msg)
    }
}

impl From<&str> for OverlayError {
    fn from(msg: &str) -> Self {
        OverlayError::Other(msg.to_string())
    }
}

/// Extension trait for adding context to Results.
///
/// # Example
/// ```ignore
/// use crate::error::{ResultExt, OverlayResult};
///
/// fn load() -> OverlayResult<String> {
///     std::fs::read_to_string("overlay.json").context("failed to read config file")
/// }
/// ```
pub trait ResultExt<T> {
    /// Add context to an error, converting it to OverlayError::Other.
    fn context(self, msg: &str) -> OverlayResult<T>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context(self, msg: &str) -> OverlayResult<T> {
        self.map_err(|e| OverlayError::Other(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T> {
        self.map_err(|e| OverlayError::Other(format!("{}: {}", f(), e)))
    }
}

/// Extension trait for adding context to Option types.
pub trait OptionExt<T> {
    /// Convert None to OverlayError::Other with the given message.
    fn context(self, msg: &str) -> OverlayResult<T>;

    /// Convert None to OverlayError::Other with a lazily evaluated message.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context(self, msg: &str) -> OverlayResult<T> {
        self.ok_or_else(|| OverlayError::Other(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T> {
        self.ok_or_else(|| OverlayError::Other(f()))
    }
}

/// Type alias for Results using OverlayError.
pub type OverlayResult<T> = Result<T, OverlayError>;
