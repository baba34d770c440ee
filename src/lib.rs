//! clearpane: transparent, click-through overlay windows with a
//! hardware-accelerated drawing surface that survives device loss, resize
//! and window recreation.
//!
//! ## Architecture
//!
//! ```text
//! FramePump ──────────── overlay-frame-pump thread
//!   │  owns RenderSurface (target, text layout cache, generation)
//!   │  drives FrameHandler::{setup, draw, destroy}
//!   │
//!   └─ listens to WindowController ── overlay-window thread
//!        owns the native window + message loop
//!
//! platform::{WindowBackend, GraphicsBackend}
//!   win32::{Win32Platform, Direct2D}  (Windows)
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use clearpane::platform::win32::{Direct2D, Win32Platform};
//!
//! let window = Arc::new(WindowController::new(
//!     Arc::new(Win32Platform::new()),
//!     WindowOptions::with_bounds(Rect::from_xywh(0, 0, 800, 600)),
//! ));
//! let pump = FramePump::new(window, Direct2D::new(), PumpOptions::default(), MyHud::default());
//! pump.start()?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod pump;
pub mod surface;
pub mod types;
pub mod window;

pub use config::{LoggingConfig, OverlayConfig, PumpOptions, SurfaceOptions, WindowOptions};
pub use error::{OverlayError, OverlayResult};
pub use platform::{FontDescriptor, GraphicsBackend, ImageData, NativeHandle, WindowBackend};
pub use pump::{FrameHandler, FrameInfo, FramePump, SetupKind};
pub use surface::{Brush, Font, FrameOutcome, Geometry, Image, RenderSurface};
pub use types::{Color, Point, PointF, Rect, RectF, Size, SizeF};
pub use window::{Lifecycle, ListenerId, WindowController, WindowEvent};
