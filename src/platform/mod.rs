//! Platform binding.
//!
//! The window controller and render surface talk to the operating system
//! only through the two traits in this module. The binding is chosen once by
//! the host and passed in explicitly:
//!
//! - `WindowBackend`: window class, native window and message primitives.
//!   Object safe, shared across threads as `Arc<dyn WindowBackend>`.
//! - `GraphicsBackend`: drawing target, resources and primitives. Resource
//!   types are associated types so the surface never sees raw COM pointers.
//!
//! `win32` holds the real Win32 + Direct2D implementation. `fake` holds the
//! in-memory doubles the test suite drives.

#[cfg(test)]
pub mod fake;
#[cfg(windows)]
pub mod win32;

use thiserror::Error;

use crate::types::{Color, PointF, Rect, RectF, Size, SizeF};

/// Opaque native window handle (HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub isize);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Errors reported by platform backends.
///
/// Callers translate these into `OverlayError` variants depending on what
/// they were doing when the failure happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A window class with this name is already registered
    #[error("window class already exists")]
    ClassExists,

    /// The graphics device was lost and the target must be recreated
    #[error("graphics device lost")]
    DeviceLost,

    /// The requested pixel format is not supported by the device
    #[error("pixel format not supported")]
    UnsupportedFormat,

    /// Any other native failure
    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    pub fn failed(msg: impl Into<String>) -> Self {
        BackendError::Failed(msg.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Everything needed to create one native overlay window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDescriptor {
    pub class_name: String,
    pub title: String,
    pub bounds: Rect,
    pub topmost: bool,
    pub visible: bool,
    pub alpha: u8,
}

/// Commands marshaled onto the window's own thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Destroy,
    Recreate,
}

/// One unit of work pulled off the window thread's message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    /// A command posted with `post_command`
    Command(WindowCommand),
    /// Desktop composition was toggled; the frame extension must be reapplied
    CompositionChanged,
    /// The native window with this handle has been destroyed
    Destroyed(NativeHandle),
    /// The thread's queue was told to quit
    Quit,
}

/// Window, class and message primitives.
///
/// Every method except `post_command` must be called on the thread that owns
/// the window's message queue, or be safe to call cross-thread (Win32 window
/// positioning calls are, and they synchronously wait on the owning thread).
pub trait WindowBackend: Send + Sync {
    fn register_class(&self, class_name: &str) -> BackendResult<()>;

    fn unregister_class(&self, class_name: &str) -> BackendResult<()>;

    /// Create a layered, transparent, click-through, non-activating popup.
    fn create_window(&self, desc: &WindowDescriptor) -> BackendResult<NativeHandle>;

    /// Destroy the window. A `WindowMessage::Destroyed` for the handle is
    /// queued to the owning thread.
    fn destroy_window(&self, handle: NativeHandle) -> BackendResult<()>;

    fn set_bounds(&self, handle: NativeHandle, bounds: Rect) -> BackendResult<()>;

    fn set_visible(&self, handle: NativeHandle, visible: bool) -> BackendResult<()>;

    fn set_topmost(&self, handle: NativeHandle, topmost: bool) -> BackendResult<()>;

    fn set_title(&self, handle: NativeHandle, title: &str) -> BackendResult<()>;

    /// Whole-window alpha for the layered window.
    fn set_layered_attributes(&self, handle: NativeHandle, alpha: u8) -> BackendResult<()>;

    /// Extend the compositor frame over the whole client area.
    fn extend_frame(&self, handle: NativeHandle) -> BackendResult<()>;

    /// Screen bounds of any top-level window.
    fn window_bounds(&self, target: NativeHandle) -> BackendResult<Rect>;

    /// Put `handle` directly above `target` in the z-order.
    fn place_above(&self, handle: NativeHandle, target: NativeHandle) -> BackendResult<()>;

    /// Post a command to the thread owning `handle`. Callable from any thread.
    fn post_command(&self, handle: NativeHandle, command: WindowCommand) -> BackendResult<()>;

    /// Block until the calling thread's queue yields something the window
    /// controller cares about. Ordinary messages are dispatched internally.
    fn next_message(&self) -> WindowMessage;
}

/// Pixel format requested for a drawing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit BGRA with premultiplied alpha
    Bgra8Premultiplied,
    /// Let the device pick
    Unknown,
}

/// Parameters a drawing target is created with. Kept by the surface so the
/// target can be recreated identically after device loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetParams {
    pub handle: NativeHandle,
    pub size: Size,
    pub format: PixelFormat,
    pub vsync: bool,
    pub antialiasing: bool,
    pub text_antialiasing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub family: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

/// Decoded image pixels, RGBA8, straight alpha, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Wraps raw pixels, checking the buffer length matches the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if width == 0 || height == 0 || pixels.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Pixels converted to premultiplied BGRA, the layout GPU bitmaps expect.
    pub fn to_premultiplied_bgra(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len());
        for px in self.pixels.chunks_exact(4) {
            let a = px[3] as u32;
            let premul = |c: u8| ((c as u32 * a + 127) / 255) as u8;
            out.extend_from_slice(&[premul(px[2]), premul(px[1]), premul(px[0]), px[3]]);
        }
        out
    }
}

/// Drawing primitives and resource factories.
///
/// All resources are created against a target and are only valid while that
/// target lives. Draw calls never fail individually; errors surface from
/// `end_draw`.
pub trait GraphicsBackend: Send + 'static {
    type Target;
    type Brush: Clone;
    type Font: Clone;
    type TextLayout;
    type Image: Clone;
    type Geometry: Clone;

    fn create_target(&self, params: &TargetParams) -> BackendResult<Self::Target>;

    fn resize_target(&self, target: &Self::Target, size: Size) -> BackendResult<()>;

    fn begin_draw(&self, target: &Self::Target);

    /// Finish the frame and present it.
    fn end_draw(&self, target: &Self::Target) -> BackendResult<()>;

    fn clear(&self, target: &Self::Target, color: Color);

    fn create_brush(&self, target: &Self::Target, color: Color) -> BackendResult<Self::Brush>;

    fn set_brush_color(&self, brush: &Self::Brush, color: Color);

    fn create_font(&self, target: &Self::Target, desc: &FontDescriptor)
        -> BackendResult<Self::Font>;

    fn create_text_layout(
        &self,
        target: &Self::Target,
        font: &Self::Font,
        text: &str,
    ) -> BackendResult<Self::TextLayout>;

    fn measure_layout(&self, layout: &Self::TextLayout) -> SizeF;

    fn create_image(&self, target: &Self::Target, data: &ImageData) -> BackendResult<Self::Image>;

    /// Build a polygon from `points`. Closed figures can be filled.
    fn create_geometry(
        &self,
        target: &Self::Target,
        points: &[PointF],
        closed: bool,
    ) -> BackendResult<Self::Geometry>;

    fn draw_line(
        &self,
        target: &Self::Target,
        from: PointF,
        to: PointF,
        brush: &Self::Brush,
        stroke: f32,
    );

    fn draw_rectangle(&self, target: &Self::Target, rect: RectF, brush: &Self::Brush, stroke: f32);

    fn fill_rectangle(&self, target: &Self::Target, rect: RectF, brush: &Self::Brush);

    fn draw_rounded_rectangle(
        &self,
        target: &Self::Target,
        rect: RectF,
        radius: f32,
        brush: &Self::Brush,
        stroke: f32,
    );

    fn fill_rounded_rectangle(
        &self,
        target: &Self::Target,
        rect: RectF,
        radius: f32,
        brush: &Self::Brush,
    );

    fn draw_ellipse(
        &self,
        target: &Self::Target,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &Self::Brush,
        stroke: f32,
    );

    fn fill_ellipse(
        &self,
        target: &Self::Target,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &Self::Brush,
    );

    fn draw_geometry(
        &self,
        target: &Self::Target,
        geometry: &Self::Geometry,
        brush: &Self::Brush,
        stroke: f32,
    );

    fn fill_geometry(&self, target: &Self::Target, geometry: &Self::Geometry, brush: &Self::Brush);

    fn draw_text_layout(
        &self,
        target: &Self::Target,
        origin: PointF,
        layout: &Self::TextLayout,
        brush: &Self::Brush,
    );

    fn draw_image(&self, target: &Self::Target, image: &Self::Image, dest: RectF, opacity: f32);
}
