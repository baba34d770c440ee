//! Render surface bound to an overlay window.
//!
//! `RenderSurface` owns the native drawing target and everything created
//! against it. It negotiates the pixel format when binding, applies resize
//! requests between frames, and rebuilds the target transparently when the
//! device is lost.
//!
//! ## Frame protocol
//!
//! ```text
//! begin_scene()   apply pending resize, start drawing (idempotent)
//! clear()/draw_*  only while drawing, only with current-generation resources
//! end_scene()     present
//!                   DeviceLost  -> flush cache, drop target, generation += 1,
//!                                  recreate, notify listeners -> Recreated
//!                   other error -> OverlayError::Present (surface kept)
//! ```
//!
//! The surface is confined to the thread that created it.

pub mod cache;
pub mod fps;
pub mod resources;


use std::marker::PhantomData;
use std::time::Instant;

use crate::config::SurfaceOptions;
use crate::error::{OverlayError, OverlayResult};
use crate::platform::{
    BackendError, FontDescriptor, GraphicsBackend, ImageData, NativeHandle, PixelFormat,
    TargetParams,
};
use crate::types::{Color, PointF, RectF, Size, SizeF};

pub use cache::TextLayoutCache;
pub use fps::FrameCounter;
pub use resources::{Brush, Font, Geometry, Image};

/// What `end_scene` did with the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No scene was open
    Skipped,
    Presented,
    /// The device was lost; the target was rebuilt and resources must be
    /// recreated
    Recreated,
}

type LostListener = Box<dyn FnMut(u64)>;

pub struct RenderSurface<B: GraphicsBackend> {
    backend: B,
    options: SurfaceOptions,
    target: Option<B::Target>,
    params: Option<TargetParams>,
    size: Size,
    drawing: bool,
    pending_resize: Option<Size>,
    generation: u64,
    text_cache: TextLayoutCache<B::TextLayout>,
    frame_counter: Option<FrameCounter>,
    lost_listeners: Vec<LostListener>,
    next_font_id: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl<B: GraphicsBackend> RenderSurface<B> {
    /// Create an unbound surface.
    pub fn new(backend: B, options: SurfaceOptions) -> Self {
        Self {
            backend,
            options,
            target: None,
            params: None,
            size: Size::default(),
            drawing: false,
            pending_resize: None,
            generation: 0,
            text_cache: TextLayoutCache::new(),
            frame_counter: options.measure_fps.then(FrameCounter::new),
            lost_listeners: Vec::new(),
            next_font_id: 1,
            _thread_bound: PhantomData,
        }
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Create the drawing target for a window.
    ///
    /// Tries premultiplied BGRA first and falls back to a device-chosen
    /// format if that is unsupported. Binding an already bound surface
    /// replaces its target and notifies `on_resources_lost` listeners, as
    /// `rebind` does.
    pub fn bind(&mut self, handle: NativeHandle, width: u32, height: u32) -> OverlayResult<()> {
        if handle.is_null() {
            return Err(OverlayError::InvalidHandle);
        }

        let rebinding = self.target.is_some();
        if rebinding {
            self.drawing = false;
            self.teardown();
            self.generation += 1;
        }

        let size = Size::new(width.max(1), height.max(1));
        let (target, params) = self.negotiate_target(handle, size)?;
        log::info!(
            "[SURFACE] Bound to {:?} at {}x{} ({:?})",
            handle,
            size.width,
            size.height,
            params.format
        );

        self.target = Some(target);
        self.params = Some(params);
        self.size = size;
        self.pending_resize = None;
        if rebinding {
            self.notify_resources_lost();
        }
        Ok(())
    }

    /// Rebuild against a new window handle, e.g. after the window was
    /// recreated. Listeners registered with `on_resources_lost` are notified.
    pub fn rebind(&mut self, handle: NativeHandle) -> OverlayResult<()> {
        if handle.is_null() {
            return Err(OverlayError::InvalidHandle);
        }
        if self.params.is_none() {
            return Err(OverlayError::NotBound);
        }

        self.drawing = false;
        self.teardown();
        self.generation += 1;

        let size = self.pending_resize.take().unwrap_or(self.size);
        let (target, params) = self.negotiate_target(handle, size)?;
        self.target = Some(target);
        self.params = Some(params);
        self.size = size;

        log::info!(
            "[SURFACE] Rebound to {:?} (generation {})",
            handle,
            self.generation
        );
        self.notify_resources_lost();
        Ok(())
    }

    fn negotiate_target(
        &self,
        handle: NativeHandle,
        size: Size,
    ) -> OverlayResult<(B::Target, TargetParams)> {
        let mut params = TargetParams {
            handle,
            size,
            format: PixelFormat::Bgra8Premultiplied,
            vsync: self.options.vsync,
            antialiasing: self.options.antialiasing,
            text_antialiasing: self.options.text_antialiasing,
        };

        match self.backend.create_target(&params) {
            Ok(target) => Ok((target, params)),
            Err(BackendError::UnsupportedFormat) => {
                log::warn!("[SURFACE] Premultiplied BGRA unsupported, falling back to device format");
                params.format = PixelFormat::Unknown;
                let target = self.backend.create_target(&params).map_err(|e| {
                    OverlayError::SurfaceCreation(format!("Fallback format failed: {}", e))
                })?;
                Ok((target, params))
            }
            Err(e) => Err(OverlayError::SurfaceCreation(e.to_string())),
        }
    }

    /// Release the target and every cached resource. The surface can be
    /// bound again afterwards.
    pub fn release(&mut self) {
        if self.target.is_none() {
            return;
        }
        if self.drawing {
            self.drawing = false;
            if let Some(target) = self.target.as_ref() {
                if let Err(e) = self.backend.end_draw(target) {
                    log::debug!("[SURFACE] Closing open scene on release failed: {}", e);
                }
            }
        }
        self.teardown();
        self.params = None;
        self.pending_resize = None;
        log::debug!("[SURFACE] Released");
    }

    fn teardown(&mut self) {
        self.text_cache.flush();
        self.target = None;
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Start a frame. Does nothing if a frame is already open.
    ///
    /// A pending resize is applied first. If that loses the device the
    /// target is rebuilt, `generation()` moves on and the lost-resource
    /// listeners fire before drawing starts.
    pub fn begin_scene(&mut self) -> OverlayResult<()> {
        if self.target.is_none() {
            return Err(OverlayError::NotBound);
        }
        if self.drawing {
            return Ok(());
        }

        if let Some(size) = self.pending_resize.take() {
            if size != self.size {
                self.apply_resize(size)?;
            }
        }

        self.backend.begin_draw(self.target_ref()?);
        self.drawing = true;
        Ok(())
    }

    /// Resize the target between frames.
    ///
    /// Device loss rebuilds the target at the new size (bumping the
    /// generation). Any other failure keeps the old size and re-queues the
    /// request for the next frame.
    fn apply_resize(&mut self, size: Size) -> OverlayResult<()> {
        let result = self.backend.resize_target(self.target_ref()?, size);

        match result {
            Ok(()) => {
                self.record_size(size);
                log::debug!("[SURFACE] Resized to {}x{}", size.width, size.height);
                Ok(())
            }
            Err(BackendError::DeviceLost) => {
                self.record_size(size);
                self.recover_device()
            }
            Err(e) => {
                log::warn!(
                    "[SURFACE] Resize to {}x{} failed, keeping {}x{}: {}",
                    size.width,
                    size.height,
                    self.size.width,
                    self.size.height,
                    e
                );
                self.pending_resize.get_or_insert(size);
                Ok(())
            }
        }
    }

    fn record_size(&mut self, size: Size) {
        self.size = size;
        if let Some(params) = self.params.as_mut() {
            params.size = size;
        }
    }

    /// Finish the frame and present it.
    pub fn end_scene(&mut self) -> OverlayResult<FrameOutcome> {
        if !self.drawing {
            return Ok(FrameOutcome::Skipped);
        }
        self.drawing = false;

        let presented = self.backend.end_draw(self.target_ref()?);
        match presented {
            Ok(()) => {
                if let Some(counter) = self.frame_counter.as_mut() {
                    if let Some(fps) = counter.tick(Instant::now()) {
                        log::trace!("[SURFACE] {} fps", fps);
                    }
                }
                Ok(FrameOutcome::Presented)
            }
            Err(BackendError::DeviceLost) => {
                self.recover_device()?;
                Ok(FrameOutcome::Recreated)
            }
            Err(e) => Err(OverlayError::Present(e.to_string())),
        }
    }

    fn recover_device(&mut self) -> OverlayResult<()> {
        let params = self.params.ok_or(OverlayError::NotBound)?;
        log::warn!(
            "[SURFACE] Device lost, recreating target (generation {} -> {})",
            self.generation,
            self.generation + 1
        );

        self.teardown();
        self.generation += 1;

        let target = self
            .backend
            .create_target(&params)
            .map_err(|e| OverlayError::DeviceRecreation(e.to_string()))?;
        self.target = Some(target);

        self.notify_resources_lost();
        Ok(())
    }

    fn notify_resources_lost(&mut self) {
        let generation = self.generation;
        for listener in self.lost_listeners.iter_mut() {
            listener(generation);
        }
    }

    /// Record a new target size, applied at the next `begin_scene`. Later
    /// requests replace earlier ones.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending_resize = Some(Size::new(width.max(1), height.max(1)));
    }

    /// Register a callback run every time the target is rebuilt. It receives
    /// the new generation.
    pub fn on_resources_lost<F>(&mut self, listener: F)
    where
        F: FnMut(u64) + 'static,
    {
        self.lost_listeners.push(Box::new(listener));
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn create_brush(&self, color: Color) -> OverlayResult<Brush<B>> {
        let native = self
            .backend
            .create_brush(self.target_ref()?, color)
            .map_err(|e| resource_error("brush", e))?;
        Ok(Brush {
            native,
            generation: self.generation,
        })
    }

    pub fn set_brush_color(&self, brush: &Brush<B>, color: Color) -> OverlayResult<()> {
        self.target_ref()?;
        self.check_generation(brush.generation)?;
        self.backend.set_brush_color(&brush.native, color);
        Ok(())
    }

    pub fn create_font(&mut self, desc: &FontDescriptor) -> OverlayResult<Font<B>> {
        let native = self
            .backend
            .create_font(self.target_ref()?, desc)
            .map_err(|e| resource_error("font", e))?;
        let id = self.next_font_id;
        self.next_font_id += 1;
        Ok(Font {
            id,
            descriptor: desc.clone(),
            native,
            generation: self.generation,
        })
    }

    pub fn create_image(&self, data: &ImageData) -> OverlayResult<Image<B>> {
        let native = self
            .backend
            .create_image(self.target_ref()?, data)
            .map_err(|e| resource_error("image", e))?;
        Ok(Image {
            native,
            size: Size::new(data.width, data.height),
            generation: self.generation,
        })
    }

    pub fn create_geometry(&self, points: &[PointF], closed: bool) -> OverlayResult<Geometry<B>> {
        let native = self
            .backend
            .create_geometry(self.target_ref()?, points, closed)
            .map_err(|e| resource_error("geometry", e))?;
        Ok(Geometry {
            native,
            generation: self.generation,
        })
    }

    /// Size of `text` shaped with `font`. Shares the draw path's layout cache.
    pub fn measure_text(&mut self, font: &Font<B>, text: &str) -> OverlayResult<SizeF> {
        self.check_generation(font.generation)?;
        let target = self.target.as_ref().ok_or(OverlayError::NotBound)?;
        let backend = &self.backend;
        let layout = self
            .text_cache
            .get_or_create(text, font.id, || {
                backend.create_text_layout(target, &font.native, text)
            })
            .map_err(|e| resource_error("text layout", e))?;
        Ok(backend.measure_layout(layout))
    }

    pub fn flush_text_cache(&mut self) -> usize {
        self.text_cache.flush()
    }

    pub fn text_cache_len(&self) -> usize {
        self.text_cache.len()
    }

    // ------------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------------

    pub fn clear(&self, color: Color) -> OverlayResult<()> {
        let target = self.drawing_target("clear")?;
        self.backend.clear(target, color);
        Ok(())
    }

    pub fn draw_line(
        &self,
        from: PointF,
        to: PointF,
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("draw_line")?;
        self.check_generation(brush.generation)?;
        self.backend.draw_line(target, from, to, &brush.native, stroke);
        Ok(())
    }

    pub fn draw_rectangle(&self, rect: RectF, brush: &Brush<B>, stroke: f32) -> OverlayResult<()> {
        let target = self.drawing_target("draw_rectangle")?;
        self.check_generation(brush.generation)?;
        self.backend.draw_rectangle(target, rect, &brush.native, stroke);
        Ok(())
    }

    pub fn fill_rectangle(&self, rect: RectF, brush: &Brush<B>) -> OverlayResult<()> {
        let target = self.drawing_target("fill_rectangle")?;
        self.check_generation(brush.generation)?;
        self.backend.fill_rectangle(target, rect, &brush.native);
        Ok(())
    }

    pub fn draw_rounded_rectangle(
        &self,
        rect: RectF,
        radius: f32,
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("draw_rounded_rectangle")?;
        self.check_generation(brush.generation)?;
        self.backend
            .draw_rounded_rectangle(target, rect, radius, &brush.native, stroke);
        Ok(())
    }

    pub fn fill_rounded_rectangle(
        &self,
        rect: RectF,
        radius: f32,
        brush: &Brush<B>,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("fill_rounded_rectangle")?;
        self.check_generation(brush.generation)?;
        self.backend
            .fill_rounded_rectangle(target, rect, radius, &brush.native);
        Ok(())
    }

    pub fn draw_ellipse(
        &self,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("draw_ellipse")?;
        self.check_generation(brush.generation)?;
        self.backend
            .draw_ellipse(target, center, radius_x, radius_y, &brush.native, stroke);
        Ok(())
    }

    pub fn fill_ellipse(
        &self,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &Brush<B>,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("fill_ellipse")?;
        self.check_generation(brush.generation)?;
        self.backend
            .fill_ellipse(target, center, radius_x, radius_y, &brush.native);
        Ok(())
    }

    pub fn draw_circle(
        &self,
        center: PointF,
        radius: f32,
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        self.draw_ellipse(center, radius, radius, brush, stroke)
    }

    pub fn fill_circle(&self, center: PointF, radius: f32, brush: &Brush<B>) -> OverlayResult<()> {
        self.fill_ellipse(center, radius, radius, brush)
    }

    pub fn draw_triangle(
        &self,
        points: [PointF; 3],
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        self.drawing_target("draw_triangle")?;
        let geometry = self.create_geometry(&points, true)?;
        self.draw_geometry(&geometry, brush, stroke)
    }

    pub fn fill_triangle(&self, points: [PointF; 3], brush: &Brush<B>) -> OverlayResult<()> {
        self.drawing_target("fill_triangle")?;
        let geometry = self.create_geometry(&points, true)?;
        self.fill_geometry(&geometry, brush)
    }

    pub fn draw_geometry(
        &self,
        geometry: &Geometry<B>,
        brush: &Brush<B>,
        stroke: f32,
    ) -> OverlayResult<()> {
        let target = self.drawing_target("draw_geometry")?;
        self.check_generation(geometry.generation)?;
        self.check_generation(brush.generation)?;
        self.backend
            .draw_geometry(target, &geometry.native, &brush.native, stroke);
        Ok(())
    }

    pub fn fill_geometry(&self, geometry: &Geometry<B>, brush: &Brush<B>) -> OverlayResult<()> {
        let target = self.drawing_target("fill_geometry")?;
        self.check_generation(geometry.generation)?;
        self.check_generation(brush.generation)?;
        self.backend
            .fill_geometry(target, &geometry.native, &brush.native);
        Ok(())
    }

    pub fn draw_text(
        &mut self,
        font: &Font<B>,
        text: &str,
        origin: PointF,
        brush: &Brush<B>,
    ) -> OverlayResult<()> {
        self.drawing_target("draw_text")?;
        self.check_generation(font.generation)?;
        self.check_generation(brush.generation)?;

        let target = self.target.as_ref().ok_or(OverlayError::NotBound)?;
        let backend = &self.backend;
        let layout = self
            .text_cache
            .get_or_create(text, font.id, || {
                backend.create_text_layout(target, &font.native, text)
            })
            .map_err(|e| resource_error("text layout", e))?;
        backend.draw_text_layout(target, origin, layout, &brush.native);
        Ok(())
    }

    /// Draw text over a filled box sized to the text plus `padding` on every
    /// side. Returns the box.
    pub fn draw_text_with_background(
        &mut self,
        font: &Font<B>,
        text: &str,
        origin: PointF,
        brush: &Brush<B>,
        background: &Brush<B>,
        padding: f32,
    ) -> OverlayResult<RectF> {
        self.drawing_target("draw_text_with_background")?;
        self.check_generation(background.generation)?;

        let size = self.measure_text(font, text)?;
        let rect = RectF::from_xywh(origin.x, origin.y, size.width, size.height).inflate(padding);
        self.fill_rectangle(rect, background)?;
        self.draw_text(font, text, origin, brush)?;
        Ok(rect)
    }

    pub fn draw_image(&self, image: &Image<B>, dest: RectF, opacity: f32) -> OverlayResult<()> {
        let target = self.drawing_target("draw_image")?;
        self.check_generation(image.generation)?;
        self.backend
            .draw_image(target, &image.native, dest, opacity.clamp(0.0, 1.0));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pending_resize(&self) -> Option<Size> {
        self.pending_resize
    }

    /// Incremented every time the target is rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.params.map(|p| p.format)
    }

    /// Last measured frame rate, 0 when measurement is off or no full
    /// second has elapsed yet.
    pub fn fps(&self) -> u32 {
        self.frame_counter.as_ref().map_or(0, FrameCounter::fps)
    }

    pub fn options(&self) -> SurfaceOptions {
        self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn target_ref(&self) -> OverlayResult<&B::Target> {
        self.target.as_ref().ok_or(OverlayError::NotBound)
    }

    fn drawing_target(&self, op: &'static str) -> OverlayResult<&B::Target> {
        if !self.drawing {
            return Err(OverlayError::NotDrawing(op));
        }
        self.target_ref()
    }

    fn check_generation(&self, resource: u64) -> OverlayResult<()> {
        if resource != self.generation {
            return Err(OverlayError::StaleResource {
                resource,
                current: self.generation,
            });
        }
        Ok(())
    }
}

impl<B: GraphicsBackend> Drop for RenderSurface<B> {
    fn drop(&mut self) {
        self.release();
    }
}

fn resource_error(kind: &str, err: BackendError) -> OverlayError {
    OverlayError::Resource(format!("Failed to create {}: {}", kind, err))
}
