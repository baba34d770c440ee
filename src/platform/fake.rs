//! In-memory platform doubles for the test suite.
//!
//! `FakeWindowBackend` keeps a table of "windows", a journal of every call and
//! a channel standing in for the thread message queue. `FakeGraphics` records
//! every drawing call into a shared journal and can be told to fail presents,
//! reject pixel formats or refuse to create targets.
//!
//! A `FakeWindowBackend` models a single message-loop thread: use one per
//! window controller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::{
    BackendError, BackendResult, FontDescriptor, GraphicsBackend, ImageData, NativeHandle,
    PixelFormat, TargetParams, WindowBackend, WindowCommand, WindowDescriptor, WindowMessage,
};
use crate::types::{Color, PointF, Rect, RectF, Size, SizeF};

// ============================================================================
// Window backend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WindowCall {
    RegisterClass(String),
    UnregisterClass(String),
    CreateWindow(NativeHandle),
    DestroyWindow {
        handle: NativeHandle,
        thread: Option<String>,
    },
    SetBounds(NativeHandle, Rect),
    SetVisible(NativeHandle, bool),
    SetTopmost(NativeHandle, bool),
    SetTitle(NativeHandle, String),
    SetLayered(NativeHandle, u8),
    ExtendFrame(NativeHandle),
    PlaceAbove(NativeHandle, NativeHandle),
    PostCommand(NativeHandle, WindowCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeWindow {
    pub class_name: String,
    pub title: String,
    pub bounds: Rect,
    pub visible: bool,
    pub topmost: bool,
    pub alpha: u8,
}

#[derive(Default)]
struct FakeWindowState {
    next_handle: isize,
    classes: HashSet<String>,
    windows: HashMap<NativeHandle, FakeWindow>,
    calls: Vec<WindowCall>,
    fail_create: VecDeque<String>,
    fail_extend_frame: bool,
}

pub struct FakeWindowBackend {
    state: Mutex<FakeWindowState>,
    queue_tx: Sender<WindowMessage>,
    queue_rx: Receiver<WindowMessage>,
}

impl Default for FakeWindowBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWindowBackend {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            state: Mutex::new(FakeWindowState {
                next_handle: 0x1000,
                ..Default::default()
            }),
            queue_tx,
            queue_rx,
        }
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&WindowCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn window(&self, handle: NativeHandle) -> Option<FakeWindow> {
        self.state.lock().windows.get(&handle).cloned()
    }

    pub fn live_windows(&self) -> usize {
        self.state.lock().windows.len()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.state.lock().classes.contains(name)
    }

    /// Register a class as if another component already owned the name.
    pub fn reserve_class(&self, name: &str) {
        self.state.lock().classes.insert(name.to_string());
    }

    /// Make the next `create_window` call fail with `msg`.
    pub fn fail_next_create(&self, msg: &str) {
        self.state.lock().fail_create.push_back(msg.to_string());
    }

    pub fn fail_extend_frame(&self, fail: bool) {
        self.state.lock().fail_extend_frame = fail;
    }

    /// A window the controller does not own, for `fit_to`/`place_above`.
    pub fn add_foreign_window(&self, bounds: Rect) -> NativeHandle {
        let mut state = self.state.lock();
        let handle = Self::allocate_handle(&mut state);
        state.windows.insert(
            handle,
            FakeWindow {
                class_name: "foreign".to_string(),
                title: "foreign".to_string(),
                bounds,
                visible: true,
                topmost: false,
                alpha: 255,
            },
        );
        handle
    }

    /// Queue a message as if the OS had delivered it.
    pub fn inject(&self, message: WindowMessage) {
        let _ = self.queue_tx.send(message);
    }

    fn allocate_handle(state: &mut FakeWindowState) -> NativeHandle {
        state.next_handle += 0x10;
        NativeHandle(state.next_handle)
    }

    fn with_window(
        &self,
        handle: NativeHandle,
        call: WindowCall,
        f: impl FnOnce(&mut FakeWindow),
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        let window = state
            .windows
            .get_mut(&handle)
            .ok_or_else(|| BackendError::failed("invalid window handle"))?;
        f(window);
        Ok(())
    }
}

impl WindowBackend for FakeWindowBackend {
    fn register_class(&self, class_name: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(WindowCall::RegisterClass(class_name.to_string()));
        if !state.classes.insert(class_name.to_string()) {
            return Err(BackendError::ClassExists);
        }
        Ok(())
    }

    fn unregister_class(&self, class_name: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(WindowCall::UnregisterClass(class_name.to_string()));
        if !state.classes.remove(class_name) {
            return Err(BackendError::failed("class not registered"));
        }
        Ok(())
    }

    fn create_window(&self, desc: &WindowDescriptor) -> BackendResult<NativeHandle> {
        let mut state = self.state.lock();
        if let Some(msg) = state.fail_create.pop_front() {
            return Err(BackendError::Failed(msg));
        }
        if !state.classes.contains(&desc.class_name) {
            return Err(BackendError::failed("class not registered"));
        }
        let handle = Self::allocate_handle(&mut state);
        state.windows.insert(
            handle,
            FakeWindow {
                class_name: desc.class_name.clone(),
                title: desc.title.clone(),
                bounds: desc.bounds,
                visible: desc.visible,
                topmost: desc.topmost,
                alpha: 255,
            },
        );
        state.calls.push(WindowCall::CreateWindow(handle));
        Ok(handle)
    }

    fn destroy_window(&self, handle: NativeHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(WindowCall::DestroyWindow {
            handle,
            thread: std::thread::current().name().map(str::to_string),
        });
        if state.windows.remove(&handle).is_none() {
            return Err(BackendError::failed("invalid window handle"));
        }
        let _ = self.queue_tx.send(WindowMessage::Destroyed(handle));
        Ok(())
    }

    fn set_bounds(&self, handle: NativeHandle, bounds: Rect) -> BackendResult<()> {
        self.with_window(handle, WindowCall::SetBounds(handle, bounds), |w| {
            w.bounds = bounds
        })
    }

    fn set_visible(&self, handle: NativeHandle, visible: bool) -> BackendResult<()> {
        self.with_window(handle, WindowCall::SetVisible(handle, visible), |w| {
            w.visible = visible
        })
    }

    fn set_topmost(&self, handle: NativeHandle, topmost: bool) -> BackendResult<()> {
        self.with_window(handle, WindowCall::SetTopmost(handle, topmost), |w| {
            w.topmost = topmost
        })
    }

    fn set_title(&self, handle: NativeHandle, title: &str) -> BackendResult<()> {
        self.with_window(
            handle,
            WindowCall::SetTitle(handle, title.to_string()),
            |w| w.title = title.to_string(),
        )
    }

    fn set_layered_attributes(&self, handle: NativeHandle, alpha: u8) -> BackendResult<()> {
        self.with_window(handle, WindowCall::SetLayered(handle, alpha), |w| {
            w.alpha = alpha
        })
    }

    fn extend_frame(&self, handle: NativeHandle) -> BackendResult<()> {
        if self.state.lock().fail_extend_frame {
            return Err(BackendError::failed("composition disabled"));
        }
        self.with_window(handle, WindowCall::ExtendFrame(handle), |_| {})
    }

    fn window_bounds(&self, target: NativeHandle) -> BackendResult<Rect> {
        self.state
            .lock()
            .windows
            .get(&target)
            .map(|w| w.bounds)
            .ok_or_else(|| BackendError::failed("invalid window handle"))
    }

    fn place_above(&self, handle: NativeHandle, target: NativeHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(WindowCall::PlaceAbove(handle, target));
        if !state.windows.contains_key(&handle) || !state.windows.contains_key(&target) {
            return Err(BackendError::failed("invalid window handle"));
        }
        Ok(())
    }

    fn post_command(&self, handle: NativeHandle, command: WindowCommand) -> BackendResult<()> {
        {
            let mut state = self.state.lock();
            state.calls.push(WindowCall::PostCommand(handle, command));
            if !state.windows.contains_key(&handle) {
                return Err(BackendError::failed("invalid window handle"));
            }
        }
        self.queue_tx
            .send(WindowMessage::Command(command))
            .map_err(|e| BackendError::failed(e.to_string()))
    }

    fn next_message(&self) -> WindowMessage {
        self.queue_rx.recv().unwrap_or(WindowMessage::Quit)
    }
}

// ============================================================================
// Graphics backend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsCall {
    CreateTarget(TargetParams),
    DropTarget(u64),
    ResizeTarget(u64, Size),
    BeginDraw(u64),
    EndDraw(u64),
    Clear(u64, Color),
    CreateBrush(Color),
    SetBrushColor(u64, Color),
    CreateFont(String),
    CreateTextLayout(String),
    CreateImage(u32, u32),
    CreateGeometry { points: usize, closed: bool },
    DrawLine,
    DrawRectangle,
    FillRectangle,
    DrawRoundedRectangle,
    FillRoundedRectangle,
    DrawEllipse { radius_x: f32, radius_y: f32 },
    FillEllipse { radius_x: f32, radius_y: f32 },
    DrawGeometry(u64),
    FillGeometry(u64),
    DrawText(String),
    DrawImage(u64),
}

#[derive(Default)]
struct FakeGraphicsState {
    calls: Vec<GraphicsCall>,
    next_id: u64,
    unsupported_formats: Vec<PixelFormat>,
    fail_target_creations: usize,
    present_failures: VecDeque<BackendError>,
    resize_failures: VecDeque<BackendError>,
    live_targets: usize,
}

impl FakeGraphicsState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Graphics double. Clones share one journal, so a test can keep a clone
/// after handing the backend to a surface or pump.
#[derive(Clone, Default)]
pub struct FakeGraphics {
    state: Arc<Mutex<FakeGraphicsState>>,
}

pub struct FakeTarget {
    pub id: u64,
    pub params: TargetParams,
    state: Arc<Mutex<FakeGraphicsState>>,
}

impl Drop for FakeTarget {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live_targets = state.live_targets.saturating_sub(1);
        state.calls.push(GraphicsCall::DropTarget(self.id));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeBrush {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeFont {
    pub id: u64,
    pub family: String,
    pub size: f32,
}

#[derive(Debug, PartialEq)]
pub struct FakeLayout {
    pub id: u64,
    pub text: String,
    pub font_size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeImage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeGeometry {
    pub id: u64,
    pub points: usize,
    pub closed: bool,
}

impl FakeGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GraphicsCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&GraphicsCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Parameters of every target created so far, oldest first.
    pub fn created_targets(&self) -> Vec<TargetParams> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GraphicsCall::CreateTarget(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn live_targets(&self) -> usize {
        self.state.lock().live_targets
    }

    pub fn reject_format(&self, format: PixelFormat) {
        self.state.lock().unsupported_formats.push(format);
    }

    /// Make the next `count` target creations fail with a generic error.
    pub fn fail_target_creations(&self, count: usize) {
        self.state.lock().fail_target_creations = count;
    }

    /// Queue an error for the next `end_draw`.
    pub fn fail_next_present(&self, err: BackendError) {
        self.state.lock().present_failures.push_back(err);
    }

    /// Queue an error for the next `resize_target`.
    pub fn fail_next_resize(&self, err: BackendError) {
        self.state.lock().resize_failures.push_back(err);
    }

    fn record(&self, call: GraphicsCall) {
        self.state.lock().calls.push(call);
    }
}

impl GraphicsBackend for FakeGraphics {
    type Target = FakeTarget;
    type Brush = FakeBrush;
    type Font = FakeFont;
    type TextLayout = FakeLayout;
    type Image = FakeImage;
    type Geometry = FakeGeometry;

    fn create_target(&self, params: &TargetParams) -> BackendResult<FakeTarget> {
        let mut state = self.state.lock();
        state.calls.push(GraphicsCall::CreateTarget(*params));
        if state.unsupported_formats.contains(&params.format) {
            return Err(BackendError::UnsupportedFormat);
        }
        if state.fail_target_creations > 0 {
            state.fail_target_creations -= 1;
            return Err(BackendError::failed("device unavailable"));
        }
        state.live_targets += 1;
        Ok(FakeTarget {
            id: state.next_id(),
            params: *params,
            state: self.state.clone(),
        })
    }

    fn resize_target(&self, target: &FakeTarget, size: Size) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GraphicsCall::ResizeTarget(target.id, size));
        match state.resize_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn begin_draw(&self, target: &FakeTarget) {
        self.record(GraphicsCall::BeginDraw(target.id));
    }

    fn end_draw(&self, target: &FakeTarget) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GraphicsCall::EndDraw(target.id));
        match state.present_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn clear(&self, target: &FakeTarget, color: Color) {
        self.record(GraphicsCall::Clear(target.id, color));
    }

    fn create_brush(&self, _target: &FakeTarget, color: Color) -> BackendResult<FakeBrush> {
        let mut state = self.state.lock();
        state.calls.push(GraphicsCall::CreateBrush(color));
        Ok(FakeBrush {
            id: state.next_id(),
        })
    }

    fn set_brush_color(&self, brush: &FakeBrush, color: Color) {
        self.record(GraphicsCall::SetBrushColor(brush.id, color));
    }

    fn create_font(&self, _target: &FakeTarget, desc: &FontDescriptor) -> BackendResult<FakeFont> {
        if desc.size <= 0.0 {
            return Err(BackendError::failed("font size must be positive"));
        }
        let mut state = self.state.lock();
        state
            .calls
            .push(GraphicsCall::CreateFont(desc.family.clone()));
        Ok(FakeFont {
            id: state.next_id(),
            family: desc.family.clone(),
            size: desc.size,
        })
    }

    fn create_text_layout(
        &self,
        _target: &FakeTarget,
        font: &FakeFont,
        text: &str,
    ) -> BackendResult<FakeLayout> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GraphicsCall::CreateTextLayout(text.to_string()));
        Ok(FakeLayout {
            id: state.next_id(),
            text: text.to_string(),
            font_size: font.size,
        })
    }

    fn measure_layout(&self, layout: &FakeLayout) -> SizeF {
        // Half an em per character, one em tall
        SizeF::new(
            layout.text.chars().count() as f32 * layout.font_size * 0.5,
            layout.font_size,
        )
    }

    fn create_image(&self, _target: &FakeTarget, data: &ImageData) -> BackendResult<FakeImage> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GraphicsCall::CreateImage(data.width, data.height));
        Ok(FakeImage {
            id: state.next_id(),
            width: data.width,
            height: data.height,
        })
    }

    fn create_geometry(
        &self,
        _target: &FakeTarget,
        points: &[PointF],
        closed: bool,
    ) -> BackendResult<FakeGeometry> {
        if points.len() < 2 {
            return Err(BackendError::failed("geometry needs at least two points"));
        }
        let mut state = self.state.lock();
        state.calls.push(GraphicsCall::CreateGeometry {
            points: points.len(),
            closed,
        });
        Ok(FakeGeometry {
            id: state.next_id(),
            points: points.len(),
            closed,
        })
    }

    fn draw_line(&self, _: &FakeTarget, _: PointF, _: PointF, _: &FakeBrush, _: f32) {
        self.record(GraphicsCall::DrawLine);
    }

    fn draw_rectangle(&self, _: &FakeTarget, _: RectF, _: &FakeBrush, _: f32) {
        self.record(GraphicsCall::DrawRectangle);
    }

    fn fill_rectangle(&self, _: &FakeTarget, _: RectF, _: &FakeBrush) {
        self.record(GraphicsCall::FillRectangle);
    }

    fn draw_rounded_rectangle(&self, _: &FakeTarget, _: RectF, _: f32, _: &FakeBrush, _: f32) {
        self.record(GraphicsCall::DrawRoundedRectangle);
    }

    fn fill_rounded_rectangle(&self, _: &FakeTarget, _: RectF, _: f32, _: &FakeBrush) {
        self.record(GraphicsCall::FillRoundedRectangle);
    }

    fn draw_ellipse(
        &self,
        _: &FakeTarget,
        _: PointF,
        radius_x: f32,
        radius_y: f32,
        _: &FakeBrush,
        _: f32,
    ) {
        self.record(GraphicsCall::DrawEllipse { radius_x, radius_y });
    }

    fn fill_ellipse(&self, _: &FakeTarget, _: PointF, radius_x: f32, radius_y: f32, _: &FakeBrush) {
        self.record(GraphicsCall::FillEllipse { radius_x, radius_y });
    }

    fn draw_geometry(&self, _: &FakeTarget, geometry: &FakeGeometry, _: &FakeBrush, _: f32) {
        self.record(GraphicsCall::DrawGeometry(geometry.id));
    }

    fn fill_geometry(&self, _: &FakeTarget, geometry: &FakeGeometry, _: &FakeBrush) {
        self.record(GraphicsCall::FillGeometry(geometry.id));
    }

    fn draw_text_layout(&self, _: &FakeTarget, _: PointF, layout: &FakeLayout, _: &FakeBrush) {
        self.record(GraphicsCall::DrawText(layout.text.clone()));
    }

    fn draw_image(&self, _: &FakeTarget, image: &FakeImage, _: RectF, _: f32) {
        self.record(GraphicsCall::DrawImage(image.id));
    }
}
