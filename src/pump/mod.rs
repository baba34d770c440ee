//! Frame pump.
//!
//! Drives a user `FrameHandler` on a dedicated render thread at a target
//! frame rate. The thread owns the `RenderSurface`; the window controller's
//! events reach it through atomics and single-slot mailboxes:
//!
//! - `VisibilityChanged` sets the auto-pause flag (no drawing while hidden)
//! - `SizeChanged` is forwarded to `RenderSurface::request_resize`
//! - `Recreated` rebinds the surface to the new handle and reruns setup
//!
//! Explicit `pause()` is independent of auto-pause; frames are drawn only
//! when both are clear.

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::config::{self, PumpOptions, MAX_FRAME_RATE};
use crate::error::{OptionExt, OverlayError, OverlayResult};
use crate::platform::{GraphicsBackend, NativeHandle};
use crate::surface::{FrameCounter, FrameOutcome, RenderSurface};
use crate::types::Size;
use crate::window::{ListenerId, WindowController, WindowEvent};

/// Sleep between checks while paused.
pub const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(10);

const PUMP_THREAD_NAME: &str = "overlay-frame-pump";

/// Why `FrameHandler::setup` is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupKind {
    /// First bind after `start()`
    Initial,
    /// The target was rebuilt (device loss or window recreation); every
    /// resource from before is stale
    Recreated,
}

/// Per-frame timing passed to `FrameHandler::draw`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Zero-based index of this frame since `start()`
    pub index: u64,
    /// Time since the previous frame started
    pub delta: Duration,
    /// Last measured frame rate
    pub fps: u32,
}

/// User drawing code, run on the pump thread.
pub trait FrameHandler<B: GraphicsBackend>: Send + 'static {
    /// Create brushes, fonts and other resources.
    fn setup(&mut self, surface: &mut RenderSurface<B>, kind: SetupKind) -> OverlayResult<()>;

    /// Draw one frame. The scene is already open.
    fn draw(&mut self, surface: &mut RenderSurface<B>, frame: &FrameInfo) -> OverlayResult<()>;

    /// Called once when the pump stops, before the surface is released.
    fn destroy(&mut self, _surface: &mut RenderSurface<B>) {}
}

/// Flags and mailboxes shared between the pump, its thread and the window
/// listener.
#[derive(Default)]
struct PumpShared {
    running: AtomicBool,
    paused: AtomicBool,
    hidden: AtomicBool,
    frame_rate: AtomicU32,
    fps: AtomicU32,
    frames: AtomicU64,
    pending_resize: Mutex<Option<Size>>,
    pending_rebind: Mutex<Option<NativeHandle>>,
}

impl PumpShared {
    fn should_draw(&self) -> bool {
        !self.paused.load(Ordering::Acquire) && !self.hidden.load(Ordering::Acquire)
    }
}

type PumpThread<H> = JoinHandle<(H, OverlayResult<()>)>;

pub struct FramePump<G, H>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    window: Arc<WindowController>,
    graphics: G,
    options: PumpOptions,
    shared: Arc<PumpShared>,
    handler: Mutex<Option<H>>,
    thread: Mutex<Option<PumpThread<H>>>,
    listener: Mutex<Option<ListenerId>>,
}

impl<G, H> FramePump<G, H>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    pub fn new(window: Arc<WindowController>, graphics: G, mut options: PumpOptions, handler: H) -> Self {
        options.validate();
        let shared = PumpShared::default();
        shared.frame_rate.store(options.frame_rate, Ordering::Relaxed);
        Self {
            window,
            graphics,
            options,
            shared: Arc::new(shared),
            handler: Mutex::new(Some(handler)),
            thread: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Pump using the process-wide default pump options.
    pub fn with_defaults(window: Arc<WindowController>, graphics: G, handler: H) -> Self {
        Self::new(window, graphics, config::default_pump_options(), handler)
    }

    /// Start the pump thread.
    ///
    /// Returns once the window exists, the surface is bound and
    /// `setup(Initial)` has succeeded, or with the first error from those
    /// steps.
    pub fn start(&self) -> OverlayResult<()> {
        if self.shared.running.load(Ordering::Acquire) {
            return Err(OverlayError::AlreadyRunning);
        }

        // A pump stopped with stop_async (or one that died) still has a thread
        if let Err(e) = self.reap() {
            log::warn!("[PUMP] Previous run ended with error: {}", e);
        }

        let handler = self
            .handler
            .lock()
            .take()
            .context("Frame handler is unavailable")?;

        self.subscribe_window_events();
        self.shared.frames.store(0, Ordering::Relaxed);
        self.shared.fps.store(0, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = bounded(1);
        let window = self.window.clone();
        let graphics = self.graphics.clone();
        let options = self.options.clone();
        let shared = self.shared.clone();

        let spawned = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || run_pump(window, graphics, options, shared, handler, ready_tx));

        let join_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.unsubscribe_window_events();
                return Err(OverlayError::Other(format!(
                    "Failed to spawn frame pump thread: {}",
                    e
                )));
            }
        };

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(OverlayError::Other(
                "Frame pump thread exited before reporting startup".to_string(),
            ))
        });

        match startup {
            Ok(()) => {
                *self.thread.lock() = Some(join_handle);
                log::info!(
                    "[PUMP] Started at {} fps",
                    self.shared.frame_rate.load(Ordering::Relaxed)
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                match join_handle.join() {
                    Ok((handler, _)) => *self.handler.lock() = Some(handler),
                    Err(_) => log::error!("[PUMP] Frame pump thread panicked during startup"),
                }
                self.unsubscribe_window_events();
                log::error!("[PUMP] Failed to start: {}", e);
                Err(e)
            }
        }
    }

    /// Stop the pump and wait for its thread. Returns the loop's result.
    pub fn stop(&self) -> OverlayResult<()> {
        self.shared.running.store(false, Ordering::Release);
        if self.thread.lock().is_none() {
            return Err(OverlayError::NotRunning);
        }
        let result = self.reap();
        log::info!("[PUMP] Stopped after {} frame(s)", self.frames_drawn());
        result
    }

    /// Ask the pump to stop without waiting. The thread is joined by the
    /// next `start()` or `stop()`.
    pub fn stop_async(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    /// Join a finished or stopping pump thread and take the handler back.
    fn reap(&self) -> OverlayResult<()> {
        let Some(handle) = self.thread.lock().take() else {
            return Ok(());
        };

        let result = match handle.join() {
            Ok((handler, result)) => {
                *self.handler.lock() = Some(handler);
                result
            }
            Err(_) => Err(OverlayError::Other(
                "Frame pump thread panicked".to_string(),
            )),
        };
        self.unsubscribe_window_events();
        result
    }

    fn subscribe_window_events(&self) {
        let shared = self.shared.clone();
        let id = self.window.subscribe(move |event| match event {
            WindowEvent::VisibilityChanged { visible } => {
                shared.hidden.store(!visible, Ordering::Release);
            }
            WindowEvent::SizeChanged { width, height } => {
                *shared.pending_resize.lock() = Some(Size::new(*width, *height));
            }
            WindowEvent::Recreated { handle } => {
                *shared.pending_rebind.lock() = Some(*handle);
            }
            _ => {}
        });

        if let Some(old) = self.listener.lock().replace(id) {
            self.window.unsubscribe(old);
        }
    }

    fn unsubscribe_window_events(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.window.unsubscribe(id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn unpause(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    /// True when either paused explicitly or auto-paused by a hidden window.
    pub fn is_paused(&self) -> bool {
        !self.shared.should_draw()
    }

    /// True when auto-paused because the window is hidden.
    pub fn is_hidden(&self) -> bool {
        self.shared.hidden.load(Ordering::Acquire)
    }

    /// Change the target rate at runtime (0 = uncapped).
    pub fn set_frame_rate(&self, rate: u32) {
        self.shared
            .frame_rate
            .store(rate.min(MAX_FRAME_RATE), Ordering::Release);
    }

    pub fn frame_rate(&self) -> u32 {
        self.shared.frame_rate.load(Ordering::Acquire)
    }

    /// Last measured frame rate.
    pub fn fps(&self) -> u32 {
        self.shared.fps.load(Ordering::Acquire)
    }

    /// Frames drawn since the last `start()`.
    pub fn frames_drawn(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    pub fn window(&self) -> &Arc<WindowController> {
        &self.window
    }

    /// Run `f` on the handler while the pump is stopped.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> Option<R> {
        self.handler.lock().as_mut().map(f)
    }
}

impl<G, H> Drop for FramePump<G, H>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Err(e) = self.reap() {
            log::warn!("[PUMP] Frame pump ended with error: {}", e);
        }
    }
}

/// Frame interval for a target rate; None when uncapped.
pub fn frame_interval(rate: u32) -> Option<Duration> {
    (rate > 0).then(|| Duration::from_nanos(1_000_000_000 / rate as u64))
}

/// How long to sleep after a frame that took `elapsed`. None when the frame
/// already used up the interval or the rate is uncapped.
pub fn remaining_sleep(interval: Option<Duration>, elapsed: Duration) -> Option<Duration> {
    interval
        .and_then(|interval| interval.checked_sub(elapsed))
        .filter(|remaining| !remaining.is_zero())
}

// ============================================================================
// Pump thread
// ============================================================================

fn run_pump<G, H>(
    window: Arc<WindowController>,
    graphics: G,
    options: PumpOptions,
    shared: Arc<PumpShared>,
    mut handler: H,
    ready: Sender<OverlayResult<()>>,
) -> (H, OverlayResult<()>)
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    let mut surface = RenderSurface::new(graphics, options.surface);

    if let Err(e) = prepare(&window, &shared, &mut surface, &mut handler) {
        shared.running.store(false, Ordering::Release);
        let _ = ready.send(Err(e));
        return (handler, Ok(()));
    }
    let _ = ready.send(Ok(()));

    let result = frame_loop(&shared, &mut surface, &mut handler);
    if let Err(e) = &result {
        log::error!("[PUMP] Frame loop stopped: {}", e);
    }

    handler.destroy(&mut surface);
    surface.release();
    shared.running.store(false, Ordering::Release);
    (handler, result)
}

fn prepare<G, H>(
    window: &WindowController,
    shared: &PumpShared,
    surface: &mut RenderSurface<G>,
    handler: &mut H,
) -> OverlayResult<()>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    if !window.is_initialized() {
        log::debug!("[PUMP] Window not created yet, creating it");
        window.create()?;
    }

    let state = window.state();
    let handle = state.handle.ok_or(OverlayError::NotInitialized)?;

    // Anything queued before this point is already reflected in `state`
    shared.pending_resize.lock().take();
    shared.pending_rebind.lock().take();
    shared.hidden.store(!state.visible, Ordering::Release);

    surface.bind(handle, state.bounds.width(), state.bounds.height())?;
    handler.setup(surface, SetupKind::Initial)
}

fn frame_loop<G, H>(
    shared: &PumpShared,
    surface: &mut RenderSurface<G>,
    handler: &mut H,
) -> OverlayResult<()>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    let mut counter = FrameCounter::new();
    let mut index: u64 = 0;
    let mut last_start = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        let rebind = shared.pending_rebind.lock().take();
        if let Some(handle) = rebind {
            surface.rebind(handle)?;
            if let Err(e) = handler.setup(surface, SetupKind::Recreated) {
                log::warn!("[PUMP] Setup after rebind failed: {}", e);
            }
        }

        let resize = shared.pending_resize.lock().take();
        if let Some(size) = resize {
            surface.request_resize(size.width, size.height);
        }

        if !shared.should_draw() {
            thread::sleep(PAUSED_POLL_INTERVAL);
            continue;
        }

        let frame_start = Instant::now();
        let info = FrameInfo {
            index,
            delta: frame_start.saturating_duration_since(last_start),
            fps: counter.fps(),
        };
        last_start = frame_start;

        render_frame(surface, handler, &info)?;

        index += 1;
        shared.frames.store(index, Ordering::Release);
        if let Some(fps) = counter.tick(Instant::now()) {
            shared.fps.store(fps, Ordering::Release);
        }

        let interval = frame_interval(shared.frame_rate.load(Ordering::Acquire));
        if let Some(sleep) = remaining_sleep(interval, frame_start.elapsed()) {
            thread::sleep(sleep);
        }
    }

    Ok(())
}

/// One begin/draw/end cycle. Only errors the surface cannot recover from
/// are returned.
///
/// A device loss hit while applying a resize rebuilds the target inside
/// `begin_scene`; the generation change tells us to rerun setup before
/// drawing with the old resources.
fn render_frame<G, H>(
    surface: &mut RenderSurface<G>,
    handler: &mut H,
    info: &FrameInfo,
) -> OverlayResult<()>
where
    G: GraphicsBackend + Clone,
    H: FrameHandler<G>,
{
    let generation = surface.generation();
    if let Err(e) = surface.begin_scene() {
        return match e {
            e @ OverlayError::DeviceRecreation(_) => Err(e),
            e => {
                log::warn!("[PUMP] Frame {} skipped: {}", info.index, e);
                Ok(())
            }
        };
    }
    if surface.generation() != generation {
        if let Err(e) = handler.setup(surface, SetupKind::Recreated) {
            log::warn!("[PUMP] Setup after device loss failed: {}", e);
        }
    }

    let drawn = handler.draw(surface, info);
    let outcome = surface.end_scene();

    if let Err(e) = drawn {
        log::warn!("[PUMP] Frame {} draw failed: {}", info.index, e);
    }

    match outcome {
        Ok(FrameOutcome::Recreated) => {
            if let Err(e) = handler.setup(surface, SetupKind::Recreated) {
                log::warn!("[PUMP] Setup after device loss failed: {}", e);
            }
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e @ OverlayError::DeviceRecreation(_)) => Err(e),
        Err(e) => {
            log::warn!("[PUMP] Frame {} dropped: {}", info.index, e);
            Ok(())
        }
    }
}
