//! Overlay window controller.
//!
//! A `WindowController` owns exactly one native overlay window and the
//! dedicated thread that runs its message loop. The window is created,
//! recreated and destroyed on that thread; every other thread talks to it
//! through the controller.
//!
//! ## Architecture
//!
//! ```text
//! caller thread                       overlay-window thread
//! -------------                       ---------------------
//! create() ── spawn ───────────────▶  register class (retry on collision)
//!    ◀──── bounded(1) startup result  create window, layered alpha, frame
//!                                     loop: next_message()
//! recreate() ── post Recreate ─────▶    Recreate  -> destroy + create
//!    ◀──── condvar (handle changed)     Destroy   -> DestroyWindow
//! destroy() ── post Destroy ───────▶    Destroyed -> unregister class, exit
//!    ◀──── join
//! move_to()/show()/... ── direct native call (no state lock held)
//! ```
//!
//! Mutators never hold the state lock across a native call: Win32 window
//! positioning from a foreign thread waits for the owning thread to process
//! the request, and that thread may itself be waiting on the lock.

pub mod events;
pub mod state;


use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::{self, WindowOptions};
use crate::error::{OverlayError, OverlayResult};
use crate::platform::{
    BackendError, NativeHandle, WindowBackend, WindowCommand, WindowDescriptor, WindowMessage,
};
use crate::types::Rect;

use events::EventRegistry;
pub use events::{Listener, ListenerId, WindowEvent};
pub use state::{Lifecycle, WindowState};
use state::generate_class_name;

/// How many freshly generated class names to try after a collision.
pub const MAX_CLASS_RETRIES: usize = 8;

const WINDOW_THREAD_NAME: &str = "overlay-window";

/// State shared with the message-loop thread.
struct Shared {
    backend: Arc<dyn WindowBackend>,
    state: Mutex<WindowState>,
    /// Signalled whenever `state.handle` changes
    handle_changed: Condvar,
    events: EventRegistry,
}

/// Thread-safe handle to one overlay window.
pub struct WindowController {
    shared: Arc<Shared>,
    options: Mutex<WindowOptions>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WindowController {
    pub fn new(backend: Arc<dyn WindowBackend>, mut options: WindowOptions) -> Self {
        options.validate();
        Self {
            shared: Arc::new(Shared {
                backend,
                state: Mutex::new(WindowState::new(options.bounds())),
                handle_changed: Condvar::new(),
                events: EventRegistry::default(),
            }),
            options: Mutex::new(options),
            thread: Mutex::new(None),
        }
    }

    /// Controller using the process-wide default window options.
    pub fn with_defaults(backend: Arc<dyn WindowBackend>) -> Self {
        Self::new(backend, config::default_window_options())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Create the window on a new message-loop thread.
    ///
    /// Blocks until the thread reports either the new handle or the startup
    /// error. On error the thread has already exited and been joined.
    pub fn create(&self) -> OverlayResult<NativeHandle> {
        let mut thread_slot = self.thread.lock();

        {
            let mut state = self.shared.state.lock();
            if !state.lifecycle.can_create() {
                return Err(OverlayError::AlreadyCreated);
            }
            state.lifecycle = Lifecycle::Initializing;
        }

        // A destroyed window's thread has finished its work; reap it.
        if let Some(previous) = thread_slot.take() {
            if previous.join().is_err() {
                log::error!("[WINDOW] Previous window thread panicked");
            }
        }

        let desc = self.snapshot_descriptor();
        log::info!(
            "[WINDOW] Creating overlay '{}' at {:?}",
            desc.class_name,
            desc.bounds
        );

        let (ready_tx, ready_rx) = bounded(1);
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(WINDOW_THREAD_NAME.to_string())
            .spawn(move || run_window_thread(shared, desc, ready_tx));

        let join_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.state.lock().lifecycle = Lifecycle::Uninitialized;
                return Err(OverlayError::WindowThread(format!(
                    "Failed to spawn window thread: {}",
                    e
                )));
            }
        };

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(OverlayError::WindowThread(
                "Window thread exited before reporting startup".to_string(),
            ))
        });

        match startup {
            Ok(handle) => {
                *thread_slot = Some(join_handle);
                Ok(handle)
            }
            Err(e) => {
                if join_handle.join().is_err() {
                    log::error!("[WINDOW] Window thread panicked during startup");
                }
                self.shared.state.lock().lifecycle = Lifecycle::Uninitialized;
                log::error!("[WINDOW] Window creation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Destroy the window and wait for its thread to exit.
    pub fn destroy(&self) -> OverlayResult<()> {
        self.request_destroy()?;
        self.join();
        Ok(())
    }

    /// Ask the window thread to destroy the window without waiting.
    pub fn request_destroy(&self) -> OverlayResult<()> {
        let handle = self.running_handle()?;
        self.shared
            .backend
            .post_command(handle, WindowCommand::Destroy)
            .map_err(|e| OverlayError::WindowThread(format!("Failed to post destroy: {}", e)))
    }

    /// Wait for the message-loop thread to exit.
    ///
    /// Returns immediately when there is no thread, or when called from the
    /// window thread itself (e.g. from a listener).
    pub fn join(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            *self.thread.lock() = Some(handle);
            return;
        }

        if handle.join().is_err() {
            log::error!("[WINDOW] Window thread panicked");
        }
    }

    /// Replace the native window with a fresh one of identical configuration.
    ///
    /// Blocks until the window thread has swapped the handle. Must not be
    /// called from the window thread.
    pub fn recreate(&self) -> OverlayResult<NativeHandle> {
        let old = self.running_handle()?;
        self.shared
            .backend
            .post_command(old, WindowCommand::Recreate)
            .map_err(|e| OverlayError::WindowThread(format!("Failed to post recreate: {}", e)))?;

        let mut state = self.shared.state.lock();
        while state.handle == Some(old) && state.lifecycle == Lifecycle::Running {
            self.shared.handle_changed.wait(&mut state);
        }

        match state.handle {
            Some(handle) if state.lifecycle == Lifecycle::Running => Ok(handle),
            _ => Err(OverlayError::WindowCreation(
                "Window could not be recreated".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn handle(&self) -> Option<NativeHandle> {
        self.shared.state.lock().handle
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.state.lock().lifecycle
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().is_initialized()
    }

    /// Snapshot of the whole window state.
    pub fn state(&self) -> WindowState {
        self.shared.state.lock().clone()
    }

    pub fn bounds(&self) -> Rect {
        self.shared.state.lock().bounds
    }

    pub fn x(&self) -> i32 {
        self.bounds().left
    }

    pub fn y(&self) -> i32 {
        self.bounds().top
    }

    pub fn width(&self) -> u32 {
        self.bounds().width()
    }

    pub fn height(&self) -> u32 {
        self.bounds().height()
    }

    pub fn is_visible(&self) -> bool {
        self.shared.state.lock().visible
    }

    pub fn is_topmost(&self) -> bool {
        self.shared.state.lock().topmost
    }

    pub fn title(&self) -> String {
        self.shared.state.lock().title.clone()
    }

    pub fn class_name(&self) -> String {
        self.shared.state.lock().class_name.clone()
    }

    /// Options the next `create()` will use.
    pub fn options(&self) -> WindowOptions {
        self.options.lock().clone()
    }

    /// Replace the options used by the next `create()`.
    pub fn set_options(&self, mut options: WindowOptions) {
        options.validate();
        *self.options.lock() = options;
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    pub fn move_to(&self, x: i32, y: i32) -> OverlayResult<()> {
        let bounds = self.bounds().with_origin(x, y);
        self.set_bounds(bounds)
    }

    pub fn resize(&self, width: u32, height: u32) -> OverlayResult<()> {
        let bounds = self.bounds().with_size(width.max(1), height.max(1));
        self.set_bounds(bounds)
    }

    pub fn set_bounds(&self, bounds: Rect) -> OverlayResult<()> {
        let (handle, old) = {
            let state = self.shared.state.lock();
            (Self::require_running(&state)?, state.bounds)
        };
        // Keep at least one pixel on screen; far edges saturate.
        let bounds = Rect::from_xywh(
            bounds.left.min(i32::MAX - 1),
            bounds.top.min(i32::MAX - 1),
            bounds.width().max(1),
            bounds.height().max(1),
        );

        let backend = &self.shared.backend;
        backend
            .set_bounds(handle, bounds)
            .map_err(|e| native_error("set_bounds", e))?;
        if let Err(e) = backend.extend_frame(handle) {
            log::warn!("[WINDOW] Failed to re-extend frame: {}", e);
        }

        self.shared.state.lock().bounds = bounds;

        if old.origin() != bounds.origin() {
            self.shared.events.emit(&WindowEvent::PositionChanged {
                x: bounds.left,
                y: bounds.top,
            });
        }
        if old.size() != bounds.size() {
            self.shared.events.emit(&WindowEvent::SizeChanged {
                width: bounds.width(),
                height: bounds.height(),
            });
        }
        Ok(())
    }

    /// Match the bounds of another top-level window.
    pub fn fit_to(&self, target: NativeHandle) -> OverlayResult<()> {
        if target.is_null() {
            return Err(OverlayError::InvalidHandle);
        }
        self.running_handle()?;
        let bounds = self
            .shared
            .backend
            .window_bounds(target)
            .map_err(|e| native_error("window_bounds", e))?;
        self.set_bounds(bounds)
    }

    /// Place the overlay directly above another window in the z-order.
    pub fn place_above(&self, target: NativeHandle) -> OverlayResult<()> {
        if target.is_null() {
            return Err(OverlayError::InvalidHandle);
        }
        let handle = self.running_handle()?;
        self.shared
            .backend
            .place_above(handle, target)
            .map_err(|e| native_error("place_above", e))
    }

    pub fn show(&self) -> OverlayResult<()> {
        self.set_visible(true)
    }

    pub fn hide(&self) -> OverlayResult<()> {
        self.set_visible(false)
    }

    fn set_visible(&self, visible: bool) -> OverlayResult<()> {
        let handle = {
            let state = self.shared.state.lock();
            let handle = Self::require_running(&state)?;
            if state.visible == visible {
                return Ok(());
            }
            handle
        };

        self.shared
            .backend
            .set_visible(handle, visible)
            .map_err(|e| native_error("set_visible", e))?;
        {
            // A concurrent caller may have applied the same change first.
            let mut state = self.shared.state.lock();
            if state.visible == visible {
                return Ok(());
            }
            state.visible = visible;
        }
        self.shared
            .events
            .emit(&WindowEvent::VisibilityChanged { visible });
        Ok(())
    }

    pub fn set_topmost(&self, topmost: bool) -> OverlayResult<()> {
        let (handle, was) = {
            let state = self.shared.state.lock();
            (Self::require_running(&state)?, state.topmost)
        };

        self.shared
            .backend
            .set_topmost(handle, topmost)
            .map_err(|e| native_error("set_topmost", e))?;
        self.shared.state.lock().topmost = topmost;
        if was != topmost {
            self.shared
                .events
                .emit(&WindowEvent::TopmostChanged { topmost });
        }
        Ok(())
    }

    pub fn set_title(&self, title: &str) -> OverlayResult<()> {
        let handle = self.running_handle()?;
        self.shared
            .backend
            .set_title(handle, title)
            .map_err(|e| native_error("set_title", e))?;
        self.shared.state.lock().title = title.to_string();
        self.shared.events.emit(&WindowEvent::TitleChanged {
            title: title.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Register a listener. Listeners run on whichever thread caused the
    /// change, with no controller lock held.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&WindowEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn running_handle(&self) -> OverlayResult<NativeHandle> {
        Self::require_running(&self.shared.state.lock())
    }

    fn require_running(state: &WindowState) -> OverlayResult<NativeHandle> {
        match (state.lifecycle, state.handle) {
            (Lifecycle::Running, Some(handle)) => Ok(handle),
            _ => Err(OverlayError::NotInitialized),
        }
    }

    fn snapshot_descriptor(&self) -> WindowDescriptor {
        let options = self.options.lock().clone();
        let class_name = options
            .class_name
            .clone()
            .unwrap_or_else(generate_class_name);
        let title = options.title.clone().unwrap_or_else(|| class_name.clone());
        WindowDescriptor {
            class_name,
            title,
            bounds: options.bounds(),
            topmost: options.topmost,
            visible: options.visible,
            alpha: options.alpha,
        }
    }
}

impl Drop for WindowController {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.request_destroy() {
                log::warn!("[WINDOW] Failed to destroy window on drop: {}", e);
            }
        }
        self.join();
    }
}

fn native_error(op: &str, err: BackendError) -> OverlayError {
    OverlayError::Other(format!("{} failed: {}", op, err))
}

// ============================================================================
// Window thread
// ============================================================================

fn run_window_thread(
    shared: Arc<Shared>,
    mut desc: WindowDescriptor,
    ready: Sender<OverlayResult<NativeHandle>>,
) {
    let handle = match start_window(&shared, &mut desc) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    {
        let mut state = shared.state.lock();
        state.handle = Some(handle);
        state.class_name = desc.class_name.clone();
        state.title = desc.title.clone();
        state.bounds = desc.bounds;
        state.visible = desc.visible;
        state.topmost = desc.topmost;
        state.lifecycle = Lifecycle::Running;
    }
    shared.handle_changed.notify_all();
    log::info!("[WINDOW] Overlay window {:?} running", handle);

    let _ = ready.send(Ok(handle));
    shared.events.emit(&WindowEvent::Created { handle });

    message_loop(&shared, &mut desc, handle);
}

/// Register the class and create the first window. Undoes the class
/// registration if window creation fails.
fn start_window(shared: &Shared, desc: &mut WindowDescriptor) -> OverlayResult<NativeHandle> {
    register_class_with_retry(shared.backend.as_ref(), desc)?;

    match create_native_window(shared.backend.as_ref(), desc) {
        Ok(handle) => Ok(handle),
        Err(e) => {
            if let Err(unregister_err) = shared.backend.unregister_class(&desc.class_name) {
                log::warn!(
                    "[WINDOW] Failed to unregister class '{}': {}",
                    desc.class_name,
                    unregister_err
                );
            }
            Err(e)
        }
    }
}

fn register_class_with_retry(
    backend: &dyn WindowBackend,
    desc: &mut WindowDescriptor,
) -> OverlayResult<()> {
    for _ in 0..=MAX_CLASS_RETRIES {
        match backend.register_class(&desc.class_name) {
            Ok(()) => return Ok(()),
            Err(BackendError::ClassExists) => {
                let retry = generate_class_name();
                log::warn!(
                    "[WINDOW] Class '{}' already registered, retrying as '{}'",
                    desc.class_name,
                    retry
                );
                desc.class_name = retry;
            }
            Err(e) => return Err(OverlayError::ClassRegistration(e.to_string())),
        }
    }

    Err(OverlayError::ClassRegistration(format!(
        "Class name collided {} times",
        MAX_CLASS_RETRIES + 1
    )))
}

fn create_native_window(
    backend: &dyn WindowBackend,
    desc: &WindowDescriptor,
) -> OverlayResult<NativeHandle> {
    let handle = backend
        .create_window(desc)
        .map_err(|e| OverlayError::WindowCreation(e.to_string()))?;

    let prepared = backend
        .set_layered_attributes(handle, desc.alpha)
        .and_then(|_| backend.extend_frame(handle));

    if let Err(e) = prepared {
        let _ = backend.destroy_window(handle);
        return Err(OverlayError::WindowCreation(format!(
            "Failed to prepare layered window: {}",
            e
        )));
    }

    Ok(handle)
}

fn message_loop(shared: &Shared, desc: &mut WindowDescriptor, mut current: NativeHandle) {
    let backend = shared.backend.as_ref();

    loop {
        match backend.next_message() {
            WindowMessage::Command(WindowCommand::Destroy) => {
                log::debug!("[WINDOW] Destroy requested for {:?}", current);
                shared.state.lock().lifecycle = Lifecycle::Destroying;
                if let Err(e) = backend.destroy_window(current) {
                    log::error!("[WINDOW] DestroyWindow failed: {}", e);
                    finish(shared, desc, current);
                    return;
                }
            }
            WindowMessage::Destroyed(handle) if handle == current => {
                finish(shared, desc, current);
                return;
            }
            WindowMessage::Destroyed(handle) => {
                log::debug!("[WINDOW] Ignoring destroy notification for stale {:?}", handle);
            }
            WindowMessage::Command(WindowCommand::Recreate) => {
                match recreate_native_window(shared, desc, current) {
                    Ok(handle) => current = handle,
                    Err(e) => {
                        log::error!("[WINDOW] Recreation failed: {}", e);
                        finish(shared, desc, current);
                        return;
                    }
                }
            }
            WindowMessage::CompositionChanged => {
                if let Err(e) = backend.extend_frame(current) {
                    log::warn!("[WINDOW] Failed to re-extend frame: {}", e);
                }
                if shared.state.lock().topmost {
                    if let Err(e) = backend.set_topmost(current, true) {
                        log::warn!("[WINDOW] Failed to reassert topmost: {}", e);
                    }
                }
            }
            WindowMessage::Quit => {
                log::debug!("[WINDOW] Message queue quit");
                let _ = backend.destroy_window(current);
                finish(shared, desc, current);
                return;
            }
        }
    }
}

fn recreate_native_window(
    shared: &Shared,
    desc: &mut WindowDescriptor,
    old: NativeHandle,
) -> OverlayResult<NativeHandle> {
    {
        let state = shared.state.lock();
        desc.bounds = state.bounds;
        desc.title = state.title.clone();
        desc.visible = state.visible;
        desc.topmost = state.topmost;
    }

    if let Err(e) = shared.backend.destroy_window(old) {
        log::warn!("[WINDOW] Failed to destroy {:?} before recreate: {}", old, e);
    }

    let handle = create_native_window(shared.backend.as_ref(), desc)?;
    shared.state.lock().handle = Some(handle);
    shared.handle_changed.notify_all();

    log::info!("[WINDOW] Recreated overlay window {:?} -> {:?}", old, handle);
    shared.events.emit(&WindowEvent::Recreated { handle });
    Ok(handle)
}

/// Tear down after the current window is gone and notify waiters.
fn finish(shared: &Shared, desc: &WindowDescriptor, handle: NativeHandle) {
    if let Err(e) = shared.backend.unregister_class(&desc.class_name) {
        log::warn!(
            "[WINDOW] Failed to unregister class '{}': {}",
            desc.class_name,
            e
        );
    }

    shared.state.lock().mark_destroyed();
    shared.handle_changed.notify_all();

    log::info!("[WINDOW] Overlay window {:?} destroyed", handle);
    shared.events.emit(&WindowEvent::Destroyed { handle });
}
