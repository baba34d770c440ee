//! Plain window state shared between the message-loop thread and callers.

use crate::platform::NativeHandle;
use crate::types::Rect;

/// Where a window controller is in its life.
///
/// `Uninitialized -> Initializing -> Running -> Destroying -> Destroyed`.
/// A destroyed controller may be created again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Running,
    Destroying,
    Destroyed,
}

impl Lifecycle {
    /// True when `create()` may start a new window.
    pub fn can_create(self) -> bool {
        matches!(self, Lifecycle::Uninitialized | Lifecycle::Destroyed)
    }
}

#[derive(Debug, Clone)]
pub struct WindowState {
    pub handle: Option<NativeHandle>,
    pub class_name: String,
    pub title: String,
    pub bounds: Rect,
    pub visible: bool,
    pub topmost: bool,
    pub lifecycle: Lifecycle,
}

impl WindowState {
    pub fn new(bounds: Rect) -> Self {
        Self {
            handle: None,
            class_name: String::new(),
            title: String::new(),
            bounds,
            visible: false,
            topmost: false,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Forget the native window after it has been destroyed.
    pub fn mark_destroyed(&mut self) {
        self.handle = None;
        self.visible = false;
        self.topmost = false;
        self.lifecycle = Lifecycle::Destroyed;
    }
}

/// Generate a class name unique to this process and call.
pub fn generate_class_name() -> String {
    format!("clearpane_overlay_{}", uuid::Uuid::new_v4().simple())
}
