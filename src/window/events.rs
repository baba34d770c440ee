//! Window change notifications.
//!
//! Listeners are stored behind `Arc` so `emit` can snapshot the list and
//! call them with no lock held: a listener may freely call back into the
//! controller or unsubscribe itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::platform::NativeHandle;

/// Something observable happened to an overlay window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Created { handle: NativeHandle },
    Destroyed { handle: NativeHandle },
    Recreated { handle: NativeHandle },
    PositionChanged { x: i32, y: i32 },
    SizeChanged { width: u32, height: u32 },
    VisibilityChanged { visible: bool },
    TopmostChanged { topmost: bool },
    TitleChanged { title: String },
}

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventRegistry {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &WindowEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        log::trace!("[WINDOW] {:?} -> {} listener(s)", event, snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}
