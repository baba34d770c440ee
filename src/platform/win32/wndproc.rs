//! Window procedure for overlay windows.
//!
//! The overlay never takes input, so almost everything goes to
//! `DefWindowProcW`. The two messages the controller cares about are queued
//! on a thread-local list that `Win32Platform::next_message` drains.

use std::cell::RefCell;
use std::collections::VecDeque;

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{BeginPaint, EndPaint, PAINTSTRUCT};
use windows::Win32::UI::WindowsAndMessaging::{
    DefWindowProcW, WM_CHAR, WM_DESTROY, WM_ERASEBKGND, WM_KEYDOWN, WM_KEYUP, WM_PAINT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use crate::platform::{NativeHandle, WindowMessage};

const WM_DPICHANGED: u32 = 0x02E0;
const WM_DWMCOMPOSITIONCHANGED: u32 = 0x031E;

thread_local! {
    static PENDING: RefCell<VecDeque<WindowMessage>> = RefCell::new(VecDeque::new());
}

pub(super) fn push(message: WindowMessage) {
    PENDING.with(|q| q.borrow_mut().push_back(message));
}

pub(super) fn pop() -> Option<WindowMessage> {
    PENDING.with(|q| q.borrow_mut().pop_front())
}

/// # Safety
/// Win32 callback; only invoked by the system on the window's thread.
pub(super) unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        // The surface paints everything; skipping GDI erase avoids flicker.
        WM_ERASEBKGND => LRESULT(1),
        WM_PAINT => handle_paint(hwnd),
        WM_KEYDOWN | WM_KEYUP | WM_SYSKEYDOWN | WM_SYSKEYUP | WM_CHAR => LRESULT(0),
        WM_DPICHANGED => LRESULT(0),
        WM_DWMCOMPOSITIONCHANGED => {
            log::debug!("[WIN32] Composition changed for {:?}", hwnd);
            push(WindowMessage::CompositionChanged);
            LRESULT(0)
        }
        WM_DESTROY => {
            push(WindowMessage::Destroyed(NativeHandle(hwnd.0 as isize)));
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

fn handle_paint(hwnd: HWND) -> LRESULT {
    unsafe {
        let mut ps = PAINTSTRUCT::default();
        let _hdc = BeginPaint(hwnd, &mut ps);
        let _ = EndPaint(hwnd, &ps);
    }
    LRESULT(0)
}
