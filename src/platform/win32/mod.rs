//! Win32 + Direct2D platform binding.
//!
//! `Win32Platform` implements `WindowBackend` with plain user32/dwmapi calls.
//! `Direct2D` (in `d2d`) implements `GraphicsBackend` on top of an HWND
//! render target.

mod d2d;
mod wndproc;

pub use d2d::{D2DTarget, Direct2D};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    GetLastError, COLORREF, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, RECT, WPARAM,
};
use windows::Win32::Graphics::Dwm::DwmExtendFrameIntoClientArea;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Controls::MARGINS;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DestroyWindow, DispatchMessageW, GetWindow, GetWindowRect, PeekMessageW,
    PostMessageW, RegisterClassW, SetLayeredWindowAttributes, SetWindowPos, SetWindowTextW,
    ShowWindow, TranslateMessage, UnregisterClassW, WaitMessage, CS_HREDRAW, CS_VREDRAW,
    GW_HWNDPREV, HWND_NOTOPMOST, HWND_TOP, HWND_TOPMOST, LWA_ALPHA, MSG, PM_REMOVE,
    SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SW_HIDE, SW_SHOWNOACTIVATE, WM_APP,
    WM_QUIT, WNDCLASSW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST,
    WS_EX_TRANSPARENT, WS_POPUP,
};

use crate::platform::{
    BackendError, BackendResult, NativeHandle, WindowBackend, WindowCommand, WindowDescriptor,
    WindowMessage,
};
use crate::types::Rect;

/// Private messages used to marshal commands onto the window thread.
const WM_OVERLAY_DESTROY: u32 = WM_APP + 0x101;
const WM_OVERLAY_RECREATE: u32 = WM_APP + 0x102;

impl From<windows::core::Error> for BackendError {
    fn from(err: windows::core::Error) -> Self {
        BackendError::Failed(format!("{:?}", err))
    }
}

fn hwnd(handle: NativeHandle) -> HWND {
    HWND(handle.0 as *mut _)
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn module_instance() -> BackendResult<HINSTANCE> {
    let module = unsafe { GetModuleHandleW(None) }
        .map_err(|e| BackendError::failed(format!("Failed to get module handle: {:?}", e)))?;
    Ok(module.into())
}

/// Window primitives backed by user32 and dwmapi.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Self
    }
}

impl WindowBackend for Win32Platform {
    fn register_class(&self, class_name: &str) -> BackendResult<()> {
        let hinstance = module_instance()?;
        let name = wide(class_name);

        let wc = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(wndproc::wnd_proc),
            hInstance: hinstance,
            lpszClassName: PCWSTR(name.as_ptr()),
            ..Default::default()
        };

        let atom = unsafe { RegisterClassW(&wc) };
        if atom == 0 {
            let err = unsafe { GetLastError() };
            if err == ERROR_CLASS_ALREADY_EXISTS {
                return Err(BackendError::ClassExists);
            }
            return Err(BackendError::failed(format!(
                "RegisterClassW failed: {:?}",
                err
            )));
        }

        log::debug!("[WIN32] Registered class {}", class_name);
        Ok(())
    }

    fn unregister_class(&self, class_name: &str) -> BackendResult<()> {
        let hinstance = module_instance()?;
        let name = wide(class_name);
        unsafe { UnregisterClassW(PCWSTR(name.as_ptr()), hinstance)? };
        Ok(())
    }

    fn create_window(&self, desc: &WindowDescriptor) -> BackendResult<NativeHandle> {
        let hinstance = module_instance()?;
        let class_name = wide(&desc.class_name);
        let title = wide(&desc.title);

        let mut ex_style = WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE;
        if desc.topmost {
            ex_style |= WS_EX_TOPMOST;
        }

        let window = unsafe {
            CreateWindowExW(
                ex_style,
                PCWSTR(class_name.as_ptr()),
                PCWSTR(title.as_ptr()),
                WS_POPUP,
                desc.bounds.left,
                desc.bounds.top,
                desc.bounds.width() as i32,
                desc.bounds.height() as i32,
                None,
                None,
                hinstance,
                None,
            )
        }
        .map_err(|e| BackendError::failed(format!("CreateWindowExW failed: {:?}", e)))?;

        if desc.visible {
            unsafe {
                let _ = ShowWindow(window, SW_SHOWNOACTIVATE);
            }
        }

        Ok(NativeHandle(window.0 as isize))
    }

    fn destroy_window(&self, handle: NativeHandle) -> BackendResult<()> {
        // WM_DESTROY queues the Destroyed message from inside the wndproc.
        unsafe { DestroyWindow(hwnd(handle))? };
        Ok(())
    }

    fn set_bounds(&self, handle: NativeHandle, bounds: Rect) -> BackendResult<()> {
        unsafe {
            SetWindowPos(
                hwnd(handle),
                None,
                bounds.left,
                bounds.top,
                bounds.width() as i32,
                bounds.height() as i32,
                SWP_NOZORDER | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }

    fn set_visible(&self, handle: NativeHandle, visible: bool) -> BackendResult<()> {
        let cmd = if visible { SW_SHOWNOACTIVATE } else { SW_HIDE };
        // ShowWindow reports the previous visibility, not success.
        unsafe {
            let _ = ShowWindow(hwnd(handle), cmd);
        }
        Ok(())
    }

    fn set_topmost(&self, handle: NativeHandle, topmost: bool) -> BackendResult<()> {
        let insert_after = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
        unsafe {
            SetWindowPos(
                hwnd(handle),
                insert_after,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }

    fn set_title(&self, handle: NativeHandle, title: &str) -> BackendResult<()> {
        let title = wide(title);
        unsafe { SetWindowTextW(hwnd(handle), PCWSTR(title.as_ptr()))? };
        Ok(())
    }

    fn set_layered_attributes(&self, handle: NativeHandle, alpha: u8) -> BackendResult<()> {
        unsafe { SetLayeredWindowAttributes(hwnd(handle), COLORREF(0), alpha, LWA_ALPHA)? };
        Ok(())
    }

    fn extend_frame(&self, handle: NativeHandle) -> BackendResult<()> {
        let margins = MARGINS {
            cxLeftWidth: -1,
            cxRightWidth: -1,
            cyTopHeight: -1,
            cyBottomHeight: -1,
        };
        unsafe { DwmExtendFrameIntoClientArea(hwnd(handle), &margins)? };
        Ok(())
    }

    fn window_bounds(&self, target: NativeHandle) -> BackendResult<Rect> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd(target), &mut rect)? };
        Ok(Rect::new(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn place_above(&self, handle: NativeHandle, target: NativeHandle) -> BackendResult<()> {
        // Inserting after the window currently above `target` leaves us
        // directly on top of it.
        let above = unsafe { GetWindow(hwnd(target), GW_HWNDPREV) }.ok();
        let insert_after = match above {
            Some(prev) if prev != hwnd(handle) => prev,
            Some(_) => return Ok(()),
            None => HWND_TOP,
        };
        unsafe {
            SetWindowPos(
                hwnd(handle),
                insert_after,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )?;
        }
        Ok(())
    }

    fn post_command(&self, handle: NativeHandle, command: WindowCommand) -> BackendResult<()> {
        let msg = match command {
            WindowCommand::Destroy => WM_OVERLAY_DESTROY,
            WindowCommand::Recreate => WM_OVERLAY_RECREATE,
        };
        unsafe { PostMessageW(hwnd(handle), msg, WPARAM(0), LPARAM(0))? };
        Ok(())
    }

    fn next_message(&self) -> WindowMessage {
        loop {
            if let Some(pending) = wndproc::pop() {
                return pending;
            }

            let mut msg = MSG::default();
            let got = unsafe { PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE) };
            if !got.as_bool() {
                if let Err(e) = unsafe { WaitMessage() } {
                    log::error!("[WIN32] WaitMessage failed: {:?}", e);
                    return WindowMessage::Quit;
                }
                continue;
            }

            match msg.message {
                WM_QUIT => return WindowMessage::Quit,
                WM_OVERLAY_DESTROY => return WindowMessage::Command(WindowCommand::Destroy),
                WM_OVERLAY_RECREATE => return WindowMessage::Command(WindowCommand::Recreate),
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }
}
