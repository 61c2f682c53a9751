use glam::IVec2;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Dwm::DwmSetWindowAttribute;
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, DestroyMenu, GetWindowLongPtrW, SetForegroundWindow,
    SetWindowLongPtrW, SetWindowPos, TrackPopupMenu, GWL_EXSTYLE, MF_STRING, SWP_FRAMECHANGED,
    SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, TPM_LEFTALIGN, TPM_NONOTIFY,
    TPM_RETURNCMD, TPM_TOPALIGN, WS_EX_TOOLWINDOW,
};

use super::MenuChoice;
use crate::render::{GpuState, Overlay};

/// Menu item ID for "Exit".
const ID_EXIT: u16 = 1000;

/// Extract the Win32 HWND from a winit window.
pub fn get_hwnd(window: &winit::window::Window) -> Option<HWND> {
    let handle = window.window_handle().ok()?;
    match handle.as_raw() {
        RawWindowHandle::Win32(h) => Some(HWND(h.hwnd.get() as *mut core::ffi::c_void)),
        _ => None,
    }
}

/// Apply companion window styles: tool window (no taskbar button), no DWM frame.
pub unsafe fn make_companion(hwnd: HWND) {
    let style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);

    // Drop WS_EX_LAYERED if present and skip the GDI redirection surface, all
    // rendering comes from the DirectComposition visual wgpu creates.
    const WS_EX_LAYERED: isize = 0x00080000;
    const WS_EX_NOREDIRECTIONBITMAP: isize = 0x00200000;

    let new_style =
        (style & !WS_EX_LAYERED) | WS_EX_TOOLWINDOW.0 as isize | WS_EX_NOREDIRECTIONBITMAP;
    SetWindowLongPtrW(hwnd, GWL_EXSTYLE, new_style);

    log::debug!("Window ex-style 0x{:08X} -> 0x{:08X}", style, new_style);

    // Force DWM to recalculate the frame with the new styles.
    let _ = SetWindowPos(
        hwnd,
        HWND::default(),
        0,
        0,
        0,
        0,
        SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
    );

    // DWMWA_NCRENDERING_POLICY(2) = DWMNCRP_DISABLED(2)
    set_dwm_u32(hwnd, 2, 2);
    // DWMWA_WINDOW_CORNER_PREFERENCE(33) = DWMWCP_DONOTROUND(1)
    set_dwm_u32(hwnd, 33, 1);
    // DWMWA_BORDER_COLOR(34) = DWMWA_COLOR_NONE
    set_dwm_u32(hwnd, 34, 0xFFFFFFFE);
    // DWMWA_SYSTEMBACKDROP_TYPE(38) = DWMSBT_NONE(1)
    set_dwm_u32(hwnd, 38, 1);
}

unsafe fn set_dwm_u32(hwnd: HWND, attribute: i32, value: u32) {
    let _ = DwmSetWindowAttribute(
        hwnd,
        windows::Win32::Graphics::Dwm::DWMWINDOWATTRIBUTE(attribute),
        &value as *const u32 as *const core::ffi::c_void,
        4,
    );
}

pub fn setup_companion(window: &winit::window::Window) {
    let Some(hwnd) = get_hwnd(window) else {
        log::warn!("No Win32 handle, skipping companion window styles");
        return;
    };
    unsafe {
        make_companion(hwnd);
    }
    log::info!("Win32 companion setup complete (toolwindow + DirectComposition)");
}

/// Show the one-item popup menu at `at` (screen pixels) and block until dismissed.
pub fn show_exit_menu(window: &winit::window::Window, at: IVec2) -> MenuChoice {
    let Some(hwnd) = get_hwnd(window) else {
        return MenuChoice::Dismissed;
    };

    unsafe {
        let hmenu = match CreatePopupMenu() {
            Ok(menu) => menu,
            Err(e) => {
                log::warn!("Failed to create popup menu: {e}");
                return MenuChoice::Dismissed;
            }
        };

        let label: Vec<u16> = "Exit\0".encode_utf16().collect();
        let _ = AppendMenuW(
            hmenu,
            MF_STRING,
            ID_EXIT as usize,
            windows::core::PCWSTR(label.as_ptr()),
        );

        // Required so the menu closes when clicking outside
        let _ = SetForegroundWindow(hwnd);

        // With TPM_RETURNCMD the result is the chosen item ID (0 if dismissed).
        let chosen = TrackPopupMenu(
            hmenu,
            TPM_LEFTALIGN | TPM_TOPALIGN | TPM_RETURNCMD | TPM_NONOTIFY,
            at.x,
            at.y,
            0,
            hwnd,
            None,
        );

        let _ = DestroyMenu(hmenu);

        if chosen.0 == ID_EXIT as i32 {
            MenuChoice::Exit
        } else {
            MenuChoice::Dismissed
        }
    }
}

/// Native popup menu. `open` blocks in the Win32 menu loop and answers at once.
pub struct ContextMenu;

impl ContextMenu {
    pub fn new(_window: &winit::window::Window, _gpu: &GpuState) -> Self {
        Self
    }

    pub fn open(&mut self, window: &winit::window::Window, at: IVec2) -> Option<MenuChoice> {
        Some(show_exit_menu(window, at))
    }

    pub fn handle_event(
        &mut self,
        _window: &winit::window::Window,
        _event: &winit::event::WindowEvent,
    ) -> bool {
        false
    }

    pub fn take_choice(&mut self) -> Option<MenuChoice> {
        None
    }

    pub fn overlay(&mut self, _window: &winit::window::Window) -> Option<&mut dyn Overlay> {
        None
    }
}
