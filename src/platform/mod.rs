#[cfg(windows)]
pub mod win32;

#[cfg(not(windows))]
mod popup;

#[cfg(not(windows))]
pub use popup::ContextMenu;
#[cfg(windows)]
pub use win32::ContextMenu;

use winit::window::Window;

/// Result of the right-click menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Exit,
    Dismissed,
}

/// Apply host-specific styling (no taskbar entry, borderless composition).
pub fn prepare_window(window: &Window) {
    #[cfg(windows)]
    win32::setup_companion(window);
    #[cfg(not(windows))]
    let _ = window;
}
