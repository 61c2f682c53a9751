//! Static configuration: window geometry and on-disk layout.

use std::path::PathBuf;

use glam::{IVec2, UVec2};

/// Fixed client size of the companion window, in physical pixels.
pub const WINDOW_SIZE: UVec2 = UVec2::new(128, 128);
/// Companion identity used when the settings don't name one.
pub const DEFAULT_PET: &str = "pikachu";
/// Inset from the bottom-right screen corner for the default placement.
pub const DEFAULT_SCREEN_INSET: IVec2 = IVec2::new(50, 100);
/// Overrides the base directory holding `assets/` and `config.json`.
pub const HOME_ENV: &str = "PETTOY_HOME";

const SETTINGS_FILE: &str = "config.json";
const SPRITES_DIR: &str = "assets/sprites";

/// Filesystem layout rooted at the base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `$PETTOY_HOME` if set, else the working directory.
    pub fn from_env() -> Self {
        let base = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base.join(SETTINGS_FILE)
    }

    /// Asset directory for one companion identity.
    pub fn sprite_dir(&self, pet: &str) -> PathBuf {
        self.base.join(SPRITES_DIR).join(pet)
    }
}

/// Bottom-right placement used when no position was saved.
pub fn default_position(screen: UVec2, window: UVec2) -> IVec2 {
    screen.as_ivec2() - window.as_ivec2() - DEFAULT_SCREEN_INSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_base() {
        let paths = Paths::new("/opt/pet");
        assert_eq!(paths.settings_file(), PathBuf::from("/opt/pet/config.json"));
        assert_eq!(
            paths.sprite_dir("eevee"),
            PathBuf::from("/opt/pet/assets/sprites/eevee")
        );
    }

    #[test]
    fn default_position_is_bottom_right() {
        let pos = default_position(UVec2::new(1920, 1080), WINDOW_SIZE);
        assert_eq!(pos, IVec2::new(1920 - 128 - 50, 1080 - 128 - 100));
    }
}
