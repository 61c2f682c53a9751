use std::time::Duration;

use glam::{IVec2, UVec2};

use crate::asset::{AssetCache, AssetSource};
use crate::interaction::{GestureOutcome, InteractionClassifier, PointerAction, PointerButton};
use crate::sequencer::{DisplayFrame, PlaybackState, Sequencer};
use crate::settings::SettingsStore;

const IDLE_ANIMATION: &str = "idle";
const CLICK_ANIMATION: &str = "click";

/// What the window host should do after a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    None,
    /// Move the window's top-left corner here.
    MoveWindow(IVec2),
    /// Pop up the exit menu at this global position.
    ShowExitMenu(IVec2),
}

/// The companion minus the window: gestures in, playback and persistence out.
pub struct Companion {
    classifier: InteractionClassifier,
    sequencer: Sequencer,
    settings: SettingsStore,
    window_pos: IVec2,
}

impl Companion {
    /// Load the idle and click assets fitted to `window_size` and start idling.
    pub fn load<S: AssetSource>(
        cache: &mut AssetCache<S>,
        settings: SettingsStore,
        window_size: UVec2,
        window_pos: IVec2,
        now: Duration,
    ) -> Self {
        let available = cache.list_available();
        if available.is_empty() {
            log::warn!("No animation resources found");
        }

        let idle = cache.load(IDLE_ANIMATION, Some(window_size));
        let click = cache.load(CLICK_ANIMATION, Some(window_size));

        Self {
            classifier: InteractionClassifier::new(),
            sequencer: Sequencer::new(idle, click, now),
            settings,
            window_pos,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.sequencer.state()
    }

    #[cfg(test)]
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn window_pos(&self) -> IVec2 {
        self.window_pos
    }

    /// The host moved the window (e.g. the OS confirmed a reposition).
    pub fn window_moved(&mut self, pos: IVec2) {
        self.window_pos = pos;
    }

    pub fn pointer_down(&mut self, button: PointerButton, global: IVec2) -> HostCommand {
        match self.classifier.pointer_down(button, global, self.window_pos) {
            PointerAction::ShowExitMenu(at) => HostCommand::ShowExitMenu(at),
            PointerAction::GestureStarted | PointerAction::Ignored => HostCommand::None,
        }
    }

    pub fn pointer_moved(&mut self, global: IVec2) -> HostCommand {
        match self.classifier.pointer_move(global) {
            Some(target) if target != self.window_pos => {
                self.window_pos = target;
                HostCommand::MoveWindow(target)
            }
            _ => HostCommand::None,
        }
    }

    pub fn pointer_up(&mut self, button: PointerButton, global: IVec2, now: Duration) {
        match self.classifier.pointer_up(button, global) {
            Some(GestureOutcome::Click { at }) => {
                log::debug!("Click at {at}");
                self.sequencer.click(now);
            }
            Some(GestureOutcome::Drag { rest }) => {
                log::debug!("Dragged to {rest}");
                self.window_pos = rest;
                self.settings.save_position(rest.x, rest.y);
            }
            None => {}
        }
    }

    /// Abandon a gesture in flight (focus lost).
    pub fn cancel_gesture(&mut self) {
        self.classifier.cancel();
    }

    /// Fire due timers. Returns true if what is shown changed state.
    pub fn tick(&mut self, now: Duration) -> bool {
        self.sequencer.tick(now)
    }

    pub fn next_deadline(&self, now: Duration) -> Option<Duration> {
        self.sequencer.next_deadline(now)
    }

    pub fn current_frame(&self, now: Duration) -> Option<DisplayFrame<'_>> {
        self.sequencer.current_frame(now)
    }

    /// Persist the position and stop playback. Safe to call more than once.
    pub fn exit(&mut self) {
        if self.sequencer.is_shut_down() {
            return;
        }
        self.classifier.cancel();
        self.settings.save_position(self.window_pos.x, self.window_pos.y);
        self.sequencer.shutdown();
        log::info!("Companion stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::asset::{fixtures, DirSource};

    const SIZE: UVec2 = UVec2::new(16, 16);
    const START: IVec2 = IVec2::new(100, 100);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn companion(dir: &Path) -> Companion {
        let mut cache = AssetCache::new(DirSource::new(dir.join("sprites")));
        let settings = SettingsStore::load(dir.join("config.json"));
        Companion::load(&mut cache, settings, SIZE, START, ms(0))
    }

    fn write_sprite(dir: &Path, file: &str, bytes: Vec<u8>) {
        let sprites = dir.join("sprites");
        std::fs::create_dir_all(&sprites).unwrap();
        std::fs::write(sprites.join(file), bytes).unwrap();
    }

    fn click(pet: &mut Companion, at: IVec2, now: Duration) {
        pet.pointer_down(PointerButton::Primary, at);
        pet.pointer_up(PointerButton::Primary, at, now);
    }

    #[test]
    fn idle_only_click_reasserts_idle() {
        let dir = tempfile::tempdir().unwrap();
        write_sprite(dir.path(), "idle.gif", fixtures::gif_bytes(&[100, 100], 4, 4));
        let mut pet = companion(dir.path());

        assert_eq!(pet.state(), PlaybackState::Idle);
        let starts = pet.sequencer().idle().unwrap().starts();

        click(&mut pet, IVec2::new(110, 110), ms(10));
        assert_eq!(pet.state(), PlaybackState::Idle);
        assert_eq!(pet.sequencer().idle().unwrap().starts(), starts + 1);
    }

    #[test]
    fn click_animation_runs_for_its_natural_duration() {
        let dir = tempfile::tempdir().unwrap();
        write_sprite(dir.path(), "idle.gif", fixtures::gif_bytes(&[100, 100], 4, 4));
        write_sprite(dir.path(), "click.gif", fixtures::gif_bytes(&[100, 200], 4, 4));
        let mut pet = companion(dir.path());

        click(&mut pet, IVec2::new(110, 110), ms(0));
        assert_eq!(pet.state(), PlaybackState::Click);

        pet.tick(ms(299));
        assert_eq!(pet.state(), PlaybackState::Click);
        pet.tick(ms(300));
        assert_eq!(pet.state(), PlaybackState::Idle);
        assert!(pet.sequencer().idle().unwrap().is_running());
    }

    #[test]
    fn drag_moves_window_and_persists_without_clicking() {
        let dir = tempfile::tempdir().unwrap();
        write_sprite(dir.path(), "idle.gif", fixtures::gif_bytes(&[100], 4, 4));
        write_sprite(dir.path(), "click.gif", fixtures::gif_bytes(&[100], 4, 4));
        let mut pet = companion(dir.path());

        assert_eq!(pet.pointer_down(PointerButton::Primary, IVec2::new(110, 110)), HostCommand::None);
        assert_eq!(
            pet.pointer_moved(IVec2::new(150, 130)),
            HostCommand::MoveWindow(IVec2::new(140, 120))
        );
        pet.pointer_up(PointerButton::Primary, IVec2::new(160, 140), ms(5));

        assert_eq!(pet.state(), PlaybackState::Idle);
        assert_eq!(pet.window_pos(), IVec2::new(150, 130));

        let saved = SettingsStore::load(dir.path().join("config.json"));
        assert_eq!(saved.settings().window_position(), Some((150, 130)));
    }

    #[test]
    fn secondary_button_requests_exit_menu() {
        let dir = tempfile::tempdir().unwrap();
        let mut pet = companion(dir.path());
        let at = IVec2::new(120, 120);
        assert_eq!(pet.pointer_down(PointerButton::Secondary, at), HostCommand::ShowExitMenu(at));
    }

    #[test]
    fn no_assets_stays_blank_and_interactive() {
        let dir = tempfile::tempdir().unwrap();
        let mut pet = companion(dir.path());

        assert_eq!(pet.state(), PlaybackState::Blank);
        click(&mut pet, IVec2::new(110, 110), ms(0));
        assert_eq!(pet.state(), PlaybackState::Blank);
        assert!(pet.current_frame(ms(0)).is_none());
    }

    #[test]
    fn exit_saves_position_and_stops_timers() {
        let dir = tempfile::tempdir().unwrap();
        write_sprite(dir.path(), "idle.gif", fixtures::gif_bytes(&[100], 4, 4));
        write_sprite(dir.path(), "click.gif", fixtures::gif_bytes(&[300], 4, 4));
        let mut pet = companion(dir.path());

        click(&mut pet, IVec2::new(110, 110), ms(0));
        pet.window_moved(IVec2::new(7, 8));
        pet.exit();
        pet.exit();

        assert_eq!(pet.sequencer().pending_timers(), 0);
        assert!(!pet.tick(ms(1000)));
        assert!(pet.next_deadline(ms(1000)).is_none());

        let saved = SettingsStore::load(dir.path().join("config.json"));
        assert_eq!(saved.settings().window_position(), Some((7, 8)));
    }
}
