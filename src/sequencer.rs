use std::time::Duration;

use image::RgbaImage;

use crate::asset::Asset;
use crate::util::timers::{TimerHandle, Timers};

/// Which animation the companion is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No idle asset could be loaded; nothing animated is shown.
    Blank,
    Idle,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    ReturnToIdle,
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// An asset plus its playback clock.
pub struct Playback {
    asset: Asset,
    /// Wrap around after the last frame instead of holding it.
    looping: bool,
    running: bool,
    started_at: Duration,
    starts: u32,
}

impl Playback {
    /// Play `asset` over and over.
    pub fn looped(asset: Asset) -> Self {
        Self::new(asset, true)
    }

    /// Play `asset` once and rest on its last frame.
    pub fn once(asset: Asset) -> Self {
        Self::new(asset, false)
    }

    fn new(asset: Asset, looping: bool) -> Self {
        Self {
            asset,
            looping,
            running: false,
            started_at: Duration::ZERO,
            starts: 0,
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// (Re)start from the first frame.
    pub fn start(&mut self, now: Duration) {
        self.running = true;
        self.started_at = now;
        self.starts += 1;
        log::trace!("Starting '{}' (run {})", self.asset.name(), self.starts);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// How many times playback has been started.
    #[cfg(test)]
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.asset.natural_duration() as u64)
    }

    /// Frame index and pixels to show at `now`. A stopped playback rests on its first frame.
    pub fn frame_at(&self, now: Duration) -> Option<(usize, &RgbaImage)> {
        match &self.asset {
            Asset::Still(still) => Some((0, &still.image)),
            Asset::Animation(anim) => {
                let idx = self.frame_index(now);
                anim.frames.get(idx).map(|f| (idx, &f.image))
            }
        }
    }

    /// When the displayed frame will next change, if it will.
    pub fn next_frame_at(&self, now: Duration) -> Option<Duration> {
        let Asset::Animation(anim) = &self.asset else {
            return None;
        };
        if !self.running || anim.frames.len() < 2 {
            return None;
        }

        let cycle = self.cycle_ms();
        let elapsed = self.elapsed_ms(now);
        if !self.looping && elapsed >= cycle {
            return None;
        }

        let loop_start = elapsed - elapsed % cycle;
        let mut boundary = loop_start;
        for idx in 0..anim.frames.len() {
            boundary += anim.frame_ms(idx) as u64;
            if boundary > elapsed {
                break;
            }
        }
        Some(self.started_at + Duration::from_millis(boundary))
    }

    fn frame_index(&self, now: Duration) -> usize {
        let Asset::Animation(anim) = &self.asset else {
            return 0;
        };
        if !self.running || anim.frames.len() < 2 {
            return 0;
        }

        let cycle = self.cycle_ms();
        let elapsed = self.elapsed_ms(now);
        let t = if self.looping {
            elapsed % cycle
        } else {
            elapsed.min(cycle - 1)
        };

        let mut acc = 0u64;
        for idx in 0..anim.frames.len() {
            acc += anim.frame_ms(idx) as u64;
            if t < acc {
                return idx;
            }
        }
        anim.frames.len() - 1
    }

    /// Length of one loop as actually played, never zero.
    fn cycle_ms(&self) -> u64 {
        match &self.asset {
            Asset::Still(_) => 1,
            Asset::Animation(anim) => (0..anim.frames.len())
                .map(|idx| anim.frame_ms(idx) as u64)
                .sum::<u64>()
                .max(1),
        }
    }

    fn elapsed_ms(&self, now: Duration) -> u64 {
        now.saturating_sub(self.started_at).as_millis() as u64
    }
}

/// Frame selected for display, keyed so the renderer can skip redundant uploads.
pub struct DisplayFrame<'a> {
    /// (asset identity, frame index)
    pub key: (usize, usize),
    pub image: &'a RgbaImage,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Idle/click state machine with a cancellable auto-return timer.
///
/// Time is a `Duration` since an epoch owned by the caller. Timers only fire
/// from [`Sequencer::tick`], so everything happens on the caller's thread.
pub struct Sequencer {
    idle: Option<Playback>,
    click: Option<Playback>,
    state: PlaybackState,
    timers: Timers<TimerEvent>,
    pending: Option<TimerHandle>,
    shut_down: bool,
}

impl Sequencer {
    /// Build the machine and start idle playback if an idle asset exists.
    pub fn new(idle: Option<Asset>, click: Option<Asset>, now: Duration) -> Self {
        let mut seq = Self {
            idle: idle.map(Playback::looped),
            click: click.map(Playback::once),
            state: PlaybackState::Blank,
            timers: Timers::with_capacity(1),
            pending: None,
            shut_down: false,
        };
        if seq.idle.is_none() {
            log::warn!("No idle animation, companion starts blank");
        }
        if seq.click.is_none() {
            log::warn!("No click animation, clicks will only restart idle");
        }
        seq.play_idle(now);
        seq
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[cfg(test)]
    pub fn idle(&self) -> Option<&Playback> {
        self.idle.as_ref()
    }

    #[cfg(test)]
    pub fn click_playback(&self) -> Option<&Playback> {
        self.click.as_ref()
    }

    /// Number of armed auto-return timers (0 or 1).
    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// React to a click. Re-clicking during the click animation restarts it
    /// and supersedes the pending auto-return.
    pub fn click(&mut self, now: Duration) {
        if self.shut_down {
            return;
        }

        let Some(click) = self.click.as_mut() else {
            log::warn!("Click animation not loaded, staying idle");
            self.play_idle(now);
            return;
        };

        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
            log::debug!("Pending return to idle superseded by new click");
        }
        if let Some(idle) = self.idle.as_mut() {
            if idle.is_running() {
                idle.stop();
            }
        }

        click.start(now);
        let duration = click.duration();
        self.pending = Some(self.timers.schedule(now + duration, TimerEvent::ReturnToIdle));
        self.state = PlaybackState::Click;
        log::info!("Playing click animation for {}ms", duration.as_millis());
    }

    /// Fire due timers. Returns true if the state changed.
    pub fn tick(&mut self, now: Duration) -> bool {
        if self.shut_down {
            return false;
        }

        let mut changed = false;
        for (handle, event) in self.timers.drain_due(now) {
            if self.pending != Some(handle) {
                log::debug!("Ignoring stale timer {handle:?}");
                continue;
            }
            self.pending = None;
            match event {
                TimerEvent::ReturnToIdle => {
                    if let Some(click) = self.click.as_mut() {
                        click.stop();
                    }
                    self.play_idle(now);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Stop all playback and invalidate the pending timer. No transition fires.
    pub fn shutdown(&mut self) {
        if let Some(idle) = self.idle.as_mut() {
            idle.stop();
        }
        if let Some(click) = self.click.as_mut() {
            click.stop();
        }
        self.timers.clear();
        self.pending = None;
        self.shut_down = true;
    }

    /// Earliest moment the caller must call back: a timer or a frame change.
    pub fn next_deadline(&self, now: Duration) -> Option<Duration> {
        if self.shut_down {
            return None;
        }
        let frame = self.active().and_then(|p| p.next_frame_at(now));
        match (self.timers.next_deadline(), frame) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// What to draw right now, if anything.
    pub fn current_frame(&self, now: Duration) -> Option<DisplayFrame<'_>> {
        let playback = self.active()?;
        let (idx, image) = playback.frame_at(now)?;
        Some(DisplayFrame {
            key: (playback.asset().id(), idx),
            image,
        })
    }

    fn active(&self) -> Option<&Playback> {
        match self.state {
            PlaybackState::Blank => None,
            PlaybackState::Idle => self.idle.as_ref(),
            PlaybackState::Click => self.click.as_ref(),
        }
    }

    fn play_idle(&mut self, now: Duration) {
        match self.idle.as_mut() {
            Some(idle) => {
                idle.start(now);
                self.state = PlaybackState::Idle;
                log::debug!("Playing idle animation");
            }
            None => {
                self.state = PlaybackState::Blank;
                log::warn!("Idle animation not loaded");
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::Rgba;

    use super::*;
    use crate::asset::{AnimFrame, AnimationAsset, StillImage};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn anim(name: &str, delays: &[Option<u32>]) -> Asset {
        let frames = delays
            .iter()
            .map(|&delay_ms| AnimFrame {
                image: RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])),
                delay_ms,
            })
            .collect::<Vec<_>>();
        let duration_ms = crate::asset::timing::total_duration(delays.iter().copied());
        Asset::Animation(Arc::new(AnimationAsset {
            name: name.to_owned(),
            frames,
            duration_ms,
        }))
    }

    fn idle_and_300ms_click() -> Sequencer {
        Sequencer::new(
            Some(anim("idle", &[Some(100), Some(100)])),
            Some(anim("click", &[Some(100), Some(200)])),
            ms(0),
        )
    }

    #[test]
    fn starts_idle_when_idle_asset_exists() {
        let seq = idle_and_300ms_click();
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert!(seq.idle().unwrap().is_running());
        assert_eq!(seq.pending_timers(), 0);
    }

    #[test]
    fn starts_blank_without_idle_asset() {
        let mut seq = Sequencer::new(None, None, ms(0));
        assert_eq!(seq.state(), PlaybackState::Blank);
        assert!(seq.current_frame(ms(0)).is_none());
        seq.click(ms(10));
        assert_eq!(seq.state(), PlaybackState::Blank);
    }

    #[test]
    fn click_returns_to_idle_after_natural_duration() {
        let mut seq = idle_and_300ms_click();
        seq.click(ms(0));

        assert_eq!(seq.state(), PlaybackState::Click);
        assert_eq!(seq.pending_timers(), 1);
        assert!(!seq.idle().unwrap().is_running());
        assert!(seq.click_playback().unwrap().is_running());

        assert!(!seq.tick(ms(299)));
        assert_eq!(seq.state(), PlaybackState::Click);

        assert!(seq.tick(ms(300)));
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert!(seq.idle().unwrap().is_running());
        assert!(!seq.click_playback().unwrap().is_running());
        assert_eq!(seq.pending_timers(), 0);
    }

    #[test]
    fn late_tick_still_returns_to_idle() {
        let mut seq = idle_and_300ms_click();
        seq.click(ms(1000));
        assert!(seq.tick(ms(1450)));
        assert_eq!(seq.state(), PlaybackState::Idle);
    }

    #[test]
    fn click_without_click_asset_reasserts_idle() {
        let mut seq = Sequencer::new(Some(anim("idle", &[None])), None, ms(0));
        assert_eq!(seq.idle().unwrap().starts(), 1);

        seq.click(ms(50));
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert_eq!(seq.idle().unwrap().starts(), 2);
        assert_eq!(seq.pending_timers(), 0);
    }

    #[test]
    fn reclick_restarts_and_supersedes_pending_return() {
        let mut seq = idle_and_300ms_click();
        seq.click(ms(0));
        seq.click(ms(200));

        assert_eq!(seq.pending_timers(), 1);
        assert_eq!(seq.click_playback().unwrap().starts(), 2);

        // The first click's return at 300ms no longer fires.
        assert!(!seq.tick(ms(300)));
        assert_eq!(seq.state(), PlaybackState::Click);

        assert!(!seq.tick(ms(499)));
        assert!(seq.tick(ms(500)));
        assert_eq!(seq.state(), PlaybackState::Idle);
    }

    #[test]
    fn shutdown_invalidates_pending_return() {
        let mut seq = idle_and_300ms_click();
        seq.click(ms(0));
        seq.shutdown();

        assert_eq!(seq.pending_timers(), 0);
        assert!(!seq.tick(ms(1000)));
        assert_eq!(seq.state(), PlaybackState::Click);
        assert!(!seq.click_playback().unwrap().is_running());
        assert!(seq.next_deadline(ms(1000)).is_none());

        seq.click(ms(1000));
        assert_eq!(seq.pending_timers(), 0);
    }

    #[test]
    fn frames_advance_and_loop() {
        let seq = Sequencer::new(Some(anim("idle", &[Some(100), Some(50), None])), None, ms(0));
        let frame = |t| seq.current_frame(ms(t)).unwrap().key.1;

        assert_eq!(frame(0), 0);
        assert_eq!(frame(99), 0);
        assert_eq!(frame(100), 1);
        assert_eq!(frame(149), 1);
        assert_eq!(frame(150), 2);
        assert_eq!(frame(250), 0);
        assert_eq!(frame(350), 1);
        assert_eq!(frame(400), 2);
    }

    #[test]
    fn click_plays_once_and_holds_last_frame() {
        let mut seq = idle_and_300ms_click();
        seq.click(ms(1000));
        let frame = |seq: &Sequencer, t| seq.current_frame(ms(t)).unwrap().key.1;

        assert_eq!(frame(&seq, 1000), 0);
        assert_eq!(frame(&seq, 1100), 1);
        // The return is late: the click rests on its last frame instead of wrapping.
        assert_eq!(frame(&seq, 1350), 1);
        assert_eq!(seq.click_playback().unwrap().next_frame_at(ms(1350)), None);

        assert!(seq.tick(ms(1350)));
        assert_eq!(seq.state(), PlaybackState::Idle);
    }

    #[test]
    fn next_deadline_prefers_earliest_of_frame_and_timer() {
        let mut seq = idle_and_300ms_click();
        assert_eq!(seq.next_deadline(ms(30)), Some(ms(100)));
        assert_eq!(seq.next_deadline(ms(130)), Some(ms(200)));

        seq.click(ms(1000));
        // Click frames change at 1100, the return fires at 1300.
        assert_eq!(seq.next_deadline(ms(1000)), Some(ms(1100)));
        assert_eq!(seq.next_deadline(ms(1150)), Some(ms(1300)));
    }

    #[test]
    fn still_click_image_shows_for_one_default_frame() {
        let still = Asset::Still(Arc::new(StillImage {
            name: "click".to_owned(),
            image: RgbaImage::new(2, 2),
        }));
        let mut seq = Sequencer::new(Some(anim("idle", &[Some(100)])), Some(still), ms(0));
        seq.click(ms(0));
        assert_eq!(seq.next_deadline(ms(0)), Some(ms(100)));
        assert!(seq.tick(ms(100)));
        assert_eq!(seq.state(), PlaybackState::Idle);
    }
}
