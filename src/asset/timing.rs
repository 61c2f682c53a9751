use image::Delay;

use super::AnimFrame;

/// Display interval assumed for a frame that does not carry one.
pub const DEFAULT_FRAME_MS: u32 = 100;
/// Duration reported when an animation yields no frames.
pub const FALLBACK_DURATION_MS: u32 = 2000;

/// Explicit interval of a decoded frame. A zero delay means "not specified".
pub fn frame_interval(delay: Delay) -> Option<u32> {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return None;
    }
    match numer / denom {
        0 => None,
        ms => Some(ms),
    }
}

/// Sum per-frame intervals, counting [`DEFAULT_FRAME_MS`] for frames without one.
pub fn total_duration<I>(intervals: I) -> u32
where
    I: IntoIterator<Item = Option<u32>>,
{
    intervals
        .into_iter()
        .map(|ms| ms.unwrap_or(DEFAULT_FRAME_MS))
        .fold(0u32, u32::saturating_add)
}

/// Natural playback duration (one full loop) of decoded frames, in milliseconds.
///
/// Never fails: an animation without frames yields [`FALLBACK_DURATION_MS`].
pub fn natural_duration(frames: &[AnimFrame]) -> u32 {
    if frames.is_empty() {
        log::warn!("Animation has no frames, assuming {FALLBACK_DURATION_MS}ms");
        return FALLBACK_DURATION_MS;
    }
    let total = total_duration(frames.iter().map(|f| f.delay_ms));
    log::debug!("Animation timing: {} frames, {}ms total", frames.len(), total);
    total
}
