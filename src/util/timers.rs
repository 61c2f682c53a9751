use std::time::Duration;

/// Handle to a one-shot deadline in a [`Timers`] arena.
///
/// Handles carry the generation of their slot. Once the deadline fires or is
/// cancelled the slot generation moves on, so a stale handle can never fire,
/// be cancelled, or alias a newer timer that reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    slot: usize,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    entry: Option<(Duration, T)>,
}

/// Generation-counted arena of one-shot deadlines.
///
/// Time is a `Duration` since an epoch chosen by the owner, so the arena never
/// reads a clock itself.
pub struct Timers<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Timers<T> {
    pub fn with_capacity(cap: usize) -> Self {
        let mut slots = Vec::with_capacity(cap);
        let mut free = Vec::with_capacity(cap);
        for i in (0..cap).rev() {
            slots.push(Slot {
                generation: 0,
                entry: None,
            });
            free.push(i);
        }
        Self { slots, free }
    }

    /// Arm a deadline at `at`. Grows the arena when every slot is in use.
    pub fn schedule(&mut self, at: Duration, payload: T) -> TimerHandle {
        let slot = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                self.slots.len() - 1
            }
        };
        let s = &mut self.slots[slot];
        s.entry = Some((at, payload));
        TimerHandle {
            slot,
            generation: s.generation,
        }
    }

    /// Cancel a pending deadline. Returns false for stale or unknown handles.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if !self.is_pending(handle) {
            return false;
        }
        self.release(handle.slot);
        true
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.slots
            .get(handle.slot)
            .is_some_and(|s| s.generation == handle.generation && s.entry.is_some())
    }

    /// Number of armed deadlines.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref().map(|(at, _)| *at))
            .min()
    }

    /// Remove every deadline at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(TimerHandle, T)> {
        let mut due: Vec<(Duration, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| match &s.entry {
                Some((at, _)) if *at <= now => Some((*at, idx)),
                _ => None,
            })
            .collect();
        due.sort_unstable();

        let mut fired = Vec::with_capacity(due.len());
        for (_, idx) in due {
            let handle = TimerHandle {
                slot: idx,
                generation: self.slots[idx].generation,
            };
            if let Some((_, payload)) = self.release(idx) {
                fired.push((handle, payload));
            }
        }
        fired
    }

    /// Drop every armed deadline, invalidating all outstanding handles.
    pub fn clear(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].entry.is_some() {
                self.release(idx);
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<(Duration, T)> {
        let s = &mut self.slots[idx];
        let entry = s.entry.take();
        s.generation = s.generation.wrapping_add(1);
        self.free.push(idx);
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut timers = Timers::with_capacity(2);
        timers.schedule(ms(30), "late");
        timers.schedule(ms(10), "early");
        timers.schedule(ms(50), "future");

        let fired: Vec<_> = timers.drain_due(ms(30)).into_iter().map(|(_, p)| p).collect();
        assert_eq!(fired, vec!["early", "late"]);
        assert_eq!(timers.pending(), 1);
        assert_eq!(timers.next_deadline(), Some(ms(50)));
    }

    #[test]
    fn cancelled_handle_never_fires() {
        let mut timers = Timers::with_capacity(1);
        let h = timers.schedule(ms(10), ());
        assert!(timers.cancel(h));
        assert!(!timers.cancel(h));
        assert!(timers.drain_due(ms(100)).is_empty());
    }

    #[test]
    fn reused_slot_does_not_alias_stale_handle() {
        let mut timers = Timers::with_capacity(1);
        let stale = timers.schedule(ms(10), 1);
        assert!(timers.cancel(stale));

        let fresh = timers.schedule(ms(20), 2);
        assert_ne!(stale, fresh);
        assert!(!timers.is_pending(stale));
        assert!(!timers.cancel(stale));
        assert!(timers.is_pending(fresh));

        let fired = timers.drain_due(ms(20));
        assert_eq!(fired, vec![(fresh, 2)]);
        assert!(!timers.is_pending(fresh));
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut timers = Timers::with_capacity(0);
        let a = timers.schedule(ms(1), ());
        let b = timers.schedule(ms(2), ());
        timers.clear();
        assert!(!timers.is_pending(a));
        assert!(!timers.is_pending(b));
        assert_eq!(timers.next_deadline(), None);
    }
}
