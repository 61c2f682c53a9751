use glam::IVec2;

/// Manhattan displacement (pixels) below which a press-release is a click.
pub const CLICK_THRESHOLD: i32 = 5;

/// Pointer buttons the companion cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

/// Gesture in progress between a primary press and its release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gesture {
    #[default]
    None,
    Pending {
        /// Global pointer position at press time.
        origin: IVec2,
        /// Pointer position relative to the window's top-left corner.
        grab_offset: IVec2,
    },
}

/// Immediate reaction to a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    /// A primary gesture started.
    GestureStarted,
    /// Secondary button: show the exit menu at this global position.
    ShowExitMenu(IVec2),
    Ignored,
}

/// Classification of a finished gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// Pointer barely moved: react at this global position.
    Click { at: IVec2 },
    /// Window was dragged and came to rest at this top-left position.
    Drag { rest: IVec2 },
}

/// Turns raw pointer events into drag-or-click decisions.
#[derive(Debug, Default)]
pub struct InteractionClassifier {
    gesture: Gesture,
}

impl InteractionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    /// Press at global position `global` while the window sits at `window_pos`.
    pub fn pointer_down(&mut self, button: PointerButton, global: IVec2, window_pos: IVec2) -> PointerAction {
        match button {
            PointerButton::Primary => {
                self.gesture = Gesture::Pending {
                    origin: global,
                    grab_offset: global - window_pos,
                };
                PointerAction::GestureStarted
            }
            PointerButton::Secondary => PointerAction::ShowExitMenu(global),
            PointerButton::Other => PointerAction::Ignored,
        }
    }

    /// Where the window should move to follow the pointer, if a gesture is active.
    pub fn pointer_move(&self, global: IVec2) -> Option<IVec2> {
        match self.gesture {
            Gesture::Pending { grab_offset, .. } => Some(global - grab_offset),
            Gesture::None => None,
        }
    }

    /// Finish the gesture. Only the primary button classifies.
    pub fn pointer_up(&mut self, button: PointerButton, global: IVec2) -> Option<GestureOutcome> {
        if button != PointerButton::Primary {
            return None;
        }

        let Gesture::Pending { origin, grab_offset } = std::mem::take(&mut self.gesture) else {
            return None;
        };

        let delta = global - origin;
        let distance = delta.x.abs() + delta.y.abs();
        if distance < CLICK_THRESHOLD {
            Some(GestureOutcome::Click { at: global })
        } else {
            Some(GestureOutcome::Drag {
                rest: global - grab_offset,
            })
        }
    }

    /// Drop any gesture in flight (focus lost, window closing).
    pub fn cancel(&mut self) {
        self.gesture = Gesture::None;
    }
}
