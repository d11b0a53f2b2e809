//! Screen state machine.

use serde::Serialize;

/// The four mutually exclusive screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Welcome,
    Camera,
    Loading,
    Results,
}

/// Tracks which screen is shown. Exactly one is active at a time.
#[derive(Debug)]
pub struct ScreenController {
    current: Screen,
}

impl Default for ScreenController {
    fn default() -> Self {
        Self { current: Screen::Welcome }
    }
}

impl ScreenController {
    pub fn current(&self) -> Screen {
        self.current
    }

    /// Switch to `target`, returning the screen that was left.
    pub fn show(&mut self, target: Screen) -> Screen {
        let previous = std::mem::replace(&mut self.current, target);
        if previous != target {
            tracing::debug!(from = ?previous, to = ?target, "screen transition");
        }
        previous
    }
}
