use serde::{Deserialize, Serialize};

use super::debounce::DebounceCounter;

/// Physical weld station on the jig.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Per-side weld counter: debounces the raw flash signal and counts each
/// rising edge exactly once.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    side: Side,
    count: u64,
    latched: bool,
    debounce: DebounceCounter,
}

impl ChannelSession {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            count: 0,
            latched: false,
            debounce: DebounceCounter::new(),
        }
    }

    /// Feed one frame's flash observation. Returns 1 when a new weld was counted.
    pub fn observe(&mut self, raw_signal: bool) -> u64 {
        let stable = self.debounce.update(raw_signal);

        match (stable, self.latched) {
            (true, false) => {
                self.count += 1;
                self.latched = true;
                1
            }
            (true, true) => 0,
            (false, _) => {
                self.latched = false;
                0
            }
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }
}
