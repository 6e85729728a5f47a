/// Saturating up/down counter turning a raw per-frame signal into a stable one.
///
/// With the default bounds of `[0, 1]` a single positive frame is enough to
/// flip the output, so this behaves as an edge latch rather than a noise
/// filter. Widen `max` to require more agreeing frames.
#[derive(Debug, Clone)]
pub struct DebounceCounter {
    state: u8,
    min: u8,
    max: u8,
}

impl Default for DebounceCounter {
    fn default() -> Self {
        Self {
            state: 0,
            min: 0,
            max: 1,
        }
    }
}

impl DebounceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one observation; returns whether the signal is currently stable-high.
    pub fn update(&mut self, raw_signal: bool) -> bool {
        if raw_signal {
            if self.state < self.max {
                self.state += 1;
            }
        } else if self.state > self.min {
            self.state -= 1;
        }

        self.is_stable()
    }

    pub fn is_stable(&self) -> bool {
        self.state >= 1
    }

    pub fn state(&self) -> u8 {
        self.state
    }
}
