use std::time::{Duration, Instant};

/// Instantaneous frame rate from the gap between consecutive ticks.
///
/// Not thread-safe; the display loop ticks it once per iteration.
#[derive(Debug, Default)]
pub struct FpsMeter {
    last: Option<Instant>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Records `now` and returns `1 / (now - previous)`. The first tick and
    /// a zero-length gap both return 0.
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        let elapsed = self
            .last
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);
        self.last = Some(now);
        if elapsed.is_zero() {
            0.0
        } else {
            1.0 / elapsed.as_secs_f64()
        }
    }
}
