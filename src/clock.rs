use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of measurement timestamps
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// Wall-clock anchored clock that never goes backwards
///
/// The wall time is read once at construction; later readings add the
/// monotonic time elapsed since then. Sharing one instance between sessions
/// keeps timestamps from different sensors on the same timeline.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin_ms: i64,
    origin: Instant,
}

impl MonotonicClock {
    /// Anchor a new clock at the current wall time
    #[must_use]
    pub fn new() -> Self {
        let origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        Self {
            origin_ms,
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now_ms();
        for _ in 0..1_000 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_monotonic_clock_is_wall_anchored() {
        let clock = MonotonicClock::new();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let diff = (i128::from(clock.now_ms()) - i128::try_from(wall).unwrap()).abs();
        assert!(diff < 1_000);
    }
}
