use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Produces `FrameTime` snapshots and gates how often a tick may run.
///
/// Delta time is clamped so a stalled or suspended loop does not hand the host
/// a huge step. The minimum interval is the pacing gate: the runtime only ticks
/// once [`is_due`](Self::is_due) reports the interval has elapsed.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
    min_interval: Duration,
}

impl FrameClock {
    /// 60 ticks per second.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_nanos(16_666_667);

    pub fn new() -> Self {
        Self::with_interval(Self::DEFAULT_INTERVAL)
    }

    /// Clock with a custom pacing interval. `Duration::ZERO` disables pacing.
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min: Duration::from_micros(100),
            dt_max: Duration::from_millis(250),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Resets the baseline, e.g. after the window was suspended.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Earliest instant the next tick may run.
    pub fn next_deadline(&self) -> Instant {
        self.last + self.min_interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_deadline()
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);

        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_opens_after_interval() {
        let clock = FrameClock::with_interval(Duration::from_millis(10));
        let start = clock.next_deadline() - Duration::from_millis(10);

        assert!(!clock.is_due(start + Duration::from_millis(9)));
        assert!(clock.is_due(start + Duration::from_millis(10)));
    }

    #[test]
    fn zero_interval_is_always_due() {
        let clock = FrameClock::with_interval(Duration::ZERO);
        assert!(clock.is_due(Instant::now()));
    }

    #[test]
    fn dt_is_clamped_and_index_advances() {
        let mut clock = FrameClock::new();
        let base = clock.next_deadline() - FrameClock::DEFAULT_INTERVAL;

        let first = clock.tick_at(base);
        assert_eq!(first.frame_index, 0);
        assert!((first.dt - 0.0001).abs() < 1e-6);

        let second = clock.tick_at(base + Duration::from_secs(5));
        assert_eq!(second.frame_index, 1);
        assert!((second.dt - 0.25).abs() < 1e-6);
    }
}
