use std::time::{Duration, Instant};

use super::source::{MonotonicClock, TimeSource};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time since the previous tick, in seconds.
    pub dt: f32,

    /// Accumulated simulation time (sum of clamped deltas), in seconds.
    pub elapsed: f64,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped to `[dt_min, dt_max]` so that debugger breaks, OS
/// suspension or a minimized window do not destabilize the simulation.
/// Accumulated time only resets when the clock is constructed.
#[derive(Debug, Clone)]
pub struct FrameClock<T: TimeSource = MonotonicClock> {
    source: T,
    last: Instant,
    elapsed: f64,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock<MonotonicClock> {
    /// Creates a wall-clock frame clock with default clamps.
    pub fn new() -> Self {
        Self::with_source(MonotonicClock)
    }
}

impl Default for FrameClock<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> FrameClock<T> {
    pub const DEFAULT_MIN_DT: Duration = Duration::from_micros(100);
    pub const DEFAULT_MAX_DT: Duration = Duration::from_millis(100);

    /// Creates a clock reading `source` with default clamps.
    pub fn with_source(source: T) -> Self {
        Self::with_clamps(source, Self::DEFAULT_MIN_DT, Self::DEFAULT_MAX_DT)
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(source: T, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let last = source.now();
        Self {
            source,
            last,
            elapsed: 0.0,
            frame_index: 0,
            dt_min,
            dt_max: dt_max.max(dt_min),
        }
    }

    /// Moves the delta baseline to "now" without touching accumulated time.
    ///
    /// Used when the loop starts so that setup time does not count as a frame.
    pub fn rebase(&mut self) {
        self.last = self.source.now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = self.source.now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);

        self.last = now;
        self.elapsed += dt.as_secs_f64();

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: self.elapsed,
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    pub fn max_delta(&self) -> Duration {
        self.dt_max
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}
