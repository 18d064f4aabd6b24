use std::time::{Duration, Instant};

/// Frame clock. The host hands in absolute times; scripts see elapsed and
/// delta seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Time {
    start: f64,
    last: f64,
    delta: f64,
    started: bool,
}

impl Time {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock to `now` (seconds) and returns the delta since the
    /// previous frame. The first frame has a zero delta; time never runs
    /// backwards.
    pub fn advance_to(&mut self, now: f64) -> f64 {
        if !self.started {
            self.start = now;
            self.last = now;
            self.started = true;
        }
        self.delta = (now - self.last).max(0.0);
        self.last = self.last.max(now);
        self.delta
    }

    pub fn advance_by(&mut self, delta: f64) -> f64 {
        let now = if self.started { self.last + delta } else { 0.0 };
        self.advance_to(now)
    }

    pub fn delta_seconds(&self) -> f64 {
        self.delta
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.last - self.start
    }
}

/// Wall clock feeding a [`Time`].
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    fn elapsed(&self) -> Duration {
        Instant::now().duration_since(self.origin)
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_delta() {
        let mut time = Time::new();
        assert_eq!(time.advance_to(10.0), 0.0);
        assert_eq!(time.advance_to(10.5), 0.5);
        assert_eq!(time.elapsed_seconds(), 0.5);
        assert_eq!(time.delta_seconds(), 0.5);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut time = Time::new();
        time.advance_to(2.0);
        time.advance_to(3.0);
        assert_eq!(time.advance_to(1.0), 0.0);
        assert_eq!(time.elapsed_seconds(), 1.0);
    }

    #[test]
    fn advance_by_accumulates_steps() {
        let mut time = Time::new();
        time.advance_by(0.25);
        time.advance_by(0.25);
        time.advance_by(0.25);
        assert_eq!(time.elapsed_seconds(), 0.5);
        assert_eq!(time.delta_seconds(), 0.25);
    }
}
