//! Transport: play/stop and drift-free step advancement.
//!
//! Step times are absolute: each fire schedules the next at
//! `next_fire += interval`, computed from the tempo at that moment. A late
//! wake-up fires every step whose time has passed instead of slipping.

use std::time::Instant;

use tracing::debug;

/// If the loop falls this far behind, it resynchronises instead of bursting.
pub const MAX_LAG_MS: f64 = 1000.0;

/// Sixteenth-note interval at `bpm`, in milliseconds.
pub fn step_interval_ms(bpm: u32) -> f64 {
    60_000.0 / bpm.max(1) as f64 / 4.0
}

/// Source of monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
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
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Running,
}

#[derive(Debug, Clone)]
pub struct Transport {
    state: PlayState,
    current_step: Option<usize>,
    next_fire_ms: f64,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: PlayState::Stopped,
            current_step: None,
            next_fire_ms: 0.0,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlayState::Running
    }

    /// The step most recently fired; `None` while stopped or before the first tick.
    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    /// Absolute time of the next scheduled step.
    pub fn next_fire_ms(&self) -> f64 {
        self.next_fire_ms
    }

    /// Start from the top. Fires step 0 immediately and returns it.
    pub fn start(&mut self, now_ms: f64, bpm: u32, steps: usize) -> usize {
        self.state = PlayState::Running;
        self.current_step = None;
        let step = self.advance(steps);
        self.next_fire_ms = now_ms + step_interval_ms(bpm);
        step
    }

    /// Cancel the pending tick and clear the current step.
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.current_step = None;
    }

    /// Fire every step due at `now_ms`, in order.
    pub fn poll(&mut self, now_ms: f64, bpm: u32, steps: usize) -> Vec<usize> {
        let mut fired = Vec::new();
        if !self.is_running() {
            return fired;
        }
        if now_ms - self.next_fire_ms > MAX_LAG_MS {
            debug!(
                behind_ms = now_ms - self.next_fire_ms,
                "transport fell behind, resynchronising"
            );
            self.next_fire_ms = now_ms;
        }
        while now_ms >= self.next_fire_ms {
            fired.push(self.advance(steps));
            self.next_fire_ms += step_interval_ms(bpm);
        }
        fired
    }

    /// Keep the current step inside a new step count.
    pub fn rescale_steps(&mut self, steps: usize) {
        if let Some(step) = self.current_step {
            self.current_step = Some(step % steps.max(1));
        }
    }

    fn advance(&mut self, steps: usize) -> usize {
        let next = self.current_step.map_or(0, |s| (s + 1) % steps.max(1));
        self.current_step = Some(next);
        next
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn initial_state() {
        let t = Transport::new();
        assert_eq!(t.state(), PlayState::Stopped);
        assert_eq!(t.current_step(), None);
    }

    #[test]
    fn interval_is_a_sixteenth() {
        assert_approx_eq!(step_interval_ms(120), 125.0);
        assert_approx_eq!(step_interval_ms(60), 250.0);
    }

    #[test]
    fn start_fires_step_zero() {
        let mut t = Transport::new();
        assert_eq!(t.start(1000.0, 120, 16), 0);
        assert!(t.is_running());
        assert_eq!(t.current_step(), Some(0));
        assert_approx_eq!(t.next_fire_ms(), 1125.0);
    }

    #[test]
    fn twenty_ticks_wrap() {
        let mut t = Transport::new();
        let mut seen = vec![t.start(0.0, 120, 16)];
        let mut now = 0.0;
        while seen.len() < 20 {
            now += 125.0;
            seen.extend(t.poll(now, 120, 16));
        }
        let expected: Vec<usize> = (0..16).chain(0..4).collect();
        assert_eq!(seen, expected);
        assert!(seen.iter().all(|&s| s < 16));
    }

    #[test]
    fn late_wake_catches_up() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        // Woken 3.5 intervals late: steps 1, 2, 3 are all due.
        assert_eq!(t.poll(375.0 + 62.5, 120, 16), vec![1, 2, 3]);
        assert_approx_eq!(t.next_fire_ms(), 500.0);
    }

    #[test]
    fn early_poll_fires_nothing() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        assert!(t.poll(124.9, 120, 16).is_empty());
    }

    #[test]
    fn long_stall_resyncs() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        let fired = t.poll(10_000.0, 120, 16);
        assert_eq!(fired, vec![1]);
        assert_approx_eq!(t.next_fire_ms(), 10_125.0);
    }

    #[test]
    fn tempo_change_applies_from_next_tick() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        // Already scheduled at 125 ms; the new tempo sets the gap after it.
        assert_eq!(t.poll(125.0, 60, 16), vec![1]);
        assert_approx_eq!(t.next_fire_ms(), 375.0);
    }

    #[test]
    fn no_drift_over_many_ticks() {
        let mut t = Transport::new();
        t.start(0.0, 137, 16);
        let interval = step_interval_ms(137);
        let mut count = 1;
        // Jittery wake-ups a little after each due time.
        for k in 1..=10_000 {
            let now = k as f64 * interval + (k % 7) as f64 * 0.3;
            count += t.poll(now, 137, 16).len();
        }
        assert_eq!(count, 10_001);
        assert_approx_eq!(t.next_fire_ms(), 10_001.0 * interval, 1e-6);
    }

    #[test]
    fn stop_clears_step_and_polling_is_inert() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        t.stop();
        assert_eq!(t.current_step(), None);
        assert!(t.poll(10_000.0, 120, 16).is_empty());
    }

    #[test]
    fn rescale_keeps_position_modulo() {
        let mut t = Transport::new();
        t.start(0.0, 120, 16);
        for k in 1..=13 {
            t.poll(125.0 * k as f64, 120, 16);
        }
        assert_eq!(t.current_step(), Some(13));
        t.rescale_steps(8);
        assert_eq!(t.current_step(), Some(5));
        assert_eq!(t.poll(125.0 * 14.0, 120, 8), vec![6]);
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
