//! Scheduled parameter automation.
//!
//! A [`ParamTimeline`] holds a base value plus time-ordered [`Automation`]
//! events and can be evaluated at any absolute time. The semantics match a
//! native audio-graph parameter: ramps start from the value and time of the
//! preceding event, exponential ramps cannot cross or touch zero, and
//! cancelling drops every event at or after a given time.

/// One scheduled change to a parameter. Times are absolute seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to `value` at `at`.
    SetValue { value: f64, at: f64 },
    /// Exponential approach from the previous event, arriving at `value` at `end`.
    ExponentialRamp { value: f64, end: f64 },
    /// First-order approach toward `target` starting at `start`.
    SetTarget {
        target: f64,
        start: f64,
        time_constant: f64,
    },
}

impl Automation {
    /// The time this event is keyed on.
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { at, .. } => at,
            Automation::ExponentialRamp { end, .. } => end,
            Automation::SetTarget { start, .. } => start,
        }
    }
}

/// A parameter's base value and its automation events.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    base: f64,
    events: Vec<Automation>,
}

impl ParamTimeline {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            events: Vec::new(),
        }
    }

    /// Value before any event takes effect.
    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    /// Insert an event, keeping events ordered by time. Events with equal
    /// times keep their insertion order.
    pub fn push(&mut self, event: Automation) {
        let at = event.time();
        let idx = self.events.partition_point(|e| e.time() <= at);
        self.events.insert(idx, event);
    }

    /// Drop every event keyed at or after `from`.
    pub fn cancel_from(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    /// Evaluate the parameter at absolute time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut value = self.base;
        let mut since = 0.0;

        for (i, event) in self.events.iter().enumerate() {
            match *event {
                Automation::SetValue { value: v, at } => {
                    if at > t {
                        return value;
                    }
                    value = v;
                    since = at;
                }
                Automation::ExponentialRamp { value: v, end } => {
                    if end > t {
                        return exponential_between(value, v, since, end, t);
                    }
                    value = v;
                    since = end;
                }
                Automation::SetTarget {
                    target,
                    start,
                    time_constant,
                } => {
                    if start > t {
                        return value;
                    }
                    let next = self.events.get(i + 1).map(Automation::time);
                    match next {
                        Some(until) if until <= t => {
                            value = approach(value, target, until - start, time_constant);
                            since = until;
                        }
                        _ => return approach(value, target, t - start, time_constant),
                    }
                }
            }
        }

        value
    }
}

fn exponential_between(v0: f64, v1: f64, t0: f64, t1: f64, t: f64) -> f64 {
    // Hold the start value when an exponential curve is undefined.
    if v0 == 0.0 || v1 == 0.0 || v0.signum() != v1.signum() {
        return v0;
    }
    if t1 <= t0 || t <= t0 {
        return if t1 <= t0 { v1 } else { v0 };
    }
    v0 * (v1 / v0).powf((t - t0) / (t1 - t0))
}

fn approach(v0: f64, target: f64, elapsed: f64, time_constant: f64) -> f64 {
    if time_constant <= 0.0 {
        return target;
    }
    target + (v0 - target) * (-elapsed / time_constant).exp()
}
