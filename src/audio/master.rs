//! Master bus: the shared output gain followed by a hard ceiling.

/// Gain of the shared output node.
pub const DEFAULT_MASTER_GAIN: f32 = 0.8;

/// Absolute sample ceiling after the master gain.
pub const DEFAULT_CEILING: f32 = 0.95;

/// Scales every voice's sum by one gain, then clamps to `[-ceiling, ceiling]`.
#[derive(Debug, Clone)]
pub struct MasterBus {
    gain: f32,
    ceiling: f32,
}

impl MasterBus {
    pub fn new(gain: f32, ceiling: f32) -> Self {
        debug_assert!(ceiling > 0.0 && ceiling <= 1.0);
        Self {
            gain: gain.clamp(0.0, 1.0),
            ceiling,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    #[inline]
    pub fn process(&self, sample: f32) -> f32 {
        (sample * self.gain).clamp(-self.ceiling, self.ceiling)
    }

    #[inline]
    pub fn process_block(&self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

impl Default for MasterBus {
    fn default() -> Self {
        Self::new(DEFAULT_MASTER_GAIN, DEFAULT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn default_bus() {
        let bus = MasterBus::default();
        assert_approx_eq!(bus.gain(), 0.8);
        assert_approx_eq!(bus.ceiling(), 0.95);
        assert_approx_eq!(bus.process(0.5), 0.4);
    }

    #[test]
    fn clamps_after_gain() {
        let bus = MasterBus::new(1.0, 0.95);
        assert_eq!(bus.process(2.5), 0.95);
        assert_eq!(bus.process(-2.5), -0.95);
        assert_eq!(bus.process(f32::MAX), 0.95);
    }

    #[test]
    fn gain_is_clamped() {
        assert_eq!(MasterBus::new(3.0, 0.95).gain(), 1.0);
        let muted = MasterBus::new(-1.0, 0.95);
        assert_eq!(muted.gain(), 0.0);
        assert_eq!(muted.process(0.7), 0.0);
    }

    #[test]
    fn block_matches_per_sample() {
        let bus = MasterBus::default();
        let mut buffer = vec![0.0, 0.5, -0.5, 1.5, -1.5];
        let expected: Vec<f32> = buffer.iter().map(|&s| bus.process(s)).collect();
        bus.process_block(&mut buffer);
        assert_eq!(buffer, expected);
    }
}
