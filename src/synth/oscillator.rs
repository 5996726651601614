//! Oscillator primitives: waveform shapes and per-sample generation.

use std::f64::consts::PI;
use std::fmt;

/// Available waveform shapes, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Square,
        Waveform::Sawtooth,
    ];

    /// Position in the session encoding (0–3).
    pub fn index(self) -> u8 {
        match self {
            Waveform::Sine => 0,
            Waveform::Triangle => 1,
            Waveform::Square => 2,
            Waveform::Sawtooth => 3,
        }
    }

    /// Inverse of [`index`](Self::index); out-of-range values clamp to the last shape.
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index as usize).min(Self::ALL.len() - 1)]
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Triangle => "triangle",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generate a single sample for the given waveform at the specified phase.
///
/// `phase` is in the range [0.0, 1.0), representing one full cycle.
/// Returns a value in [-1.0, 1.0].
pub fn oscillator(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => (phase * 2.0 * PI).sin(),
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => {
            if phase < 0.25 {
                4.0 * phase
            } else if phase < 0.75 {
                2.0 - 4.0 * phase
            } else {
                4.0 * phase - 4.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_order() {
        assert_eq!(Waveform::Sine.index(), 0);
        assert_eq!(Waveform::Triangle.index(), 1);
        assert_eq!(Waveform::Square.index(), 2);
        assert_eq!(Waveform::Sawtooth.index(), 3);
        for wf in Waveform::ALL {
            assert_eq!(Waveform::from_index(wf.index()), wf);
        }
    }

    #[test]
    fn from_index_clamps() {
        assert_eq!(Waveform::from_index(9), Waveform::Sawtooth);
    }

    #[test]
    fn sine_at_quarter() {
        let v = oscillator(Waveform::Sine, 0.25);
        assert!((v - 1.0).abs() < 1e-10);
    }

    #[test]
    fn saw_midpoint() {
        let v = oscillator(Waveform::Sawtooth, 0.5);
        assert!(v.abs() < 1e-10);
    }

    #[test]
    fn square_halves() {
        assert!((oscillator(Waveform::Square, 0.25) - 1.0).abs() < 1e-10);
        assert!((oscillator(Waveform::Square, 0.75) + 1.0).abs() < 1e-10);
    }

    #[test]
    fn triangle_at_three_quarters() {
        let v = oscillator(Waveform::Triangle, 0.75);
        assert!((v - (-1.0)).abs() < 1e-10);
    }

    #[test]
    fn all_waveforms_bounded() {
        for wf in Waveform::ALL {
            for i in 0..1000 {
                let phase = i as f64 / 1000.0;
                let v = oscillator(wf, phase);
                assert!(
                    (-1.0..=1.0).contains(&v),
                    "{wf:?} at phase {phase}: {v} out of bounds"
                );
            }
        }
    }
}
