//! Instrument model: the four tonal voice algorithms.
//!
//! Each voice is a pure function of an [`Instrument`] and an onset time that
//! returns a fresh [`Patch`]. Nothing is shared between triggers.

use std::fmt;

use crate::graph::{Destination, FilterKind, NodeRef, Param, Patch};
use crate::synth::oscillator::Waveform;

/// Lowest gain any decay starts from or ends at. Exponential ramps cannot
/// touch zero.
pub const GAIN_FLOOR: f64 = 0.001;

/// Synthesis algorithm for a tonal track, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Voice {
    #[default]
    Blip,
    Pluck,
    Chime,
    Fm,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Blip, Voice::Pluck, Voice::Chime, Voice::Fm];

    pub fn index(self) -> u8 {
        match self {
            Voice::Blip => 0,
            Voice::Pluck => 1,
            Voice::Chime => 2,
            Voice::Fm => 3,
        }
    }

    /// Out-of-range indices clamp to the last voice.
    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index as usize).min(Self::ALL.len() - 1)]
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Blip => "blip",
            Voice::Pluck => "pluck",
            Voice::Chime => "chime",
            Voice::Fm => "fm",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Synthesis parameters for one tonal track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instrument {
    pub voice: Voice,
    pub waveform: Waveform,
    pub frequency_hz: f64,
    /// Linear gain in `[0, 1]`.
    pub gain: f64,
}

impl Instrument {
    /// A blip/square instrument at `frequency_hz`, gain 0.35.
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            voice: Voice::Blip,
            waveform: Waveform::Square,
            frequency_hz,
            gain: 0.35,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain.clamp(0.0, 1.0);
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::new(440.0)
    }
}

/// Build the sound event for `inst` starting at `when`.
pub fn render_instrument(inst: &Instrument, when: f64) -> Patch {
    match inst.voice {
        Voice::Blip => blip(inst, when),
        Voice::Pluck => pluck(inst, when),
        Voice::Chime => chime(inst, when),
        Voice::Fm => fm(inst, when),
    }
}

/// Gain node that starts at `max(floor, gain)` and decays to the floor.
fn decay_gain(patch: &mut Patch, gain: f64, when: f64, decay: f64) -> NodeRef {
    let start = gain.max(GAIN_FLOOR);
    let g = patch.gain(start);
    patch.set_value_at(g, Param::Gain, start, when);
    patch.exponential_ramp_to(g, Param::Gain, GAIN_FLOOR, when + decay);
    g
}

fn blip(inst: &Instrument, when: f64) -> Patch {
    let mut p = Patch::new();
    let osc = p.oscillator(inst.waveform, inst.frequency_hz);
    let g = decay_gain(&mut p, inst.gain, when, 0.12);
    p.connect(osc, Destination::Node(g));
    p.connect(g, Destination::Output);
    p.start(osc, when);
    p.stop(osc, when + 0.14);
    p
}

fn pluck(inst: &Instrument, when: f64) -> Patch {
    let mut p = Patch::new();
    let osc = p.oscillator(inst.waveform, inst.frequency_hz);
    let lp = p.filter(FilterKind::Lowpass, inst.frequency_hz * 2.5, 0.8);
    let g = decay_gain(&mut p, inst.gain, when, 0.22);
    p.connect(osc, Destination::Node(lp));
    p.connect(lp, Destination::Node(g));
    p.connect(g, Destination::Output);
    p.start(osc, when);
    p.stop(osc, when + 0.25);
    p
}

fn chime(inst: &Instrument, when: f64) -> Patch {
    let mut p = Patch::new();
    let osc = p.oscillator(Waveform::Sine, inst.frequency_hz);
    let bp = p.filter(FilterKind::Bandpass, inst.frequency_hz, 8.0);
    let g = decay_gain(&mut p, inst.gain, when, 0.6);
    p.connect(osc, Destination::Node(bp));
    p.connect(bp, Destination::Node(g));
    p.connect(g, Destination::Output);
    p.start(osc, when);
    p.stop(osc, when + 0.62);
    p
}

fn fm(inst: &Instrument, when: f64) -> Patch {
    let f = inst.frequency_hz;
    let mut p = Patch::new();
    let carrier = p.oscillator(Waveform::Sine, f);
    let modulator = p.oscillator(Waveform::Sine, f * 2.0);
    let depth = p.gain(f * 0.25);
    let g = decay_gain(&mut p, inst.gain, when, 0.35);

    p.connect(modulator, Destination::Node(depth));
    p.connect(depth, Destination::Param(carrier, Param::Frequency));
    p.connect(carrier, Destination::Node(g));
    p.connect(g, Destination::Output);

    p.start(carrier, when);
    p.start(modulator, when);
    p.stop(carrier, when + 0.4);
    p.stop(modulator, when + 0.4);
    p
}
