//! Fixed percussion voices: kick, snare and hat.
//!
//! These take no parameters beyond the onset time. Snare and hat ask the
//! graph for a fresh noise burst on every trigger.

use std::fmt;

use crate::graph::{Destination, FilterKind, Param, Patch};
use crate::synth::instrument::GAIN_FLOOR;
use crate::synth::oscillator::Waveform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Percussion {
    Kick,
    Snare,
    Hat,
}

impl Percussion {
    /// Registry order.
    pub const ALL: [Percussion; 3] = [Percussion::Kick, Percussion::Snare, Percussion::Hat];

    /// Stable track id.
    pub fn id(self) -> &'static str {
        match self {
            Percussion::Kick => "kick",
            Percussion::Snare => "snare",
            Percussion::Hat => "hat",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Percussion::Kick => "Kick",
            Percussion::Snare => "Snare",
            Percussion::Hat => "Hat",
        }
    }

    pub fn render(self, when: f64) -> Patch {
        match self {
            Percussion::Kick => kick(when),
            Percussion::Snare => snare(when),
            Percussion::Hat => hat(when),
        }
    }
}

impl fmt::Display for Percussion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

fn kick(when: f64) -> Patch {
    let mut p = Patch::new();
    let osc = p.oscillator(Waveform::Sine, 150.0);
    p.set_value_at(osc, Param::Frequency, 150.0, when);
    p.exponential_ramp_to(osc, Param::Frequency, 50.0, when + 0.2);

    let g = p.gain(1.0);
    p.set_value_at(g, Param::Gain, 1.0, when);
    p.exponential_ramp_to(g, Param::Gain, GAIN_FLOOR, when + 0.2);

    p.connect(osc, Destination::Node(g));
    p.connect(g, Destination::Output);
    p.start(osc, when);
    p.stop(osc, when + 0.3);
    p
}

fn snare(when: f64) -> Patch {
    let mut p = Patch::new();

    let noise = p.noise(0.2);
    let hp = p.filter(FilterKind::Highpass, 1800.0, 1.0);
    let noise_gain = p.gain(0.5);
    p.set_value_at(noise_gain, Param::Gain, 0.5, when);
    p.exponential_ramp_to(noise_gain, Param::Gain, GAIN_FLOOR, when + 0.15);
    p.connect(noise, Destination::Node(hp));
    p.connect(hp, Destination::Node(noise_gain));
    p.connect(noise_gain, Destination::Output);
    p.start(noise, when);
    p.stop(noise, when + 0.2);

    // Body
    let tone = p.oscillator(Waveform::Triangle, 200.0);
    let tone_gain = p.gain(0.2);
    p.set_value_at(tone_gain, Param::Gain, 0.2, when);
    p.exponential_ramp_to(tone_gain, Param::Gain, GAIN_FLOOR, when + 0.1);
    p.connect(tone, Destination::Node(tone_gain));
    p.connect(tone_gain, Destination::Output);
    p.start(tone, when);
    p.stop(tone, when + 0.11);

    p
}

fn hat(when: f64) -> Patch {
    let mut p = Patch::new();
    let noise = p.noise(0.08);
    let hp = p.filter(FilterKind::Highpass, 6000.0, 1.0);
    let g = p.gain(0.35);
    p.set_value_at(g, Param::Gain, 0.35, when);
    p.exponential_ramp_to(g, Param::Gain, GAIN_FLOOR, when + 0.06);
    p.connect(noise, Destination::Node(hp));
    p.connect(hp, Destination::Node(g));
    p.connect(g, Destination::Output);
    p.start(noise, when);
    p.stop(noise, when + 0.07);
    p
}
