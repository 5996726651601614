//! musictoy: a step sequencer and drone synthesizer whose whole session
//! fits in a URL fragment.

pub mod audio;
pub mod codec;
pub mod config;
pub mod drone;
pub mod graph;
pub mod note;
pub mod sequencer;
pub mod session;
pub mod synth;
pub mod theme;
