//! Sound sources: waveforms, tonal voices, fixed percussion and samples.

pub mod instrument;
pub mod oscillator;
pub mod percussion;
pub mod sample;

pub use instrument::{render_instrument, Instrument, Voice, GAIN_FLOOR};
pub use oscillator::Waveform;
pub use percussion::Percussion;
pub use sample::{DecodeTicket, LoadOutcome, SampleData, SampleError, SampleLoader, SampleStatus};
