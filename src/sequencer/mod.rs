//! Step sequencing: the pattern grid, the track list and the clock that walks it.

pub mod pattern;
pub mod tracks;
pub mod transport;

pub use pattern::{hex_to_sequence, sequence_to_hex, PatternStore};
pub use tracks::{Track, TrackId, TrackKind, TrackRegistry, MAX_TONAL, SAMPLE_TRACK};
pub use transport::{step_interval_ms, Clock, MonotonicClock, PlayState, Transport};
