//! Session codec: the whole session as a compact `key=value&...` string.
//!
//! | key | meaning |
//! |-----|---------|
//! | `b` | tempo, clamped to 40..=220 |
//! | `s` | step count, clamped to 4..=32 |
//! | `p` | `-`-joined fixed-width hex rows, one per track in registry order |
//! | `i` | `.`-joined `voice-wave-note-vol` groups, one per tonal track |
//! | `d` | `.`-joined `armed-wave-note-vol` groups, one per drone slot |
//! | `t` | theme token |
//!
//! Decoding never fails. Every integer field falls back to a default when it
//! has no leading digits and is clamped to its range afterwards.

use crate::drone::Drone;
use crate::note::NoteTable;
use crate::session::Session;
use crate::synth::instrument::{Instrument, Voice};
use crate::synth::oscillator::Waveform;
use crate::theme::ThemeMode;

pub const DEFAULT_BPM: u32 = 120;
pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 220;

pub const DEFAULT_STEPS: usize = 16;
pub const MIN_STEPS: usize = 4;
pub const MAX_STEPS: usize = 32;

/// Key/value pairs of a location, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value for `key`, treating an empty value as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Pull the session parameters out of a location.
///
/// A non-empty fragment wins over the query string. A string with neither
/// `#` nor `?` is read as a bare parameter list. Keys and values are
/// percent-decoded, with `+` read as a space.
pub fn parse_location(location: &str) -> Params {
    let (head, fragment) = match location.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (location, None),
    };
    let body = match fragment {
        Some(frag) if !frag.is_empty() => frag,
        _ => match head.split_once('?') {
            Some((_, query)) => query,
            None if fragment.is_some() => "",
            None => head,
        },
    };

    let pairs = body
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(part), String::new()),
        })
        .collect();
    Params { pairs }
}

/// Decode `%XX` escapes and `+`. Malformed escapes are kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Leading optional sign plus decimal digits; anything after is ignored.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let digits: &str = &rest[..rest
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(rest.len())];
    if digits.is_empty() {
        return None;
    }
    // Saturate very long digit strings instead of failing.
    let value = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * value)
}

/// Parse with fallback, then clamp.
pub fn int_field(s: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    s.and_then(parse_int).unwrap_or(default).clamp(min, max)
}

pub fn clamp_bpm(value: Option<&str>) -> u32 {
    int_field(value, DEFAULT_BPM as i64, MIN_BPM as i64, MAX_BPM as i64) as u32
}

pub fn clamp_steps(value: Option<&str>) -> usize {
    int_field(
        value,
        DEFAULT_STEPS as i64,
        MIN_STEPS as i64,
        MAX_STEPS as i64,
    ) as usize
}

fn percent(v: f64) -> i64 {
    (v * 100.0).round().clamp(0.0, 100.0) as i64
}

pub fn encode_instrument(inst: &Instrument, notes: &NoteTable) -> String {
    format!(
        "{}-{}-{}-{}",
        inst.voice.index(),
        inst.waveform.index(),
        notes.nearest_index(inst.frequency_hz),
        percent(inst.gain)
    )
}

/// Decode one `voice-wave-note-vol` group. The frequency snaps to the table.
pub fn decode_instrument(group: &str, notes: &NoteTable) -> Instrument {
    let mut fields = group.split('-');
    let voice = int_field(fields.next(), 0, 0, 3);
    let wave = int_field(fields.next(), 2, 0, 3);
    let note = int_field(fields.next(), 0, 0, notes.max_index() as i64);
    let vol = int_field(fields.next(), 35, 0, 100);
    Instrument {
        voice: Voice::from_index(voice as u8),
        waveform: Waveform::from_index(wave as u8),
        frequency_hz: notes.frequency(note as usize),
        gain: vol as f64 / 100.0,
    }
}

/// A drone's persisted fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroneFields {
    pub armed: bool,
    pub waveform: Waveform,
    pub note_index: usize,
    pub volume: f64,
}

pub fn encode_drone(drone: &Drone) -> String {
    format!(
        "{}-{}-{}-{}",
        u8::from(drone.armed),
        drone.waveform.index(),
        drone.note_index,
        percent(drone.volume)
    )
}

/// Decode one `armed-wave-note-vol` group; only a literal 1 arms.
pub fn decode_drone(group: &str, notes: &NoteTable) -> DroneFields {
    let mut fields = group.split('-');
    let armed = fields.next().and_then(parse_int) == Some(1);
    let wave = int_field(fields.next(), 0, 0, 3);
    let note = int_field(fields.next(), 12, 0, notes.max_index() as i64);
    let vol = int_field(fields.next(), 50, 0, 100);
    DroneFields {
        armed,
        waveform: Waveform::from_index(wave as u8),
        note_index: note as usize,
        volume: vol as f64 / 100.0,
    }
}

/// Everything a location can carry. `None` means the key was absent and the
/// session keeps its current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSession {
    pub bpm: Option<u32>,
    pub steps: Option<usize>,
    /// Raw hex rows, positional over the registry's track order.
    pub patterns: Option<Vec<String>>,
    pub instruments: Option<Vec<Instrument>>,
    /// One entry per drone slot; missing groups decode to defaults.
    pub drones: Option<Vec<DroneFields>>,
    pub theme: Option<ThemeMode>,
}

/// Decode parameters against the note table and a drone slot count.
pub fn decode(params: &Params, notes: &NoteTable, drone_slots: usize) -> DecodedSession {
    let instruments = params.get("i").map(|s| {
        if s.is_empty() {
            Vec::new()
        } else {
            s.split('.').map(|g| decode_instrument(g, notes)).collect()
        }
    });

    let drones = params.non_empty("d").map(|s| {
        let groups: Vec<&str> = s.split('.').collect();
        (0..drone_slots)
            .map(|slot| decode_drone(groups.get(slot).copied().unwrap_or(""), notes))
            .collect()
    });

    DecodedSession {
        bpm: params.non_empty("b").map(|b| clamp_bpm(Some(b))),
        steps: params.non_empty("s").map(|s| clamp_steps(Some(s))),
        patterns: params
            .non_empty("p")
            .map(|p| p.split('-').map(str::to_string).collect()),
        instruments,
        drones,
        theme: params.non_empty("t").map(ThemeMode::from_token),
    }
}

/// Encode the whole session, keys in the order `b s p i d t`.
pub fn encode(session: &Session) -> String {
    let notes = session.notes();
    let steps = session.steps();

    let patterns: Vec<String> = session
        .registry()
        .ids()
        .iter()
        .map(|id| {
            let row = session.patterns().row(id).unwrap_or(&[]);
            crate::sequencer::sequence_to_hex(row, steps)
        })
        .collect();

    let instruments: Vec<String> = session
        .registry()
        .instruments()
        .map(|(_, inst)| encode_instrument(inst, notes))
        .collect();

    let drones: Vec<String> = session.drones().drones().iter().map(encode_drone).collect();

    format!(
        "b={}&s={}&p={}&i={}&d={}&t={}",
        session.bpm(),
        steps,
        patterns.join("-"),
        instruments.join("."),
        drones.join("."),
        session.theme().token()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn fragment_preferred_over_query() {
        let p = parse_location("https://toy.example/?b=90#b=150&s=8");
        assert_eq!(p.get("b"), Some("150"));
        assert_eq!(p.get("s"), Some("8"));
    }

    #[test]
    fn query_used_when_fragment_empty() {
        let p = parse_location("https://toy.example/index.html?b=90&t=dark#");
        assert_eq!(p.get("b"), Some("90"));
        assert_eq!(p.get("t"), Some("dark"));
    }

    #[test]
    fn bare_and_hash_only_forms() {
        assert_eq!(parse_location("b=100").get("b"), Some("100"));
        assert_eq!(parse_location("#b=101").get("b"), Some("101"));
        assert!(parse_location("").is_empty());
        assert!(parse_location("https://toy.example/#").is_empty());
    }

    #[test]
    fn first_occurrence_wins() {
        let p = parse_location("b=1&b=2&flag");
        assert_eq!(p.get("b"), Some("1"));
        assert_eq!(p.get("flag"), Some(""));
        assert_eq!(p.non_empty("flag"), None);
    }

    #[test]
    fn escaped_separators_are_decoded() {
        let p = parse_location("#b=1%32%30&p=0001%2D0002&%74=dark");
        assert_eq!(p.get("b"), Some("120"));
        assert_eq!(p.get("p"), Some("0001-0002"));
        assert_eq!(p.get("t"), Some("dark"));

        let notes = NoteTable::build();
        let d = decode(&parse_location("#i=1%2D2%2D33%2D40"), &notes, 3);
        let inst = d.instruments.unwrap()[0];
        assert_eq!(inst.voice, Voice::Pluck);
        assert_eq!(inst.waveform, Waveform::Square);
    }

    #[test]
    fn malformed_escapes_stay_literal() {
        assert_eq!(percent_decode("50%"), "50%");
        assert_eq!(percent_decode("%zz%4"), "%zz%4");
        assert_eq!(percent_decode("a+b%20c"), "a b c");
    }

    #[test]
    fn integer_parsing() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("42abc"), Some(42));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int(" 9"), Some(9));
        assert_eq!(parse_int("500.0"), Some(500));
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("99999999999999999999999"), Some(i64::MAX));
    }

    #[test]
    fn tempo_and_steps_clamp() {
        assert_eq!(clamp_bpm(Some("9999")), 220);
        assert_eq!(clamp_bpm(Some("1")), 40);
        assert_eq!(clamp_bpm(Some("x")), DEFAULT_BPM);
        assert_eq!(clamp_bpm(None), DEFAULT_BPM);
        assert_eq!(clamp_steps(Some("100")), 32);
        assert_eq!(clamp_steps(Some("1")), 4);
        assert_eq!(clamp_steps(Some("12")), 12);
    }

    #[test]
    fn instrument_group_defaults_and_clamps() {
        let notes = NoteTable::build();
        let inst = decode_instrument("", &notes);
        assert_eq!(inst.voice, Voice::Blip);
        assert_eq!(inst.waveform, Waveform::Square);
        assert_approx_eq!(inst.frequency_hz, notes.frequency(0));
        assert_approx_eq!(inst.gain, 0.35);

        let inst = decode_instrument("7-9-200-400", &notes);
        assert_eq!(inst.voice, Voice::Fm);
        assert_eq!(inst.waveform, Waveform::Sawtooth);
        assert_approx_eq!(inst.frequency_hz, notes.frequency(notes.max_index()));
        assert_approx_eq!(inst.gain, 1.0);
    }

    #[test]
    fn literal_zero_is_kept() {
        let notes = NoteTable::build();
        let inst = decode_instrument("0-0-0-0", &notes);
        assert_eq!(inst.waveform, Waveform::Sine);
        assert_approx_eq!(inst.gain, 0.0);
    }

    #[test]
    fn instrument_encoding_snaps_to_table() {
        let notes = NoteTable::build();
        let inst = Instrument {
            voice: Voice::Pluck,
            waveform: Waveform::Square,
            frequency_hz: 441.3,
            gain: 0.404,
        };
        assert_eq!(encode_instrument(&inst, &notes), "1-2-33-40");
    }

    #[test]
    fn malformed_drones_degrade() {
        let notes = NoteTable::build();
        let params = parse_location("d=1-9-99-500.0--40");
        let decoded = decode(&params, &notes, 3);
        let drones = decoded.drones.unwrap();
        assert_eq!(drones.len(), 3);

        assert!(drones[0].armed);
        assert_eq!(drones[0].waveform, Waveform::Sawtooth);
        assert_eq!(drones[0].note_index, notes.max_index());
        assert_approx_eq!(drones[0].volume, 1.0);

        assert!(!drones[1].armed);
        assert_eq!(drones[1].waveform, Waveform::Sine);
        assert_eq!(drones[1].note_index, 40);
        assert_approx_eq!(drones[1].volume, 0.5);

        // Missing group: every field defaulted.
        assert!(!drones[2].armed);
        assert_eq!(drones[2].note_index, 12);
    }

    #[test]
    fn only_one_arms() {
        let notes = NoteTable::build();
        assert!(!decode_drone("2-0-0-0", &notes).armed);
        assert!(decode_drone("1", &notes).armed);
    }

    #[test]
    fn absent_keys_stay_absent() {
        let notes = NoteTable::build();
        let decoded = decode(&parse_location("#t=vaporwave"), &notes, 3);
        assert_eq!(decoded.theme, Some(ThemeMode::Vaporwave));
        assert_eq!(decoded.bpm, None);
        assert_eq!(decoded.steps, None);
        assert_eq!(decoded.instruments, None);
        assert_eq!(decoded.drones, None);
        assert_eq!(decoded.patterns, None);
    }

    #[test]
    fn empty_instrument_list_means_none() {
        let notes = NoteTable::build();
        let decoded = decode(&parse_location("i="), &notes, 3);
        assert_eq!(decoded.instruments, Some(Vec::new()));
    }

    #[test]
    fn unknown_theme_is_light() {
        let notes = NoteTable::build();
        let decoded = decode(&parse_location("t=neon"), &notes, 3);
        assert_eq!(decoded.theme, Some(ThemeMode::Light));
    }
}
