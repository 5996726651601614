//! Note table: the 48 equal-tempered pitches (octaves 2–5) every tonal
//! control snaps to, and the index space used by the session encoding.

/// Lowest octave in the table.
pub const LOWEST_OCTAVE: i32 = 2;

/// Highest octave in the table.
pub const HIGHEST_OCTAVE: i32 = 5;

/// Number of entries: four octaves of twelve pitch classes.
pub const NOTE_COUNT: usize = 48;

/// Pitch-class spellings; sharps carry their flat enharmonic as well.
const PITCH_NAMES: [(&str, Option<&str>); 12] = [
    ("C", None),
    ("C#", Some("Db")),
    ("D", None),
    ("D#", Some("Eb")),
    ("E", None),
    ("F", None),
    ("F#", Some("Gb")),
    ("G", None),
    ("G#", Some("Ab")),
    ("A", None),
    ("A#", Some("Bb")),
    ("B", None),
];

/// Convert a MIDI note number to frequency in Hz.
///
/// Standard tuning: A4 (MIDI 69) = 440 Hz.
pub fn midi_to_freq(midi: i32) -> f64 {
    440.0 * 2.0f64.powf((midi as f64 - 69.0) / 12.0)
}

/// One named pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub name: String,
    pub frequency: f64,
}

/// Immutable, ascending table of [`NOTE_COUNT`] notes.
#[derive(Debug, Clone)]
pub struct NoteTable {
    notes: Vec<Note>,
}

impl NoteTable {
    /// Build the table. Pure and deterministic.
    pub fn build() -> Self {
        let mut notes = Vec::with_capacity(NOTE_COUNT);
        for octave in LOWEST_OCTAVE..=HIGHEST_OCTAVE {
            for (pc, (sharp, flat)) in PITCH_NAMES.iter().enumerate() {
                let name = match flat {
                    Some(flat) => format!("{sharp}{octave}/{flat}{octave}"),
                    None => format!("{sharp}{octave}"),
                };
                let midi = 12 * (octave + 1) + pc as i32;
                notes.push(Note {
                    name,
                    frequency: midi_to_freq(midi),
                });
            }
        }
        Self { notes }
    }

    /// Index of the note closest to `freq`.
    ///
    /// Ties resolve to the lowest index. Non-finite input lands on index 0.
    pub fn nearest_index(&self, freq: f64) -> usize {
        let mut idx = 0;
        let mut best = f64::INFINITY;
        for (i, note) in self.notes.iter().enumerate() {
            let err = (note.frequency - freq).abs();
            if err < best {
                best = err;
                idx = i;
            }
        }
        idx
    }

    /// Note at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    /// Frequency at `index`, clamping out-of-range indices to the top note.
    pub fn frequency(&self, index: usize) -> f64 {
        self.notes[index.min(self.notes.len() - 1)].frequency
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn max_index(&self) -> usize {
        self.notes.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }
}

impl Default for NoteTable {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_four_octaves() {
        let table = NoteTable::build();
        assert_eq!(table.len(), NOTE_COUNT);
        assert_eq!(table.get(0).unwrap().name, "C2");
        assert_eq!(table.get(NOTE_COUNT - 1).unwrap().name, "B5");
    }

    #[test]
    fn a4_is_concert_pitch() {
        let table = NoteTable::build();
        // octave 4 starts at (4 - 2) * 12
        let a4 = table.get(2 * 12 + 9).unwrap();
        assert_eq!(a4.name, "A4");
        assert!((a4.frequency - 440.0).abs() < 1e-6);
    }

    #[test]
    fn ascending() {
        let table = NoteTable::build();
        let freqs: Vec<f64> = table.iter().map(|n| n.frequency).collect();
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn sharps_carry_flat_spelling() {
        let table = NoteTable::build();
        assert_eq!(table.get(1).unwrap().name, "C#2/Db2");
        assert_eq!(table.get(12 + 10).unwrap().name, "A#3/Bb3");
    }

    #[test]
    fn nearest_index_of_every_entry_is_itself() {
        let table = NoteTable::build();
        for (k, note) in table.iter().enumerate() {
            assert_eq!(table.nearest_index(note.frequency), k);
        }
    }

    #[test]
    fn nearest_index_snaps_between_notes() {
        let table = NoteTable::build();
        // 445 Hz sits just above A4
        assert_eq!(table.nearest_index(445.0), 2 * 12 + 9);
        // 220 Hz is A3
        assert_eq!(table.nearest_index(220.0), 12 + 9);
    }

    #[test]
    fn nearest_index_tie_takes_the_lower_note() {
        let note = |name: &str, frequency| Note {
            name: name.to_string(),
            frequency,
        };
        let table = NoteTable {
            notes: vec![note("lo", 100.0), note("mid", 200.0), note("hi", 300.0)],
        };
        assert_eq!(table.nearest_index(150.0), 0);
        assert_eq!(table.nearest_index(250.0), 1);
        assert_eq!(table.nearest_index(250.5), 2);
    }

    #[test]
    fn nearest_index_clamps_to_table_edges() {
        let table = NoteTable::build();
        assert_eq!(table.nearest_index(1.0), 0);
        assert_eq!(table.nearest_index(20_000.0), NOTE_COUNT - 1);
    }

    #[test]
    fn frequency_clamps_index() {
        let table = NoteTable::build();
        assert_eq!(table.frequency(999), table.frequency(NOTE_COUNT - 1));
    }

    #[test]
    fn midi_octave_doubles_freq() {
        let f1 = midi_to_freq(60);
        let f2 = midi_to_freq(72);
        assert!((f2 / f1 - 2.0).abs() < 1e-10);
    }
}
