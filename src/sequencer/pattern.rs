//! Pattern store: one boolean row per track, all the same length.

use std::collections::HashMap;

use super::tracks::TrackId;

/// Resize a row in place: the index-aligned prefix survives, new steps are off.
pub fn resize_row(row: &mut Vec<bool>, steps: usize) {
    row.resize(steps, false);
}

/// Number of hex digits a row of `steps` steps encodes to.
pub fn hex_width(steps: usize) -> usize {
    steps.div_ceil(4)
}

/// Pack a row into lowercase hex, bit `i` set iff step `i` is on,
/// zero-padded to [`hex_width`] digits.
pub fn sequence_to_hex(seq: &[bool], steps: usize) -> String {
    let width = hex_width(steps);
    let mut digits = vec![b'0'; width];
    for (i, _) in seq.iter().take(steps).enumerate().filter(|(_, on)| **on) {
        // Digit 0 of the string is the most significant nibble.
        let nibble = i / 4;
        let pos = width - 1 - nibble;
        let value = hex_value(digits[pos]) | (1 << (i % 4));
        digits[pos] = HEX_DIGITS[value as usize];
    }
    String::from_utf8(digits).unwrap_or_default()
}

/// Unpack a hex string into a row of `steps` steps.
///
/// Bits beyond `steps` are ignored; missing high digits read as off. A string
/// with any non-hex character yields an all-off row.
pub fn hex_to_sequence(hex: &str, steps: usize) -> Vec<bool> {
    let mut out = vec![false; steps];
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return out;
    }
    for (nibble, c) in hex.bytes().rev().enumerate() {
        let value = hex_value(c.to_ascii_lowercase());
        for bit in 0..4 {
            let step = nibble * 4 + bit;
            if step < steps && value & (1 << bit) != 0 {
                out[step] = true;
            }
        }
    }
    out
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

/// Rows keyed by track id. Every row has exactly `steps` entries.
#[derive(Debug, Clone)]
pub struct PatternStore {
    steps: usize,
    rows: HashMap<TrackId, Vec<bool>>,
}

impl PatternStore {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            rows: HashMap::new(),
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn row(&self, id: &TrackId) -> Option<&[bool]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    /// Whether `step` is on for `id`. Unknown tracks and steps read as off.
    pub fn is_active(&self, id: &TrackId, step: usize) -> bool {
        self.rows
            .get(id)
            .and_then(|r| r.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Set one cell. Returns false when the track or step does not exist.
    pub fn set(&mut self, id: &TrackId, step: usize, on: bool) -> bool {
        match self.rows.get_mut(id).and_then(|r| r.get_mut(step)) {
            Some(cell) => {
                *cell = on;
                true
            }
            None => false,
        }
    }

    /// Flip one cell, returning its new value.
    pub fn toggle(&mut self, id: &TrackId, step: usize) -> Option<bool> {
        let cell = self.rows.get_mut(id)?.get_mut(step)?;
        *cell = !*cell;
        Some(*cell)
    }

    /// Change the step count of every row.
    pub fn resize(&mut self, steps: usize) {
        self.steps = steps;
        for row in self.rows.values_mut() {
            resize_row(row, steps);
        }
    }

    /// Make the key set exactly `ids`: drop rows for unknown ids, add empty
    /// rows for new ones, and fix any row whose length has drifted.
    pub fn sync<'a>(&mut self, ids: impl IntoIterator<Item = &'a TrackId>) {
        let ids: Vec<&TrackId> = ids.into_iter().collect();
        self.rows.retain(|k, _| ids.contains(&k));
        for id in ids {
            let row = self.rows.entry(id.clone()).or_default();
            resize_row(row, self.steps);
        }
    }

    /// Install a whole row, forced to the current step count.
    pub fn replace_row(&mut self, id: &TrackId, mut row: Vec<bool>) {
        resize_row(&mut row, self.steps);
        self.rows.insert(id.clone(), row);
    }

    pub fn remove(&mut self, id: &TrackId) {
        self.rows.remove(id);
    }

    pub fn clear(&mut self) {
        for row in self.rows.values_mut() {
            row.fill(false);
        }
    }
}
