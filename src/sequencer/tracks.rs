//! Track registry: fixed percussion first, then tonal tracks, then the sample track.

use std::collections::HashMap;
use std::fmt;

use crate::synth::instrument::Instrument;
use crate::synth::percussion::Percussion;

/// Most tonal tracks a session can hold.
pub const MAX_TONAL: usize = 16;

/// Id of the single sample track.
pub const SAMPLE_TRACK: &str = "sample";

/// Stable, unique track identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Percussion(Percussion),
    Tonal,
    Sample,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub display_name: String,
    pub kind: TrackKind,
}

/// Label shown for a tonal track: `blip` is "Blip", `beepN` is "Beep N".
pub fn tonal_label(id: &str) -> String {
    if id == "blip" {
        return "Blip".to_string();
    }
    let digits: String = id
        .strip_prefix("beep")
        .unwrap_or(id)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<u64>() {
        Ok(n) => format!("Beep {n}"),
        Err(_) => "Beep".to_string(),
    }
}

/// Ordered tonal track ids and their instruments.
#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    tonal: Vec<TrackId>,
    instruments: HashMap<TrackId, Instrument>,
}

impl TrackRegistry {
    /// A registry with no tonal tracks.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first-load layout: `beep1` at A4, `beep2` at E4, `blip` at E5.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.insert(TrackId::new("beep1"), Instrument::new(440.0));
        reg.insert(TrackId::new("beep2"), Instrument::new(329.63).with_gain(0.30));
        reg.insert(TrackId::new("blip"), Instrument::new(659.25));
        reg
    }

    fn insert(&mut self, id: TrackId, inst: Instrument) {
        self.instruments.insert(id.clone(), inst);
        self.tonal.push(id);
    }

    /// Every track in registry order.
    pub fn tracks(&self) -> Vec<Track> {
        let fixed = Percussion::ALL.iter().map(|&p| Track {
            id: TrackId::new(p.id()),
            display_name: p.display_name().to_string(),
            kind: TrackKind::Percussion(p),
        });
        let tonal = self.tonal.iter().map(|id| Track {
            id: id.clone(),
            display_name: tonal_label(id.as_str()),
            kind: TrackKind::Tonal,
        });
        let sample = std::iter::once(Track {
            id: TrackId::new(SAMPLE_TRACK),
            display_name: "Sample".to_string(),
            kind: TrackKind::Sample,
        });
        fixed.chain(tonal).chain(sample).collect()
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks().into_iter().map(|t| t.id).collect()
    }

    pub fn tonal_ids(&self) -> &[TrackId] {
        &self.tonal
    }

    pub fn tonal_count(&self) -> usize {
        self.tonal.len()
    }

    pub fn kind_of(&self, id: &TrackId) -> Option<TrackKind> {
        if let Some(p) = Percussion::ALL.iter().find(|p| p.id() == id.as_str()) {
            return Some(TrackKind::Percussion(*p));
        }
        if id.as_str() == SAMPLE_TRACK {
            return Some(TrackKind::Sample);
        }
        self.instruments.contains_key(id).then_some(TrackKind::Tonal)
    }

    /// Lowest unused `beepN`, counting from 1.
    fn next_tonal_id(&self) -> TrackId {
        (1..)
            .map(|n| TrackId::new(format!("beep{n}")))
            .find(|id| !self.instruments.contains_key(id))
            .unwrap_or_else(|| TrackId::new("beep"))
    }

    /// Append a tonal track. `None` when the registry is full.
    pub fn add_tonal(&mut self, inst: Instrument) -> Option<TrackId> {
        if self.tonal.len() >= MAX_TONAL {
            return None;
        }
        let id = self.next_tonal_id();
        self.insert(id.clone(), inst);
        Some(id)
    }

    /// Remove a tonal track and its instrument. Fixed tracks cannot be removed.
    pub fn remove_tonal(&mut self, id: &TrackId) -> bool {
        match self.tonal.iter().position(|t| t == id) {
            Some(idx) => {
                self.tonal.remove(idx);
                self.instruments.remove(id);
                true
            }
            None => false,
        }
    }

    /// Grow or shrink the tonal list to `count` (clamped to `0..=16`).
    /// New tracks get the 440 Hz default; removal takes from the end.
    pub fn set_tonal_count(&mut self, count: usize) -> usize {
        let count = count.min(MAX_TONAL);
        while self.tonal.len() < count {
            let id = self.next_tonal_id();
            self.insert(id, Instrument::new(440.0));
        }
        for id in self.tonal.split_off(count) {
            self.instruments.remove(&id);
        }
        count
    }

    pub fn instrument(&self, id: &TrackId) -> Option<&Instrument> {
        self.instruments.get(id)
    }

    pub fn instrument_mut(&mut self, id: &TrackId) -> Option<&mut Instrument> {
        self.instruments.get_mut(id)
    }

    /// Tonal instruments in track order.
    pub fn instruments(&self) -> impl Iterator<Item = (&TrackId, &Instrument)> {
        self.tonal
            .iter()
            .filter_map(|id| self.instruments.get(id).map(|inst| (id, inst)))
    }
}
