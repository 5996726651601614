//! Session: every piece of sequencer state behind one owner.
//!
//! The session holds the note table, tempo, step count, tracks, patterns,
//! drones, theme, transport and sample slot. Sound goes through the
//! [`AudioGraph`] passed into each call; the session keeps no handle to it.
//! After every mutation the whole session is re-encoded into
//! [`Session::location`].

use tracing::{debug, info, warn};

use crate::codec::{self, DecodedSession, MAX_BPM, MAX_STEPS, MIN_BPM, MIN_STEPS};
use crate::drone::DroneBank;
use crate::graph::AudioGraph;
use crate::note::NoteTable;
use crate::sequencer::{
    hex_to_sequence, PatternStore, Track, TrackId, TrackKind, TrackRegistry, Transport,
};
use crate::synth::instrument::{render_instrument, Instrument};
use crate::synth::oscillator::Waveform;
use crate::synth::sample::{sample_patch, DecodeTicket, LoadOutcome, SampleLoader, SampleStatus};
use crate::theme::ThemeMode;

/// Onsets are scheduled this far past the graph clock.
pub const LOOKAHEAD: f64 = 0.010;

/// Frequency of a tonal track added by hand.
pub const ADDED_TRACK_HZ: f64 = 220.0;

#[derive(Debug)]
pub struct Session {
    notes: NoteTable,
    bpm: u32,
    steps: usize,
    registry: TrackRegistry,
    patterns: PatternStore,
    drones: DroneBank,
    theme: ThemeMode,
    transport: Transport,
    sample: SampleLoader,
    /// Value being painted during a drag stroke.
    paint: Option<bool>,
    location: String,
}

impl Session {
    /// The first-load session.
    pub fn new() -> Self {
        let notes = NoteTable::build();
        let registry = TrackRegistry::with_defaults();
        let mut patterns = PatternStore::new(codec::DEFAULT_STEPS);
        patterns.sync(registry.ids().iter());
        let drones = DroneBank::new(&notes);
        let mut session = Self {
            notes,
            bpm: codec::DEFAULT_BPM,
            steps: codec::DEFAULT_STEPS,
            registry,
            patterns,
            drones,
            theme: ThemeMode::default(),
            transport: Transport::new(),
            sample: SampleLoader::new(),
            paint: None,
            location: String::new(),
        };
        session.commit();
        session
    }

    /// Decode a session from a URL, fragment or bare parameter string.
    /// Absent keys keep their defaults.
    pub fn from_location(location: &str, graph: &mut dyn AudioGraph) -> Self {
        let mut session = Self::new();
        session.apply_location(location, graph);
        session
    }

    /// Overwrite this session with whatever `location` carries.
    pub fn apply_location(&mut self, location: &str, graph: &mut dyn AudioGraph) {
        let params = codec::parse_location(location);
        let decoded = codec::decode(&params, &self.notes, self.drones.len());
        self.apply(decoded, graph);
        self.commit();
    }

    fn apply(&mut self, decoded: DecodedSession, graph: &mut dyn AudioGraph) {
        // Instruments first: they fix the track count the pattern rows index into.
        if let Some(instruments) = decoded.instruments {
            self.registry.set_tonal_count(instruments.len());
            let ids = self.registry.tonal_ids().to_vec();
            for (id, inst) in ids.iter().zip(instruments) {
                if let Some(slot) = self.registry.instrument_mut(id) {
                    *slot = inst;
                }
            }
        }
        if let Some(steps) = decoded.steps {
            self.resize_steps(steps);
        }
        self.patterns.sync(self.registry.ids().iter());

        if let Some(bpm) = decoded.bpm {
            self.bpm = bpm;
        }

        if let Some(rows) = decoded.patterns {
            // Positional over registry order; missing rows are all off.
            for (i, id) in self.registry.ids().iter().enumerate() {
                let row = match rows.get(i) {
                    Some(hex) => hex_to_sequence(hex, self.steps),
                    None => vec![false; self.steps],
                };
                self.patterns.replace_row(id, row);
            }
        }

        if let Some(theme) = decoded.theme {
            self.theme = theme;
        }

        if let Some(drones) = decoded.drones {
            for (slot, fields) in drones.into_iter().enumerate() {
                let results = [
                    self.drones.set_waveform(slot, fields.waveform, graph),
                    self.drones
                        .set_note(slot, fields.note_index, &self.notes, graph),
                    self.drones.set_volume(slot, fields.volume, graph),
                    self.drones.set_armed(slot, fields.armed, graph),
                ];
                for e in results.into_iter().filter_map(Result::err) {
                    warn!(slot, error = %e, "drone update failed during decode");
                }
            }
        }
    }

    /// Re-encode after a mutation.
    fn commit(&mut self) {
        self.location = format!("#{}", codec::encode(self));
        debug!(location = %self.location, "session re-encoded");
    }

    /// The encoded session, `#`-prefixed.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn notes(&self) -> &NoteTable {
        &self.notes
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.registry.tracks()
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn drones(&self) -> &DroneBank {
        &self.drones
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    pub fn current_step(&self) -> Option<usize> {
        self.transport.current_step()
    }

    // --- tempo, grid, theme ---

    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        debug!(bpm = self.bpm, "tempo changed");
        self.commit();
    }

    /// Resize every row; a running transport keeps its position modulo the new count.
    pub fn set_steps(&mut self, steps: usize) {
        self.resize_steps(steps);
        debug!(steps = self.steps, "step count changed");
        self.commit();
    }

    fn resize_steps(&mut self, steps: usize) {
        self.steps = steps.clamp(MIN_STEPS, MAX_STEPS);
        self.patterns.resize(self.steps);
        self.transport.rescale_steps(self.steps);
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.theme = theme;
        self.commit();
    }

    // --- pattern editing ---

    /// Flip one cell. `None` for an unknown track or step.
    pub fn toggle_step(&mut self, track: &TrackId, step: usize) -> Option<bool> {
        let value = self.patterns.toggle(track, step)?;
        self.commit();
        Some(value)
    }

    pub fn set_step(&mut self, track: &TrackId, step: usize, on: bool) -> bool {
        let changed = self.patterns.set(track, step, on);
        if changed {
            self.commit();
        }
        changed
    }

    /// Start a drag stroke: the first cell flips and its new value is painted
    /// onto every cell the stroke enters.
    pub fn begin_paint(&mut self, track: &TrackId, step: usize) -> Option<bool> {
        let value = self.patterns.toggle(track, step)?;
        self.paint = Some(value);
        Some(value)
    }

    pub fn paint(&mut self, track: &TrackId, step: usize) {
        if let Some(value) = self.paint {
            self.patterns.set(track, step, value);
        }
    }

    /// Finish the stroke and write the location once.
    pub fn end_paint(&mut self) {
        if self.paint.take().is_some() {
            self.commit();
        }
    }

    pub fn is_painting(&self) -> bool {
        self.paint.is_some()
    }

    // --- tracks and instruments ---

    /// Add a 220 Hz tonal track. `None` when the registry is full.
    pub fn add_tonal_track(&mut self) -> Option<TrackId> {
        let id = self.registry.add_tonal(Instrument::new(ADDED_TRACK_HZ))?;
        self.patterns.sync(self.registry.ids().iter());
        debug!(track = %id, "tonal track added");
        self.commit();
        Some(id)
    }

    pub fn remove_tonal_track(&mut self, id: &TrackId) -> bool {
        if !self.registry.remove_tonal(id) {
            return false;
        }
        self.patterns.remove(id);
        debug!(track = %id, "tonal track removed");
        self.commit();
        true
    }

    /// Grow or shrink the tonal tracks; returns the count actually set.
    pub fn set_tonal_count(&mut self, count: usize) -> usize {
        let count = self.registry.set_tonal_count(count);
        self.patterns.sync(self.registry.ids().iter());
        self.commit();
        count
    }

    /// Edit a tonal track's instrument in place. False for unknown ids.
    pub fn edit_instrument(&mut self, id: &TrackId, edit: impl FnOnce(&mut Instrument)) -> bool {
        let Some(inst) = self.registry.instrument_mut(id) else {
            return false;
        };
        edit(inst);
        inst.gain = inst.gain.clamp(0.0, 1.0);
        self.commit();
        true
    }

    // --- drones ---

    /// Start or stop a slot. Also a user gesture, so the graph is resumed.
    pub fn toggle_drone(&mut self, slot: usize, graph: &mut dyn AudioGraph) {
        resume(graph);
        if let Err(e) = self.drones.toggle(slot, &self.notes, graph) {
            warn!(slot, error = %e, "drone toggle failed");
        }
        self.commit();
    }

    /// Set the desired state only; nothing starts until the transport does.
    pub fn arm_drone(&mut self, slot: usize, armed: bool, graph: &mut dyn AudioGraph) {
        if let Err(e) = self.drones.set_armed(slot, armed, graph) {
            warn!(slot, error = %e, "drone arm failed");
        }
        self.commit();
    }

    pub fn set_drone_note(&mut self, slot: usize, note_index: usize, graph: &mut dyn AudioGraph) {
        if let Err(e) = self.drones.set_note(slot, note_index, &self.notes, graph) {
            warn!(slot, error = %e, "drone note change failed");
        }
        self.commit();
    }

    pub fn set_drone_waveform(&mut self, slot: usize, waveform: Waveform, graph: &mut dyn AudioGraph) {
        if let Err(e) = self.drones.set_waveform(slot, waveform, graph) {
            warn!(slot, error = %e, "drone waveform change failed");
        }
        self.commit();
    }

    pub fn set_drone_volume(&mut self, slot: usize, volume: f64, graph: &mut dyn AudioGraph) {
        if let Err(e) = self.drones.set_volume(slot, volume, graph) {
            warn!(slot, error = %e, "drone volume change failed");
        }
        self.commit();
    }

    // --- transport ---

    /// Start from the top: armed drones come alive, then step 0 fires.
    pub fn start(&mut self, now_ms: f64, graph: &mut dyn AudioGraph) -> usize {
        resume(graph);
        let step = self.transport.start(now_ms, self.bpm, self.steps);
        let started = self.drones.start_armed(&self.notes, graph);
        info!(bpm = self.bpm, steps = self.steps, drones = started, "transport started");
        self.fire_step(step, graph);
        step
    }

    /// Stop stepping. Sounds already scheduled and live drones carry on.
    pub fn stop(&mut self, graph: &mut dyn AudioGraph) {
        resume(graph);
        self.transport.stop();
        info!("transport stopped");
    }

    /// Fire every step due at `now_ms`.
    pub fn poll(&mut self, now_ms: f64, graph: &mut dyn AudioGraph) -> Vec<usize> {
        let fired = self.transport.poll(now_ms, self.bpm, self.steps);
        for &step in &fired {
            self.fire_step(step, graph);
        }
        fired
    }

    fn fire_step(&self, step: usize, graph: &mut dyn AudioGraph) {
        let when = graph.current_time() + LOOKAHEAD;
        for id in self.registry.ids() {
            if self.patterns.is_active(&id, step) {
                self.trigger(&id, when, graph);
            }
        }
    }

    /// Play one track's sound at `when`. The sample track with nothing
    /// loaded, and unknown tracks, are silent.
    pub fn trigger(&self, track: &TrackId, when: f64, graph: &mut dyn AudioGraph) {
        let patch = match self.registry.kind_of(track) {
            Some(TrackKind::Percussion(p)) => p.render(when),
            Some(TrackKind::Tonal) => match self.registry.instrument(track) {
                Some(inst) => render_instrument(inst, when),
                None => return,
            },
            Some(TrackKind::Sample) => match self.sample.sample() {
                Some(data) => sample_patch(data, when),
                None => return,
            },
            None => return,
        };
        if let Err(e) = graph.play(patch) {
            warn!(%track, error = %e, "could not play track");
        }
    }

    // --- sample track ---

    pub fn begin_sample_load(&mut self, name: &str) -> DecodeTicket {
        self.sample.begin(name)
    }

    /// Decode `bytes` and install them if `ticket` is still the newest request.
    pub fn finish_sample_load(
        &mut self,
        ticket: &DecodeTicket,
        bytes: &[u8],
        graph: &mut dyn AudioGraph,
    ) -> LoadOutcome {
        let result = graph.decode_sample(bytes);
        self.sample.finish(ticket, result)
    }

    pub fn sample_status(&self) -> &SampleStatus {
        self.sample.status()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn resume(graph: &mut dyn AudioGraph) {
    if let Err(e) = graph.resume() {
        warn!(error = %e, "audio graph did not resume");
    }
}
