//! Drone bank: sustained voices that run independently of the step clock.
//!
//! Each slot keeps what the user wants (`armed`) apart from what is actually
//! sounding (`live`). A drone can be armed while stopped and only come alive
//! when the transport starts.

use tracing::{debug, warn};

use crate::audio::AudioError;
use crate::graph::{AudioGraph, Automation, Destination, NodeRef, Param, Patch, PatchHandle};
use crate::note::NoteTable;
use crate::synth::oscillator::Waveform;

/// Number of drone slots. The session encoding is positional over these.
pub const DRONE_SLOTS: usize = 3;

/// Fade-in length when a drone starts.
pub const FADE_IN: f64 = 0.5;

/// Fade-out length when a drone stops.
pub const FADE_OUT: f64 = 0.3;

/// The oscillator stops this long after the stop request.
pub const STOP_DELAY: f64 = 0.35;

/// Quietest level a drone ramps from or to.
pub const SILENT: f64 = 0.0001;

/// Time constant for live volume changes.
pub const VOLUME_SMOOTHING: f64 = 0.05;

/// The running oscillator and gain of a sounding drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveDrone {
    pub handle: PatchHandle,
    pub osc: NodeRef,
    pub gain: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drone {
    pub slot_id: String,
    pub armed: bool,
    pub note_index: usize,
    pub waveform: Waveform,
    pub volume: f64,
    pub live: Option<LiveDrone>,
}

impl Drone {
    fn new(slot_id: String, note_index: usize) -> Self {
        Self {
            slot_id,
            armed: false,
            note_index,
            waveform: Waveform::Sine,
            volume: 0.5,
            live: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }
}

/// Fixed set of drone slots.
#[derive(Debug, Clone)]
pub struct DroneBank {
    drones: Vec<Drone>,
}

impl DroneBank {
    /// Slots "1", "2", "3", each disarmed, sine, A3, half volume.
    pub fn new(notes: &NoteTable) -> Self {
        let a3 = notes.nearest_index(220.0);
        Self {
            drones: (1..=DRONE_SLOTS)
                .map(|n| Drone::new(n.to_string(), a3))
                .collect(),
        }
    }

    pub fn drones(&self) -> &[Drone] {
        &self.drones
    }

    pub fn get(&self, slot: usize) -> Option<&Drone> {
        self.drones.get(slot)
    }

    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.drones.iter().filter(|d| d.is_live()).count()
    }

    /// Start the slot if silent, stop it if sounding. `armed` follows.
    pub fn toggle(
        &mut self,
        slot: usize,
        notes: &NoteTable,
        graph: &mut dyn AudioGraph,
    ) -> Result<(), AudioError> {
        let Some(drone) = self.drones.get_mut(slot) else {
            return Ok(());
        };
        if drone.is_live() {
            drone.armed = false;
            stop_drone(drone, graph)
        } else {
            drone.armed = true;
            start_drone(drone, notes, graph)
        }
    }

    /// Record the desired state without starting anything. Disarming a
    /// sounding drone stops it.
    pub fn set_armed(
        &mut self,
        slot: usize,
        armed: bool,
        graph: &mut dyn AudioGraph,
    ) -> Result<(), AudioError> {
        let Some(drone) = self.drones.get_mut(slot) else {
            return Ok(());
        };
        drone.armed = armed;
        if !armed && drone.is_live() {
            stop_drone(drone, graph)?;
        }
        Ok(())
    }

    /// Bring every armed, silent slot to life. Returns how many started.
    pub fn start_armed(&mut self, notes: &NoteTable, graph: &mut dyn AudioGraph) -> usize {
        let mut started = 0;
        for drone in self.drones.iter_mut().filter(|d| d.armed && !d.is_live()) {
            match start_drone(drone, notes, graph) {
                Ok(()) => started += 1,
                Err(e) => warn!(slot = %drone.slot_id, error = %e, "could not start drone"),
            }
        }
        started
    }

    pub fn set_note(
        &mut self,
        slot: usize,
        note_index: usize,
        notes: &NoteTable,
        graph: &mut dyn AudioGraph,
    ) -> Result<(), AudioError> {
        let Some(drone) = self.drones.get_mut(slot) else {
            return Ok(());
        };
        drone.note_index = note_index.min(notes.max_index());
        if let Some(live) = drone.live {
            let freq = notes.frequency(drone.note_index);
            let at = graph.current_time();
            let result = graph.schedule(
                live.handle,
                live.osc,
                Param::Frequency,
                Automation::SetValue { value: freq, at },
            );
            with_live(drone, result)?;
        }
        Ok(())
    }

    pub fn set_waveform(
        &mut self,
        slot: usize,
        waveform: Waveform,
        graph: &mut dyn AudioGraph,
    ) -> Result<(), AudioError> {
        let Some(drone) = self.drones.get_mut(slot) else {
            return Ok(());
        };
        drone.waveform = waveform;
        if let Some(live) = drone.live {
            let result = graph.set_waveform(live.handle, live.osc, waveform);
            with_live(drone, result)?;
        }
        Ok(())
    }

    /// Volume changes glide toward the new level rather than jumping.
    pub fn set_volume(
        &mut self,
        slot: usize,
        volume: f64,
        graph: &mut dyn AudioGraph,
    ) -> Result<(), AudioError> {
        let Some(drone) = self.drones.get_mut(slot) else {
            return Ok(());
        };
        drone.volume = volume.clamp(0.0, 1.0);
        if let Some(live) = drone.live {
            let target = drone.volume;
            let start = graph.current_time();
            let result = graph.schedule(
                live.handle,
                live.gain,
                Param::Gain,
                Automation::SetTarget {
                    target,
                    start,
                    time_constant: VOLUME_SMOOTHING,
                },
            );
            with_live(drone, result)?;
        }
        Ok(())
    }
}

/// A graph that no longer knows the patch has already let the drone go.
fn with_live(drone: &mut Drone, result: Result<(), AudioError>) -> Result<(), AudioError> {
    match result {
        Err(AudioError::UnknownPatch(handle)) => {
            debug!(slot = %drone.slot_id, %handle, "drone patch already released");
            drone.live = None;
            Ok(())
        }
        other => other,
    }
}

fn drone_patch(freq: f64, waveform: Waveform, volume: f64, now: f64) -> (Patch, NodeRef, NodeRef) {
    let mut p = Patch::new();
    let osc = p.oscillator(waveform, freq);
    p.set_value_at(osc, Param::Frequency, freq, now);
    let gain = p.gain(SILENT);
    p.set_value_at(gain, Param::Gain, SILENT, now);
    p.exponential_ramp_to(gain, Param::Gain, volume.max(SILENT), now + FADE_IN);
    p.connect(osc, Destination::Node(gain));
    p.connect(gain, Destination::Output);
    p.start(osc, now);
    (p, osc, gain)
}

fn start_drone(
    drone: &mut Drone,
    notes: &NoteTable,
    graph: &mut dyn AudioGraph,
) -> Result<(), AudioError> {
    let now = graph.current_time();
    let freq = notes.frequency(drone.note_index);
    let (patch, osc, gain) = drone_patch(freq, drone.waveform, drone.volume, now);
    let handle = graph.play(patch)?;
    drone.live = Some(LiveDrone { handle, osc, gain });
    debug!(slot = %drone.slot_id, freq, waveform = %drone.waveform, "drone started");
    Ok(())
}

/// Snapshot the current level, cancel pending changes, hold, fade out, stop.
fn stop_drone(drone: &mut Drone, graph: &mut dyn AudioGraph) -> Result<(), AudioError> {
    let Some(live) = drone.live.take() else {
        return Ok(());
    };
    let result = fade_out(live, graph);
    debug!(slot = %drone.slot_id, "drone stopped");
    with_live(drone, result)
}

fn fade_out(live: LiveDrone, graph: &mut dyn AudioGraph) -> Result<(), AudioError> {
    let t = graph.current_time();
    let level = graph.param_value(live.handle, live.gain, Param::Gain, t)?;
    graph.cancel_scheduled(live.handle, live.gain, Param::Gain, t)?;
    graph.schedule(
        live.handle,
        live.gain,
        Param::Gain,
        Automation::SetValue { value: level, at: t },
    )?;
    graph.schedule(
        live.handle,
        live.gain,
        Param::Gain,
        Automation::ExponentialRamp {
            value: SILENT,
            end: t + FADE_OUT,
        },
    )?;
    graph.stop(live.handle, live.osc, t + STOP_DELAY)
}
