//! In-process audio graph renderer.
//!
//! [`SoftwareGraph`] realises patches sample by sample. Its clock is the
//! number of frames rendered so far, so time only moves while blocks are
//! pulled and the graph is not suspended. The binary pulls blocks and feeds
//! them to the real-time output; tests pull blocks directly.

use std::collections::VecDeque;
use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::automation::Automation;
use super::patch::{Destination, FilterKind, NodeKind, NodeRef, Param, Patch, PatchNode};
use super::{AudioGraph, PatchHandle};
use crate::audio::AudioError;
use crate::synth::oscillator::{oscillator, Waveform};
use crate::synth::sample::{SampleData, SampleError};

fn param_slot(param: Param) -> usize {
    match param {
        Param::Frequency => 0,
        Param::Gain => 1,
        Param::Q => 2,
    }
}

/// First frame at or after time `t`.
fn frame_at(t: f64, sample_rate: f64) -> u64 {
    (t * sample_rate).ceil().max(0.0) as u64
}

fn coefficients(kind: FilterKind, sample_rate: f64, freq: f64, q: f64) -> Coefficients<f32> {
    let (ty, q) = match kind {
        // Lowpass and highpass resonance is given in dB.
        FilterKind::Lowpass => (biquad::Type::LowPass, 10f64.powf(q / 20.0)),
        FilterKind::Highpass => (biquad::Type::HighPass, 10f64.powf(q / 20.0)),
        FilterKind::Bandpass => (biquad::Type::BandPass, q),
    };
    let freq = freq.clamp(1.0, sample_rate * 0.49);
    let q = q.max(1e-4);
    Coefficients::<f32>::from_params(
        ty,
        (sample_rate as f32).hz(),
        (freq as f32).hz(),
        q as f32,
    )
    .unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

enum NodeState {
    Oscillator {
        phase: f64,
    },
    Buffer {
        data: Arc<SampleData>,
    },
    Filter {
        kind: FilterKind,
        filter: DirectForm2Transposed<f32>,
        last: (f64, f64),
    },
    Gain,
}

fn value(spec: &PatchNode, param: Param, t: f64, mods: &[f64; 3]) -> f64 {
    spec.param(param).map_or(0.0, |p| p.value_at(t)) + mods[param_slot(param)]
}

struct LiveNode {
    spec: PatchNode,
    state: NodeState,
}

impl LiveNode {
    fn is_playing(&self, frame: u64, sample_rate: f64) -> bool {
        let started = self
            .spec
            .start_time()
            .is_some_and(|s| frame >= frame_at(s, sample_rate));
        let stopped = self
            .spec
            .stop_time()
            .is_some_and(|s| frame >= frame_at(s, sample_rate));
        started && !stopped
    }

    fn is_finished(&self, frame: u64, sample_rate: f64) -> bool {
        if let Some(stop) = self.spec.stop_time() {
            if frame >= frame_at(stop, sample_rate) {
                return true;
            }
        }
        match (&self.state, self.spec.start_time()) {
            (NodeState::Buffer { data }, Some(start)) => {
                frame >= frame_at(start, sample_rate) + data.len() as u64
            }
            _ => false,
        }
    }

    fn tick(&mut self, frame: u64, sample_rate: f64, input: f64, mods: &[f64; 3]) -> f64 {
        let t = frame as f64 / sample_rate;
        let playing = self.is_playing(frame, sample_rate);
        match &mut self.state {
            NodeState::Oscillator { phase } => {
                if !playing {
                    return 0.0;
                }
                let waveform = match self.spec.kind() {
                    NodeKind::Oscillator { waveform } => *waveform,
                    _ => Waveform::Sine,
                };
                let freq = value(&self.spec, Param::Frequency, t, mods);
                let y = oscillator(waveform, *phase);
                *phase = (*phase + freq / sample_rate).rem_euclid(1.0);
                y
            }
            NodeState::Buffer { data } => {
                if !playing {
                    return 0.0;
                }
                let start = self
                    .spec
                    .start_time()
                    .map_or(0, |s| frame_at(s, sample_rate));
                data.samples()
                    .get((frame - start) as usize)
                    .copied()
                    .unwrap_or(0.0) as f64
            }
            NodeState::Filter { kind, filter, last } => {
                let freq = value(&self.spec, Param::Frequency, t, mods);
                let q = value(&self.spec, Param::Q, t, mods);
                if (freq, q) != *last {
                    filter.update_coefficients(coefficients(*kind, sample_rate, freq, q));
                    *last = (freq, q);
                }
                filter.run(input as f32) as f64
            }
            NodeState::Gain => input * value(&self.spec, Param::Gain, t, mods),
        }
    }
}

struct LiveVoice {
    handle: PatchHandle,
    nodes: Vec<LiveNode>,
    order: Vec<usize>,
    inputs: Vec<f64>,
    mods: Vec<[f64; 3]>,
}

impl LiveVoice {
    fn node(&self, node: NodeRef) -> Result<&LiveNode, AudioError> {
        self.nodes.get(node.index()).ok_or(AudioError::UnknownNode {
            handle: self.handle,
            node: node.index(),
        })
    }

    fn node_mut(&mut self, node: NodeRef) -> Result<&mut LiveNode, AudioError> {
        let handle = self.handle;
        self.nodes.get_mut(node.index()).ok_or(AudioError::UnknownNode {
            handle,
            node: node.index(),
        })
    }

    fn render_frame(&mut self, frame: u64, sample_rate: f64) -> f64 {
        self.inputs.iter_mut().for_each(|x| *x = 0.0);
        self.mods.iter_mut().for_each(|m| *m = [0.0; 3]);

        let mut out = 0.0;
        for &i in &self.order {
            let y = self.nodes[i].tick(frame, sample_rate, self.inputs[i], &self.mods[i]);
            for dest in self.nodes[i].spec.outputs() {
                match *dest {
                    Destination::Output => out += y,
                    Destination::Node(j) => {
                        if let Some(x) = self.inputs.get_mut(j.index()) {
                            *x += y;
                        }
                    }
                    Destination::Param(j, p) => {
                        if let Some(m) = self.mods.get_mut(j.index()) {
                            m[param_slot(p)] += y;
                        }
                    }
                }
            }
        }
        out
    }

    fn is_finished(&self, frame: u64, sample_rate: f64) -> bool {
        self.nodes
            .iter()
            .filter(|n| n.spec.is_source())
            .all(|n| n.is_finished(frame, sample_rate))
    }
}

/// Evaluation order for a patch: sources before the nodes they feed.
/// Nodes caught in a cycle run last, in declaration order.
fn topological_order(nodes: &[PatchNode]) -> Vec<usize> {
    let n = nodes.len();
    let target = |d: &Destination| match *d {
        Destination::Output => None,
        Destination::Node(j) | Destination::Param(j, _) => Some(j.index()).filter(|&j| j < n),
    };

    let mut indegree = vec![0usize; n];
    for node in nodes {
        for j in node.outputs().iter().filter_map(target) {
            indegree[j] += 1;
        }
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for j in nodes[i].outputs().iter().filter_map(target) {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push_back(j);
            }
        }
    }

    if order.len() < n {
        let mut placed = vec![false; n];
        order.iter().for_each(|&i| placed[i] = true);
        order.extend((0..n).filter(|&i| !placed[i]));
    }
    order
}

/// Offline implementation of [`AudioGraph`].
pub struct SoftwareGraph {
    sample_rate: u32,
    channels: u16,
    frame: u64,
    suspended: bool,
    rng: ChaCha8Rng,
    next_handle: u64,
    voices: Vec<LiveVoice>,
}

impl SoftwareGraph {
    /// Create a running graph. `seed` drives the noise generator.
    pub fn new(sample_rate: u32, channels: u16, seed: u64) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            frame: 0,
            suspended: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_handle: 0,
            voices: Vec::new(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop the clock until the next [`resume`](AudioGraph::resume).
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Number of patches still sounding or scheduled.
    pub fn active_patches(&self) -> usize {
        self.voices.len()
    }

    /// Render `frames` frames of interleaved output and advance the clock.
    ///
    /// A suspended graph yields silence and its clock stays put.
    pub fn render_block(&mut self, frames: usize) -> Vec<f32> {
        let channels = self.channels as usize;
        let mut out = vec![0.0f32; frames * channels];
        if self.suspended {
            return out;
        }

        let sr = self.sample_rate as f64;
        for (i, frame_out) in out.chunks_exact_mut(channels).enumerate() {
            let frame = self.frame + i as u64;
            let mix: f64 = self
                .voices
                .iter_mut()
                .map(|v| v.render_frame(frame, sr))
                .sum();
            frame_out.fill(mix as f32);
        }
        self.frame += frames as u64;

        let now = self.frame;
        let before = self.voices.len();
        self.voices.retain(|v| !v.is_finished(now, sr));
        if self.voices.len() != before {
            debug!(
                finished = before - self.voices.len(),
                live = self.voices.len(),
                "released finished patches"
            );
        }
        out
    }

    /// Render roughly `seconds` of audio in one block.
    pub fn render_seconds(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.sample_rate as f64).round().max(0.0) as usize;
        self.render_block(frames)
    }

    fn voice(&self, handle: PatchHandle) -> Result<&LiveVoice, AudioError> {
        self.voices
            .iter()
            .find(|v| v.handle == handle)
            .ok_or(AudioError::UnknownPatch(handle))
    }

    fn voice_mut(&mut self, handle: PatchHandle) -> Result<&mut LiveVoice, AudioError> {
        self.voices
            .iter_mut()
            .find(|v| v.handle == handle)
            .ok_or(AudioError::UnknownPatch(handle))
    }

    fn instantiate(&mut self, spec: PatchNode) -> LiveNode {
        let sr = self.sample_rate as f64;
        let state = match spec.kind() {
            NodeKind::Oscillator { .. } => NodeState::Oscillator { phase: 0.0 },
            // A fresh burst per trigger; costs one allocation per hit.
            NodeKind::Noise { duration } => {
                let len = (duration * sr).round().max(0.0) as usize;
                let samples = (0..len).map(|_| self.rng.gen_range(-1.0f32..1.0)).collect();
                NodeState::Buffer {
                    data: Arc::new(SampleData::from_mono(samples, self.sample_rate)),
                }
            }
            NodeKind::Buffer { sample } => {
                let data = if sample.sample_rate() == self.sample_rate {
                    Arc::clone(sample)
                } else {
                    Arc::new(SampleData::clone(sample).resampled(self.sample_rate))
                };
                NodeState::Buffer { data }
            }
            NodeKind::Filter { kind } => {
                let freq = spec.param(Param::Frequency).map_or(350.0, |p| p.base());
                let q = spec.param(Param::Q).map_or(1.0, |p| p.base());
                NodeState::Filter {
                    kind: *kind,
                    filter: DirectForm2Transposed::<f32>::new(coefficients(*kind, sr, freq, q)),
                    last: (freq, q),
                }
            }
            NodeKind::Gain => NodeState::Gain,
        };
        LiveNode { spec, state }
    }
}

impl AudioGraph for SoftwareGraph {
    fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.suspended = false;
        Ok(())
    }

    fn play(&mut self, patch: Patch) -> Result<PatchHandle, AudioError> {
        let specs = patch.into_nodes();
        let order = topological_order(&specs);
        let n = specs.len();
        let nodes: Vec<LiveNode> = specs.into_iter().map(|s| self.instantiate(s)).collect();

        self.next_handle += 1;
        let handle = PatchHandle(self.next_handle);
        self.voices.push(LiveVoice {
            handle,
            nodes,
            order,
            inputs: vec![0.0; n],
            mods: vec![[0.0; 3]; n],
        });
        Ok(handle)
    }

    fn schedule(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        automation: Automation,
    ) -> Result<(), AudioError> {
        self.voice_mut(handle)?
            .node_mut(node)?
            .spec
            .param_mut(param)
            .push(automation);
        Ok(())
    }

    fn cancel_scheduled(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        from: f64,
    ) -> Result<(), AudioError> {
        self.voice_mut(handle)?
            .node_mut(node)?
            .spec
            .param_mut(param)
            .cancel_from(from);
        Ok(())
    }

    fn param_value(
        &self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        at: f64,
    ) -> Result<f64, AudioError> {
        let live = self.voice(handle)?.node(node)?;
        live.spec
            .param(param)
            .map(|p| p.value_at(at))
            .ok_or(AudioError::MissingParam {
                handle,
                node: node.index(),
                param,
            })
    }

    fn set_waveform(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        waveform: Waveform,
    ) -> Result<(), AudioError> {
        let live = self.voice_mut(handle)?.node_mut(node)?;
        if !matches!(live.spec.kind(), NodeKind::Oscillator { .. }) {
            return Err(AudioError::UnknownNode {
                handle,
                node: node.index(),
            });
        }
        live.spec.set_kind(NodeKind::Oscillator { waveform });
        Ok(())
    }

    fn stop(&mut self, handle: PatchHandle, node: NodeRef, at: f64) -> Result<(), AudioError> {
        self.voice_mut(handle)?.node_mut(node)?.spec.set_stop_time(at);
        Ok(())
    }

    fn decode_sample(&self, bytes: &[u8]) -> Result<SampleData, SampleError> {
        SampleData::from_bytes(bytes, self.sample_rate)
    }
}
