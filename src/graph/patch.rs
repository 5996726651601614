//! Patch description: a small node graph handed to an [`AudioGraph`](super::AudioGraph).
//!
//! A patch is built once per sounding event: sources (oscillators, noise
//! bursts, sample buffers) feed filters and gains, gains feed the output or
//! another node's parameter. Nodes are addressed by [`NodeRef`] so callers
//! can keep live control over them after the patch is playing.

use std::collections::HashMap;
use std::sync::Arc;

use super::automation::{Automation, ParamTimeline};
use crate::synth::oscillator::Waveform;
use crate::synth::sample::SampleData;

/// Index of a node inside its patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub(crate) usize);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Automatable node parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Frequency,
    Gain,
    Q,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

/// What a node computes.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Oscillator { waveform: Waveform },
    /// White noise burst of `duration` seconds, freshly generated per play.
    Noise { duration: f64 },
    Buffer { sample: Arc<SampleData> },
    Filter { kind: FilterKind },
    Gain,
}

/// Where a node's output goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Destination {
    Output,
    Node(NodeRef),
    /// Audio-rate modulation: the signal is added to the parameter's value.
    Param(NodeRef, Param),
}

/// One node and its wiring.
#[derive(Debug, Clone)]
pub struct PatchNode {
    kind: NodeKind,
    params: HashMap<Param, ParamTimeline>,
    outputs: Vec<Destination>,
    start: Option<f64>,
    stop: Option<f64>,
}

impl PatchNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            params: HashMap::new(),
            outputs: Vec::new(),
            start: None,
            stop: None,
        }
    }

    fn with_param(mut self, param: Param, base: f64) -> Self {
        self.params.insert(param, ParamTimeline::new(base));
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn param(&self, param: Param) -> Option<&ParamTimeline> {
        self.params.get(&param)
    }

    pub(crate) fn param_mut(&mut self, param: Param) -> &mut ParamTimeline {
        self.params
            .entry(param)
            .or_insert_with(|| ParamTimeline::new(0.0))
    }

    pub fn outputs(&self) -> &[Destination] {
        &self.outputs
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop
    }

    pub(crate) fn set_stop_time(&mut self, at: f64) {
        self.stop = Some(at);
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    /// Sources generate signal; everything else transforms it.
    pub fn is_source(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Oscillator { .. } | NodeKind::Noise { .. } | NodeKind::Buffer { .. }
        )
    }
}

/// A node graph ready to be played.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    nodes: Vec<PatchNode>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, node: PatchNode) -> NodeRef {
        self.nodes.push(node);
        NodeRef(self.nodes.len() - 1)
    }

    pub fn oscillator(&mut self, waveform: Waveform, frequency: f64) -> NodeRef {
        self.add(
            PatchNode::new(NodeKind::Oscillator { waveform })
                .with_param(Param::Frequency, frequency),
        )
    }

    pub fn noise(&mut self, duration: f64) -> NodeRef {
        self.add(PatchNode::new(NodeKind::Noise { duration }))
    }

    pub fn buffer(&mut self, sample: Arc<SampleData>) -> NodeRef {
        self.add(PatchNode::new(NodeKind::Buffer { sample }))
    }

    pub fn filter(&mut self, kind: FilterKind, frequency: f64, q: f64) -> NodeRef {
        self.add(
            PatchNode::new(NodeKind::Filter { kind })
                .with_param(Param::Frequency, frequency)
                .with_param(Param::Q, q),
        )
    }

    pub fn gain(&mut self, value: f64) -> NodeRef {
        self.add(PatchNode::new(NodeKind::Gain).with_param(Param::Gain, value))
    }

    pub fn connect(&mut self, from: NodeRef, to: Destination) {
        self.nodes[from.0].outputs.push(to);
    }

    pub fn automate(&mut self, node: NodeRef, param: Param, automation: Automation) {
        self.nodes[node.0].param_mut(param).push(automation);
    }

    pub fn set_value_at(&mut self, node: NodeRef, param: Param, value: f64, at: f64) {
        self.automate(node, param, Automation::SetValue { value, at });
    }

    pub fn exponential_ramp_to(&mut self, node: NodeRef, param: Param, value: f64, end: f64) {
        self.automate(node, param, Automation::ExponentialRamp { value, end });
    }

    pub fn start(&mut self, node: NodeRef, at: f64) {
        self.nodes[node.0].start = Some(at);
    }

    pub fn stop(&mut self, node: NodeRef, at: f64) {
        self.nodes[node.0].stop = Some(at);
    }

    pub fn node(&self, node: NodeRef) -> &PatchNode {
        &self.nodes[node.0]
    }

    pub fn nodes(&self) -> &[PatchNode] {
        &self.nodes
    }

    pub(crate) fn into_nodes(self) -> Vec<PatchNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes of a given kind, in insertion order.
    pub fn find(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| pred(&n.kind))
            .map(|(i, _)| NodeRef(i))
            .collect()
    }

    /// Latest scheduled stop across all sources, if every source has one.
    pub fn end_time(&self) -> Option<f64> {
        let mut end: Option<f64> = None;
        for node in self.nodes.iter().filter(|n| n.is_source()) {
            let stop = node.stop?;
            end = Some(end.map_or(stop, |e: f64| e.max(stop)));
        }
        end
    }
}
