//! Audio graph capability: the seam between session logic and sound.
//!
//! Everything audible in the crate is expressed as a [`Patch`] played on an
//! [`AudioGraph`]. The session, drones and voice renderers only ever talk to
//! this trait, so the same code drives the offline [`SoftwareGraph`] used by
//! the CLI and tests, or any other backend that can realise a patch.

pub mod automation;
pub mod patch;
pub mod software;

pub use automation::{Automation, ParamTimeline};
pub use patch::{Destination, FilterKind, NodeKind, NodeRef, Param, Patch, PatchNode};
pub use software::SoftwareGraph;

use std::fmt;

use crate::audio::AudioError;
use crate::synth::oscillator::Waveform;
use crate::synth::sample::{SampleData, SampleError};

/// Identifies a playing patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchHandle(pub u64);

impl fmt::Display for PatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A running audio context with a monotonic clock.
///
/// Times are absolute seconds on the graph's own clock. Patches finish on
/// their own once every source has stopped; handles to finished patches
/// become unknown.
pub trait AudioGraph {
    /// Current time of the graph clock in seconds.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// Resume a suspended context. A no-op when already running.
    fn resume(&mut self) -> Result<(), AudioError>;

    /// Start playing a patch; returns a handle for later control.
    fn play(&mut self, patch: Patch) -> Result<PatchHandle, AudioError>;

    /// Add an automation event to a live node's parameter.
    fn schedule(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        automation: Automation,
    ) -> Result<(), AudioError>;

    /// Drop a live parameter's events at or after `from`.
    fn cancel_scheduled(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        from: f64,
    ) -> Result<(), AudioError>;

    /// Computed value of a live parameter at time `at`.
    fn param_value(
        &self,
        handle: PatchHandle,
        node: NodeRef,
        param: Param,
        at: f64,
    ) -> Result<f64, AudioError>;

    /// Change a live oscillator's waveform.
    fn set_waveform(
        &mut self,
        handle: PatchHandle,
        node: NodeRef,
        waveform: Waveform,
    ) -> Result<(), AudioError>;

    /// Schedule a live source node to stop at `at`.
    fn stop(&mut self, handle: PatchHandle, node: NodeRef, at: f64) -> Result<(), AudioError>;

    /// Decode an encoded audio file into a buffer at the graph's sample rate.
    fn decode_sample(&self, bytes: &[u8]) -> Result<SampleData, SampleError>;
}
