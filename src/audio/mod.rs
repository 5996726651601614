//! Real-time output: cpal stream fed through a lock-free command queue.
//!
//! The control thread renders blocks from an [`AudioGraph`](crate::graph::AudioGraph)
//! and pushes them as [`AudioCommand`]s; the audio thread drains the queue in
//! its callback and runs everything through the [`MasterBus`].

pub mod callback;
pub mod command;
pub mod master;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Producer, Split},
    HeapRb,
};
use tracing::{error, info};

pub use command::AudioCommand;
pub use master::{MasterBus, DEFAULT_CEILING, DEFAULT_MASTER_GAIN};

use crate::graph::{Param, PatchHandle};
use callback::AudioCallback;

/// Ring buffer capacity (number of commands).
const RING_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device found")]
    NoOutputDevice,
    #[error("device config error: {0}")]
    DeviceConfig(String),
    #[error("stream build error: {0}")]
    StreamBuild(String),
    #[error("stream play error: {0}")]
    StreamPlay(String),
    /// The audio thread is not draining fast enough.
    #[error("audio command ring buffer is full")]
    BufferFull,
    #[error("no live patch {0}")]
    UnknownPatch(PatchHandle),
    #[error("patch {handle} has no node {node}")]
    UnknownNode { handle: PatchHandle, node: usize },
    #[error("patch {handle} node {node} has no {param:?} parameter")]
    MissingParam {
        handle: PatchHandle,
        node: usize,
        param: Param,
    },
}

/// Owns the cpal stream and the producer half of the command queue.
pub struct AudioEngine {
    /// Held for its lifetime; dropping it stops playback.
    _stream: cpal::Stream,
    producer: ringbuf::HeapProd<AudioCommand>,
    sample_rate: u32,
    channels: u16,
}

impl AudioEngine {
    /// Open the default output device at its preferred rate, or at
    /// `sample_rate` when given.
    pub fn new(sample_rate: Option<u32>, master_gain: f32) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

        let sample_rate = sample_rate.unwrap_or(config.sample_rate().0);
        let channels = config.channels();

        Self::build_with_device(&device, sample_rate, channels, master_gain)
    }

    fn build_with_device(
        device: &cpal::Device,
        sample_rate: u32,
        channels: u16,
        master_gain: f32,
    ) -> Result<Self, AudioError> {
        let rb = HeapRb::<AudioCommand>::new(RING_BUFFER_CAPACITY);
        let (producer, consumer) = rb.split();

        let mut audio_callback = AudioCallback::new(
            consumer,
            MasterBus::new(master_gain, DEFAULT_CEILING),
            sample_rate as usize * channels as usize,
        );

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err: cpal::StreamError| {
            error!("audio stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    audio_callback.process(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        info!(sample_rate, channels, "audio output started");

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
        })
    }

    /// Queue interleaved frames for playback. When the queue is full the
    /// block is handed back so the caller can retry it.
    pub fn send_samples(&mut self, samples: Vec<f32>) -> Result<(), Vec<f32>> {
        push_samples(&mut self.producer, samples)
    }

    /// Drop queued audio.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.producer
            .try_push(AudioCommand::Stop)
            .map_err(|_| AudioError::BufferFull)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn push_samples<P>(producer: &mut P, samples: Vec<f32>) -> Result<(), Vec<f32>>
where
    P: Producer<Item = AudioCommand>,
{
    if let Err(AudioCommand::Samples(block)) = producer.try_push(AudioCommand::Samples(samples)) {
        return Err(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio device: run manually with `cargo test -- --ignored`
    fn engine_opens_default_device() {
        let engine = AudioEngine::new(None, DEFAULT_MASTER_GAIN).expect("no audio device");
        assert!(engine.sample_rate() > 0);
        assert!(engine.channels() > 0);
    }

    #[test]
    #[ignore] // Requires audio device
    fn engine_accepts_commands() {
        let mut engine = AudioEngine::new(None, DEFAULT_MASTER_GAIN).expect("no audio device");
        assert!(engine.send_samples(vec![0.0; 1024]).is_ok());
        assert!(engine.stop().is_ok());
    }

    #[test]
    fn full_queue_hands_the_block_back() {
        use ringbuf::traits::Consumer;

        let rb = HeapRb::<AudioCommand>::new(1);
        let (mut prod, mut cons) = rb.split();
        assert!(push_samples(&mut prod, vec![0.1; 4]).is_ok());

        let rejected = push_samples(&mut prod, vec![0.2, 0.3]).unwrap_err();
        assert_eq!(rejected, vec![0.2, 0.3]);

        assert!(cons.try_pop().is_some());
        assert!(push_samples(&mut prod, rejected).is_ok());
        match cons.try_pop() {
            Some(AudioCommand::Samples(data)) => assert_eq!(data, vec![0.2, 0.3]),
            other => panic!("expected retried block, got {other:?}"),
        }
    }

    #[test]
    fn error_display() {
        assert_eq!(
            AudioError::NoOutputDevice.to_string(),
            "no audio output device found"
        );
        assert_eq!(
            AudioError::UnknownPatch(PatchHandle(7)).to_string(),
            "no live patch #7"
        );
        assert_eq!(
            AudioError::UnknownNode {
                handle: PatchHandle(2),
                node: 5
            }
            .to_string(),
            "patch #2 has no node 5"
        );
    }
}
