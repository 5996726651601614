//! Audio callback: runs on the cpal audio thread.
//!
//! Drains commands from the ring buffer, copies queued frames to the device
//! and runs them through the master bus.

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use super::command::AudioCommand;
use super::master::MasterBus;

/// Consumed samples are compacted away once `read_pos` passes this.
const COMPACT_THRESHOLD: usize = 8192;

/// State owned by the audio thread.
pub struct AudioCallback {
    consumer: HeapCons<AudioCommand>,
    playback_buffer: Vec<f32>,
    read_pos: usize,
    master: MasterBus,
}

impl AudioCallback {
    pub fn new(consumer: HeapCons<AudioCommand>, master: MasterBus, capacity: usize) -> Self {
        Self {
            consumer,
            playback_buffer: Vec::with_capacity(capacity),
            read_pos: 0,
            master,
        }
    }

    /// Fill `output` with queued frames, silence on underrun.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Some(cmd) = self.consumer.try_pop() {
            match cmd {
                AudioCommand::Samples(data) => self.playback_buffer.extend_from_slice(&data),
                AudioCommand::Stop => {
                    self.playback_buffer.clear();
                    self.read_pos = 0;
                }
            }
        }

        let available = self.playback_buffer.len() - self.read_pos;
        let copy_len = output.len().min(available);
        output[..copy_len]
            .copy_from_slice(&self.playback_buffer[self.read_pos..self.read_pos + copy_len]);
        self.read_pos += copy_len;
        output[copy_len..].fill(0.0);

        self.master.process_block(output);

        if self.read_pos >= COMPACT_THRESHOLD {
            self.playback_buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
    }

    /// Samples queued but not yet played.
    pub fn queued(&self) -> usize {
        self.playback_buffer.len() - self.read_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{
        traits::{Producer, Split},
        HeapRb,
    };

    fn setup(gain: f32) -> (ringbuf::HeapProd<AudioCommand>, AudioCallback) {
        let rb = HeapRb::<AudioCommand>::new(16);
        let (prod, cons) = rb.split();
        (prod, AudioCallback::new(cons, MasterBus::new(gain, 0.95), 1024))
    }

    #[test]
    fn silence_when_empty() {
        let (_prod, mut cb) = setup(1.0);
        let mut output = vec![999.0f32; 64];
        cb.process(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn applies_master_gain() {
        let (mut prod, mut cb) = setup(0.8);
        prod.try_push(AudioCommand::Samples(vec![0.5, -0.5])).unwrap();
        let mut output = vec![0.0f32; 2];
        cb.process(&mut output);
        assert!((output[0] - 0.4).abs() < 1e-6);
        assert!((output[1] + 0.4).abs() < 1e-6);
    }

    #[test]
    fn ceiling_is_applied() {
        let (mut prod, mut cb) = setup(1.0);
        prod.try_push(AudioCommand::Samples(vec![2.0, -2.0, 0.5])).unwrap();
        let mut output = vec![0.0f32; 3];
        cb.process(&mut output);
        assert!((output[0] - 0.95).abs() < 1e-6);
        assert!((output[1] + 0.95).abs() < 1e-6);
        assert!((output[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stop_clears_queue() {
        let (mut prod, mut cb) = setup(1.0);
        prod.try_push(AudioCommand::Samples(vec![0.5; 64])).unwrap();
        prod.try_push(AudioCommand::Stop).unwrap();
        let mut output = vec![999.0f32; 32];
        cb.process(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(cb.queued(), 0);
    }

    #[test]
    fn underrun_pads_with_silence() {
        let (mut prod, mut cb) = setup(1.0);
        prod.try_push(AudioCommand::Samples(vec![0.5, 0.6])).unwrap();
        let mut output = vec![999.0f32; 4];
        cb.process(&mut output);
        assert!((output[1] - 0.6).abs() < 1e-6);
        assert_eq!(&output[2..], &[0.0, 0.0]);
    }

    #[test]
    fn queue_persists_across_calls() {
        let (mut prod, mut cb) = setup(1.0);
        prod.try_push(AudioCommand::Samples(vec![0.1, 0.2, 0.3, 0.4]))
            .unwrap();
        let mut a = vec![0.0f32; 2];
        cb.process(&mut a);
        assert_eq!(cb.queued(), 2);
        let mut b = vec![0.0f32; 2];
        cb.process(&mut b);
        assert!((b[0] - 0.3).abs() < 1e-6);
        assert!((b[1] - 0.4).abs() < 1e-6);
    }
}
