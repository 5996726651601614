//! Commands sent from the control thread to the audio thread.

#[derive(Debug)]
pub enum AudioCommand {
    /// Rendered interleaved frames to append to the playback queue.
    Samples(Vec<f32>),

    /// Drop everything queued for playback.
    Stop,
}
