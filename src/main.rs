//! musictoy: play, inspect and normalise shareable sequencer sessions.

use clap::{Parser, Subcommand};
use musictoy::audio::AudioEngine;
use musictoy::config::{self, Config};
use musictoy::graph::{AudioGraph, SoftwareGraph};
use musictoy::sequencer::{Clock, MonotonicClock};
use musictoy::session::Session;
use tracing::debug;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sample rate used when no device is involved.
const HEADLESS_SAMPLE_RATE: u32 = 48_000;

#[derive(Parser)]
#[command(name = "musictoy")]
#[command(about = "Step sequencer and drone synth driven by a shareable location", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a session and play it through the default output device
    Play {
        /// URL, fragment (`#b=120&...`) or bare parameter string
        location: String,

        /// WAV file for the sample track
        #[arg(long)]
        sample: Option<PathBuf>,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Decode a session and print it
    Inspect {
        location: String,
    },

    /// Print the note table
    Notes,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}; using defaults");
            Config::default()
        }
    };

    match cli.command {
        Commands::Play {
            location,
            sample,
            seconds,
        } => play(&location, sample.as_deref(), seconds, &config),
        Commands::Inspect { location } => {
            inspect(&location, &config);
            Ok(())
        }
        Commands::Notes => {
            print_notes();
            Ok(())
        }
    }
}

fn play(
    location: &str,
    sample: Option<&Path>,
    seconds: Option<f64>,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let mut engine = AudioEngine::new(config.sample_rate, config.master_gain)?;
    let sample_rate = engine.sample_rate();
    let channels = engine.channels();
    println!("audio: {sample_rate} Hz, {channels} ch");

    let mut graph = SoftwareGraph::new(sample_rate, channels, config.seed);
    let mut session = Session::from_location(location, &mut graph);

    if let Some(path) = sample {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let ticket = session.begin_sample_load(&name);
        session.finish_sample_load(&ticket, &bytes, &mut graph);
        println!("{}", session.sample_status());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    println!(
        "tempo: {} BPM, {} steps, block size: {} frames",
        session.bpm(),
        session.steps(),
        config.block_size
    );

    let clock = MonotonicClock::new();
    let block = config.block_size.max(1) as usize;
    let ahead = config.render_ahead_ms as f64 / 1000.0;
    session.start(clock.now_ms(), &mut graph);
    // A rendered block the queue had no room for; sent before rendering more.
    let mut pending: Option<Vec<f32>> = None;

    while running.load(Ordering::SeqCst) {
        let now_ms = clock.now_ms();
        if seconds.is_some_and(|limit| now_ms / 1000.0 >= limit) {
            break;
        }
        session.poll(now_ms, &mut graph);

        // Keep the graph clock a little ahead of the wall clock.
        loop {
            let samples = match pending.take() {
                Some(held) => held,
                None if graph.current_time() < now_ms / 1000.0 + ahead => {
                    graph.render_block(block)
                }
                None => break,
            };
            if let Err(samples) = engine.send_samples(samples) {
                debug!(len = samples.len(), "audio queue full, holding block");
                pending = Some(samples);
                break;
            }
        }
        thread::sleep(Duration::from_millis(2));
    }

    session.stop(&mut graph);
    // Let queued audio drain
    thread::sleep(Duration::from_millis(config.render_ahead_ms + 100));
    engine.stop()?;
    println!("{}", session.location());
    Ok(())
}

fn inspect(location: &str, config: &Config) {
    let mut graph = SoftwareGraph::new(HEADLESS_SAMPLE_RATE, 1, config.seed);
    let session = Session::from_location(location, &mut graph);
    let notes = session.notes();

    println!("{}", session.location());
    println!(
        "tempo: {} BPM, {} steps, theme: {}",
        session.bpm(),
        session.steps(),
        session.theme()
    );

    println!();
    for track in session.tracks() {
        let row: String = session
            .patterns()
            .row(&track.id)
            .unwrap_or(&[])
            .iter()
            .map(|&on| if on { 'x' } else { '.' })
            .collect();
        println!("{:<8} {row}", track.display_name);
    }

    println!();
    for (id, inst) in session.registry().instruments() {
        let note = notes
            .get(notes.nearest_index(inst.frequency_hz))
            .map(|n| n.name.as_str())
            .unwrap_or("?");
        println!(
            "{:<8} {:<6} {:<9} {note:<4} ({:.2} Hz) vol {:.2}",
            id.as_str(),
            inst.voice.name(),
            inst.waveform.name(),
            inst.frequency_hz,
            inst.gain
        );
    }

    println!();
    for drone in session.drones().drones() {
        let note = notes
            .get(drone.note_index)
            .map(|n| n.name.as_str())
            .unwrap_or("?");
        println!(
            "drone {} {} {:<9} {note:<4} vol {:.2}",
            drone.slot_id,
            if drone.armed { "armed   " } else { "disarmed" },
            drone.waveform.name(),
            drone.volume
        );
    }
}

fn print_notes() {
    let notes = musictoy::note::NoteTable::build();
    for (i, note) in notes.iter().enumerate() {
        println!("{i:>2}  {:<4} {:>8.2} Hz", note.name, note.frequency);
    }
}
