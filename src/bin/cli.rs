//! chiptone CLI: real-time playback and WAV export.
//!
//! Usage:
//!   ct-cli path/to/song.mid
//!   ct-cli path/to/song.mid --wav output.wav --sample-rate 48000

use clap::Parser;
use ct_master::{Controller, MasterError, RenderConfig};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ct-cli")]
#[command(version)]
#[command(about = "Play a Standard MIDI File on a four-voice chiptune synth", long_about = None)]
struct Args {
    /// Standard MIDI File to play
    input: PathBuf,

    /// Render to this WAV file instead of playing
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Output sample rate for WAV export
    #[arg(long, default_value_t = RenderConfig::default().sample_rate)]
    sample_rate: u32,

    /// Output channels for WAV export
    #[arg(long, default_value_t = RenderConfig::default().channels)]
    channels: u16,

    /// Seed for the noise voice
    #[arg(long)]
    seed: Option<u64>,

    /// Longest WAV export, in seconds
    #[arg(long, default_value_t = RenderConfig::default().max_seconds)]
    max_seconds: u32,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    debug!(?args, "starting");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", args.input.display(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), MasterError> {
    let mut ctrl = Controller::new();
    ctrl.set_seed(args.seed);

    let seq = ctrl.load_file(&args.input)?;
    println!("Format:   {}", seq.format.as_u16());
    println!("Division: {} ticks/quarter", seq.division);
    println!("Tracks:   {}", seq.tracks);
    for (index, timeline) in seq.timelines.iter().enumerate().take(seq.tracks) {
        let name = timeline.name.as_deref().unwrap_or("-");
        println!("  {}: {:4} events  {}", index, timeline.len(), name);
    }
    println!("Length:   {:.1}s", seq.duration_secs());
    println!();

    match &args.wav {
        Some(path) => {
            let config = RenderConfig {
                sample_rate: args.sample_rate,
                channels: args.channels,
                max_seconds: args.max_seconds,
                seed: args.seed,
            };
            render_to_wav(&ctrl, path, &config)
        }
        None => play_audio(&mut ctrl),
    }
}

fn play_audio(ctrl: &mut Controller) -> Result<(), MasterError> {
    ctrl.play()?;
    println!("Playing...");

    while ctrl.is_playing() {
        if let Some(progress) = ctrl.progress() {
            print!("\r{:3}%", progress.percent());
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    println!();
    ctrl.finish()?;

    println!("Done.");
    Ok(())
}

fn render_to_wav(ctrl: &Controller, path: &Path, config: &RenderConfig) -> Result<(), MasterError> {
    println!(
        "Rendering to {} at {} Hz, {} channel(s)...",
        path.display(),
        config.sample_rate,
        config.channels
    );
    ctrl.export_wav(path, config)?;
    println!("Done.");
    Ok(())
}
