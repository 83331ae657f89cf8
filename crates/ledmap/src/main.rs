//! ledmap command line
//!
//! Runs a show file against its Art-Net outputs, validates show files and
//! replays recorded DMX captures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use ledmap::logging_setup::{self, LogGuard};
use ledmap::{ShowContext, StatusPublisher};
use ledmap_core::PlayState;
use ledmap_io::{load_show, save_recording, ShowConfig};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "ledmap", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a show file.
    Run(RunArgs),
    /// Check a show file and report every rejected entry.
    Validate(ValidateArgs),
    /// Send a recorded capture to the show's outputs.
    Replay(ReplayArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Show file (toml, json or ron).
    show: PathBuf,

    /// Stop after this many seconds. Without it the show runs until every
    /// player has stopped.
    #[arg(long)]
    seconds: Option<f64>,

    /// Override the show's log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Print status snapshots to stdout as JSON lines.
    #[arg(long, default_value_t = false)]
    status: bool,

    /// Capture everything sent and save it here on exit (json or ron).
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Show file (toml, json or ron).
    show: PathBuf,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Show file providing the outputs.
    show: PathBuf,

    /// Recording (json or ron).
    recording: PathBuf,

    /// Start over at the end instead of stopping.
    #[arg(long = "loop", default_value_t = false)]
    looping: bool,

    /// Playback speed multiplier.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Brightness multiplier applied to every channel.
    #[arg(long, default_value_t = 1.0)]
    brightness: f32,

    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Validate(args) => cmd_validate(args),
        Command::Replay(args) => cmd_replay(args),
    }
}

/// Load a show and install logging from its settings. Keep the guard alive
/// until exit.
fn open_show(
    path: &Path,
    log_level: Option<&str>,
) -> anyhow::Result<(ShowConfig, Option<LogGuard>)> {
    let show = load_show(path).with_context(|| format!("load show '{}'", path.display()))?;
    let mut logging = show.logging.clone();
    if let Some(level) = log_level {
        logging.level = level.to_string();
    }
    let guard = logging_setup::init(&logging)?;
    Ok((show, guard))
}

fn deadline(seconds: Option<f64>) -> Option<Instant> {
    seconds
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| Instant::now() + Duration::from_secs_f64(s))
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let (show, _log_guard) = open_show(&args.show, args.log_level.as_deref())?;
    let context = Arc::new(ShowContext::new(show).context("start show")?);

    let publisher = if args.status {
        Some(StatusPublisher::spawn(
            context.clone(),
            context.status_interval(),
        )?)
    } else {
        None
    };
    if args.record.is_some() {
        context.start_recording(context.name());
    }

    let until = deadline(args.seconds);
    loop {
        if let Some(publisher) = &publisher {
            for snapshot in publisher.receiver().try_iter() {
                println!("{}", serde_json::to_string(&snapshot)?);
            }
        }
        match until {
            Some(until) if Instant::now() >= until => break,
            Some(_) => {}
            None => {
                let status = context.status();
                let idle = status
                    .players
                    .iter()
                    .all(|p| p.state == PlayState::Stopped);
                if idle && !status.replay.active {
                    info!("All players stopped");
                    break;
                }
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    if let Some(path) = args.record {
        let recording = context.stop_recording()?;
        save_recording(&recording, &path)
            .with_context(|| format!("save recording '{}'", path.display()))?;
        eprintln!("wrote {}", path.display());
    }
    drop(publisher);
    context.shutdown();
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let show = load_show(&args.show)
        .with_context(|| format!("load show '{}'", args.show.display()))?;
    let (topology, mut errors) = show.build_topology();
    errors.extend(show.player_errors());

    println!(
        "{}: {} objects, {} points, {} outputs, {} universes, {} players",
        show.name,
        topology.objects().len(),
        topology.point_count(),
        topology.outputs().len(),
        topology.universes().len(),
        show.players.len()
    );
    for error in &errors {
        println!("  rejected: {}", error);
    }
    if !errors.is_empty() {
        bail!("{} entries rejected", errors.len());
    }
    Ok(())
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let (mut show, _log_guard) = open_show(&args.show, None)?;
    if !show.players.is_empty() {
        warn!("Replay mode: {} players not started", show.players.len());
        show.players.clear();
    }
    let context = ShowContext::new(show).context("start show")?;

    context
        .load_replay_file(&args.recording)
        .with_context(|| format!("load recording '{}'", args.recording.display()))?;
    context.set_replay_loop(args.looping);
    context.set_replay_speed(args.speed)?;
    context.set_replay_brightness(args.brightness)?;
    context.start_replay()?;

    let until = deadline(args.seconds);
    while context.replay_status().active {
        if until.is_some_and(|until| Instant::now() >= until) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    context.shutdown();
    Ok(())
}
