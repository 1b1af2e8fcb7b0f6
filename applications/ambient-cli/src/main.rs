/// ambiently - ambient sound mixer for the terminal
use ambient_audio_desktop::{BackendPreference, DesktopMixer};
use ambient_cli::{AppConfig, Command, Reply, Session};
use ambient_mixer::{AudioSource, LoadOutcome, MixerEvent};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often loads and tick events are polled while waiting for input
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "ambiently")]
#[command(about = "Blend looping ambient sounds with crossfades and presets", long_about = None)]
struct Cli {
    /// Configuration file path (default: ./ambiently.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with one loop file per track
    #[arg(short, long, env = "AMBIENTLY_LOOPS_DIR")]
    loops_dir: Option<PathBuf>,

    /// Use the ramp-less fallback backend even when a device is available
    #[arg(long)]
    fallback: bool,

    /// Keep audio suspended until the `resume` command
    #[arg(long)]
    suspended: bool,

    /// Apply this preset once the loops are loaded
    #[arg(short, long)]
    preset: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ambiently=info,ambient_cli=info,ambient_mixer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.loops_dir {
        config.loops_dir = dir;
    }
    if cli.suspended {
        config.engine.start_suspended = true;
    }
    let preference = if cli.fallback || config.force_fallback {
        BackendPreference::Fallback
    } else {
        BackendPreference::Auto
    };

    tracing::info!("Starting ambiently");
    tracing::info!("Loops: {}", config.loops_dir.display());

    let mut mixer = DesktopMixer::open_with(config.tracks.clone(), config.engine.clone(), preference)?;
    match mixer.device() {
        Some(device) => tracing::info!("Output: {} ({})", device, mixer.backend_kind().name()),
        None => tracing::warn!("No output device; commands still work but nothing is audible"),
    }

    for track in &config.tracks {
        let path = config.loop_path(track);
        if !mixer.engine_mut().request_load(&track.id, AudioSource::Path(path)) {
            tracing::warn!("Could not queue loop for {}", track.id);
        }
    }

    let mut session = Session::new(config.presets.clone());
    let mut pending_preset = cli.preset;

    let lines = spawn_stdin_reader();
    println!("{}", ambient_cli::command::HELP);
    prompt();

    loop {
        report_loads(&mut mixer);
        drain_events(&mixer);

        if let Some(name) = pending_preset.as_deref() {
            if !mixer.engine().is_loading() {
                run(&mut session, &mut mixer, Command::Load(name.to_string()));
                pending_preset = None;
                prompt();
            }
        }

        let line = match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            // stdin closed
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if line.trim().is_empty() {
            prompt();
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                if !run(&mut session, &mut mixer, command) {
                    break;
                }
            }
            Err(e) => println!("{e} (type 'help')"),
        }
        prompt();
    }

    tracing::info!("Shutting down");
    mixer.dispose();
    Ok(())
}

/// Execute one command; returns false on quit
fn run(session: &mut Session, mixer: &mut DesktopMixer, command: Command) -> bool {
    match session.execute(mixer.engine_mut(), command) {
        Reply::Text(text) => println!("{text}"),
        Reply::Resume => match mixer.resume_if_suspended() {
            Ok(()) => println!("Audio running"),
            Err(e) => println!("Cannot resume audio: {e}"),
        },
        Reply::Quit => return false,
    }
    true
}

fn report_loads(mixer: &mut DesktopMixer) {
    for outcome in mixer.engine_mut().poll_loads() {
        match outcome {
            LoadOutcome::Loaded { id, duration_secs } => {
                println!("\rloaded {id} ({duration_secs:.1}s loop)");
            }
            LoadOutcome::Failed { id, reason } => {
                println!("\r{id} unavailable: {reason}");
            }
        }
    }
}

fn drain_events(mixer: &DesktopMixer) {
    while let Some(event) = mixer.engine().try_recv_event() {
        match event {
            MixerEvent::VoiceStarted { id } => tracing::debug!("{} started", id),
            MixerEvent::VoiceStopped { id } => tracing::debug!("{} stopped", id),
            MixerEvent::LoopScheduled { id, iteration, .. } => {
                tracing::trace!("{} loop iteration {}", id, iteration);
            }
            MixerEvent::BufferInstalled { id } => tracing::debug!("{} buffer installed", id),
            MixerEvent::Disposed => tracing::debug!("mixer tick disposed"),
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    // Without the reader the channel is disconnected and the main loop exits
    if let Err(e) = spawned {
        tracing::error!("Failed to start input thread: {}", e);
    }
    rx
}

fn prompt() {
    print!("ambiently> ");
    let _ = std::io::stdout().flush();
}
