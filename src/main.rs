//! Multitrack Recorder CLI entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};

use multitrack_recorder::capture::{
    CaptureBackend, NativeDeviceBackend, Rect, SelectionTarget, SyntheticBackend,
};
use multitrack_recorder::config::{MissingDevicePolicy, RecorderSettings, SettingsStore};
use multitrack_recorder::recorder::{RecordingEvent, RecordingSession};
use multitrack_recorder::utils::{AppError, ErrorResponse};

/// Record screen, system audio, camera, microphone and input events
#[derive(Parser, Debug)]
#[command(name = "multitrack-recorder")]
#[command(version)]
#[command(about = "Records synchronized screen, audio, camera and input tracks into one session directory")]
struct Cli {
    /// Config file (defaults to <config_dir>/multitrack-recorder/config.toml)
    #[arg(short, long, global = true, value_name = "FILE", env = "MULTITRACK_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a session (Ctrl-C stops it)
    Record(RecordArgs),
    /// List displays
    Displays,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Print the effective configuration
    Show,
    /// Show config file path
    Path,
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Record a whole display
    #[arg(long, value_name = "ID", group = "target")]
    display: Option<u32>,

    /// Record a single window
    #[arg(long, value_name = "ID", group = "target")]
    window: Option<u32>,

    /// Record an area in global coordinates
    #[arg(long, value_name = "X,Y,W,H", group = "target", value_parser = parse_area)]
    area: Option<Rect>,

    /// Stop automatically after this many seconds
    #[arg(short, long, value_name = "SECONDS")]
    duration: Option<f64>,

    /// Use synthetic camera and microphone instead of host devices
    #[arg(long)]
    synthetic: bool,

    /// Base directory for session folders
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    #[arg(long)]
    no_system_audio: bool,

    #[arg(long)]
    no_camera: bool,

    #[arg(long)]
    no_microphone: bool,

    #[arg(long)]
    no_interactions: bool,

    /// Fail instead of skipping when the camera or microphone is missing
    #[arg(long)]
    require_devices: bool,
}

impl RecordArgs {
    fn target(&self, backend: &dyn CaptureBackend) -> anyhow::Result<SelectionTarget> {
        if let Some(id) = self.display {
            return Ok(SelectionTarget::Display { id });
        }
        if let Some(id) = self.window {
            return Ok(SelectionTarget::Window { id });
        }
        if let Some(rect) = self.area {
            return Ok(SelectionTarget::Area { rect });
        }

        let displays = backend.displays();
        let primary = displays
            .iter()
            .find(|d| d.is_primary)
            .or_else(|| displays.first())
            .context("no display available")?;
        Ok(SelectionTarget::Display { id: primary.id })
    }

    fn apply(&self, settings: &mut RecorderSettings) {
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        settings.system_audio &= !self.no_system_audio;
        settings.camera &= !self.no_camera;
        settings.microphone &= !self.no_microphone;
        settings.interactions &= !self.no_interactions;
        if self.require_devices {
            settings.missing_device = MissingDevicePolicy::Fail;
        }
    }
}

fn parse_area(value: &str) -> Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid area: {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err("area width and height must be positive".to_string()),
        _ => Err("expected X,Y,W,H".to_string()),
    }
}

/// Present an application error with its stable code
fn report(error: impl Into<AppError>) -> anyhow::Error {
    let response = ErrorResponse::from(error.into());
    anyhow!("[{}] {}", response.code, response.message)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    multitrack_recorder::init_tracing();
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => SettingsStore::with_path(path),
        None => SettingsStore::new(),
    };

    match cli.command {
        Commands::Record(args) => record(&store, args).await,
        Commands::Displays => {
            for display in SyntheticBackend::new().displays() {
                println!(
                    "{}\t{}\t{}x{} (scale {}){}",
                    display.id,
                    display.name,
                    display.bounds.width,
                    display.bounds.height,
                    display.scale_factor,
                    if display.is_primary { " (primary)" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Config { action } => config(&store, action).await,
    }
}

async fn config(store: &SettingsStore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            store.init().await.map_err(report)?;
            println!("Created {}", store.path().display());
        }
        ConfigAction::Show => {
            let settings = store.load().await.map_err(report)?;
            print!("{}", settings.to_toml().map_err(report)?);
        }
        ConfigAction::Path => println!("{}", store.path().display()),
    }
    Ok(())
}

async fn record(store: &SettingsStore, args: RecordArgs) -> anyhow::Result<()> {
    let mut settings = store
        .load()
        .await
        .map_err(report)
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    args.apply(&mut settings);

    // Screen and input always come from the synthetic backend here; host
    // screen capture plugs in through `CaptureBackend`.
    let screens: Arc<dyn CaptureBackend> = Arc::new(SyntheticBackend::new());
    let backend: Arc<dyn CaptureBackend> = if args.synthetic {
        screens
    } else {
        Arc::new(NativeDeviceBackend::new(screens, settings.ffmpeg_path.clone()))
    };

    let target = args.target(backend.as_ref())?;
    let mut session = RecordingSession::new(backend, settings);
    session.select_target(Some(target)).map_err(report)?;

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecordingEvent::UnitSkipped { unit, reason } => {
                    eprintln!("Skipping {unit}: {reason}")
                }
                RecordingEvent::Error(message) => eprintln!("Error: {message}"),
                _ => {}
            }
        }
    });

    let directory = session.start().await.map_err(report)?;
    println!("Recording to {}", directory.display());

    match args.duration {
        Some(seconds) if seconds > 0.0 => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        _ => {
            println!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    let Some(output) = session.stop().await else {
        bail!("recording was not active");
    };

    println!(
        "Recorded {:.1}s into {}",
        output.duration.as_secs_f64(),
        output.directory.display()
    );
    for file in &output.files {
        println!("  {}", file.display());
    }
    for skipped in &output.skipped {
        println!("  skipped {skipped}");
    }
    for error in &output.errors {
        eprintln!("  error: {error}");
    }
    Ok(())
}
