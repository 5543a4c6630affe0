// Quarry command line interface
// Runs the detection loop over recorded frames, checks configs and warms models

mod session;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use quarry_eye::render::RgbaSurface;
use quarry_eye::{
    DetectionConfig, FrameLoop, FrameSource, ImageSequenceSource, InferenceEngine, OrtBackend,
    TickOutcome,
};
use session::{Mode, SessionListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - live object-presence detection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Detection config file (JSON or TOML); defaults apply when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the model path from the config
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection loop over a directory of frames
    Run {
        /// Directory of frames, replayed in file-name order
        #[arg(long)]
        frames: PathBuf,

        /// Directory receiving the annotated overlays
        #[arg(long, default_value = "./overlays")]
        out: PathBuf,

        /// Font used for box labels
        #[arg(long)]
        font: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "detect")]
        mode: Mode,
    },

    /// Validate a config file and print the effective settings
    CheckConfig,

    /// Load the model and run the warm-up pass
    Warmup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.model)?;

    match cli.command {
        Commands::Run {
            frames,
            out,
            font,
            mode,
        } => {
            run(config, &frames, &out, font.as_deref(), mode).await?;
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!(
                "Tracking {} classes, settle threshold {}",
                config.tracked_class_names().len(),
                config.settle_threshold
            );
        }
        Commands::Warmup => {
            let engine = load_engine(&config)?;
            let (w, h) = engine.input_size();
            println!("Model {:?} ready ({}x{})", config.model_path, w, h);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, model: Option<PathBuf>) -> anyhow::Result<DetectionConfig> {
    let mut config = match path {
        Some(path) => DetectionConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => DetectionConfig::default(),
    };

    config.apply_env_overrides();
    if let Some(model) = model {
        config.model_path = model;
    }

    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }
    Ok(config)
}

fn load_engine(config: &DetectionConfig) -> anyhow::Result<InferenceEngine<OrtBackend>> {
    let backend = OrtBackend::load(config).context("Failed to load detector model")?;
    let engine = InferenceEngine::new(backend, config).context("Model warm-up failed")?;
    Ok(engine)
}

async fn run(
    config: DetectionConfig,
    frames: &Path,
    out: &Path,
    font: Option<&Path>,
    mode: Mode,
) -> anyhow::Result<()> {
    let mut source = ImageSequenceSource::open(frames)?;
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        bail!("No readable frames in {:?}", frames);
    }

    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {:?}", out))?;

    let mut surface = RgbaSurface::new(width, height);
    if let Some(path) = font {
        surface = surface.with_font(RgbaSurface::load_font(path)?);
    } else {
        warn!("No --font given, labels are drawn without text");
    }

    let engine = load_engine(&config)?;
    let listener = Arc::new(SessionListener::new(mode));
    let mut frame_loop = FrameLoop::new(Arc::new(config), engine, listener.clone())?;

    let handle = frame_loop.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping after the current frame");
            handle.stop();
        }
    });

    info!("Replaying {} frames from {:?}", source.len(), frames);
    let mut written = 0usize;
    let summary = frame_loop
        .run_with(&mut source, &mut surface, |outcome, surface| {
            if matches!(outcome, TickOutcome::Idle) {
                return Ok(());
            }
            written += 1;
            let path = out.join(format!("overlay_{:05}.png", written));
            if let Err(e) = surface.save(&path) {
                error!("Failed to write {:?}: {}", path, e);
                return Err(e);
            }
            Ok(())
        })
        .await?;

    println!(
        "Processed {} frames: {} rendered, {} settled, {} aborted",
        summary.ticks, summary.rendered, summary.settled, summary.aborted
    );
    for event in listener.settled() {
        println!("  settled: {} ({} hits)", event.class_name, event.count);
    }
    if mode == Mode::Learning {
        println!("Classes seen: {}", listener.seen_classes().join(", "));
    }
    println!("Overlays written to {:?}", out);

    Ok(())
}
