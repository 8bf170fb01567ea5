//! Headless session replay
//!
//! Replays a recorded script compiler session through the frame executor on a real
//! GPU and writes the last presented frame to a PNG file.
//!
//! # Usage
//! ```bash
//! framegraph-replay sessions/blur.json out.png --frames 120 --width 640 --height 360 --set Radius=4
//! ```

mod readback;
mod session;

use clap::Parser;
use framegraph::{ExecutorConfig, Extent, FrameExecutor, FrameOutcome, HeadlessControls, WgpuDevice};
use session::{ReplayCompiler, Session};
use std::path::PathBuf;
use std::time::Duration;

/// Simulated frame interval (60 Hz)
const FRAME_INTERVAL: Duration = Duration::from_nanos(16_666_667);

/// Command-line arguments for the session replayer
#[derive(Parser)]
#[command(version, about = "Replays a recorded script session and saves the final frame")]
struct Args {
    /// Session file (JSON) with the compiler's load result and recorded frames
    session: PathBuf,

    /// Output image file path
    output: PathBuf,

    /// Number of frames to run
    #[arg(long, short, default_value_t = 60)]
    frames: u32,

    /// Surface width in pixels
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Pins a slider to a value, e.g. `--set Radius=4`
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, f64)>,

    /// Executor settings as a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
}

fn parse_override(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{text}'"))?;
    let value = value.trim().parse::<f64>().map_err(|err| format!("invalid value for '{name}': {err}"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => serde_json::from_str::<ExecutorConfig>(&std::fs::read_to_string(path)?)?,
        None => ExecutorConfig::default(),
    };

    tracing::info!(session = %args.session.display(), "loading session");
    let session = Session::from_file(&args.session)?;
    let compiler = ReplayCompiler::new(session);
    let source = compiler.source().to_string();

    let mut controls = HeadlessControls::new();
    for (name, value) in &args.overrides {
        controls.set_override(name.clone(), *value);
    }

    let size = Extent::new(args.width, args.height);
    let device = pollster::block_on(WgpuDevice::headless(size))?;
    let mut executor = FrameExecutor::new(device, compiler, controls, config)?;

    executor.build(&source)?;
    tracing::info!(passes = executor.framegraph().len(), "session built");

    let mut rendered = 0;
    for frame in 0..args.frames {
        match executor.tick(FRAME_INTERVAL * frame, size) {
            FrameOutcome::Rendered { executed, skipped } => {
                rendered += 1;
                tracing::debug!(frame, executed, skipped, "frame rendered");
            }
            outcome => tracing::warn!(frame, ?outcome, "frame not rendered"),
        }
    }
    tracing::info!(rendered, frames = args.frames, "replay finished");
    for input in executor.compiler().last_inputs() {
        tracing::debug!(name = %input.name, value = ?input.value, "final frame input");
    }

    let device = executor.device();
    let image = readback::read_rgba8_texture(device.device(), device.queue(), device.surface_texture())?;
    image.save(&args.output)?;
    tracing::info!(output = %args.output.display(), width = image.width(), height = image.height(), "saved final frame");

    let (device, _, _) = executor.shutdown();
    device.device().poll(wgpu::PollType::Wait)?;

    Ok(())
}
