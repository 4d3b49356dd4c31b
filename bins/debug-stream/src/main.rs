use anyhow::{Context, Result};
use clap::Parser;
use dbgwin_config::DebugStreamConfig;
use dbgwin_engine::{DebugStreamSession, Runner, Session, open_source};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Receives, decodes and prints debug-stream records from the DSP debug
/// window. The host polls; nothing is ever written back to the DSP.
#[derive(Parser, Debug)]
#[command(name = "debug-stream", version)]
struct Args {
    /// TOML config file; the flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Polling interval in seconds [default: 0.01]
    #[arg(short = 't', long)]
    update_interval: Option<f64>,

    /// File to read the slot from [default: /sys/kernel/debug/sof/debug_stream]
    #[arg(short = 'f', long)]
    debugstream_file: Option<PathBuf>,

    /// Access this debug window slot directly, no debugfs file needed
    #[arg(short = 'c', long)]
    direct_access_slot: Option<u32>,

    /// Memory-mappable debug window, e.g. a PCI resource file
    #[arg(short = 'w', long)]
    window: Option<PathBuf>,

    /// Byte offset of the debug window inside the window file
    #[arg(long)]
    window_offset: Option<u64>,

    /// Decode failures tolerated before a core's ring is re-attached
    #[arg(long)]
    error_threshold: Option<u32>,
}

impl Args {
    fn apply(self, cfg: &mut DebugStreamConfig) {
        if let Some(t) = self.update_interval {
            cfg.update_interval_secs = t;
        }
        if let Some(file) = self.debugstream_file {
            cfg.source.file = Some(file);
        }
        if let Some(slot) = self.direct_access_slot {
            cfg.source.slot = Some(slot);
        }
        if let Some(window) = self.window {
            cfg.source.window = Some(window);
        }
        if let Some(offset) = self.window_offset {
            cfg.source.window_offset = offset;
        }
        if let Some(threshold) = self.error_threshold {
            cfg.error_threshold = threshold;
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => DebugStreamConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => DebugStreamConfig::default(),
    };
    args.apply(&mut cfg);
    cfg.validate().context("invalid settings")?;
    init_tracing(&cfg.log_level);

    let interval = cfg.update_interval()?;
    let spec = cfg.source_spec();
    info!(?spec, ?interval, threshold = cfg.error_threshold, "debug-stream starting");

    let session = DebugStreamSession::new(cfg.error_threshold, std::io::stdout().lock());
    let slot_type = session.slot_type();
    let mut runner = Runner::new(session, interval, move || open_source(&spec, slot_type));
    runner.run().context("debug-stream stopped")?;
    Ok(())
}
