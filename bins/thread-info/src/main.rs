use anyhow::{Context, Result};
use clap::Parser;
use dbgwin_config::ThreadInfoConfig;
use dbgwin_engine::{Runner, Session, ThreadInfoSession, open_source};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints per-core thread load and stack usage from the telemetry2 slot.
#[derive(Parser, Debug)]
#[command(name = "thread-info", version)]
struct Args {
    /// TOML config file; the flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Telemetry2 polling interval in seconds [default: 1]
    #[arg(short = 't', long)]
    update_interval: Option<f64>,

    /// File to read the slot from [default: /sys/kernel/debug/sof/telemetry2]
    #[arg(short = 'f', long)]
    telemetry2_file: Option<PathBuf>,

    /// Access this debug window slot directly, no debugfs file needed
    #[arg(short = 'c', long)]
    direct_access_slot: Option<u32>,

    /// Memory-mappable debug window, e.g. a PCI resource file
    #[arg(short = 'w', long)]
    window: Option<PathBuf>,

    /// Byte offset of the debug window inside the window file
    #[arg(long)]
    window_offset: Option<u64>,
}

impl Args {
    fn apply(self, cfg: &mut ThreadInfoConfig) {
        if let Some(t) = self.update_interval {
            cfg.update_interval_secs = t;
        }
        if let Some(file) = self.telemetry2_file {
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
        Some(path) => ThreadInfoConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => ThreadInfoConfig::default(),
    };
    args.apply(&mut cfg);
    cfg.validate().context("invalid settings")?;

    init_tracing(&cfg.log_level);

    let interval = cfg.update_interval()?;
    let spec = cfg.source_spec();
    info!(?spec, ?interval, "thread-info starting");

    let session = ThreadInfoSession::new(std::io::stdout().lock());
    let slot_type = session.slot_type();
    let mut runner = Runner::new(session, interval, move || open_source(&spec, slot_type));
    runner.run().context("thread-info stopped")?;
    Ok(())
}
