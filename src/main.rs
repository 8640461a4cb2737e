mod cli;

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::config::{load_config, FollowerConfig};
use common::dashboard::DashboardBuffer;
use common::metrics::FrameRecorder;
use follower::{CommandChannel, ControlLoop, DashboardDisplay, ExitReason, PassThroughDetector, ReplaySource};

use cli::Cli;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => FollowerConfig::default(),
    };
    if let Some(address) = &cli.address {
        config.actuator.address = address.clone();
    }
    if let Some(port) = cli.port {
        config.actuator.port = port;
    }
    config.validate()?;

    init_logging(&config.logging.level);
    info!("person-follower v{} starting", env!("CARGO_PKG_VERSION"));

    let mut source = ReplaySource::open(&cli.replay).with_context(|| format!("opening {}", cli.replay.display()))?;
    if let Some(fps) = cli.fps.filter(|f| *f > 0.0) {
        source = source.with_frame_interval(Duration::from_secs_f64(1.0 / fps));
    }

    let addr = config.actuator_addr();
    let send_timeout = Some(Duration::from_millis(config.actuator.send_timeout_ms));
    let channel = CommandChannel::connect(
        &addr,
        Duration::from_millis(config.actuator.connect_timeout_ms),
        send_timeout,
    )
    .map_err(|e| {
        error!("{}", e);
        e
    })?;

    let (events_tx, events_rx) = mpsc::channel();
    if !cli.no_tuner {
        cli::spawn_stdin_tuner(events_tx);
        info!("tuner ready: 'kp <0-100>', 'ki <0-100>', 'kd <0-100>', 'q' to quit");
    }
    let display = DashboardDisplay::new(DashboardBuffer::new(config.logging.dashboard_capacity)).with_events(events_rx);

    let recorder = FrameRecorder::new();
    let mut control = ControlLoop::new(source, PassThroughDetector, channel, display, &config)?
        .with_recorder(recorder.clone());

    let shutdown = control.shutdown_flag();
    actuator_sim::spawn_interrupt_watcher(move || shutdown.request());

    let outcome = tokio::task::spawn_blocking(move || control.run()).await?;

    let csv_path = cli
        .metrics_csv
        .clone()
        .or_else(|| config.logging.metrics_csv.clone().map(Into::into));
    if let Some(path) = csv_path {
        if let Err(e) = recorder.save_to_csv(&path) {
            error!("failed to write {}: {}", path.display(), e);
        }
    }

    match outcome? {
        ExitReason::StreamEnded => info!("video stream ended"),
        ExitReason::QuitRequested => info!("stopped by operator"),
        ExitReason::Interrupted => info!("stopped by interrupt"),
    }
    Ok(())
}
