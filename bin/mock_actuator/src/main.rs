use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use actuator_sim::{MotorModel, SimulatedActuator};

/// Simulated robot motor controller: prints every command it receives.
#[derive(Parser)]
#[command(name = "mock_actuator", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Commands weaker than this do not turn the simulated wheels.
    #[arg(long, default_value_t = 150)]
    stall: i32,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let actuator = SimulatedActuator::bind(&args.listen)
        .await?
        .with_model(MotorModel {
            stall: args.stall,
            ..MotorModel::default()
        });
    let log = actuator.log();

    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(actuator.run(stop_rx));

    tokio::signal::ctrl_c().await?;
    let _ = stop_tx.send(true);
    server.await.map_err(std::io::Error::other)??;

    let commands = log.commands();
    let stops = commands.iter().filter(|c| c.is_stop()).count();
    info!(
        "received {} commands ({} stops, {} malformed) over {} connections",
        commands.len(),
        stops,
        log.malformed(),
        log.connections()
    );
    Ok(())
}
