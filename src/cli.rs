use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use clap::Parser;
use tracing::warn;

use common::{GainTerm, UiEvent};

#[derive(Parser, Debug)]
#[command(name = "person-follower")]
#[command(version, about = "Steer a two-wheel robot toward the person in view")]
pub struct Cli {
    /// TOML configuration; built-in defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Recorded detector output to drive the loop with (JSON lines).
    #[arg(short, long)]
    pub replay: PathBuf,

    /// Actuator controller address, overrides the config.
    #[arg(long)]
    pub address: Option<String>,

    /// Actuator controller port, overrides the config.
    #[arg(long)]
    pub port: Option<u16>,

    /// Pace replayed frames at this rate instead of as fast as possible.
    #[arg(long)]
    pub fps: Option<f64>,

    /// Write per-frame records to this CSV file on exit.
    #[arg(long)]
    pub metrics_csv: Option<PathBuf>,

    /// Do not read tuning commands from stdin.
    #[arg(long)]
    pub no_tuner: bool,
}

/// Parses one tuner line: `kp 50`, `ki 10`, `kd 5` or `q`.
pub fn parse_tuner_line(line: &str) -> Result<Option<UiEvent>, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    if matches!(head, "q" | "quit" | "exit") {
        return Ok(Some(UiEvent::Quit));
    }
    let term: GainTerm = head.parse()?;
    let raw = parts
        .next()
        .ok_or_else(|| format!("missing slider value for {}", head))?
        .parse::<u32>()
        .map_err(|e| format!("bad slider value: {}", e))?;
    Ok(Some(UiEvent::Slider { term, raw }))
}

/// Reads tuner commands from stdin until it closes.
pub fn spawn_stdin_tuner(events: Sender<UiEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_tuner_line(&line) {
                Ok(Some(event)) => {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("tuner: {}", e),
            }
        }
    })
}
