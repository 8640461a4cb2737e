use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use common::wire::decode_command;
use common::MotorCommand;

/// Wheel response of the simulated robot: anything below `stall` in
/// magnitude does not turn the wheel, anything above `max` saturates.
#[derive(Debug, Clone, Copy)]
pub struct MotorModel {
    pub stall: i32,
    pub max: i32,
}

impl Default for MotorModel {
    fn default() -> Self {
        Self { stall: 150, max: 1023 }
    }
}

impl MotorModel {
    pub fn effective(&self, pwm: i32) -> i32 {
        if pwm.abs() < self.stall {
            0
        } else {
            pwm.clamp(-self.max, self.max)
        }
    }
}

/// Everything the simulated controller has received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    commands: Vec<MotorCommand>,
    malformed: usize,
    connections: usize,
}

impl CommandLog {
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.inner.lock().map(|l| l.commands.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<MotorCommand> {
        self.inner.lock().ok().and_then(|l| l.commands.last().copied())
    }

    pub fn malformed(&self) -> usize {
        self.inner.lock().map(|l| l.malformed).unwrap_or(0)
    }

    pub fn connections(&self) -> usize {
        self.inner.lock().map(|l| l.connections).unwrap_or(0)
    }

    fn push(&self, command: MotorCommand) {
        if let Ok(mut log) = self.inner.lock() {
            log.commands.push(command);
        }
    }

    fn reject(&self) {
        if let Ok(mut log) = self.inner.lock() {
            log.malformed += 1;
        }
    }

    fn connected(&self) {
        if let Ok(mut log) = self.inner.lock() {
            log.connections += 1;
        }
    }
}

/// Stand-in for the microcontroller on the robot: accepts one connection at a
/// time and decodes line-delimited motor commands.
pub struct SimulatedActuator {
    listener: TcpListener,
    model: MotorModel,
    log: CommandLog,
}

impl SimulatedActuator {
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            model: MotorModel::default(),
            log: CommandLog::default(),
        })
    }

    pub fn with_model(mut self, model: MotorModel) -> Self {
        self.model = model;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Serves connections until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        info!("simulated actuator listening on {}", self.listener.local_addr()?);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let (stream, peer) = accepted?;
            self.log.connected();
            info!("controller connected from {}", peer);
            serve_connection(stream, &self.log, self.model, &mut shutdown).await;
            info!("controller {} disconnected", peer);
        }
        info!("simulated actuator stopped, {} commands received", self.log.commands().len());
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    log: &CommandLog,
    model: MotorModel,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.changed() => return,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match decode_command(&line) {
                Ok(cmd) => {
                    log.push(cmd);
                    debug!(
                        "recv pwmL={} pwmR={} -> wheels L={} R={}",
                        cmd.left,
                        cmd.right,
                        model.effective(cmd.left),
                        model.effective(cmd.right)
                    );
                }
                Err(e) => {
                    log.reject();
                    warn!("malformed command {:?}: {}", line, e);
                }
            },
            Ok(None) => return,
            Err(e) => {
                warn!("read error: {}", e);
                return;
            }
        }
    }
}
