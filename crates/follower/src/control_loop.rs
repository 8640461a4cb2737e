use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use common::config::{DetectionConfig, FollowerConfig, TuningConfig};
use common::dashboard::DashboardData;
use common::metrics::{FrameRecord, FrameRecorder};
use common::pid::PidError;
use common::policy::DriveMode;
use common::{
    ActuationPolicy, Detection, FrameGeometry, GainHandle, MotorCommand, SharedDiagnostics,
    SteeringController, Target, UiEvent,
};

use crate::channel::{ChannelError, CommandSink};
use crate::collaborators::{Detector, Display, VideoSource};

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("command channel failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("invalid steering configuration: {0}")]
    Steering(#[from] PidError),
    #[error("control loop already shut down")]
    AlreadyShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingStream,
    Running,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The video source closed.
    StreamEnded,
    /// The operator asked to quit through the display.
    QuitRequested,
    /// The shutdown flag was raised from outside, e.g. by an interrupt.
    Interrupted,
}

/// Cancellation request checked once per frame boundary.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Display that shows nothing and never raises events.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

impl Display for Headless {
    fn present(&mut self, _data: &DashboardData) -> Vec<UiEvent> {
        Vec::new()
    }
}

type Clock = Box<dyn FnMut() -> Instant + Send>;

/// Per-frame driver: detection in, one motor command out.
pub struct ControlLoop<V, D, S, U>
where
    V: VideoSource,
    D: Detector<V::Frame>,
    S: CommandSink,
    U: Display,
{
    source: V,
    detector: D,
    sink: S,
    display: U,

    steering: SteeringController,
    policy: ActuationPolicy,
    detection: DetectionConfig,
    tuning: TuningConfig,
    reset_on_reacquire: bool,

    state: LoopState,
    geometry: Option<FrameGeometry>,
    frame_id: u64,
    target_present: bool,

    shutdown: ShutdownFlag,
    diagnostics: Arc<SharedDiagnostics>,
    recorder: Option<FrameRecorder>,
    clock: Clock,
}

enum FrameOutcome {
    Continue,
    Quit,
}

impl<V, D, S, U> ControlLoop<V, D, S, U>
where
    V: VideoSource,
    D: Detector<V::Frame>,
    S: CommandSink,
    U: Display,
{
    pub fn new(source: V, detector: D, sink: S, display: U, config: &FollowerConfig) -> Result<Self, LoopError> {
        Ok(Self {
            source,
            detector,
            sink,
            display,
            steering: SteeringController::from_config(&config.steering)?,
            policy: ActuationPolicy::from_config(&config.policy),
            detection: config.detection.clone(),
            tuning: config.tuning.clone(),
            reset_on_reacquire: config.steering.reset_integral_on_reacquire,
            state: LoopState::AwaitingStream,
            geometry: None,
            frame_id: 0,
            target_present: false,
            shutdown: ShutdownFlag::new(),
            diagnostics: Arc::new(SharedDiagnostics::default()),
            recorder: None,
            clock: Box::new(Instant::now),
        })
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<SharedDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_recorder(mut self, recorder: FrameRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Replaces the monotonic clock feeding the steering controller.
    pub fn with_clock(mut self, clock: impl FnMut() -> Instant + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn gain_handle(&self) -> GainHandle {
        self.steering.gain_handle()
    }

    pub fn steering(&self) -> &SteeringController {
        &self.steering
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_id
    }

    pub fn diagnostics(&self) -> &Arc<SharedDiagnostics> {
        &self.diagnostics
    }

    /// Drives frames until the stream ends, the operator quits or shutdown is
    /// requested, then runs the shutdown sequence. The sequence also runs when
    /// a send fails, before the error is returned.
    pub fn run(&mut self) -> Result<ExitReason, LoopError> {
        if self.state == LoopState::ShuttingDown {
            return Err(LoopError::AlreadyShutDown);
        }
        let result = self.drive();
        if let Err(e) = &result {
            error!("control loop stopped: {}", e);
        }
        self.finish();
        result
    }

    fn drive(&mut self) -> Result<ExitReason, LoopError> {
        loop {
            if self.shutdown.is_requested() {
                info!("shutdown requested after {} frames", self.frame_id);
                return Ok(ExitReason::Interrupted);
            }
            if !self.source.is_open() {
                info!("video stream closed after {} frames", self.frame_id);
                return Ok(ExitReason::StreamEnded);
            }
            if self.state == LoopState::AwaitingStream {
                self.state = LoopState::Running;
                info!("video stream open, entering control loop");
            }
            if self.geometry.is_none() {
                self.init_geometry();
            }
            if let FrameOutcome::Quit = self.process_frame()? {
                info!("quit requested after {} frames", self.frame_id);
                return Ok(ExitReason::QuitRequested);
            }
        }
    }

    /// Fixes the setpoint from the stream geometry. Runs once; until it
    /// succeeds steering stays neutral and targets cannot be located.
    fn init_geometry(&mut self) {
        match self.source.geometry().filter(FrameGeometry::is_valid) {
            Some(geometry) => {
                let center = geometry.center_x();
                self.steering.initialize_setpoint(center as f64);
                self.policy.set_center(center);
                self.geometry = Some(geometry);
                info!("frame geometry {}x{}, setpoint x={}", geometry.width, geometry.height, center);
            }
            None => debug!("frame geometry not available yet"),
        }
    }

    fn process_frame(&mut self) -> Result<FrameOutcome, LoopError> {
        let Some(frame) = self.source.read_frame() else {
            self.diagnostics.record_skip();
            debug!("frame read failed, skipping");
            return Ok(FrameOutcome::Continue);
        };

        let control_start = Instant::now();
        let detections = self.detector.detect(&frame);
        let target = self.select_target(&detections);
        let (correction, mode, command) = self.control(target);
        let control_ns = control_start.elapsed().as_nanos() as u64;

        let send_start = Instant::now();
        self.sink.send(&command)?;
        let send_ns = send_start.elapsed().as_nanos() as u64;

        self.diagnostics.record_frame();
        self.diagnostics.record_send();
        debug!(
            frame = self.frame_id,
            target_cx = target.map(|t| t.cx),
            correction,
            ?mode,
            pwm_left = command.left,
            pwm_right = command.right,
            "frame processed"
        );

        if let Some(recorder) = &self.recorder {
            recorder.record(FrameRecord {
                frame_id: self.frame_id,
                target_present: target.is_some(),
                target_cx: target.map(|t| t.cx),
                correction,
                mode,
                pwm_left: command.left,
                pwm_right: command.right,
                control_ns,
                send_ns,
            });
        }

        let data = DashboardData {
            frame_id: self.frame_id,
            gains: self.steering.gains(),
            target,
            correction,
            mode,
            command,
        };
        self.frame_id += 1;

        let mut outcome = FrameOutcome::Continue;
        for event in self.display.present(&data) {
            match event {
                UiEvent::Slider { term, raw } => self.apply_slider(term, raw),
                UiEvent::Quit => outcome = FrameOutcome::Quit,
            }
        }
        Ok(outcome)
    }

    /// First detection of the target class in the detector's order.
    fn select_target(&self, detections: &[Detection]) -> Option<Target> {
        let geometry = self.geometry?;
        detections
            .iter()
            .find(|d| d.class == self.detection.target_class && d.confidence >= self.detection.min_confidence)
            .map(|d| {
                let (cx, cy) = d.pixel_center(geometry);
                Target {
                    cx,
                    cy,
                    confidence: d.confidence,
                }
            })
    }

    fn control(&mut self, target: Option<Target>) -> (f64, DriveMode, MotorCommand) {
        match target {
            Some(target) => {
                if !self.target_present {
                    self.target_present = true;
                    self.diagnostics.record_acquired();
                    if self.reset_on_reacquire {
                        self.steering.reset();
                    }
                    debug!("target acquired at x={}", target.cx);
                }
                let now = (self.clock)();
                let correction = self.steering.step(target.cx as f64, now);
                let (mode, command) = self.policy.evaluate(true, target.cx, correction);
                (correction, mode, command)
            }
            None => {
                if self.target_present {
                    self.target_present = false;
                    self.diagnostics.record_lost();
                    debug!("target lost");
                }
                let (mode, command) = self.policy.evaluate(false, 0, 0.0);
                (0.0, mode, command)
            }
        }
    }

    fn apply_slider(&mut self, term: common::GainTerm, raw: u32) {
        let value = self.tuning.gain_for(term, raw);
        match self.steering.gain_handle().set(term, value) {
            Ok(applied) => info!("{:?} set to {}", term, applied),
            Err(e) => warn!("ignoring {:?} slider value {}: {}", term, raw, e),
        }
    }

    /// Final stop, then release every collaborator. Only the first call acts.
    fn finish(&mut self) {
        if self.state == LoopState::ShuttingDown {
            return;
        }
        self.state = LoopState::ShuttingDown;
        self.sink.close();
        self.source.release();
        self.display.close();
        let diag = self.diagnostics.snapshot();
        info!(
            "shutdown complete: {} frames, {} skipped, {} commands",
            diag.frames_processed, diag.frames_skipped, diag.commands_sent
        );
    }
}

impl<V, D, S, U> Drop for ControlLoop<V, D, S, U>
where
    V: VideoSource,
    D: Detector<V::Frame>,
    S: CommandSink,
    U: Display,
{
    fn drop(&mut self) {
        self.finish();
    }
}
