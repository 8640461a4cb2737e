use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::SteeringConfig;
use crate::{GainTerm, Gains};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PidError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Gains stored as f64 bit patterns so a tuning thread can write while the
/// control thread reads. Each gain is an independent scalar; a `snapshot`
/// may mix an old Kp with a new Ki if both change mid-read.
#[derive(Debug)]
struct AtomicGains {
    kp: AtomicU64,
    ki: AtomicU64,
    kd: AtomicU64,
    precision: u32,
}

/// Cloneable handle over a controller's gains.
#[derive(Debug, Clone)]
pub struct GainHandle {
    inner: Arc<AtomicGains>,
}

impl GainHandle {
    pub fn new(gains: Gains, precision: u32) -> Self {
        let handle = Self {
            inner: Arc::new(AtomicGains {
                kp: AtomicU64::new(0f64.to_bits()),
                ki: AtomicU64::new(0f64.to_bits()),
                kd: AtomicU64::new(0f64.to_bits()),
                precision,
            }),
        };
        handle.store(gains);
        handle
    }

    pub fn snapshot(&self) -> Gains {
        Gains {
            kp: f64::from_bits(self.inner.kp.load(Ordering::Acquire)),
            ki: f64::from_bits(self.inner.ki.load(Ordering::Acquire)),
            kd: f64::from_bits(self.inner.kd.load(Ordering::Acquire)),
        }
    }

    /// Sets one gain, rounded to the configured number of decimals.
    /// Non-finite values are rejected and leave the gain untouched.
    pub fn set(&self, term: GainTerm, value: f64) -> Result<f64, PidError> {
        if !value.is_finite() {
            return Err(PidError::InvalidParameter("gain must be a finite number"));
        }
        let rounded = round_to(value, self.inner.precision);
        let slot = match term {
            GainTerm::Kp => &self.inner.kp,
            GainTerm::Ki => &self.inner.ki,
            GainTerm::Kd => &self.inner.kd,
        };
        slot.store(rounded.to_bits(), Ordering::Release);
        Ok(rounded)
    }

    pub fn set_gains(&self, kp: f64, ki: f64, kd: f64) -> Result<(), PidError> {
        if !(kp.is_finite() && ki.is_finite() && kd.is_finite()) {
            return Err(PidError::InvalidParameter("gains must be finite numbers"));
        }
        self.store(Gains { kp, ki, kd });
        Ok(())
    }

    fn store(&self, gains: Gains) {
        let p = self.inner.precision;
        self.inner.kp.store(round_to(gains.kp, p).to_bits(), Ordering::Release);
        self.inner.ki.store(round_to(gains.ki, p).to_bits(), Ordering::Release);
        self.inner.kd.store(round_to(gains.kd, p).to_bits(), Ordering::Release);
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Full controller state, for inspection and display.
#[derive(Debug, Clone, PartialEq)]
pub struct PidState {
    pub gains: Gains,
    pub setpoint: Option<f64>,
    pub integral: f64,
    pub prev_error: Option<f64>,
    pub prev_time: Option<Instant>,
    pub output_min: f64,
    pub output_max: f64,
}

/// PID controller over the horizontal pixel position of the target.
///
/// `error = setpoint - measured`, so a target right of center yields a
/// negative correction.
#[derive(Debug)]
pub struct SteeringController {
    gains: GainHandle,
    setpoint: Option<f64>,
    integral: f64,
    integral_limit: Option<f64>,
    prev_error: Option<f64>,
    prev_time: Option<Instant>,
    last_output: f64,
    output_min: f64,
    output_max: f64,
}

impl SteeringController {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_handle(GainHandle::new(Gains { kp, ki, kd }, 3))
    }

    pub fn with_handle(gains: GainHandle) -> Self {
        Self {
            gains,
            setpoint: None,
            integral: 0.0,
            integral_limit: None,
            prev_error: None,
            prev_time: None,
            last_output: 0.0,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    pub fn from_config(config: &SteeringConfig) -> Result<Self, PidError> {
        let gains = Gains {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
        };
        if !(gains.kp.is_finite() && gains.ki.is_finite() && gains.kd.is_finite()) {
            return Err(PidError::InvalidParameter("gains must be finite numbers"));
        }
        let mut controller = Self::with_handle(GainHandle::new(gains, config.gain_precision));
        controller.set_output_limits(config.output_min, config.output_max)?;
        if let Some(limit) = config.integral_limit {
            if !(limit.is_finite() && limit >= 0.0) {
                return Err(PidError::InvalidParameter("integral limit must be finite and non-negative"));
            }
            controller.integral_limit = Some(limit);
        }
        Ok(controller)
    }

    pub fn gain_handle(&self) -> GainHandle {
        self.gains.clone()
    }

    pub fn gains(&self) -> Gains {
        self.gains.snapshot()
    }

    pub fn set_gains(&self, kp: f64, ki: f64, kd: f64) -> Result<(), PidError> {
        self.gains.set_gains(kp, ki, kd)
    }

    pub fn set_output_limits(&mut self, min: f64, max: f64) -> Result<(), PidError> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(PidError::InvalidParameter("output limits must satisfy min < max"));
        }
        self.output_min = min;
        self.output_max = max;
        self.last_output = self.last_output.clamp(min, max);
        Ok(())
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.output_min, self.output_max)
    }

    /// Fixes the setpoint. Only the first call has any effect; returns
    /// whether this call set it.
    pub fn initialize_setpoint(&mut self, setpoint: f64) -> bool {
        if self.setpoint.is_some() || !setpoint.is_finite() {
            return false;
        }
        self.setpoint = Some(setpoint);
        true
    }

    pub fn setpoint(&self) -> Option<f64> {
        self.setpoint
    }

    /// Runs one control step and returns the clamped correction.
    ///
    /// Returns 0 until the setpoint is known. When `now` equals the previous
    /// step's timestamp the previous output is returned and no state changes.
    pub fn step(&mut self, measured: f64, now: Instant) -> f64 {
        let Some(setpoint) = self.setpoint else {
            return 0.0;
        };
        let gains = self.gains.snapshot();
        let error = setpoint - measured;

        let derivative = match (self.prev_time, self.prev_error) {
            (Some(prev_time), Some(prev_error)) => {
                let dt = now.saturating_duration_since(prev_time).as_secs_f64();
                if dt <= 0.0 {
                    return self.last_output;
                }
                self.integral += error * dt;
                if let Some(limit) = self.integral_limit {
                    self.integral = self.integral.clamp(-limit, limit);
                }
                (error - prev_error) / dt
            }
            // First step after construction or reset: proportional plus
            // whatever integral is already held.
            _ => 0.0,
        };

        self.prev_error = Some(error);
        self.prev_time = Some(now);

        let output = (gains.kp * error) + (gains.ki * self.integral) + (gains.kd * derivative);
        self.last_output = output.clamp(self.output_min, self.output_max);
        self.last_output
    }

    /// Clears the integral and derivative history; gains, limits and the
    /// setpoint are kept.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.prev_time = None;
        self.last_output = 0.0;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn state(&self) -> PidState {
        PidState {
            gains: self.gains.snapshot(),
            setpoint: self.setpoint,
            integral: self.integral,
            prev_error: self.prev_error,
            prev_time: self.prev_time,
            output_min: self.output_min,
            output_max: self.output_max,
        }
    }
}
