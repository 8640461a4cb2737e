use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::MotorCommand;

/// Which branch of the policy produced a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveMode {
    /// No target: brake.
    Stop,
    /// Target inside the dead zone: full power on both wheels.
    Forward,
    /// Target off-center: spin toward it.
    Turn,
}

/// Turns a steering correction into wheel power.
#[derive(Debug, Clone)]
pub struct ActuationPolicy {
    center: Option<i32>,
    dead_zone_px: i32,
    threshold: i32,
    forward_power: i32,
}

impl ActuationPolicy {
    pub fn new(dead_zone_px: i32, threshold: i32, forward_power: i32) -> Self {
        Self {
            center: None,
            dead_zone_px,
            threshold,
            forward_power,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.dead_zone_px, config.threshold, config.forward_power)
    }

    pub fn with_center(mut self, center: i32) -> Self {
        self.center = Some(center);
        self
    }

    pub fn set_center(&mut self, center: i32) {
        self.center = Some(center);
    }

    pub fn center(&self) -> Option<i32> {
        self.center
    }

    pub fn compute(&self, target_present: bool, target_cx: i32, correction: f64) -> MotorCommand {
        self.evaluate(target_present, target_cx, correction).1
    }

    pub fn evaluate(&self, target_present: bool, target_cx: i32, correction: f64) -> (DriveMode, MotorCommand) {
        // Without a known center there is nothing to steer toward.
        let Some(center) = self.center.filter(|_| target_present) else {
            return (DriveMode::Stop, MotorCommand::STOP);
        };

        if (target_cx - center).abs() < self.dead_zone_px {
            let power = self.forward_power;
            return (DriveMode::Forward, MotorCommand::new(power, power));
        }

        let pwm = self.compensate(correction as i32);
        (DriveMode::Turn, MotorCommand::new(-pwm, pwm))
    }

    /// Pushes the correction past the motors' stall band. Zero counts as
    /// positive.
    fn compensate(&self, pwm: i32) -> i32 {
        if pwm >= 0 {
            pwm.saturating_add(self.threshold)
        } else {
            pwm.saturating_sub(self.threshold)
        }
    }
}

impl Default for ActuationPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ActuationPolicy {
        ActuationPolicy::default().with_center(320)
    }

    #[test]
    fn no_target_stops() {
        assert_eq!(policy().compute(false, 320, 120.0), MotorCommand::STOP);
        assert_eq!(policy().compute(false, 0, -250.0), MotorCommand::STOP);
    }

    // Threshold compensation is applied to turns only. A dead-zone frame
    // drives at forward power with no +/- threshold, whatever the correction.
    #[test]
    fn dead_zone_ignores_correction_and_threshold() {
        let p = policy();
        for cx in 271..370 {
            for correction in [-250.0, -3.0, 0.0, 42.0, 250.0] {
                assert_eq!(p.compute(true, cx, correction), MotorCommand::new(255, 255), "cx={cx}");
            }
        }
    }

    #[test]
    fn dead_zone_edges_are_exclusive() {
        let p = policy();
        assert_eq!(p.evaluate(true, 270, 10.0).0, DriveMode::Turn);
        assert_eq!(p.evaluate(true, 370, -10.0).0, DriveMode::Turn);
    }

    #[test]
    fn threshold_keeps_sign_and_adds_magnitude() {
        let p = policy();
        for c in [-250.0, -40.0, -1.0, 1.0, 40.0, 250.0] {
            let cmd = p.compute(true, 500, c);
            let applied = cmd.right;
            assert_eq!(applied.abs(), (c as i32).abs() + 150);
            assert_eq!(applied.signum(), (c as i32).signum());
            assert_eq!(cmd.left, -applied);
        }
    }

    #[test]
    fn zero_correction_takes_positive_branch() {
        assert_eq!(policy().compute(true, 0, 0.0), MotorCommand::new(-150, 150));
    }

    #[test]
    fn fractional_correction_truncates_toward_zero() {
        assert_eq!(policy().compute(true, 400, -40.9), MotorCommand::new(190, -190));
        assert_eq!(policy().compute(true, 100, 0.7), MotorCommand::new(-150, 150));
    }

    #[test]
    fn unknown_center_stops_even_with_target() {
        assert_eq!(ActuationPolicy::default().compute(true, 320, 80.0), MotorCommand::STOP);
    }
}
