use serde::{Deserialize, Serialize};

pub mod config;
pub mod dashboard;
pub mod diagnostics;
pub mod metrics;
pub mod pid;
pub mod policy;
pub mod wire;

pub use config::FollowerConfig;
pub use dashboard::DashboardBuffer;
pub use diagnostics::SharedDiagnostics;
pub use metrics::FrameRecorder;
pub use pid::{GainHandle, SteeringController};
pub use policy::ActuationPolicy;

/// One bounding box as reported by the detector, coordinates normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub class: u32,
    pub confidence: f64,
}

impl Detection {
    /// Denormalizes the box and returns its integer pixel center.
    ///
    /// Corners are truncated to whole pixels before averaging, so the center
    /// matches what the box overlay would draw.
    pub fn pixel_center(&self, geometry: FrameGeometry) -> (i32, i32) {
        let w = geometry.width as f64;
        let h = geometry.height as f64;
        let (x1, y1) = ((self.x1 * w) as i32, (self.y1 * h) as i32);
        let (x2, y2) = ((self.x2 * w) as i32, (self.y2 * h) as i32);
        // Widened so boxes far outside the frame cannot overflow the sum.
        let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
        (mid(x1, x2), mid(y1, y2))
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Horizontal center, rounded down.
    pub fn center_x(&self) -> i32 {
        (self.width / 2) as i32
    }
}

/// The target picked for one frame, already in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub cx: i32,
    pub cy: i32,
    pub confidence: f64,
}

/// Left/right wheel power sent to the actuator controller.
///
/// Field order matters: the wire record is `{"pwmR": .., "pwmL": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorCommand {
    #[serde(rename = "pwmR")]
    pub right: i32,
    #[serde(rename = "pwmL")]
    pub left: i32,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand { right: 0, left: 0 };

    pub fn new(left: i32, right: i32) -> Self {
        Self { right, left }
    }

    pub fn is_stop(&self) -> bool {
        *self == Self::STOP
    }
}

/// Snapshot of the three PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GainTerm {
    Kp,
    Ki,
    Kd,
}

impl std::str::FromStr for GainTerm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kp" | "p" => Ok(GainTerm::Kp),
            "ki" | "i" => Ok(GainTerm::Ki),
            "kd" | "d" => Ok(GainTerm::Kd),
            other => Err(format!("unknown gain term '{}'", other)),
        }
    }
}

/// Events emitted by the display/tuning collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// A tuning slider moved to `raw`.
    Slider { term: GainTerm, raw: u32 },
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_center_truncates_corners() {
        let det = Detection {
            x1: 0.5,
            y1: 0.0,
            x2: 0.75,
            y2: 1.0,
            class: 0,
            confidence: 0.9,
        };
        let (cx, cy) = det.pixel_center(FrameGeometry::new(640, 360));
        assert_eq!(cx, (320 + 480) / 2);
        assert_eq!(cy, 180);
    }

    #[test]
    fn pixel_center_survives_out_of_range_boxes() {
        let det = Detection {
            x1: 1e12,
            y1: -1e12,
            x2: 1e12,
            y2: -1e12,
            class: 0,
            confidence: 0.5,
        };
        let (cx, cy) = det.pixel_center(FrameGeometry::new(640, 360));
        assert_eq!(cx, i32::MAX);
        assert_eq!(cy, i32::MIN);
    }

    #[test]
    fn motor_command_serializes_right_first() {
        let json = serde_json::to_string(&MotorCommand::new(190, -190)).unwrap();
        assert_eq!(json, r#"{"pwmR":-190,"pwmL":190}"#);
    }

    #[test]
    fn gain_term_parses_short_names() {
        assert_eq!("KP".parse::<GainTerm>(), Ok(GainTerm::Kp));
        assert_eq!("i".parse::<GainTerm>(), Ok(GainTerm::Ki));
        assert!("kx".parse::<GainTerm>().is_err());
    }
}
