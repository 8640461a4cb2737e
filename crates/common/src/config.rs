use serde::Deserialize;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::GainTerm;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FollowerConfig {
    pub actuator: ActuatorConfig,
    pub steering: SteeringConfig,
    pub policy: PolicyConfig,
    pub detection: DetectionConfig,
    pub tuning: TuningConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActuatorConfig {
    pub address: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// 0 leaves sends unbounded.
    pub send_timeout_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            address: "192.168.4.1".to_string(),
            port: 80,
            connect_timeout_ms: 3000,
            send_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SteeringConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub integral_limit: Option<f64>,
    /// Clear the integral when a target reappears after being lost.
    /// Off keeps the accumulator frozen across the gap.
    pub reset_integral_on_reacquire: bool,
    pub gain_precision: u32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            output_min: -250.0,
            output_max: 250.0,
            integral_limit: None,
            reset_integral_on_reacquire: false,
            gain_precision: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolicyConfig {
    pub dead_zone_px: i32,
    pub threshold: i32,
    pub forward_power: i32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            dead_zone_px: 50,
            threshold: 150,
            forward_power: 255,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    pub target_class: u32,
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_class: 0,
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TuningConfig {
    pub kp_scale: f64,
    pub ki_scale: f64,
    pub kd_scale: f64,
    pub slider_max: u32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            kp_scale: 0.1,
            ki_scale: 0.01,
            kd_scale: 0.1,
            slider_max: 100,
        }
    }
}

impl TuningConfig {
    /// Maps a raw slider position to a gain value. Rounding happens when the
    /// gain is stored.
    pub fn gain_for(&self, term: GainTerm, raw: u32) -> f64 {
        let raw = raw.min(self.slider_max) as f64;
        match term {
            GainTerm::Kp => raw * self.kp_scale,
            GainTerm::Ki => raw * self.ki_scale,
            GainTerm::Kd => raw * self.kd_scale,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub metrics_csv: Option<String>,
    pub dashboard_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            metrics_csv: None,
            dashboard_capacity: 300,
        }
    }
}

impl FollowerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FollowerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.steering;
        if !(s.output_min < s.output_max) {
            return Err(ConfigError::Invalid(format!(
                "steering.output_min ({}) must be below steering.output_max ({})",
                s.output_min, s.output_max
            )));
        }
        if !(s.kp.is_finite() && s.ki.is_finite() && s.kd.is_finite()) {
            return Err(ConfigError::Invalid("steering gains must be finite".into()));
        }
        if matches!(s.integral_limit, Some(limit) if !(limit >= 0.0)) {
            return Err(ConfigError::Invalid("steering.integral_limit must be non-negative".into()));
        }
        if self.policy.dead_zone_px < 0 || self.policy.threshold < 0 {
            return Err(ConfigError::Invalid(
                "policy.dead_zone_px and policy.threshold must be non-negative".into(),
            ));
        }
        if self.actuator.port == 0 {
            return Err(ConfigError::Invalid("actuator.port must be non-zero".into()));
        }
        if self.actuator.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("actuator.connect_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn actuator_addr(&self) -> String {
        format!("{}:{}", self.actuator.address, self.actuator.port)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<FollowerConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    FollowerConfig::from_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = FollowerConfig::from_toml("").unwrap();
        assert_eq!(config.policy.dead_zone_px, 50);
        assert_eq!(config.policy.threshold, 150);
        assert_eq!(config.steering.output_max, 250.0);
        assert!(!config.steering.reset_integral_on_reacquire);
        assert_eq!(config.actuator_addr(), "192.168.4.1:80");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = FollowerConfig::from_toml(
            r#"
            [actuator]
            address = "10.0.0.7"

            [steering]
            kp = 0.5
            reset_integral_on_reacquire = true
            "#,
        )
        .unwrap();
        assert_eq!(config.actuator.address, "10.0.0.7");
        assert_eq!(config.actuator.port, 80);
        assert_eq!(config.steering.kp, 0.5);
        assert_eq!(config.steering.output_min, -250.0);
        assert!(config.steering.reset_integral_on_reacquire);
    }

    #[test]
    fn rejects_inverted_output_limits() {
        let err = FollowerConfig::from_toml("[steering]\noutput_min = 10.0\noutput_max = -10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_connect_timeout() {
        let err = FollowerConfig::from_toml("[actuator]\nconnect_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("connect_timeout_ms")));
    }

    #[test]
    fn rejects_unparseable_toml() {
        assert!(matches!(
            FollowerConfig::from_toml("[policy\nthreshold = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn slider_mapping_matches_scales() {
        let tuning = TuningConfig::default();
        assert_eq!(tuning.gain_for(GainTerm::Kp, 50), 5.0);
        assert_eq!(tuning.gain_for(GainTerm::Ki, 10), 0.1);
        assert_eq!(tuning.gain_for(GainTerm::Kd, 100), 10.0);
        assert_eq!(tuning.gain_for(GainTerm::Kp, 500), 10.0);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nthreshold = 120").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.policy.threshold, 120);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            load_config("/nonexistent/follower.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
