use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LinkError, LinkResult};

/// Bytes kept free at the end of the frame buffer. A line is flushed once
/// the buffer holds `capacity - FRAME_SAFETY_MARGIN` bytes.
pub const FRAME_SAFETY_MARGIN: usize = 2;

/// Proportional heading-seek autopilot constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Step length in seconds; also the tick period of the loop
    pub dt: f64,
    /// Fraction of the heading error corrected per second
    pub turn_response: f64,
    pub accel_gain: f64,
    pub decel_gain: f64,
    pub max_speed: f64,
    /// Heading error (deg) under which the drone counts as aligned
    pub aligned_threshold_deg: f64,
    pub initial_speed: f64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,
            turn_response: 5.0,
            accel_gain: 20.0,
            decel_gain: 15.0,
            max_speed: 300.0,
            aligned_threshold_deg: 5.0,
            initial_speed: 50.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWalkConfig {
    pub step_secs: f64,
    /// Largest heading perturbation per step, in whole degrees
    pub max_turn_deg: i32,
    /// Distance covered per step
    pub initial_speed: f64,
    /// Stop by itself after this many seconds (None = until cancelled)
    pub duration_secs: Option<f64>,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            step_secs: 0.1,
            max_turn_deg: 3,
            initial_speed: 2.0,
            duration_secs: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Upper bound on how long a read blocks before the cancel flag is checked
    pub read_timeout_ms: u64,
    pub frame_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.232".to_string(),
            port: 5000,
            connect_timeout_ms: 3000,
            read_timeout_ms: 100,
            frame_capacity: 256,
        }
    }
}

impl TelemetryConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration, loadable from a JSON file. Missing fields fall
/// back to their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub autopilot: AutopilotConfig,
    pub random_walk: RandomWalkConfig,
    pub telemetry: TelemetryConfig,
}

impl LinkConfig {
    pub fn load(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("{}: {}", path.display(), e)))?;
        let config: LinkConfig = serde_json::from_str(&text)
            .map_err(|e| LinkError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LinkResult<()> {
        let ap = &self.autopilot;
        period("autopilot.dt", ap.dt)?;
        positive("autopilot.turn_response", ap.turn_response)?;
        positive("autopilot.accel_gain", ap.accel_gain)?;
        positive("autopilot.decel_gain", ap.decel_gain)?;
        positive("autopilot.max_speed", ap.max_speed)?;
        positive("autopilot.aligned_threshold_deg", ap.aligned_threshold_deg)?;
        // Heading must converge, not overshoot past the target each step
        if ap.turn_response * ap.dt > 1.0 {
            return Err(LinkError::Config(format!(
                "autopilot.turn_response * dt must be <= 1 (got {})",
                ap.turn_response * ap.dt
            )));
        }
        if !(0.0..=ap.max_speed).contains(&ap.initial_speed) {
            return Err(LinkError::Config(format!(
                "autopilot.initial_speed must be within [0, {}]",
                ap.max_speed
            )));
        }

        let rw = &self.random_walk;
        period("random_walk.step_secs", rw.step_secs)?;
        if rw.max_turn_deg < 0 {
            return Err(LinkError::Config(
                "random_walk.max_turn_deg must not be negative".to_string(),
            ));
        }
        if !rw.initial_speed.is_finite() || rw.initial_speed < 0.0 {
            return Err(LinkError::Config(
                "random_walk.initial_speed must not be negative".to_string(),
            ));
        }
        if let Some(d) = rw.duration_secs {
            period("random_walk.duration_secs", d)?;
        }

        let tm = &self.telemetry;
        if tm.frame_capacity <= FRAME_SAFETY_MARGIN {
            return Err(LinkError::Config(format!(
                "telemetry.frame_capacity must exceed {}",
                FRAME_SAFETY_MARGIN
            )));
        }
        if tm.read_timeout_ms == 0 || tm.connect_timeout_ms == 0 {
            return Err(LinkError::Config(
                "telemetry timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> LinkResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LinkError::Config(format!("{} must be positive (got {})", name, value)))
    }
}

/// A positive number of seconds that fits in a non-zero [`Duration`].
fn period(name: &str, secs: f64) -> LinkResult<Duration> {
    positive(name, secs)?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(LinkError::Config(format!(
            "{} is not a usable duration (got {})",
            name, secs
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.address(), "192.168.1.232:5000");
        assert_eq!(config.autopilot.max_speed, 300.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "telemetry": { "host": "127.0.0.1", "port": 6000 } }"#;
        let config: LinkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.telemetry.address(), "127.0.0.1:6000");
        assert_eq!(config.telemetry.frame_capacity, 256);
        assert_eq!(config.autopilot, AutopilotConfig::default());
    }

    #[test]
    fn test_rejects_tiny_frame() {
        let mut config = LinkConfig::default();
        config.telemetry.frame_capacity = 2;
        assert!(matches!(config.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn test_rejects_overshooting_turn() {
        let mut config = LinkConfig::default();
        config.autopilot.turn_response = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_periods() {
        let mut config = LinkConfig::default();
        config.random_walk.duration_secs = Some(1e20);
        assert!(matches!(config.validate(), Err(LinkError::Config(_))));

        let mut config = LinkConfig::default();
        config.random_walk.step_secs = f64::MAX;
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.autopilot.dt = 1e-12;
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.random_walk.duration_secs = Some(3600.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = LinkConfig::load("/nonexistent/drone_link.json").unwrap_err();
        assert!(err.to_string().contains("drone_link.json"));
    }
}
