use serde::{Deserialize, Serialize};

/// Planar coordinate. Used for the drone position and the autopilot target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Parse `"x,y"` as typed on the command line or stdin.
    pub fn parse(text: &str) -> Option<Self> {
        let (x, y) = text.trim().split_once(',')?;
        let x: f64 = x.trim().parse().ok()?;
        let y: f64 = y.trim().parse().ok()?;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Self { x, y })
    }
}

/// Kinematic state of the drone.
///
/// Steppers never mutate a state in place; each step returns a new value
/// that replaces the previous one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub x: f64,
    pub y: f64,
    /// Non-negative, bounded by the configured max speed
    pub speed: f64,
    /// Degrees in [0, 360)
    pub orientation: f64,
    /// Only meaningful for the autopilot; stays 0 for the random walk
    pub acceleration: f64,
}

impl AgentState {
    pub fn new(x: f64, y: f64, speed: f64, orientation: f64) -> Self {
        Self {
            x,
            y,
            speed,
            orientation,
            acceleration: 0.0,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One decoded telemetry line: `x,y,speed,orientation`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub orientation: f64,
}

impl TelemetryRecord {
    /// Format as one newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{},{},{},{}\n", self.x, self.y, self.speed, self.orientation)
    }
}

impl From<&AgentState> for TelemetryRecord {
    fn from(state: &AgentState) -> Self {
        Self {
            x: state.x,
            y: state.y,
            speed: state.speed,
            orientation: state.orientation,
        }
    }
}

/// Where a state update came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Autopilot,
    RandomWalk,
    Telemetry,
}

/// What the observer receives for every step or decoded record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub source: UpdateSource,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub orientation: f64,
    /// `None` for telemetry and the random walk
    pub acceleration: Option<f64>,
}

impl StateUpdate {
    pub fn from_agent(source: UpdateSource, state: &AgentState) -> Self {
        let acceleration = match source {
            UpdateSource::Autopilot => Some(state.acceleration),
            UpdateSource::RandomWalk | UpdateSource::Telemetry => None,
        };
        Self {
            source,
            x: state.x,
            y: state.y,
            speed: state.speed,
            orientation: state.orientation,
            acceleration,
        }
    }

    pub fn from_record(record: &TelemetryRecord) -> Self {
        Self {
            source: UpdateSource::Telemetry,
            x: record.x,
            y: record.y,
            speed: record.speed,
            orientation: record.orientation,
            acceleration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_parse() {
        assert_eq!(Point::parse(" 12.5, -3 "), Some(Point::new(12.5, -3.0)));
        assert_eq!(Point::parse("12.5"), None);
        assert_eq!(Point::parse("a,b"), None);
        assert_eq!(Point::parse("inf,0"), None);
    }

    #[test]
    fn test_record_line_format() {
        let record = TelemetryRecord {
            x: 1.5,
            y: -2.0,
            speed: 10.0,
            orientation: 90.25,
        };
        assert_eq!(record.to_line(), "1.5,-2,10,90.25\n");
    }

    #[test]
    fn test_acceleration_only_for_autopilot() {
        let mut state = AgentState::new(1.0, 2.0, 3.0, 4.0);
        state.acceleration = 0.4;

        let auto = StateUpdate::from_agent(UpdateSource::Autopilot, &state);
        assert_eq!(auto.acceleration, Some(0.4));

        let walk = StateUpdate::from_agent(UpdateSource::RandomWalk, &state);
        assert_eq!(walk.acceleration, None);
    }
}
