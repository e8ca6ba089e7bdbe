//! Drone kinematics: the target-seeking autopilot step and the random walk.
//!
//! Both steppers are pure: they take the current state by reference and
//! return the next one.

use rand::Rng;

use crate::config::{AutopilotConfig, RandomWalkConfig};
use crate::types::{AgentState, Point};

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Shortest signed turn from `from` to `to`, in (-180, 180].
pub fn heading_error(to: f64, from: f64) -> f64 {
    let diff = (to - from) % 360.0;
    if diff > 180.0 {
        diff - 360.0
    } else if diff <= -180.0 {
        diff + 360.0
    } else {
        diff
    }
}

/// Bearing from `from` to `to` in degrees, [0, 360). 0 points along +x,
/// 90 along +y. Coincident points give 0.
pub fn bearing_deg(from: Point, to: Point) -> f64 {
    normalize_deg((to.y - from.y).atan2(to.x - from.x).to_degrees())
}

/// One autopilot step of length `dt` toward `target`.
///
/// Heading follows a proportional controller; the drone speeds up while
/// aligned within the threshold and slows down otherwise. Position is
/// integrated with the already-updated heading and speed.
pub fn autopilot_step(
    state: &AgentState,
    target: Point,
    cfg: &AutopilotConfig,
    dt: f64,
) -> AgentState {
    let desired = bearing_deg(state.position(), target);
    let error = heading_error(desired, state.orientation);

    let orientation = normalize_deg(state.orientation + error * cfg.turn_response * dt);

    let mut acceleration = if error.abs() < cfg.aligned_threshold_deg {
        state.acceleration + cfg.accel_gain * dt
    } else {
        state.acceleration - cfg.decel_gain * dt
    };
    acceleration = acceleration.clamp(-cfg.decel_gain, cfg.accel_gain);

    let speed = (state.speed + acceleration * dt).clamp(0.0, cfg.max_speed);

    let rad = orientation.to_radians();
    AgentState {
        x: state.x + rad.cos() * speed * dt,
        y: state.y + rad.sin() * speed * dt,
        speed,
        orientation,
        acceleration,
    }
}

/// One random-walk step: move `speed` units along the current heading, then
/// perturb the heading by a whole number of degrees in
/// [-max_turn_deg, max_turn_deg].
pub fn random_walk_step<R: Rng + ?Sized>(
    state: &AgentState,
    cfg: &RandomWalkConfig,
    rng: &mut R,
) -> AgentState {
    let rad = state.orientation.to_radians();
    let turn = rng.random_range(-cfg.max_turn_deg..=cfg.max_turn_deg);

    AgentState {
        x: state.x + state.speed * rad.cos(),
        y: state.y + state.speed * rad.sin(),
        speed: state.speed,
        orientation: normalize_deg(state.orientation + f64::from(turn)),
        acceleration: 0.0,
    }
}
