use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use crate::config::{AutopilotConfig, RandomWalkConfig};
use crate::control::CancelToken;
use crate::kinematics::{autopilot_step, random_walk_step};
use crate::presenter::LinkEvent;
use crate::types::{AgentState, Point, StateUpdate, UpdateSource};

fn tick_period(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok().filter(|d| !d.is_zero())
}

/// Fixed-step autopilot loop. Reads the latest target at the start of each
/// step and reports every new state until cancelled.
pub async fn autopilot_loop(
    cfg: AutopilotConfig,
    target: watch::Receiver<Point>,
    cancel: CancelToken,
    tx: UnboundedSender<LinkEvent>,
) {
    let Some(period) = tick_period(cfg.dt) else {
        log::error!("Autopilot not started: invalid dt {}", cfg.dt);
        let _ = tx.send(LinkEvent::SimulationStopped(UpdateSource::Autopilot));
        return;
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = AgentState::new(0.0, 0.0, cfg.initial_speed, 0.0);
    let mut steps = 0u64;
    log::info!("Autopilot started (dt={}s)", cfg.dt);

    loop {
        ticker.tick().await;
        if cancel.is_cancelled() {
            break;
        }

        let goal = *target.borrow();
        state = autopilot_step(&state, goal, &cfg, cfg.dt);
        steps += 1;

        let update = StateUpdate::from_agent(UpdateSource::Autopilot, &state);
        if tx.send(LinkEvent::State(update)).is_err() {
            log::warn!("[autopilot] Presenter gone after {} steps", steps);
            return;
        }
        if steps % 500 == 0 {
            log::debug!("[autopilot] {} steps", steps);
        }
    }

    log::info!("Autopilot stopped after {} steps", steps);
    let _ = tx.send(LinkEvent::SimulationStopped(UpdateSource::Autopilot));
}

/// Random walk without a target. Stops when cancelled or once the configured
/// duration has elapsed.
pub async fn random_walk_loop<R: Rng + Send>(
    cfg: RandomWalkConfig,
    mut rng: R,
    cancel: CancelToken,
    tx: UnboundedSender<LinkEvent>,
) {
    let Some(period) = tick_period(cfg.step_secs) else {
        log::error!("Random walk not started: invalid step {}", cfg.step_secs);
        let _ = tx.send(LinkEvent::SimulationStopped(UpdateSource::RandomWalk));
        return;
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // A deadline past what Instant can hold means no deadline
    let deadline = cfg
        .duration_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .and_then(|d| Instant::now().checked_add(d));
    let mut state = AgentState::new(0.0, 0.0, cfg.initial_speed, 0.0);
    let mut steps = 0u64;
    log::info!("Random walk started (step={}s)", cfg.step_secs);

    loop {
        ticker.tick().await;
        if cancel.is_cancelled() {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("Random walk duration reached");
            break;
        }

        state = random_walk_step(&state, &cfg, &mut rng);
        steps += 1;

        let update = StateUpdate::from_agent(UpdateSource::RandomWalk, &state);
        if tx.send(LinkEvent::State(update)).is_err() {
            log::warn!("[random walk] Presenter gone after {} steps", steps);
            return;
        }
    }

    log::info!("Random walk stopped after {} steps", steps);
    let _ = tx.send(LinkEvent::SimulationStopped(UpdateSource::RandomWalk));
}
