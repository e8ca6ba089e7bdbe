//! Control surface: start/stop the simulation, connect/disconnect the
//! telemetry link, move the autopilot target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::presenter::LinkEvent;
use crate::simulator::{autopilot_loop, random_walk_loop};
use crate::telemetry::telemetry_session;
use crate::types::Point;

/// Cooperative stop flag, checked by a loop once per iteration.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sets the autopilot target from any thread. Latest value wins.
#[derive(Clone)]
pub struct TargetInput(Arc<watch::Sender<Point>>);

impl TargetInput {
    pub fn set(&self, target: Point) {
        self.0.send_replace(target);
    }
}

/// One background loop and the token that stops it. A stopped slot stays in
/// place until its task has been awaited, so a new run is only spawned once
/// the previous one has delivered its last event.
struct LoopSlot {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl LoopSlot {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    /// Cancel and wait for the task to exit.
    async fn retire(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            log::error!("Background loop ended abnormally: {}", e);
        }
    }
}

pub struct DroneLink {
    config: LinkConfig,
    events: UnboundedSender<LinkEvent>,
    target: TargetInput,
    simulation: Option<LoopSlot>,
    telemetry: Option<LoopSlot>,
}

impl DroneLink {
    /// Validates `config` and returns the link plus the event stream to hand
    /// to a [`Presenter`](crate::presenter::Presenter).
    pub fn new(config: LinkConfig) -> LinkResult<(Self, UnboundedReceiver<LinkEvent>)> {
        config.validate()?;
        let (events, rx) = mpsc::unbounded_channel();
        let (target, _) = watch::channel(Point::default());
        let link = DroneLink {
            config,
            events,
            target: TargetInput(Arc::new(target)),
            simulation: None,
            telemetry: None,
        };
        Ok((link, rx))
    }

    pub fn target_input(&self) -> TargetInput {
        self.target.clone()
    }

    pub fn set_target(&self, target: Point) {
        self.target.set(target);
    }

    pub fn is_simulating(&self) -> bool {
        self.simulation.as_ref().is_some_and(LoopSlot::is_active)
    }

    /// True while connecting or connected.
    pub fn is_connected(&self) -> bool {
        self.telemetry.as_ref().is_some_and(LoopSlot::is_active)
    }

    pub async fn start_autopilot(&mut self) -> LinkResult<()> {
        self.retire_simulation().await?;
        let token = CancelToken::new();
        let handle = tokio::spawn(autopilot_loop(
            self.config.autopilot.clone(),
            self.target.0.subscribe(),
            token.clone(),
            self.events.clone(),
        ));
        self.simulation = Some(LoopSlot { token, handle });
        Ok(())
    }

    pub async fn start_random_walk(&mut self) -> LinkResult<()> {
        self.retire_simulation().await?;
        let token = CancelToken::new();
        let handle = tokio::spawn(random_walk_loop(
            self.config.random_walk.clone(),
            StdRng::from_os_rng(),
            token.clone(),
            self.events.clone(),
        ));
        self.simulation = Some(LoopSlot { token, handle });
        Ok(())
    }

    /// Returns false if nothing was running. The loop exits within one step.
    pub fn stop_simulation(&mut self) -> bool {
        match &self.simulation {
            Some(slot) => {
                let was_active = slot.is_active();
                slot.token.cancel();
                was_active
            }
            None => false,
        }
    }

    pub async fn connect(&mut self) -> LinkResult<()> {
        if self.is_connected() {
            log::info!("Already connected to drone.");
            return Err(LinkError::AlreadyRunning("Telemetry connection"));
        }
        if let Some(old) = self.telemetry.take() {
            old.retire().await;
        }
        log::info!("Connecting to drone at {}", self.config.telemetry.address());
        let token = CancelToken::new();
        let handle = tokio::spawn(telemetry_session(
            self.config.telemetry.clone(),
            token.clone(),
            self.events.clone(),
        ));
        self.telemetry = Some(LoopSlot { token, handle });
        Ok(())
    }

    /// Returns false if no connection was open. The socket is closed within
    /// one read timeout.
    pub fn disconnect(&mut self) -> bool {
        match &self.telemetry {
            Some(slot) => {
                let was_active = slot.is_active();
                slot.token.cancel();
                was_active
            }
            None => false,
        }
    }

    /// Stop both loops and wait for them to exit, so the socket is closed
    /// before this returns.
    pub async fn shutdown(mut self) {
        for slot in [self.simulation.take(), self.telemetry.take()]
            .into_iter()
            .flatten()
        {
            slot.retire().await;
        }
    }

    async fn retire_simulation(&mut self) -> LinkResult<()> {
        if self.is_simulating() {
            log::info!("Simulation already running, ignoring start");
            return Err(LinkError::AlreadyRunning("Simulation"));
        }
        if let Some(old) = self.simulation.take() {
            old.retire().await;
        }
        Ok(())
    }
}

impl Drop for DroneLink {
    fn drop(&mut self) {
        for slot in [&self.simulation, &self.telemetry].into_iter().flatten() {
            slot.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::live_status::LiveStatus;
    use crate::presenter::{CloseReason, Observer, Presenter};
    use crate::types::{StateUpdate, UpdateSource};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct Counts {
        autopilot: usize,
        random_walk: usize,
        telemetry: usize,
        stopped: usize,
        closed: usize,
    }

    impl Observer for Counts {
        fn on_state(&mut self, update: &StateUpdate) {
            match update.source {
                UpdateSource::Autopilot => self.autopilot += 1,
                UpdateSource::RandomWalk => self.random_walk += 1,
                UpdateSource::Telemetry => self.telemetry += 1,
            }
        }

        fn on_simulation_stopped(&mut self, _source: UpdateSource) {
            self.stopped += 1;
        }

        fn on_connection_closed(
            &mut self,
            _reason: &CloseReason,
            _stats: &crate::framing::FrameStats,
        ) {
            self.closed += 1;
        }
    }

    fn local_config(port: u16) -> LinkConfig {
        LinkConfig {
            telemetry: TelemetryConfig {
                host: "127.0.0.1".to_string(),
                port,
                read_timeout_ms: 20,
                ..TelemetryConfig::default()
            },
            ..LinkConfig::default()
        }
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let (mut link, rx) = DroneLink::new(LinkConfig::default()).unwrap();
        let presenter = tokio::spawn(Presenter::new(rx, Counts::default()).run());

        link.set_target(Point::new(50.0, 50.0));
        assert!(link.start_autopilot().await.is_ok());
        assert!(link.is_simulating());
        assert_eq!(
            link.start_random_walk().await,
            Err(LinkError::AlreadyRunning("Simulation"))
        );

        sleep(Duration::from_millis(100)).await;
        assert!(link.stop_simulation());
        assert!(!link.is_simulating());
        assert!(!link.stop_simulation());

        link.shutdown().await;
        let counts = presenter.await.unwrap();
        assert!(counts.autopilot >= 1);
        assert_eq!(counts.random_walk, 0);
        assert_eq!(counts.stopped, 1);
    }

    #[tokio::test]
    async fn test_restart_never_leaves_two_loops() {
        let (mut link, mut rx) = DroneLink::new(LinkConfig::default()).unwrap();

        link.start_autopilot().await.unwrap();
        link.stop_simulation();
        link.start_autopilot().await.unwrap();
        link.stop_simulation();
        link.start_random_walk().await.unwrap();
        sleep(Duration::from_millis(60)).await;
        link.shutdown().await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        // Each run reports its stop before the next run produces anything
        let stops: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, LinkEvent::SimulationStopped(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(stops.len(), 3);
        assert_eq!(
            events[stops[1]],
            LinkEvent::SimulationStopped(UpdateSource::Autopilot)
        );
        for event in &events[stops[1] + 1..stops[2]] {
            match event {
                LinkEvent::State(s) => assert_eq!(s.source, UpdateSource::RandomWalk),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_twice_is_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"1,2,3,4\n5,6,7,8\n").await.unwrap();
            sleep(Duration::from_millis(100)).await;
        });

        let (mut link, rx) = DroneLink::new(local_config(port)).unwrap();
        let presenter = tokio::spawn(Presenter::new(rx, Counts::default()).run());

        link.connect().await.unwrap();
        assert!(matches!(
            link.connect().await,
            Err(LinkError::AlreadyRunning(_))
        ));

        server.await.unwrap();
        // Peer is gone: the loop ends by itself
        for _ in 0..50 {
            if !link.is_connected() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(!link.is_connected());

        link.shutdown().await;
        let counts = presenter.await.unwrap();
        assert_eq!(counts.telemetry, 2);
        assert_eq!(counts.closed, 1);
    }

    #[tokio::test]
    async fn test_reconnect_closes_old_link_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept every client and keep its socket open
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (mut link, mut rx) = DroneLink::new(local_config(port)).unwrap();
        link.connect().await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(link.disconnect());
        link.connect().await.unwrap();
        sleep(Duration::from_millis(300)).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 3, "{:?}", events);
        assert!(matches!(events[0], LinkEvent::Connected(Some(_))));
        assert!(matches!(
            events[1],
            LinkEvent::ConnectionClosed {
                reason: CloseReason::Disconnected,
                ..
            }
        ));
        assert!(matches!(events[2], LinkEvent::Connected(Some(_))));

        let (_tx, idle) = mpsc::unbounded_channel();
        let mut presenter = Presenter::new(idle, LiveStatus::new());
        for event in events {
            presenter.dispatch(event);
        }
        assert!(link.is_connected());
        assert!(presenter.observer().connected);
        assert_eq!(presenter.observer().connections_closed, 1);

        link.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting_does_not_block() {
        // Non-routable address: the connect attempt hangs until its timeout
        let mut config = LinkConfig::default();
        config.telemetry.host = "10.255.255.1".to_string();
        config.telemetry.connect_timeout_ms = 5000;
        config.telemetry.read_timeout_ms = 20;

        let (mut link, _rx) = DroneLink::new(config).unwrap();
        link.connect().await.unwrap();
        sleep(Duration::from_millis(30)).await;
        link.disconnect();

        let started = std::time::Instant::now();
        link.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = LinkConfig::default();
        config.autopilot.dt = 0.0;
        assert!(matches!(DroneLink::new(config), Err(LinkError::Config(_))));

        let mut config = LinkConfig::default();
        config.random_walk.duration_secs = Some(1e20);
        assert!(matches!(DroneLink::new(config), Err(LinkError::Config(_))));
    }
}
