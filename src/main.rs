use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::time::{sleep, Duration};

use drone_link::framing::FrameStats;
use drone_link::live_status::LiveStatus;
use drone_link::{
    CloseReason, DroneLink, LinkConfig, LinkError, Observer, Point, Presenter, StateUpdate,
    TargetInput, UpdateSource,
};

#[derive(Parser, Debug)]
#[command(name = "drone_link")]
#[command(about = "Drone tracker - local autopilot simulation or live TCP telemetry", long_about = None)]
struct Args {
    /// JSON config file (missing fields keep their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Duration in seconds (0 = until Ctrl-C or the link ends)
    #[arg(long, global = true, default_value = "0")]
    duration: u64,

    /// Directory for live_status.json snapshots
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fly toward a target. Further `x,y` lines on stdin move the target.
    Autopilot {
        #[arg(long, default_value = "100,100", value_parser = parse_point)]
        target: Point,
    },
    /// Random walk with no target
    Wander {
        /// Stop walking after this many seconds
        #[arg(long)]
        walk_secs: Option<f64>,
    },
    /// Receive `x,y,speed,orientation` lines from the drone
    Connect {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_point(text: &str) -> Result<Point, String> {
    Point::parse(text).ok_or_else(|| format!("expected x,y but got {:?}", text))
}

/// Prints the drone state about once a second and keeps live_status.json
/// fresh.
struct ConsoleObserver {
    status: LiveStatus,
    status_path: Option<PathBuf>,
    last_print: Instant,
    last_save: Instant,
}

impl ConsoleObserver {
    fn new(status_path: Option<PathBuf>) -> Self {
        Self {
            status: LiveStatus::new(),
            status_path,
            last_print: Instant::now(),
            last_save: Instant::now(),
        }
    }

    fn maybe_save(&mut self) {
        if self.last_save.elapsed() < Duration::from_secs(2) {
            return;
        }
        if let Some(path) = &self.status_path {
            if let Err(e) = self.status.save(path) {
                log::warn!("Failed to write {}: {}", path.display(), e);
            }
        }
        self.last_save = Instant::now();
    }
}

impl Observer for ConsoleObserver {
    fn on_state(&mut self, update: &StateUpdate) {
        self.status.on_state(update);
        if self.last_print.elapsed() >= Duration::from_secs(1) {
            let accel = match update.acceleration {
                Some(a) => format!("Accel: {:.1}", a),
                None => "AZ: N/A".to_string(),
            };
            println!(
                "[{}] Speed: {:.2}  X: {:.2}  Y: {:.2}  Ori: {:.1}°  {}",
                ts_now(),
                update.speed,
                update.x,
                update.y,
                update.orientation,
                accel
            );
            self.last_print = Instant::now();
        }
        self.maybe_save();
    }

    fn on_connected(&mut self, peer: Option<SocketAddr>) {
        self.status.on_connected(peer);
        match peer {
            Some(addr) => println!("[{}] Connected to drone at {}", ts_now(), addr),
            None => println!("[{}] Connected to drone", ts_now()),
        }
    }

    fn on_connect_failed(&mut self, error: &LinkError) {
        self.status.on_connect_failed(error);
        println!("[{}] {}", ts_now(), error);
    }

    fn on_connection_closed(&mut self, reason: &CloseReason, stats: &FrameStats) {
        self.status.on_connection_closed(reason, stats);
        println!("[{}] Drone connection closed ({})", ts_now(), reason);
    }

    fn on_simulation_stopped(&mut self, source: UpdateSource) {
        println!("[{}] Simulation stopped ({:?})", ts_now(), source);
    }
}

/// New targets typed as `x,y`. Runs on a plain thread because a blocking
/// stdin read cannot be cancelled.
fn spawn_target_reader(input: TargetInput) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Point::parse(&line) {
                Some(target) => {
                    log::info!("Target set to ({}, {})", target.x, target.y);
                    input.set(target);
                }
                None => log::warn!("Ignoring target {:?}, expected x,y", line),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LinkConfig::default(),
    };
    match &args.command {
        Command::Connect { host, port } => {
            if let Some(host) = host {
                config.telemetry.host = host.clone();
            }
            if let Some(port) = port {
                config.telemetry.port = *port;
            }
        }
        Command::Wander { walk_secs } => {
            if walk_secs.is_some() {
                config.random_walk.duration_secs = *walk_secs;
            }
        }
        Command::Autopilot { .. } => {}
    }
    config.validate().context("Invalid configuration")?;

    println!("[{}] Drone Link Starting", ts_now());
    println!("  Mode: {:?}", args.command);
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    if let Some(dir) = &args.output_dir {
        println!("  Output Dir: {}", dir.display());
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let (mut link, events) = DroneLink::new(config)?;
    let observer = ConsoleObserver::new(
        args.output_dir
            .as_ref()
            .map(|dir| dir.join("live_status.json")),
    );
    let presenter = tokio::spawn(Presenter::new(events, observer).run());

    match &args.command {
        Command::Autopilot { target } => {
            link.set_target(*target);
            spawn_target_reader(link.target_input());
            link.start_autopilot().await?;
        }
        Command::Wander { .. } => link.start_random_walk().await?,
        Command::Connect { .. } => link.connect().await?,
    }

    let start = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if args.duration > 0 && start.elapsed() >= Duration::from_secs(args.duration) {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }
        if !link.is_simulating() && !link.is_connected() {
            break;
        }
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
            _ = sleep(Duration::from_millis(100)) => {}
        }
    }

    link.shutdown().await;
    let mut observer = presenter.await.context("Presenter task failed")?;
    observer.status.timestamp = drone_link::live_status::current_timestamp();

    if let Some(dir) = &args.output_dir {
        let path = dir.join("live_status_final.json");
        observer
            .status
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let status = &observer.status;
    println!("\n=== Final Stats ===");
    println!("Updates: {}", status.updates);
    println!("Telemetry records: {}", status.telemetry_records);
    println!("Dropped lines: {}", status.dropped_lines);
    println!(
        "Last position: ({:.2}, {:.2}) heading {:.1}° speed {:.2}",
        status.x, status.y, status.orientation, status.speed
    );
    println!("Uptime: {:.1} s", status.uptime_seconds());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
