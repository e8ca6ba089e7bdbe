//! Serves simulated drone telemetry over TCP, one `x,y,speed,orientation`
//! line per step, so the `connect` mode can be run without hardware.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, Duration};

use drone_link::kinematics::{autopilot_step, random_walk_step};
use drone_link::{AgentState, LinkConfig, Point, TelemetryRecord};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Motion {
    /// Random walk
    Wander,
    /// Autopilot chasing a point that circles the origin
    Orbit,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "telemetry_feed")]
#[command(about = "Simulated drone telemetry server", long_about = None)]
struct Args {
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    #[arg(long, value_enum, default_value = "orbit")]
    motion: Motion,

    /// Radius of the orbited point
    #[arg(long, default_value = "150.0")]
    radius: f64,

    /// Every Nth line is replaced by a malformed one (0 = never)
    #[arg(long, default_value = "0")]
    garbage_every: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    log::info!("Serving telemetry on {} ({:?})", args.bind, args.motion);

    loop {
        let (socket, peer) = listener.accept().await?;
        log::info!("Client connected: {}", peer);
        let args = args.clone();
        tokio::spawn(async move {
            let lines = serve(socket, &args).await;
            log::info!("Client {} gone after {} lines", peer, lines);
        });
    }
}

/// Streams until the client goes away. Returns the number of lines sent.
async fn serve(mut socket: TcpStream, args: &Args) -> u64 {
    let config = LinkConfig::default();
    let mut rng = StdRng::from_os_rng();

    let (period, mut state) = match args.motion {
        Motion::Wander => (
            config.random_walk.step_secs,
            AgentState::new(0.0, 0.0, config.random_walk.initial_speed, 0.0),
        ),
        Motion::Orbit => (
            config.autopilot.dt,
            AgentState::new(0.0, 0.0, config.autopilot.initial_speed, 0.0),
        ),
    };

    let mut ticker = interval(Duration::from_secs_f64(period));
    let mut lines = 0u64;
    let mut elapsed = 0.0;

    loop {
        ticker.tick().await;
        elapsed += period;

        state = match args.motion {
            Motion::Wander => random_walk_step(&state, &config.random_walk, &mut rng),
            Motion::Orbit => {
                let angle = elapsed * 0.2;
                let target = Point::new(args.radius * angle.cos(), args.radius * angle.sin());
                autopilot_step(&state, target, &config.autopilot, period)
            }
        };

        let line = if args.garbage_every > 0 && (lines + 1) % args.garbage_every == 0 {
            "not,a,record\n".to_string()
        } else {
            TelemetryRecord::from(&state).to_line()
        };
        if let Err(e) = socket.write_all(line.as_bytes()).await {
            log::debug!("Write failed: {}", e);
            return lines;
        }
        lines += 1;
    }
}
