use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LinkError;
use crate::framing::FrameStats;
use crate::presenter::{CloseReason, Observer};
use crate::types::{StateUpdate, UpdateSource};

/// JSON snapshot of what the link is doing, refreshed by the presenter.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub started_at: f64,
    pub source: Option<UpdateSource>,
    pub connected: bool,
    // Latest drone state
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub orientation: f64,
    pub acceleration: Option<f64>,
    // Counters
    pub updates: u64,
    pub telemetry_records: u64,
    pub dropped_lines: u64,
    pub connect_failures: u64,
    pub connections_closed: u64,
    pub last_error: Option<String>,
}

impl LiveStatus {
    pub fn new() -> Self {
        let now = current_timestamp();
        Self {
            timestamp: now,
            started_at: now,
            source: None,
            connected: false,
            x: 0.0,
            y: 0.0,
            speed: 0.0,
            orientation: 0.0,
            acceleration: None,
            updates: 0,
            telemetry_records: 0,
            dropped_lines: 0,
            connect_failures: 0,
            connections_closed: 0,
            last_error: None,
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        (self.timestamp - self.started_at).max(0.0)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for LiveStatus {
    fn on_state(&mut self, update: &StateUpdate) {
        self.timestamp = current_timestamp();
        self.source = Some(update.source);
        self.x = update.x;
        self.y = update.y;
        self.speed = update.speed;
        self.orientation = update.orientation;
        self.acceleration = update.acceleration;
        self.updates += 1;
        if update.source == UpdateSource::Telemetry {
            self.telemetry_records += 1;
        }
    }

    fn on_connected(&mut self, _peer: Option<SocketAddr>) {
        self.timestamp = current_timestamp();
        self.connected = true;
        self.x = 0.0;
        self.y = 0.0;
        self.speed = 0.0;
        self.orientation = 0.0;
        self.acceleration = None;
    }

    fn on_connect_failed(&mut self, error: &LinkError) {
        self.timestamp = current_timestamp();
        self.connect_failures += 1;
        self.last_error = Some(error.to_string());
    }

    fn on_connection_closed(&mut self, reason: &CloseReason, stats: &FrameStats) {
        self.timestamp = current_timestamp();
        self.connected = false;
        self.connections_closed += 1;
        self.dropped_lines += stats.dropped_lines;
        if let CloseReason::ReadFailed(e) = reason {
            self.last_error = Some(e.to_string());
        }
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
