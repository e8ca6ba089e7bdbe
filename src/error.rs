use thiserror::Error;

/// Drone link error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("{0} already running")]
    AlreadyRunning(&'static str),

    #[error("Unable to connect to drone at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Connecting to drone at {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("Telemetry stream failed: {0}")]
    Stream(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type LinkResult<T> = Result<T, LinkError>;
