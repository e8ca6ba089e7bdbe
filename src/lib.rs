//! Drone position tracking: a local autopilot / random-walk simulation and a
//! line-oriented TCP telemetry client, delivering state updates to a single
//! presentation-side observer.

pub mod config;
pub mod control;
pub mod error;
pub mod framing;
pub mod kinematics;
pub mod live_status;
pub mod presenter;
pub mod simulator;
pub mod telemetry;
pub mod types;

pub use config::{AutopilotConfig, LinkConfig, RandomWalkConfig, TelemetryConfig};
pub use control::{CancelToken, DroneLink, TargetInput};
pub use error::{LinkError, LinkResult};
pub use framing::{FrameStats, LineFramer, TelemetryParser};
pub use presenter::{CloseReason, LinkEvent, Observer, Presenter};
pub use types::{AgentState, Point, StateUpdate, TelemetryRecord, UpdateSource};
