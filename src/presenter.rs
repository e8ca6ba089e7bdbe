//! Single-consumer delivery of link events.
//!
//! Background loops never touch observer state directly. They push
//! [`LinkEvent`]s into one channel; the [`Presenter`] drains it in order and
//! is the only place the current drone state is replaced and observed.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::LinkError;
use crate::framing::FrameStats;
use crate::types::{StateUpdate, UpdateSource};

#[derive(Clone, Debug, PartialEq)]
pub enum CloseReason {
    /// Peer closed the stream
    EndOfStream,
    ReadFailed(LinkError),
    /// Local disconnect, or nobody left to deliver records to
    Disconnected,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::EndOfStream => write!(f, "end of stream"),
            CloseReason::ReadFailed(e) => write!(f, "{}", e),
            CloseReason::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    State(StateUpdate),
    SimulationStopped(UpdateSource),
    Connected(Option<SocketAddr>),
    ConnectFailed(LinkError),
    ConnectionClosed {
        reason: CloseReason,
        stats: FrameStats,
    },
}

/// Presentation-side collaborator. Every method runs on the presenter, one
/// call at a time.
pub trait Observer {
    fn on_state(&mut self, update: &StateUpdate);

    fn on_connected(&mut self, _peer: Option<SocketAddr>) {}

    fn on_connect_failed(&mut self, _error: &LinkError) {}

    fn on_connection_closed(&mut self, _reason: &CloseReason, _stats: &FrameStats) {}

    fn on_simulation_stopped(&mut self, _source: UpdateSource) {}
}

pub struct Presenter<O: Observer> {
    events: UnboundedReceiver<LinkEvent>,
    observer: O,
    current: Option<StateUpdate>,
}

impl<O: Observer> Presenter<O> {
    pub fn new(events: UnboundedReceiver<LinkEvent>, observer: O) -> Self {
        Presenter {
            events,
            observer,
            current: None,
        }
    }

    /// Latest state, replaced wholesale on every update.
    pub fn current(&self) -> Option<&StateUpdate> {
        self.current.as_ref()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn dispatch(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::State(update) => {
                self.current = Some(update);
                self.observer.on_state(&update);
            }
            LinkEvent::SimulationStopped(source) => {
                self.observer.on_simulation_stopped(source);
            }
            LinkEvent::Connected(peer) => {
                // A new connection starts from a fresh state
                self.current = None;
                self.observer.on_connected(peer);
            }
            LinkEvent::ConnectFailed(error) => {
                self.observer.on_connect_failed(&error);
            }
            LinkEvent::ConnectionClosed { reason, stats } => {
                self.observer.on_connection_closed(&reason, &stats);
            }
        }
    }

    /// Drain events until every sender is gone, then hand the observer back.
    pub async fn run(mut self) -> O {
        while let Some(event) = self.events.recv().await {
            self.dispatch(event);
        }
        self.observer
    }
}
