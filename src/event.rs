//! Events published by the gateway to an optional observer.
//!
//! Observers receive the outcome of every session (including the reassembled
//! payload) without polling session state. Delivery is best effort: a dropped
//! receiver silently stops the stream.

use tokio::sync::mpsc;

use crate::{
    device::DeviceId,
    reassembly::{ReassemblyEvent, WorkerExit},
};

/// Event published by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Raised by a session's state machine.
    Reassembly {
        device: DeviceId,
        event: ReassemblyEvent,
    },
    /// A session finished teardown and its pool slot can be claimed again.
    SessionReleased {
        device: DeviceId,
        slot: usize,
        exit: WorkerExit,
    },
}

/// Sending half of the event stream.
pub type EventSink = mpsc::UnboundedSender<GatewayEvent>;

/// Receiving half of the event stream.
pub type EventStream = mpsc::UnboundedReceiver<GatewayEvent>;

/// Create a connected event sink and stream.
#[must_use]
pub fn event_channel() -> (EventSink, EventStream) { mpsc::unbounded_channel() }
