//! Canonical error and result types for the crate.
//!
//! This module defines the single public [`GatewayError`] surface returned by
//! the fragmenter and sessions when an uplink cannot be routed.

use thiserror::Error;

use crate::{device::DeviceId, queue::QueueError, ttn::EnvelopeError};

/// Top-level error type exposed by `schc_gateway`.
///
/// Integrity failures are not errors: they are a protocol branch reported as
/// [`ReassemblyEvent::IntegrityFailure`](crate::reassembly::ReassemblyEvent).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every session slot is in use.
    #[error("all {capacity} sessions are busy")]
    SessionPoolExhausted {
        /// Number of slots in the pool.
        capacity: usize,
    },
    /// No session is associated with the device.
    #[error("no session associated with device {0}")]
    AssociationNotFound(DeviceId),
    /// The slot is no longer bound to the device.
    #[error("session slot {slot} is not running for device {device}")]
    SessionNotRunning {
        /// Pool index of the session.
        slot: usize,
        /// Device the message was meant for.
        device: DeviceId,
    },
    /// The uplink envelope could not be parsed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// The session queue refused the fragment.
    #[error("session queue rejected fragment: {0}")]
    Queue(#[from] QueueError),
}

/// Result type returned by gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
