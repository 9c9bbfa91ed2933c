//! Metric helpers for `schc_gateway`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::codec::FragmentKind;

/// Name of the gauge tracking sessions holding a pool slot.
pub const SESSIONS_ACTIVE: &str = "schc_gateway_sessions_active";
/// Name of the counter tracking finished sessions, labelled by outcome.
pub const SESSIONS_FINISHED: &str = "schc_gateway_sessions_finished_total";
/// Name of the counter tracking decoded fragments, labelled by kind.
pub const FRAGMENTS_RECEIVED: &str = "schc_gateway_fragments_received_total";
/// Name of the counter tracking ACKs produced, labelled by the `c` bit.
pub const ACKS_SENT: &str = "schc_gateway_acks_sent_total";
/// Name of the counter tracking errors, labelled by kind.
pub const ERRORS_TOTAL: &str = "schc_gateway_errors_total";

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a finished session.
pub fn inc_finished(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(SESSIONS_FINISHED, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a decoded fragment.
pub fn inc_fragments(kind: FragmentKind) {
    #[cfg(feature = "metrics")]
    counter!(FRAGMENTS_RECEIVED, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record an ACK handed to the link.
pub fn inc_acks(complete: bool) {
    #[cfg(feature = "metrics")]
    counter!(ACKS_SENT, "complete" => if complete { "true" } else { "false" }).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = complete;
}

/// Record an error occurrence.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
