//! Shared utilities for integration tests.
//!
//! Builds fragmenters wired to a [`RecordingLink`](schc_testing::RecordingLink)
//! and an event stream, and waits for session events with a timeout.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use bytes::Bytes;
use rstest::fixture;
use schc_gateway::{
    EventStream,
    GatewayEvent,
    ReassemblyEvent,
    config::{AckMode, FragmentationProfile},
    event_channel,
    fragmenter::{Fragmenter, FragmenterBuilder},
};
use schc_testing::{Downlinks, recording_link};
use tokio::time::timeout;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A fragmenter together with the streams it reports to.
pub struct Harness {
    pub fragmenter: Fragmenter,
    pub downlinks: Downlinks,
    pub events: EventStream,
}

/// Build a harness, letting `configure` adjust the builder.
///
/// # Panics
///
/// Panics if the builder rejects the configuration.
pub fn harness_with(configure: impl FnOnce(FragmenterBuilder) -> FragmenterBuilder) -> Harness {
    let (link, downlinks) = recording_link();
    let (sink, events) = event_channel();
    let fragmenter = configure(Fragmenter::builder(link).event_sink(sink))
        .build()
        .expect("valid fragmenter configuration");
    Harness {
        fragmenter,
        downlinks,
        events,
    }
}

/// Harness acknowledging in `mode` with the default pool.
pub fn harness(mode: AckMode) -> Harness { harness_with(|builder| builder.ack_mode(mode)) }

#[fixture]
pub fn profile() -> FragmentationProfile { FragmentationProfile::lorawan_uplink() }

/// Deterministic message of `len` bytes.
pub fn message(len: usize) -> Bytes {
    (0..len)
        .map(|i| u8::try_from(i % 249).expect("below 256"))
        .collect::<Vec<_>>()
        .into()
}

/// Wait up to a second for the next event.
///
/// # Panics
///
/// Panics if nothing arrives in time or every sink was dropped.
pub async fn next_event(events: &mut EventStream) -> GatewayEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Skip events until a reassembled payload is published.
pub async fn completed_payload(events: &mut EventStream) -> Bytes {
    loop {
        if let GatewayEvent::Reassembly {
            event: ReassemblyEvent::Completed { payload },
            ..
        } = next_event(events).await
        {
            return payload;
        }
    }
}

/// Skip events until a session is released; returns the slot.
pub async fn released_slot(events: &mut EventStream) -> usize {
    loop {
        if let GatewayEvent::SessionReleased { slot, .. } = next_event(events).await {
            return slot;
        }
    }
}
