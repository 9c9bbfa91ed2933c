//! In-memory [`Link`] implementations.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use schc_gateway::{
    codec::RuleId,
    device::DeviceId,
    link::{Link, LinkError},
};
use tokio::{
    sync::mpsc,
    time::{Duration, timeout},
};

/// A downlink captured by [`RecordingLink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentDownlink {
    pub device: DeviceId,
    pub rule_id: RuleId,
    pub frame: Bytes,
}

/// Link that forwards every downlink to a channel.
#[derive(Debug)]
pub struct RecordingLink {
    tx: mpsc::UnboundedSender<SentDownlink>,
    mtu: usize,
}

/// Receiving side of a [`RecordingLink`].
#[derive(Debug)]
pub struct Downlinks(mpsc::UnboundedReceiver<SentDownlink>);

impl Downlinks {
    /// Wait up to a second for the next downlink.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives in time or the link was dropped.
    pub async fn next(&mut self) -> SentDownlink {
        timeout(Duration::from_secs(1), self.0.recv())
            .await
            .expect("timed out waiting for a downlink")
            .expect("link dropped")
    }

    /// Take a downlink if one is already queued.
    pub fn try_next(&mut self) -> Option<SentDownlink> { self.0.try_recv().ok() }
}

/// Create a [`RecordingLink`] and the stream of frames it receives.
#[must_use]
pub fn recording_link() -> (Arc<RecordingLink>, Downlinks) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingLink { tx, mtu: 51 }), Downlinks(rx))
}

#[async_trait]
impl Link for RecordingLink {
    async fn send_downlink(
        &self,
        device: &DeviceId,
        rule_id: RuleId,
        frame: Bytes,
    ) -> Result<(), LinkError> {
        self.tx
            .send(SentDownlink {
                device: device.clone(),
                rule_id,
                frame,
            })
            .map_err(|_| LinkError::Closed)
    }

    fn mtu(&self, _consider_optional_field: bool) -> usize { self.mtu }
}

/// Link whose every send fails.
#[derive(Debug, Default)]
pub struct FailingLink;

#[async_trait]
impl Link for FailingLink {
    async fn send_downlink(
        &self,
        _device: &DeviceId,
        _rule_id: RuleId,
        _frame: Bytes,
    ) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }

    fn mtu(&self, _consider_optional_field: bool) -> usize { 0 }
}
