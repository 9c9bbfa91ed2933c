//! Link-layer abstraction used to send ACKs back to devices.
//!
//! The gateway never talks to a network directly. A [`Link`] receives the
//! encoded ACK bytes together with the rule id that must accompany them (the
//! LoRaWAN `FPort`) and is responsible for delivery.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::{codec::RuleId, device::DeviceId};

/// Errors reported by a [`Link`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LinkError {
    /// Writing to the underlying transport failed.
    #[error("link i/o failed: {0}")]
    Io(#[from] io::Error),
    /// The downlink could not be serialized.
    #[error("failed to encode downlink: {0}")]
    Encode(#[from] serde_json::Error),
    /// The link has been shut down.
    #[error("link closed")]
    Closed,
}

/// Transport for downlink frames.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Prepare the link before the first downlink.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the transport cannot be prepared.
    async fn initialize(&self) -> Result<(), LinkError> { Ok(()) }

    /// Send `frame` to `device` on `rule_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the frame cannot be handed to the transport.
    async fn send_downlink(
        &self,
        device: &DeviceId,
        rule_id: RuleId,
        frame: Bytes,
    ) -> Result<(), LinkError>;

    /// Largest frame the link carries, in bytes. With
    /// `consider_optional_field`, room for optional L2 header fields is
    /// subtracted.
    fn mtu(&self, consider_optional_field: bool) -> usize;
}
