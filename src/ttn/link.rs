//! Line-oriented JSON link for piping downlinks to an MQTT publisher.

use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::{DownlinkPush, downlink_topic};
use crate::{
    codec::RuleId,
    device::DeviceId,
    link::{Link, LinkError},
};

/// Largest LoRaWAN application payload at the slowest EU868 data rate.
pub const LORAWAN_MAX_PAYLOAD: usize = 51;

/// Bytes reserved for the optional `FOpts` field of the frame header.
pub const LORAWAN_FOPTS_LEN: usize = 15;

#[derive(Serialize)]
struct Publication<'a> {
    topic: String,
    payload: &'a DownlinkPush,
}

/// [`Link`] writing one JSON object per downlink to `W`.
///
/// Each line carries the TTN topic and push body:
/// `{"topic":"v3/…/down/push","payload":{"downlinks":[…]}}`.
pub struct JsonLinesLink<W> {
    username: String,
    max_payload: usize,
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesLink<W> {
    /// Create a link publishing under the TTN application `username`.
    pub fn new(username: impl Into<String>, out: W) -> Self {
        Self {
            username: username.into(),
            max_payload: LORAWAN_MAX_PAYLOAD,
            out: Mutex::new(out),
        }
    }

    /// Override the payload size reported by [`Link::mtu`].
    #[must_use]
    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W { self.out.into_inner().unwrap_or_else(PoisonError::into_inner) }
}

#[async_trait]
impl<W: Write + Send + 'static> Link for JsonLinesLink<W> {
    async fn send_downlink(
        &self,
        device: &DeviceId,
        rule_id: RuleId,
        frame: Bytes,
    ) -> Result<(), LinkError> {
        let push = DownlinkPush::new(rule_id, &frame);
        let publication = Publication {
            topic: downlink_topic(&self.username, device),
            payload: &push,
        };
        let mut line = serde_json::to_vec(&publication)?;
        line.push(b'\n');
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(&line)?;
        out.flush()?;
        debug!(%device, %rule_id, topic = %publication.topic, "published downlink");
        Ok(())
    }

    fn mtu(&self, consider_optional_field: bool) -> usize {
        if consider_optional_field {
            self.max_payload.saturating_sub(LORAWAN_FOPTS_LEN)
        } else {
            self.max_payload
        }
    }
}
