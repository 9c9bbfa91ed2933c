//! Encoder for The Things Network v3 downlink push messages.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::{codec::RuleId, device::DeviceId};

/// Priority TTN assigns to gateway ACKs.
pub const DOWNLINK_PRIORITY: &str = "NORMAL";

/// Body of a `down/push` publication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DownlinkPush {
    pub downlinks: Vec<Downlink>,
}

/// A single queued downlink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Downlink {
    pub f_port: u8,
    pub frm_payload: String,
    pub priority: &'static str,
}

impl DownlinkPush {
    /// Wrap `frame` for delivery on `rule_id`.
    #[must_use]
    pub fn new(rule_id: RuleId, frame: &[u8]) -> Self {
        Self {
            downlinks: vec![Downlink {
                f_port: rule_id.get(),
                frm_payload: STANDARD.encode(frame),
                priority: DOWNLINK_PRIORITY,
            }],
        }
    }
}

/// MQTT topic that queues a downlink for `device`.
///
/// # Examples
///
/// ```
/// use schc_gateway::{device::DeviceId, ttn::downlink_topic};
/// assert_eq!(
///     downlink_topic("app@ttn", &DeviceId::from("sensor-01")),
///     "v3/app@ttn/devices/sensor-01/down/push"
/// );
/// ```
#[must_use]
pub fn downlink_topic(username: &str, device: &DeviceId) -> String {
    format!("v3/{username}/devices/{device}/down/push")
}
