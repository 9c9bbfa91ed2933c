//! Adapter for The Things Network v3 MQTT message formats.
//!
//! Uplinks arrive as JSON envelopes carrying the device id, the frame port
//! (the SCHC rule id) and the base64 fragment. Downlinks are published to
//! `v3/{user}/devices/{device}/down/push` with a base64 ACK.

mod downlink;
mod link;
mod uplink;

pub use downlink::{DOWNLINK_PRIORITY, Downlink, DownlinkPush, downlink_topic};
pub use link::{JsonLinesLink, LORAWAN_FOPTS_LEN, LORAWAN_MAX_PAYLOAD};
pub use uplink::{EnvelopeError, Uplink, parse_uplink};
