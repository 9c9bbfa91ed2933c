//! Builders for TTN uplink envelopes.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Serialize a TTN v3 uplink envelope carrying `frame` on `f_port`.
#[must_use]
pub fn uplink_json(device: &str, f_port: u8, frame: &[u8]) -> Vec<u8> {
    serde_json::json!({
        "end_device_ids": { "device_id": device },
        "uplink_message": {
            "f_port": f_port,
            "frm_payload": STANDARD.encode(frame),
        }
    })
    .to_string()
    .into_bytes()
}
