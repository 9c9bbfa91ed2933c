//! Parser for The Things Network v3 uplink envelopes.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::{codec::RuleId, device::DeviceId};

/// Errors raised while parsing an uplink envelope.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope is not valid JSON of the expected shape.
    #[error("invalid uplink json: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent.
    #[error("uplink envelope lacks {0}")]
    MissingField(&'static str),
    /// The payload is not valid base64.
    #[error("invalid frm_payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The frame port does not fit a rule id.
    #[error("f_port {0} is not a valid rule id")]
    InvalidPort(u32),
}

#[derive(Deserialize)]
struct Envelope {
    end_device_ids: Option<EndDeviceIds>,
    uplink_message: Option<UplinkMessage>,
}

#[derive(Deserialize)]
struct EndDeviceIds {
    device_id: Option<String>,
}

#[derive(Deserialize)]
struct UplinkMessage {
    f_port: Option<u32>,
    frm_payload: Option<String>,
}

/// A SCHC fragment extracted from an uplink envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uplink {
    pub device_id: DeviceId,
    pub rule_id: RuleId,
    pub payload: Bytes,
}

/// Parse a TTN v3 uplink message.
///
/// Unknown fields are ignored.
///
/// # Errors
///
/// Returns [`EnvelopeError`] if the JSON is malformed, a required field is
/// missing, the payload is not base64, or the port exceeds a byte.
///
/// # Examples
///
/// ```
/// use schc_gateway::ttn::parse_uplink;
///
/// let raw = br#"{
///     "end_device_ids": {"device_id": "sensor-01"},
///     "uplink_message": {"f_port": 20, "frm_payload": "AA=="}
/// }"#;
/// let uplink = parse_uplink(raw).expect("valid envelope");
/// assert_eq!(uplink.device_id.as_str(), "sensor-01");
/// assert_eq!(uplink.rule_id.get(), 20);
/// assert_eq!(uplink.payload.as_ref(), &[0]);
/// ```
pub fn parse_uplink(raw: &[u8]) -> Result<Uplink, EnvelopeError> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    let device_id = envelope
        .end_device_ids
        .and_then(|ids| ids.device_id)
        .ok_or(EnvelopeError::MissingField("end_device_ids.device_id"))?;
    let message = envelope
        .uplink_message
        .ok_or(EnvelopeError::MissingField("uplink_message"))?;
    let port = message
        .f_port
        .ok_or(EnvelopeError::MissingField("uplink_message.f_port"))?;
    let rule_id = u8::try_from(port)
        .map(RuleId::new)
        .map_err(|_| EnvelopeError::InvalidPort(port))?;
    let encoded = message
        .frm_payload
        .ok_or(EnvelopeError::MissingField("uplink_message.frm_payload"))?;
    let payload = STANDARD.decode(encoded)?;
    Ok(Uplink {
        device_id: DeviceId::from(device_id),
        rule_id,
        payload: Bytes::from(payload),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{EnvelopeError, parse_uplink};

    #[test]
    fn ignores_unrelated_fields() {
        let raw = br#"{
            "end_device_ids": {"device_id": "d", "application_ids": {"application_id": "app"}},
            "received_at": "2024-01-01T00:00:00Z",
            "uplink_message": {"f_port": 20, "frm_payload": "PgECAw==", "rx_metadata": []}
        }"#;
        let uplink = parse_uplink(raw).expect("valid envelope");
        assert_eq!(uplink.payload.as_ref(), &[0x3E, 1, 2, 3]);
    }

    #[rstest]
    #[case(br#"{"uplink_message": {"f_port": 20, "frm_payload": "AA=="}}"#.as_slice(), "end_device_ids.device_id")]
    #[case(br#"{"end_device_ids": {"device_id": "d"}}"#.as_slice(), "uplink_message")]
    #[case(br#"{"end_device_ids": {"device_id": "d"}, "uplink_message": {"frm_payload": "AA=="}}"#.as_slice(), "uplink_message.f_port")]
    #[case(br#"{"end_device_ids": {"device_id": "d"}, "uplink_message": {"f_port": 20}}"#.as_slice(), "uplink_message.frm_payload")]
    fn reports_missing_fields(#[case] raw: &[u8], #[case] field: &str) {
        let err = parse_uplink(raw).expect_err("field is missing");
        assert!(matches!(err, EnvelopeError::MissingField(missing) if missing == field));
    }

    #[test]
    fn rejects_port_above_a_byte() {
        let raw = br#"{"end_device_ids": {"device_id": "d"}, "uplink_message": {"f_port": 300, "frm_payload": "AA=="}}"#;
        assert!(matches!(parse_uplink(raw), Err(EnvelopeError::InvalidPort(300))));
    }

    #[test]
    fn rejects_invalid_base64() {
        let raw = br#"{"end_device_ids": {"device_id": "d"}, "uplink_message": {"f_port": 20, "frm_payload": "!!"}}"#;
        assert!(matches!(parse_uplink(raw), Err(EnvelopeError::Base64(_))));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(parse_uplink(b"not json"), Err(EnvelopeError::Json(_))));
    }
}
