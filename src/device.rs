//! Device identity.

use std::sync::Arc;

use derive_more::Display;

/// Identifier of an end device, as assigned by the network server.
///
/// Cheap to clone; the string is shared.
///
/// # Examples
///
/// ```
/// use schc_gateway::device::DeviceId;
/// let id = DeviceId::from("sensor-01");
/// assert_eq!(id.as_str(), "sensor-01");
/// assert_eq!(id.to_string(), "sensor-01");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self { Self(Arc::from(value)) }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self { Self(Arc::from(value)) }
}
