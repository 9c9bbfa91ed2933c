//! Routing of device uplinks to reassembly sessions.
//!
//! The [`Fragmenter`] owns a fixed pool of [`Session`]s. The first fragment
//! from a device claims a free slot and associates the device with it; later
//! fragments follow the association until the session tears down.

mod associations;
mod builder;

use std::sync::Arc;

pub use associations::Associations;
pub use builder::{FragmenterBuilder, FragmenterConfigError};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    codec::RuleId,
    config::FragmentationProfile,
    device::DeviceId,
    error::{GatewayError, Result},
    link::Link,
    metrics,
    session::Session,
    ttn,
};

/// Maps devices to pooled reassembly sessions.
pub struct Fragmenter {
    sessions: Vec<Arc<Session>>,
    associations: Arc<Associations>,
    profile: FragmentationProfile,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Fragmenter {
    /// Start configuring a fragmenter that sends ACKs over `link`.
    #[must_use]
    pub fn builder(link: Arc<dyn Link>) -> FragmenterBuilder { FragmenterBuilder::new(link) }

    /// Parse a TTN uplink envelope and dispatch its fragment.
    ///
    /// Returns the slot that received the fragment. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Envelope`] if the envelope is invalid, or any
    /// error from [`dispatch`](Self::dispatch).
    pub fn listen_message(&self, raw: &[u8]) -> Result<usize> {
        let uplink = ttn::parse_uplink(raw)?;
        self.dispatch(uplink.device_id, uplink.rule_id, uplink.payload)
    }

    /// Route a fragment from `device` to its session, claiming a free slot
    /// for devices without one.
    ///
    /// Returns the slot that received the fragment. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionPoolExhausted`] if the device has no
    /// session and every slot is busy, or an error from
    /// [`Session::process_message`].
    pub fn dispatch(&self, device: DeviceId, rule_id: RuleId, payload: Bytes) -> Result<usize> {
        let slot = match self.associations.entry(device.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let Some(session) = self.sessions.iter().find(|session| session.try_claim(&device))
                else {
                    warn!(%device, capacity = self.sessions.len(), "session pool exhausted");
                    metrics::inc_errors("pool_exhausted");
                    return Err(GatewayError::SessionPoolExhausted {
                        capacity: self.sessions.len(),
                    });
                };
                info!(
                    %device,
                    slot = session.slot(),
                    direction = %session.direction(),
                    "associated device with session"
                );
                *entry.insert(session.slot())
            }
        };
        let session = self
            .sessions
            .get(slot)
            .ok_or_else(|| GatewayError::SessionNotRunning {
                slot,
                device: device.clone(),
            })?;
        debug!(%device, slot, %rule_id, "dispatching fragment");
        session.process_message(&device, rule_id, payload)?;
        Ok(slot)
    }

    /// Remove the association of `device`.
    ///
    /// The session's worker keeps running until it ends or the fragmenter
    /// shuts down; later fragments from the device start a new session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AssociationNotFound`] if the device has no
    /// association.
    pub fn disassociate(&self, device: &DeviceId) -> Result<usize> {
        self.associations.disassociate(device)
    }

    /// Slot currently associated with `device`.
    #[must_use]
    pub fn session_for(&self, device: &DeviceId) -> Option<usize> { self.associations.get(device) }

    /// Session at `slot`.
    #[must_use]
    pub fn session(&self, slot: usize) -> Option<&Arc<Session>> { self.sessions.get(slot) }

    /// Number of slots claimed by a device.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|session| session.is_running())
            .count()
    }

    #[must_use]
    pub fn pool_size(&self) -> usize { self.sessions.len() }

    #[must_use]
    pub fn profile(&self) -> &FragmentationProfile { &self.profile }

    #[must_use]
    pub fn associations(&self) -> &Associations { &self.associations }

    /// Cancel every worker and wait for all sessions to tear down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("fragmenter stopped");
    }
}

impl std::fmt::Debug for Fragmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragmenter")
            .field("pool_size", &self.sessions.len())
            .field("associations", &self.associations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::Fragmenter;
    use crate::{codec::RuleId, device::DeviceId, error::GatewayError, ttn::JsonLinesLink};

    fn fragmenter(pool_size: usize) -> Fragmenter {
        Fragmenter::builder(Arc::new(JsonLinesLink::new("app", Vec::new())))
            .pool_size(pool_size)
            .build()
            .expect("valid configuration")
    }

    fn first_tile() -> Bytes {
        let mut frame = vec![0x3E];
        frame.extend_from_slice(&[1; 10]);
        Bytes::from(frame)
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn exhausted_pool_is_logged() {
        let fragmenter = fragmenter(1);
        let rule = RuleId::new(20);
        fragmenter
            .dispatch(DeviceId::from("a"), rule, first_tile())
            .expect("free slot");
        let err = fragmenter
            .dispatch(DeviceId::from("b"), rule, first_tile())
            .expect_err("pool is busy");
        assert!(matches!(err, GatewayError::SessionPoolExhausted { capacity: 1 }));
        assert!(logs_contain("session pool exhausted"));
        fragmenter.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn listen_message_routes_by_device() {
        let fragmenter = fragmenter(2);
        let raw = br#"{"end_device_ids":{"device_id":"d1"},"uplink_message":{"f_port":20,"frm_payload":"PgEBAQEBAQEBAQE="}}"#;
        assert_eq!(fragmenter.listen_message(raw).expect("routed"), 0);
        assert_eq!(fragmenter.session_for(&DeviceId::from("d1")), Some(0));
        assert_eq!(fragmenter.active_sessions(), 1);
        fragmenter.shutdown().await;
    }
}
