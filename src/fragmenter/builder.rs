//! Builder for configuring a [`Fragmenter`].

use std::{num::NonZeroUsize, sync::Arc};

use thiserror::Error;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Associations, Fragmenter};
use crate::{
    config::{
        AckMode,
        DEFAULT_POOL_SIZE,
        DEFAULT_QUEUE_CAPACITY,
        Direction,
        FragmentationProfile,
    },
    event::EventSink,
    link::Link,
    reassembly::FaultPolicy,
    session::{FaultPolicyFactory, Session, SessionContext},
};

/// Errors returned when building a [`Fragmenter`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FragmenterConfigError {
    /// The session pool must hold at least one slot.
    #[error("invalid pool size {0}; must be >= 1")]
    PoolSize(usize),
    /// Session queues must hold at least one fragment.
    #[error("invalid queue capacity {0}; must be >= 1")]
    QueueCapacity(usize),
}

/// Builder for [`Fragmenter`].
///
/// Defaults: the LoRaWAN uplink profile, per-window ACKs, a pool of
/// [`DEFAULT_POOL_SIZE`] sessions and queues of [`DEFAULT_QUEUE_CAPACITY`]
/// fragments. Construct via [`Fragmenter::builder`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use schc_gateway::{config::AckMode, fragmenter::Fragmenter, ttn::JsonLinesLink};
///
/// let link = Arc::new(JsonLinesLink::new("app@ttn", Vec::new()));
/// let fragmenter = Fragmenter::builder(link)
///     .ack_mode(AckMode::Compound)
///     .pool_size(4)
///     .build()
///     .expect("valid configuration");
/// assert_eq!(fragmenter.pool_size(), 4);
/// ```
pub struct FragmenterBuilder {
    link: Arc<dyn Link>,
    profile: FragmentationProfile,
    ack_mode: AckMode,
    pool_size: usize,
    queue_capacity: usize,
    events: Option<EventSink>,
    fault_policy: Option<FaultPolicyFactory>,
    shutdown: Option<CancellationToken>,
}

impl FragmenterBuilder {
    pub(super) fn new(link: Arc<dyn Link>) -> Self {
        Self {
            link,
            profile: FragmentationProfile::lorawan_uplink(),
            ack_mode: AckMode::default(),
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            events: None,
            fault_policy: None,
            shutdown: None,
        }
    }

    /// Use `profile` for every session.
    #[must_use]
    pub fn profile(mut self, profile: FragmentationProfile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn ack_mode(mut self, mode: AckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    /// Set the number of concurrent sessions.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the depth of each session's fragment queue.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Publish session events to `sink`.
    #[must_use]
    pub fn event_sink(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Install a fault policy in every new session. `factory` runs once per
    /// session.
    #[must_use]
    pub fn fault_policy<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn FaultPolicy> + Send + Sync + 'static,
    {
        self.fault_policy = Some(Arc::new(factory));
        self
    }

    /// Derive worker cancellation from `token` instead of a private one.
    #[must_use]
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Construct the fragmenter and its session pool.
    ///
    /// # Errors
    ///
    /// Returns [`FragmenterConfigError`] if the pool size or queue capacity
    /// is zero.
    pub fn build(self) -> Result<Fragmenter, FragmenterConfigError> {
        let pool_size = NonZeroUsize::new(self.pool_size)
            .ok_or(FragmenterConfigError::PoolSize(self.pool_size))?;
        let queue_capacity = NonZeroUsize::new(self.queue_capacity)
            .ok_or(FragmenterConfigError::QueueCapacity(self.queue_capacity))?;

        let associations = Arc::new(Associations::default());
        let tracker = TaskTracker::new();
        let shutdown = self.shutdown.unwrap_or_default();
        let ctx = Arc::new(SessionContext {
            link: self.link,
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
            events: self.events,
            associations: Arc::clone(&associations),
            fault_policy: self.fault_policy,
            queue_capacity,
        });
        let sessions = (0..pool_size.get())
            .map(|slot| {
                Arc::new(Session::new(
                    slot,
                    Direction::Uplink,
                    self.profile,
                    self.ack_mode,
                    Arc::clone(&ctx),
                ))
            })
            .collect();

        Ok(Fragmenter {
            sessions,
            associations,
            profile: self.profile,
            tracker,
            shutdown,
        })
    }
}
