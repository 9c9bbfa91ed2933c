//! Fragment queue between the ingestion path and a session worker.
//!
//! Each session owns one bounded FIFO. Any number of producers may hold a
//! cloned [`FragmentSender`]; exactly one [`FragmentReceiver`] consumes it,
//! parking on [`FragmentReceiver::recv`] until a fragment arrives or every
//! sender is gone.

use std::num::NonZeroUsize;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::RuleId;

/// Errors returned when enqueueing a fragment.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was at capacity.
    #[error("fragment queue full")]
    Full,
    /// The consuming worker has stopped.
    #[error("fragment queue closed")]
    Closed,
}

/// A fragment waiting to be processed, with the rule id it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedFragment {
    pub rule_id: RuleId,
    pub buffer: Bytes,
}

impl QueuedFragment {
    #[must_use]
    pub fn new(rule_id: RuleId, buffer: Bytes) -> Self { Self { rule_id, buffer } }

    /// Length of the fragment in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.buffer.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }
}

/// Producer half of a fragment queue.
#[derive(Clone, Debug)]
pub struct FragmentSender(mpsc::Sender<QueuedFragment>);

impl FragmentSender {
    /// Enqueue a fragment without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the queue is at capacity or
    /// [`QueueError::Closed`] if the receiver has been dropped.
    pub fn push(&self, rule_id: RuleId, buffer: Bytes) -> Result<(), QueueError> {
        self.0
            .try_send(QueuedFragment::new(rule_id, buffer))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }

    /// Report whether the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.is_closed() }
}

/// Consumer half of a fragment queue.
#[derive(Debug)]
pub struct FragmentReceiver(mpsc::Receiver<QueuedFragment>);

impl FragmentReceiver {
    /// Wait for the next fragment. Returns `None` once every sender has been
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<QueuedFragment> { self.0.recv().await }

    /// Take the next fragment if one is ready.
    pub fn try_recv(&mut self) -> Option<QueuedFragment> { self.0.try_recv().ok() }

    /// Number of fragments waiting.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Create a fragment queue holding at most `capacity` fragments.
#[must_use]
pub fn fragment_queue(capacity: NonZeroUsize) -> (FragmentSender, FragmentReceiver) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (FragmentSender(tx), FragmentReceiver(rx))
}
