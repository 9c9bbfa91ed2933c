//! Fault injection hook for exercising retransmission paths.

use super::ReceiverState;
use crate::codec::Fragment;

/// Decides whether a decoded fragment is discarded before processing.
///
/// Production sessions use [`NoFaults`]. Tests install policies that drop
/// chosen fragments to force incomplete bitmaps and retransmissions.
pub trait FaultPolicy: Send + 'static {
    /// Return `true` to discard `fragment`.
    fn should_drop(&mut self, fragment: &Fragment, state: ReceiverState) -> bool;
}

/// Policy that never drops a fragment.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn should_drop(&mut self, _fragment: &Fragment, _state: ReceiverState) -> bool { false }
}

impl<F> FaultPolicy for F
where
    F: FnMut(&Fragment, ReceiverState) -> bool + Send + 'static,
{
    fn should_drop(&mut self, fragment: &Fragment, state: ReceiverState) -> bool {
        self(fragment, state)
    }
}
