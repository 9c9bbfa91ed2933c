//! Observable outcomes of a reassembly session.

use bytes::Bytes;

use super::ReceiverState;
use crate::codec::{CodecError, FragmentKind};

/// Why a fragment was discarded without changing the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The fragment failed to decode.
    Malformed(CodecError),
    /// The session's fault policy discarded it.
    Injected,
    /// The fragment was queued after its session had already stopped.
    SessionEnded,
    /// The fragment kind is not accepted in the current state.
    UnexpectedInState {
        kind: FragmentKind,
        state: ReceiverState,
    },
}

/// Events emitted while a session processes fragments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReassemblyEvent {
    /// The message was reassembled and its RCS verified.
    Completed {
        /// The reassembled message.
        payload: Bytes,
    },
    /// The RCS carried by the All-1 fragment did not match the stored tiles.
    IntegrityFailure {
        window: u8,
        expected: u32,
        computed: u32,
    },
    /// The session was aborted by either side.
    Aborted { kind: FragmentKind },
    /// A fragment was discarded.
    FragmentDropped { reason: DropReason },
}
