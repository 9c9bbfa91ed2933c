use std::fmt;

/// Receiver state of one reassembly session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReceiverState {
    /// No fragment seen yet; storage not allocated.
    #[default]
    Init,
    /// Accepting tiles of the current window.
    ReceivingWindow,
    /// An incomplete ACK was sent; waiting for retransmissions.
    WaitingForMissingFragments,
    /// The message was reassembled and verified.
    Ended,
    /// The session was aborted.
    TerminateAll,
}

impl ReceiverState {
    /// Report whether the session can accept no further fragments.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ReceiverState::Ended | ReceiverState::TerminateAll)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ReceiverState::Init => "init",
            ReceiverState::ReceivingWindow => "receiving_window",
            ReceiverState::WaitingForMissingFragments => "waiting_for_missing_fragments",
            ReceiverState::Ended => "ended",
            ReceiverState::TerminateAll => "terminate_all",
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
