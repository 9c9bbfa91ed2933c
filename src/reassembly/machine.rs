//! Ack-on-Error receiver state machine.
//!
//! The machine is synchronous: every call consumes one fragment and returns
//! the ACK frames to transmit and the events raised. The
//! [`worker`](super::worker) drives it from a queue and performs the I/O.

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::{
    DropReason,
    FaultPolicy,
    NoFaults,
    ReassemblyEvent,
    ReceiverState,
    storage::TileStore,
};
use crate::{
    codec::{self, AckFrame, Bitmap, Fragment, FragmentKind, RuleId},
    config::{AckMode, FragmentationProfile},
    device::DeviceId,
    metrics,
};

/// ACK frames and events produced by one step of the machine.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// ACKs to send, in order.
    pub acks: Vec<AckFrame>,
    /// Events raised while processing.
    pub events: Vec<ReassemblyEvent>,
}

/// Receiver side of one SCHC fragmentation session.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use schc_gateway::{
///     codec::{RuleId, checksum},
///     config::{AckMode, FragmentationProfile},
///     device::DeviceId,
///     reassembly::{ReassemblyMachine, ReceiverState},
/// };
///
/// let profile = FragmentationProfile::lorawan_uplink();
/// let mut machine = ReassemblyMachine::new(DeviceId::from("dev"), profile, AckMode::EndOfWindow);
///
/// // A single All-1 fragment carrying the whole message.
/// let message = b"hi";
/// let mut frame = vec![0b0011_1111];
/// frame.extend_from_slice(&checksum(message).to_be_bytes());
/// frame.extend_from_slice(message);
///
/// let outcome = machine.handle(RuleId::new(20), Bytes::from(frame));
/// assert_eq!(machine.state(), ReceiverState::Ended);
/// assert!(outcome.acks[0].is_complete());
/// ```
pub struct ReassemblyMachine {
    device: DeviceId,
    profile: FragmentationProfile,
    mode: AckMode,
    state: ReceiverState,
    store: Option<TileStore>,
    rcs: Option<u32>,
    all1_window: Option<u8>,
    last_window: u8,
    last_confirmed_window: u8,
    awaiting_pull: bool,
    faults: Box<dyn FaultPolicy>,
}

impl ReassemblyMachine {
    /// Create a machine in [`ReceiverState::Init`]. Storage is allocated when
    /// the first fragment arrives.
    #[must_use]
    pub fn new(device: DeviceId, profile: FragmentationProfile, mode: AckMode) -> Self {
        Self {
            device,
            profile,
            mode,
            state: ReceiverState::Init,
            store: None,
            rcs: None,
            all1_window: None,
            last_window: 0,
            last_confirmed_window: 0,
            awaiting_pull: false,
            faults: Box::new(NoFaults),
        }
    }

    /// Install a fault policy consulted before each fragment is processed.
    #[must_use]
    pub fn with_fault_policy(mut self, policy: Box<dyn FaultPolicy>) -> Self {
        self.faults = policy;
        self
    }

    #[must_use]
    pub fn device(&self) -> &DeviceId { &self.device }

    #[must_use]
    pub fn state(&self) -> ReceiverState { self.state }

    #[must_use]
    pub fn mode(&self) -> AckMode { self.mode }

    /// Report whether the session has ended or been aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.state.is_terminal() }

    /// Bitmap of `window`, once storage exists.
    #[must_use]
    pub fn bitmap(&self, window: u8) -> Option<&Bitmap> {
        self.store.as_ref().and_then(|store| store.bitmap(window))
    }

    /// Highest window seen so far.
    #[must_use]
    pub fn last_window(&self) -> u8 { self.last_window }

    /// One past the highest tile index stored so far.
    #[must_use]
    pub fn next_tile(&self) -> usize { self.store.as_ref().map_or(0, TileStore::next_tile) }

    /// Decode `buffer` and process the resulting fragment.
    ///
    /// Malformed fragments are dropped and reported as
    /// [`DropReason::Malformed`].
    pub fn handle(&mut self, rule_id: RuleId, buffer: Bytes) -> Outcome {
        match codec::decode(&self.profile, rule_id, buffer) {
            Ok(fragment) => self.handle_fragment(fragment),
            Err(err) => {
                warn!(device = %self.device, %rule_id, error = %err, "dropping malformed fragment");
                metrics::inc_errors(err.as_str());
                Outcome {
                    acks: Vec::new(),
                    events: vec![ReassemblyEvent::FragmentDropped {
                        reason: DropReason::Malformed(err),
                    }],
                }
            }
        }
    }

    /// Process an already decoded fragment.
    pub fn handle_fragment(&mut self, fragment: Fragment) -> Outcome {
        let mut out = Outcome::default();
        let kind = fragment.kind();
        metrics::inc_fragments(kind);

        if self.faults.should_drop(&fragment, self.state) {
            info!(device = %self.device, %kind, window = ?fragment.window(), "fault policy dropped fragment");
            out.events.push(ReassemblyEvent::FragmentDropped {
                reason: DropReason::Injected,
            });
            return out;
        }

        if self.state.is_terminal() {
            if kind == FragmentKind::AckRequest {
                debug!(device = %self.device, state = %self.state, "ack request after session end");
            } else {
                warn!(device = %self.device, %kind, state = %self.state, "unexpected fragment");
                metrics::inc_errors("unexpected_fragment");
            }
            out.events.push(ReassemblyEvent::FragmentDropped {
                reason: DropReason::UnexpectedInState {
                    kind,
                    state: self.state,
                },
            });
            return out;
        }

        match fragment {
            Fragment::SenderAbort { .. } | Fragment::ReceiverAbort => self.on_abort(kind, &mut out),
            fragment => {
                if self.state == ReceiverState::Init {
                    debug!(device = %self.device, tiles = self.profile.total_tiles(), "allocating tile storage");
                    self.store = Some(TileStore::new(&self.profile));
                    self.transition(ReceiverState::ReceivingWindow);
                }
                match fragment {
                    Fragment::Regular {
                        window,
                        fcn,
                        payload,
                    } => self.on_regular(window, fcn, &payload, &mut out),
                    Fragment::All1 {
                        window,
                        rcs,
                        payload,
                        ..
                    } => self.on_all1(window, rcs, payload, &mut out),
                    Fragment::AckRequest { window } => self.on_ack_request(window, &mut out),
                    Fragment::SenderAbort { .. } | Fragment::ReceiverAbort => {}
                }
            }
        }
        out
    }

    fn on_regular(&mut self, window: u8, fcn: u8, payload: &[u8], out: &mut Outcome) {
        if usize::from(fcn) >= self.profile.window_size() {
            warn!(device = %self.device, window, fcn, "fcn outside window");
            return;
        }
        let first_tile = self.profile.tile_index(window, fcn);
        let Some(count) = self
            .store
            .as_mut()
            .and_then(|store| store.store_tiles(first_tile, payload))
        else {
            warn!(device = %self.device, window, fcn, "tiles outside session storage");
            return;
        };
        let last_touched = (first_tile + count.saturating_sub(1)) / self.profile.window_size();
        self.last_window = self
            .last_window
            .max(u8::try_from(last_touched).unwrap_or(u8::MAX));
        debug!(
            device = %self.device,
            window,
            fcn,
            tiles = count,
            bitmap = %self.bitmap_string(window),
            "stored tiles"
        );

        match (self.state, self.mode) {
            (ReceiverState::ReceivingWindow, AckMode::EndOfWindow) => {
                let complete = self.window_complete(window);
                if usize::from(fcn) < count || complete {
                    self.send_ack(window, complete, true, out);
                    if !complete {
                        self.transition(ReceiverState::WaitingForMissingFragments);
                    }
                }
            }
            (ReceiverState::WaitingForMissingFragments, mode) => {
                if self.integrity_ok() {
                    self.complete(out);
                    return;
                }
                if !self.window_complete(window) {
                    return;
                }
                match mode {
                    AckMode::EndOfWindow => {
                        let complete = self.window_confirmed(window);
                        self.send_ack(window, complete, true, out);
                        // After a failed All-1 only a passing RCS ends the wait.
                        if self.all1_window.is_none() {
                            self.transition(ReceiverState::ReceivingWindow);
                        }
                    }
                    AckMode::EndOfSession => {
                        if let Some(next) = self.first_unconfirmed(window.saturating_add(1)) {
                            self.send_ack(next, false, true, out);
                            self.last_confirmed_window = next;
                        }
                    }
                    AckMode::Compound => {}
                }
            }
            _ => {}
        }
    }

    fn on_all1(&mut self, window: u8, rcs: u32, payload: Bytes, out: &mut Outcome) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        store.store_last_tile(window, payload);
        let computed = store.checksum();
        self.rcs = Some(rcs);
        self.all1_window = Some(window);
        self.last_window = window;

        if computed == rcs {
            info!(device = %self.device, window, rcs, "integrity check passed");
            self.complete(out);
            return;
        }

        warn!(device = %self.device, window, expected = rcs, computed, "integrity check failed");
        metrics::inc_errors("integrity");
        out.events.push(ReassemblyEvent::IntegrityFailure {
            window,
            expected: rcs,
            computed,
        });
        match self.mode {
            AckMode::EndOfWindow => self.send_ack(window, false, false, out),
            AckMode::EndOfSession => {
                self.send_session_ack(self.last_confirmed_window, out);
            }
            AckMode::Compound => {
                self.send_compound_ack(out);
            }
        }
        self.transition(ReceiverState::WaitingForMissingFragments);
    }

    fn on_ack_request(&mut self, window: u8, out: &mut Outcome) {
        if self.awaiting_pull {
            self.awaiting_pull = false;
            debug!(device = %self.device, window, "discarding pull ack request");
            return;
        }
        debug!(device = %self.device, window, state = %self.state, "ack request");
        if self.integrity_ok() {
            self.complete(out);
            return;
        }
        let complete = match self.mode {
            AckMode::EndOfWindow => {
                let complete = self.window_confirmed(window);
                self.send_ack(window, complete, true, out);
                complete
            }
            AckMode::EndOfSession => self.send_session_ack(self.last_confirmed_window, out),
            AckMode::Compound => self.send_compound_ack(out),
        };
        if !complete {
            self.transition(ReceiverState::WaitingForMissingFragments);
        }
    }

    fn on_abort(&mut self, kind: FragmentKind, out: &mut Outcome) {
        info!(device = %self.device, %kind, state = %self.state, "session aborted");
        out.events.push(ReassemblyEvent::Aborted { kind });
        self.transition(ReceiverState::TerminateAll);
    }

    fn complete(&mut self, out: &mut Outcome) {
        let window = self.all1_window.unwrap_or(self.last_window);
        self.send_ack(window, true, true, out);
        let payload = self
            .store
            .as_ref()
            .map_or_else(Bytes::new, TileStore::reassembled);
        info!(device = %self.device, bytes = payload.len(), "message reassembled");
        debug!(device = %self.device, payload = ?payload, "reassembled payload");
        out.events.push(ReassemblyEvent::Completed { payload });
        self.transition(ReceiverState::Ended);
    }

    /// Send an ACK for the first unconfirmed window at or after `from`, or
    /// for the last window when all are confirmed. Returns the `c` bit sent.
    fn send_session_ack(&mut self, from: u8, out: &mut Outcome) -> bool {
        let target = self.first_unconfirmed(from).unwrap_or(self.last_window);
        let complete = self.window_confirmed(target);
        self.send_ack(target, complete, true, out);
        self.last_confirmed_window = target;
        complete
    }

    /// Send one compound ACK covering every unconfirmed window. Returns
    /// `true` when no window was missing tiles.
    fn send_compound_ack(&mut self, out: &mut Outcome) -> bool {
        let incomplete: Vec<u8> = (self.last_confirmed_window..=self.last_window)
            .filter(|window| !self.window_confirmed(*window))
            .collect();
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        match codec::encode_compound_ack(
            &self.profile,
            self.profile.uplink_rule(),
            self.last_window,
            &incomplete,
            store.bitmaps(),
        ) {
            Ok(ack) => {
                info!(device = %self.device, windows = ?incomplete, "sending compound ack");
                self.push_ack(ack, out);
            }
            Err(err) => {
                error!(device = %self.device, error = %err, "failed to encode compound ack");
                metrics::inc_errors(err.as_str());
            }
        }
        incomplete.is_empty()
    }

    fn send_ack(&mut self, window: u8, complete: bool, compress: bool, out: &mut Outcome) {
        let Some(bitmap) = self.bitmap(window) else {
            warn!(device = %self.device, window, "no bitmap for window");
            return;
        };
        match codec::encode_ack(
            &self.profile,
            self.profile.uplink_rule(),
            window,
            complete,
            bitmap,
            compress,
        ) {
            Ok(ack) => {
                info!(device = %self.device, window, complete, %bitmap, "sending ack");
                self.push_ack(ack, out);
            }
            Err(err) => {
                error!(device = %self.device, window, error = %err, "failed to encode ack");
                metrics::inc_errors(err.as_str());
            }
        }
    }

    fn push_ack(&mut self, ack: AckFrame, out: &mut Outcome) {
        metrics::inc_acks(ack.is_complete());
        out.acks.push(ack);
        self.awaiting_pull = true;
    }

    fn transition(&mut self, next: ReceiverState) {
        if self.state != next {
            debug!(device = %self.device, from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    fn window_complete(&self, window: u8) -> bool {
        self.store
            .as_ref()
            .is_some_and(|store| store.window_complete(window))
    }

    fn integrity_ok(&self) -> bool {
        match (self.rcs, self.store.as_ref()) {
            (Some(rcs), Some(store)) => store.checksum() == rcs,
            _ => false,
        }
    }

    /// The All-1 window is confirmed by the RCS, every other window by its
    /// bitmap.
    fn window_confirmed(&self, window: u8) -> bool {
        if self.all1_window == Some(window) {
            self.integrity_ok()
        } else {
            self.window_complete(window)
        }
    }

    fn first_unconfirmed(&self, from: u8) -> Option<u8> {
        (from..=self.last_window).find(|window| !self.window_confirmed(*window))
    }

    fn bitmap_string(&self, window: u8) -> String {
        self.bitmap(window).map(ToString::to_string).unwrap_or_default()
    }
}

impl std::fmt::Debug for ReassemblyMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassemblyMachine")
            .field("device", &self.device)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("last_window", &self.last_window)
            .field("last_confirmed_window", &self.last_confirmed_window)
            .finish_non_exhaustive()
    }
}
