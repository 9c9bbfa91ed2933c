//! Unit tests for the receiver state machine.

use bytes::Bytes;
use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::*;
use crate::{
    codec::{CodecError, Fragment, FragmentKind, RuleId, checksum},
    config::{AckMode, FragmentationProfile},
    device::DeviceId,
};

const RULE: RuleId = RuleId::new(20);
const TILE: usize = 10;
const WINDOW: usize = 63;

#[expect(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn profile() -> FragmentationProfile { FragmentationProfile::lorawan_uplink() }

fn machine(mode: AckMode) -> ReassemblyMachine {
    ReassemblyMachine::new(
        DeviceId::from("dev-1"),
        FragmentationProfile::lorawan_uplink(),
        mode,
    )
}

fn message(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).expect("below 256"))
        .collect()
}

/// Sender-side view of a message: full tiles plus the last tile.
struct Tiles<'a> {
    message: &'a [u8],
    regular: usize,
}

impl<'a> Tiles<'a> {
    fn new(message: &'a [u8]) -> Self {
        let regular = message.len().div_ceil(TILE) - 1;
        Self { message, regular }
    }

    fn position(index: usize) -> (u8, u8) {
        let window = u8::try_from(index / WINDOW).expect("window fits");
        let fcn = u8::try_from(WINDOW - 1 - index % WINDOW).expect("fcn fits");
        (window, fcn)
    }

    fn regular(&self, index: usize) -> Bytes {
        let (window, fcn) = Self::position(index);
        let mut frame = vec![(window << 6) | fcn];
        frame.extend_from_slice(&self.message[index * TILE..(index + 1) * TILE]);
        Bytes::from(frame)
    }

    fn all1_window(&self) -> u8 { Self::position(self.regular).0 }

    fn all1(&self) -> Bytes {
        let mut frame = vec![(self.all1_window() << 6) | 0b0011_1111];
        frame.extend_from_slice(&checksum(self.message).to_be_bytes());
        frame.extend_from_slice(&self.message[self.regular * TILE..]);
        Bytes::from(frame)
    }
}

fn ack_request(window: u8) -> Bytes { Bytes::from(vec![window << 6]) }

fn completed_payload(outcome: &Outcome) -> Option<&Bytes> {
    outcome.events.iter().find_map(|event| match event {
        ReassemblyEvent::Completed { payload } => Some(payload),
        _ => None,
    })
}

#[rstest]
#[case(AckMode::EndOfWindow)]
#[case(AckMode::EndOfSession)]
#[case(AckMode::Compound)]
fn reassembles_message_in_every_mode(#[case] mode: AckMode) {
    let data = message(25);
    let tiles = Tiles::new(&data);
    let mut machine = machine(mode);

    for index in 0..tiles.regular {
        let outcome = machine.handle(RULE, tiles.regular(index));
        assert!(outcome.acks.is_empty());
    }
    let outcome = machine.handle(RULE, tiles.all1());

    assert_eq!(machine.state(), ReceiverState::Ended);
    assert_eq!(outcome.acks.len(), 1);
    assert!(outcome.acks[0].is_complete());
    assert_eq!(outcome.acks[0].bytes().as_ref(), &[0b0010_0000]);
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn multi_tile_fragment_spans_windows() {
    let data = message(130 * TILE + 3);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfSession);

    for index in 0..61 {
        machine.handle(RULE, tiles.regular(index));
    }
    // 66 tiles starting at window 0, fcn 1 reach into window 2.
    let mut frame = vec![0b0000_0001];
    frame.extend_from_slice(&data[61 * TILE..127 * TILE]);
    let outcome = machine.handle(RULE, Bytes::from(frame));

    assert!(outcome.acks.is_empty());
    assert_eq!(machine.last_window(), 2);
    assert!(machine.bitmap(0).expect("window 0").is_complete());
    assert!(machine.bitmap(1).expect("window 1").is_complete());
    assert!(machine.bitmap(2).expect("window 2").get(0));
    assert_eq!(machine.next_tile(), 127);
}

#[test]
fn missing_tile_yields_single_zero_in_bitmap() {
    let data = message(WINDOW * TILE + 5);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow);

    let mut acks = Vec::new();
    for index in (0..WINDOW).filter(|index| *index != 57) {
        acks.extend(machine.handle(RULE, tiles.regular(index)).acks);
    }

    assert_eq!(acks.len(), 1);
    let ack = &acks[0];
    assert!(!ack.is_complete());
    assert_eq!(ack.window(), 0);
    let mut expected = vec![0x1F];
    expected.extend_from_slice(&[0xFF; 6]);
    expected.push(0xF7);
    assert_eq!(ack.bytes().as_ref(), expected.as_slice());

    let bitmap = machine.bitmap(0).expect("window 0");
    assert_eq!(bitmap.missing().collect::<Vec<_>>(), vec![57]);
    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );

    let outcome = machine.handle(RULE, tiles.regular(57));
    assert_eq!(outcome.acks.len(), 1);
    assert!(outcome.acks[0].is_complete());
    assert_eq!(machine.state(), ReceiverState::ReceivingWindow);

    let outcome = machine.handle(RULE, tiles.all1());
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn checksum_failure_requests_missing_tiles() {
    let data = message(3 * TILE + 4);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow);

    machine.handle(RULE, tiles.regular(0));
    machine.handle(RULE, tiles.regular(2));
    let outcome = machine.handle(RULE, tiles.all1());

    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );
    assert!(matches!(
        outcome.events.as_slice(),
        [ReassemblyEvent::IntegrityFailure { window: 0, .. }]
    ));
    assert_eq!(outcome.acks.len(), 1);
    let ack = &outcome.acks[0];
    assert!(!ack.is_complete());
    // Uncompressed: 3 header bits plus the full 63-bit bitmap.
    assert_eq!(ack.bytes().len(), 9);
    assert_eq!(ack.bytes()[0], 0b0001_0100);

    let outcome = machine.handle(RULE, tiles.regular(1));
    assert_eq!(machine.state(), ReceiverState::Ended);
    assert!(outcome.acks[0].is_complete());
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

fn corrupted(frame: &Bytes) -> Bytes {
    let mut bytes = frame.to_vec();
    bytes[1] ^= 0xFF;
    Bytes::from(bytes)
}

#[rstest]
#[case(AckMode::EndOfWindow)]
#[case(AckMode::EndOfSession)]
#[case(AckMode::Compound)]
fn corrupted_byte_fails_integrity_until_tile_is_resent(#[case] mode: AckMode) {
    let data = message(700);
    let tiles = Tiles::new(&data);
    let mut machine = machine(mode);

    for index in 0..tiles.regular {
        let frame = tiles.regular(index);
        let frame = if index == 3 { corrupted(&frame) } else { frame };
        machine.handle(RULE, frame);
    }
    let outcome = machine.handle(RULE, tiles.all1());

    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );
    assert!(matches!(
        outcome.events.as_slice(),
        [ReassemblyEvent::IntegrityFailure { window: 1, .. }]
    ));
    assert_eq!(outcome.acks.len(), 1);
    assert!(!outcome.acks[0].is_complete());
    assert_eq!(outcome.acks[0].window(), 1);

    let outcome = machine.handle(RULE, tiles.regular(3));
    assert_eq!(machine.state(), ReceiverState::Ended);
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn end_of_window_keeps_waiting_while_integrity_fails() {
    let data = message(700);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow);

    for index in 0..tiles.regular {
        let frame = tiles.regular(index);
        let frame = if index == 3 || index == 10 {
            corrupted(&frame)
        } else {
            frame
        };
        machine.handle(RULE, frame);
    }
    machine.handle(RULE, tiles.all1());

    let outcome = machine.handle(RULE, tiles.regular(3));
    assert_eq!(outcome.acks.len(), 1);
    assert!(outcome.acks[0].is_complete(), "window 0 bitmap is full");
    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );

    let outcome = machine.handle(RULE, tiles.regular(10));
    assert_eq!(machine.state(), ReceiverState::Ended);
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn redelivered_fragment_changes_nothing() {
    let data = message(4 * TILE + 1);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfSession);

    machine.handle(RULE, tiles.regular(0));
    machine.handle(RULE, tiles.regular(1));
    let before = machine.bitmap(0).cloned();
    let next_tile = machine.next_tile();

    let outcome = machine.handle(RULE, tiles.regular(1));
    assert_eq!(outcome, Outcome::default());
    assert_eq!(machine.bitmap(0).cloned(), before);
    assert_eq!(machine.next_tile(), next_tile);

    for index in 2..tiles.regular {
        machine.handle(RULE, tiles.regular(index));
    }
    let outcome = machine.handle(RULE, tiles.all1());
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn ack_request_after_ack_is_treated_as_pull() {
    let data = message(WINDOW * TILE + 5);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow);
    for index in (0..WINDOW).filter(|index| *index != 3) {
        machine.handle(RULE, tiles.regular(index));
    }

    let pulled = machine.handle(RULE, ack_request(0));
    assert!(pulled.acks.is_empty());

    let resent = machine.handle(RULE, ack_request(0));
    assert_eq!(resent.acks.len(), 1);
    assert!(!resent.acks[0].is_complete());
    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );
}

#[test]
fn end_of_session_acks_windows_in_turn() {
    let data = message(66 * TILE + 2);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfSession);

    for index in (0..tiles.regular).filter(|index| ![10, 64].contains(index)) {
        assert!(machine.handle(RULE, tiles.regular(index)).acks.is_empty());
    }
    let outcome = machine.handle(RULE, tiles.all1());
    assert_eq!(outcome.acks.len(), 1);
    assert_eq!(outcome.acks[0].window(), 0);
    assert!(!outcome.acks[0].is_complete());

    let outcome = machine.handle(RULE, tiles.regular(10));
    assert_eq!(outcome.acks.len(), 1);
    assert_eq!(outcome.acks[0].window(), 1);
    assert!(!outcome.acks[0].is_complete());
    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );

    let outcome = machine.handle(RULE, tiles.regular(64));
    assert_eq!(machine.state(), ReceiverState::Ended);
    assert_eq!(outcome.acks[0].window(), 1);
    assert!(outcome.acks[0].is_complete());
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[test]
fn compound_ack_reports_both_incomplete_windows() {
    let data = message(66 * TILE + 2);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::Compound);

    for index in (0..tiles.regular).filter(|index| ![52, 64].contains(index)) {
        machine.handle(RULE, tiles.regular(index));
    }
    let outcome = machine.handle(RULE, tiles.all1());

    assert_eq!(outcome.acks.len(), 1);
    let ack = &outcome.acks[0];
    assert!(!ack.is_complete());
    assert_eq!(ack.window(), 0);
    // Header, bitmap 0, window field and bitmap 1 round up to 17 bytes.
    assert_eq!(ack.bytes().len(), 17);
    assert_eq!(ack.bytes()[8], 0b1101_1010);
    assert_eq!(ack.bytes()[16], 0b0010_0000);

    machine.handle(RULE, tiles.regular(52));
    assert_eq!(
        machine.state(),
        ReceiverState::WaitingForMissingFragments
    );
    let outcome = machine.handle(RULE, tiles.regular(64));
    assert_eq!(machine.state(), ReceiverState::Ended);
    assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
}

#[rstest]
#[case(Bytes::from_static(&[0b0011_1111]), FragmentKind::SenderAbort)]
#[case(Bytes::from_static(&[0b0111_1111]), FragmentKind::SenderAbort)]
fn abort_terminates_without_ack(#[case] frame: Bytes, #[case] kind: FragmentKind) {
    let data = message(3 * TILE);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow);
    machine.handle(RULE, tiles.regular(0));

    let outcome = machine.handle(RULE, frame);
    assert!(outcome.acks.is_empty());
    assert_eq!(outcome.events, vec![ReassemblyEvent::Aborted { kind }]);
    assert_eq!(machine.state(), ReceiverState::TerminateAll);

    let outcome = machine.handle(RULE, tiles.regular(1));
    assert_eq!(
        outcome.events,
        vec![ReassemblyEvent::FragmentDropped {
            reason: DropReason::UnexpectedInState {
                kind: FragmentKind::Regular,
                state: ReceiverState::TerminateAll,
            }
        }]
    );
}

#[rstest]
fn receiver_abort_on_downlink_rule(profile: FragmentationProfile) {
    let mut machine = machine(AckMode::EndOfWindow);
    let outcome = machine.handle(profile.downlink_rule(), Bytes::from_static(&[0xFF]));
    assert_eq!(
        outcome.events,
        vec![ReassemblyEvent::Aborted {
            kind: FragmentKind::ReceiverAbort
        }]
    );
    assert!(machine.is_finished());
}

#[test]
fn malformed_fragment_is_dropped_and_reported() {
    let mut machine = machine(AckMode::EndOfWindow);
    let outcome = machine.handle(RULE, Bytes::from_static(&[0b0011_1110, 1, 2, 3]));
    assert_eq!(
        outcome.events,
        vec![ReassemblyEvent::FragmentDropped {
            reason: DropReason::Malformed(CodecError::PartialTile {
                payload_len: 3,
                tile_size: TILE
            })
        }]
    );
    assert_eq!(machine.state(), ReceiverState::Init);
}

#[test]
fn fault_policy_drops_chosen_fragment() {
    let data = message(WINDOW * TILE + 5);
    let tiles = Tiles::new(&data);
    let mut machine = machine(AckMode::EndOfWindow).with_fault_policy(Box::new(
        |fragment: &Fragment, _state: ReceiverState| {
            matches!(fragment, Fragment::Regular { fcn: 5, .. })
        },
    ));

    let mut acks = Vec::new();
    let mut dropped = 0;
    for index in 0..WINDOW {
        let outcome = machine.handle(RULE, tiles.regular(index));
        dropped += outcome
            .events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    ReassemblyEvent::FragmentDropped {
                        reason: DropReason::Injected
                    }
                )
            })
            .count();
        acks.extend(outcome.acks);
    }
    assert_eq!(dropped, 1);
    assert_eq!(acks.len(), 1);
    assert!(!acks[0].is_complete());
    let missing: Vec<usize> = machine.bitmap(0).expect("window 0").missing().collect();
    assert_eq!(missing, vec![57]);
}

proptest! {
    #[test]
    fn arrival_order_does_not_change_result(
        order in Just((0..80_usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let data = message(80 * TILE + 7);
        let tiles = Tiles::new(&data);
        let mut machine = machine(AckMode::EndOfSession);
        for index in order {
            prop_assert!(machine.handle(RULE, tiles.regular(index)).acks.is_empty());
        }
        let outcome = machine.handle(RULE, tiles.all1());
        prop_assert_eq!(machine.state(), ReceiverState::Ended);
        prop_assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
    }

    #[test]
    fn duplicates_do_not_change_result(
        repeats in proptest::collection::vec(0..20_usize, 0..40),
    ) {
        let data = message(20 * TILE + 3);
        let tiles = Tiles::new(&data);
        let mut machine = machine(AckMode::Compound);
        for index in (0..20).chain(repeats) {
            machine.handle(RULE, tiles.regular(index));
        }
        let outcome = machine.handle(RULE, tiles.all1());
        prop_assert_eq!(completed_payload(&outcome).map(Bytes::as_ref), Some(data.as_slice()));
    }
}
