#![cfg(feature = "metrics")]
//! Tests for `schc_gateway` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use bytes::Bytes;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use schc_gateway::{
    DeviceId,
    ReassemblyMachine,
    codec::{FragmentKind, RuleId, checksum},
    config::{AckMode, FragmentationProfile},
    metrics,
};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_with_label(snapshotter: &Snapshotter, name: &str, key: &str, value: &str) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && k.key().labels().any(|l| l.key() == key && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(FragmentKind::Regular, "regular")]
#[case(FragmentKind::All1, "all1")]
#[case(FragmentKind::AckRequest, "ack_request")]
fn fragment_metric_is_labelled_by_kind(#[case] kind: FragmentKind, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_fragments(kind));
    assert_eq!(
        counter_with_label(&snapshotter, metrics::FRAGMENTS_RECEIVED, "kind", label),
        1
    );
}

#[test]
fn session_gauge_tracks_claims() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_sessions();
        metrics::inc_sessions();
        metrics::dec_sessions();
    });
    let found = snapshotter.snapshot().into_vec().into_iter().any(|(k, _, _, v)| {
        k.key().name() == metrics::SESSIONS_ACTIVE
            && matches!(v, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    });
    assert!(found, "active sessions gauge not recorded");
}

#[test]
fn machine_records_acks_and_malformed_fragments() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        let mut machine = ReassemblyMachine::new(
            DeviceId::from("metrics"),
            FragmentationProfile::lorawan_uplink(),
            AckMode::EndOfWindow,
        );
        let _ = machine.handle(RuleId::new(20), Bytes::from_static(&[0x3E, 1, 2, 3]));
        let mut all1 = vec![0x3F];
        all1.extend_from_slice(&checksum(&[5; 10]).to_be_bytes());
        all1.extend_from_slice(&[5; 10]);
        let outcome = machine.handle(RuleId::new(20), Bytes::from(all1));
        assert_eq!(outcome.acks.len(), 1);
    });
    assert_eq!(
        counter_with_label(&snapshotter, metrics::ACKS_SENT, "complete", "true"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshotter, metrics::ERRORS_TOTAL, "kind", "partial_tile"),
        1
    );
}
