//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use bytes::Bytes;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use gjoll::{FlowOptions, GjollError, conduit, telemetry};

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Runs async code within a local recorder scope on the multi-thread
/// runtime. `block_in_place` keeps the sync `with_local_recorder` closure
/// on the current thread while `block_on` drives the inner async work.
fn record<F: Future>(recorder: &DebuggingRecorder, work: F) -> F::Output {
    metrics::with_local_recorder(recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(work))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn completed_stream_records_chunk_and_weight_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    record(&recorder, async {
        let (intake, outlet) = conduit::<Bytes>(FlowOptions::new().name("meter"));
        intake.deliver(Bytes::from_static(b"hello ")).await.unwrap();
        intake.deliver(Bytes::from_static(b"sailor")).await.unwrap();
        intake.close();
        assert_eq!(outlet.acquire(12).await.unwrap().map(|c| c.len()), Some(12));
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::CHUNKS_DELIVERED_TOTAL),
        2
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::WEIGHT_DELIVERED_TOTAL),
        12
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::STREAMS_COMPLETED_TOTAL),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::STAGE_ERRORS_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_stream_records_an_error_counter() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    record(&recorder, async {
        let (intake, outlet) = conduit::<Bytes>(FlowOptions::new().name("doomed"));
        intake.fail(GjollError::upstream("boom"));
        assert!(outlet.ended().await.is_err());
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::STAGE_ERRORS_TOTAL), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::STREAMS_COMPLETED_TOTAL),
        0
    );
}
