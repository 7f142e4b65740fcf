//! Tests for welding stages into one duplex.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use gjoll::adapters::source;
use gjoll::{
    Feed, FlowOptions, GjollError, Pull, PullTransform, Push, Tap, Transform, Weld, pipe,
    pipe_to_buffer,
};

fn uppercaser() -> Transform<Bytes, Bytes> {
    Transform::new(
        FlowOptions::new().name("upper"),
        |_: Push<Bytes>, c: Bytes| async move { Ok(Some(Bytes::from(c.to_ascii_uppercase()))) },
    )
}

fn prefixer(prefix: &'static [u8]) -> Transform<Bytes, Bytes> {
    let first = Arc::new(AtomicBool::new(true));
    Transform::new(
        FlowOptions::new().name("prefix"),
        move |push: Push<Bytes>, c: Bytes| {
            let first = first.clone();
            async move {
                if first.swap(false, Ordering::SeqCst) {
                    push.push(Bytes::from_static(prefix)).await?;
                }
                Ok(Some(c))
            }
        },
    )
}

fn suffixer(suffix: &'static [u8]) -> Transform<Bytes, Bytes> {
    Transform::with_flush(
        FlowOptions::new().name("suffix"),
        |_: Push<Bytes>, c: Bytes| async move { Ok(Some(c)) },
        move |push: Push<Bytes>| async move { push.push(Bytes::from_static(suffix)).await },
    )
}

#[tokio::test]
async fn welds_three_stages_into_one_duplex() {
    let weld = Weld::new(uppercaser())
        .then(prefixer(b"<<"))
        .then(suffixer(b">>"));

    let feed = {
        let weld = weld.clone();
        tokio::spawn(pipe(source("hello sailor!"), weld))
    };
    assert_eq!(
        &pipe_to_buffer(weld).await.unwrap()[..],
        b"<<HELLO SAILOR!>>"
    );
    feed.await.unwrap().unwrap();
}

#[tokio::test]
async fn closing_the_weld_reaches_the_first_stage() {
    let weld = Weld::new(uppercaser()).then(suffixer(b"!"));
    weld.deliver(Bytes::from_static(b"hi")).await.unwrap();
    weld.close();

    assert_eq!(
        &pipe_to_buffer(weld).await.unwrap()[..],
        b"HI!"
    );
}

#[tokio::test]
async fn stage_error_propagates_to_the_welded_output() {
    let failing = Transform::new(
        FlowOptions::new().name("failing"),
        |_: Push<Bytes>, _: Bytes| async move { Err(GjollError::transform("stage blew up")) },
    );
    let weld = Weld::new(failing).then(uppercaser());

    let _ = weld.deliver(Bytes::from_static(b"boom")).await;
    assert_eq!(
        weld.ended().await,
        Err(GjollError::transform("stage blew up"))
    );
}

#[tokio::test]
async fn parked_consumer_bounds_production() {
    let passthrough = |name: &str| {
        PullTransform::new(
            FlowOptions::new().high_water_mark(16).name(name),
            |t: Pull<Bytes, Bytes>| async move { t.acquire(1).await },
        )
    };
    let weld = Weld::new(passthrough("stage-a")).then(passthrough("stage-b"));

    let delivered = Arc::new(AtomicU32::new(0));
    let producer = {
        let weld = weld.clone();
        let delivered = delivered.clone();
        tokio::spawn(async move {
            for _ in 0..1000 {
                if weld.deliver(Bytes::from_static(b"x")).await.is_err() {
                    return;
                }
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // Nobody ever reads the welded output; every stage buffer fills to
    // its high-water mark and the producer parks.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let total = delivered.load(Ordering::SeqCst);
    assert!(
        total < 200,
        "producer should park against stage buffers, but delivered {total} chunks"
    );
    assert!(!producer.is_finished());
}
