//! Tests for the byte-counting pass-through.

use bytes::Bytes;
use gjoll::adapters::{counting, sink};
use gjoll::{Feed, FlowOptions, pipe};

#[tokio::test]
async fn publishes_a_running_total() {
    let counter = counting(FlowOptions::new().name("meter"));
    assert_eq!(counter.total(), 0);

    // A submit resolves once its chunk is processed, so the total is
    // already up to date here.
    counter.deliver(Bytes::from_static(b"hello ")).await.unwrap();
    assert_eq!(counter.total(), 6);

    counter
        .deliver(Bytes::from_static(b"not again!"))
        .await
        .unwrap();
    assert_eq!(counter.total(), 16);
    counter.close();

    let collector = sink();
    pipe(counter.clone(), collector.clone()).await.unwrap();
    assert_eq!(&collector.collected()[..], b"hello not again!");
    assert_eq!(counter.total(), 16);
}

#[tokio::test]
async fn watchers_see_updates() {
    let counter = counting(FlowOptions::new());
    let mut updates = counter.updates();

    counter.deliver(Bytes::from_static(b"abcd")).await.unwrap();
    updates.changed().await.unwrap();
    assert_eq!(*updates.borrow_and_update(), 4);
}
