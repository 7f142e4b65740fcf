//! Tests for `futures_util::Stream` interop.

use bytes::Bytes;
use futures_util::StreamExt;
use gjoll::adapters::{from_stream, into_stream, source};
use gjoll::{FlowOptions, GjollError, pipe_to_buffer};

#[tokio::test]
async fn from_stream_feeds_a_conduit() {
    let outlet = from_stream(
        tokio_stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"sailor")),
        ]),
        FlowOptions::new(),
    );
    assert_eq!(&pipe_to_buffer(outlet).await.unwrap()[..], b"hello sailor");
}

#[tokio::test]
async fn from_stream_propagates_errors() {
    let outlet = from_stream(
        tokio_stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(GjollError::upstream("feed died")),
        ]),
        FlowOptions::new(),
    );
    assert_eq!(
        outlet.next().await.unwrap(),
        Some(Bytes::from_static(b"ok"))
    );
    assert_eq!(outlet.next().await, Err(GjollError::upstream("feed died")));
}

#[tokio::test]
async fn into_stream_drains_a_tap() {
    let stream = into_stream(source("hello sailor"));
    let chunks: Vec<_> = stream.collect().await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].as_deref(),
        Ok(&b"hello sailor"[..])
    );
}
