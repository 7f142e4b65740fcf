//! Tests for the pull transform: serialized acquires, push-back, and
//! delegation.

use std::time::Duration;

use bytes::Bytes;
use gjoll::{Feed, FlowOptions, Item, Pull, PullTransform, Tap};

fn chunk(data: &'static [u8]) -> Bytes {
    Bytes::from_static(data)
}

#[tokio::test]
async fn passthrough_reassembles_the_input() {
    let transform: PullTransform<Bytes, Bytes> =
        PullTransform::new(FlowOptions::new(), |t: Pull<Bytes, Bytes>| async move {
            t.acquire(3).await
        });

    transform.deliver(chunk(b"abcde")).await.unwrap();
    transform.deliver(chunk(b"fghi")).await.unwrap();
    transform.close();

    assert_eq!(
        transform.acquire(9).await.unwrap(),
        Some(chunk(b"abcdefghi"))
    );
    transform.ended().await.unwrap();
}

#[tokio::test]
async fn builds_objects_from_bytes() {
    let transform = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Bytes, Item<String>>| async move {
            match t.acquire(3).await? {
                Some(data) if data.len() == 3 => {
                    Ok(Some(Item(String::from_utf8_lossy(&data).into_owned())))
                }
                _ => Ok(None),
            }
        },
    );

    transform.deliver(chunk(b"abcde")).await.unwrap();
    transform.deliver(chunk(b"fghi")).await.unwrap();
    transform.close();

    assert_eq!(transform.next().await.unwrap(), Some(Item("abc".into())));
    assert_eq!(transform.next().await.unwrap(), Some(Item("def".into())));
    assert_eq!(transform.next().await.unwrap(), Some(Item("ghi".into())));
    assert_eq!(transform.next().await.unwrap(), None);
}

#[tokio::test]
async fn discards_the_truncated_tail() {
    let transform = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Bytes, Item<String>>| async move {
            match t.acquire(3).await? {
                Some(data) if data.len() == 3 => {
                    Ok(Some(Item(String::from_utf8_lossy(&data).into_owned())))
                }
                _ => Ok(None),
            }
        },
    );

    transform.deliver(chunk(b"abcde")).await.unwrap();
    transform.deliver(chunk(b"fg")).await.unwrap();
    transform.close();

    assert_eq!(transform.next().await.unwrap(), Some(Item("abc".into())));
    assert_eq!(transform.next().await.unwrap(), Some(Item("def".into())));
    assert_eq!(transform.next().await.unwrap(), None);
}

#[tokio::test]
async fn breaks_objects_down_into_bytes() {
    let transform = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Item<String>, Bytes>| async move {
            match t.acquire(1).await? {
                Some(Item(value)) => Ok(Some(Bytes::from(value))),
                None => Ok(None),
            }
        },
    );

    transform.deliver(Item("abcde".to_owned())).await.unwrap();
    transform.deliver(Item("fg".to_owned())).await.unwrap();
    transform.close();

    assert_eq!(transform.next().await.unwrap(), Some(chunk(b"abcde")));
    assert_eq!(transform.next().await.unwrap(), Some(chunk(b"fg")));
    assert_eq!(transform.next().await.unwrap(), None);
}

#[tokio::test]
async fn accumulates_across_many_small_writes() {
    let transform = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Bytes, Item<Bytes>>| async move {
            match t.acquire(1024).await? {
                Some(data) if data.len() == 1024 => Ok(Some(Item(data))),
                _ => Ok(None),
            }
        },
    );

    let feeder = {
        let transform = transform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            for _ in 0..32 {
                transform.deliver(Bytes::from(vec![b'x'; 32])).await.unwrap();
            }
            transform.close();
        })
    };

    let frame = transform.next().await.unwrap().unwrap();
    assert_eq!(frame.0.len(), 1024);
    assert!(frame.0.iter().all(|byte| *byte == b'x'));
    assert_eq!(transform.next().await.unwrap(), None);
    feeder.await.unwrap();
}

#[tokio::test]
async fn chains_length_prefixed_reads() {
    // Each record: count, <count bytes> whose second byte is the length
    // of the payload that follows.
    let transform = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Bytes, Item<String>>| async move {
            let Some(head) = t.acquire(1).await? else {
                return Ok(None);
            };
            let Some(sizes) = t.acquire(head[0] as usize).await? else {
                return Ok(None);
            };
            let Some(payload) = t.acquire(sizes[1] as usize).await? else {
                return Ok(None);
            };
            Ok(Some(Item(String::from_utf8_lossy(&payload).into_owned())))
        },
    );

    transform
        .deliver(Bytes::from_static(&[2, 0, 5, 0x68, 0x65, 0x6c, 0x6c, 0x6f]))
        .await
        .unwrap();
    transform
        .deliver(Bytes::from_static(&[4, 9, 4, 7, 7, 0x77, 0x68, 0x61, 0x74]))
        .await
        .unwrap();
    // For fun, chop one record across three writes.
    transform
        .deliver(Bytes::from_static(&[6, 100, 7, 4]))
        .await
        .unwrap();
    transform
        .deliver(Bytes::from_static(&[101, 102, 103, 0x6d, 0x79, 0x73]))
        .await
        .unwrap();
    transform
        .deliver(Bytes::from_static(&[0x74, 0x65, 0x72, 0x79]))
        .await
        .unwrap();
    transform.close();

    assert_eq!(transform.next().await.unwrap(), Some(Item("hello".into())));
    assert_eq!(transform.next().await.unwrap(), Some(Item("what".into())));
    assert_eq!(
        transform.next().await.unwrap(),
        Some(Item("mystery".into()))
    );
    assert_eq!(transform.next().await.unwrap(), None);
}

#[tokio::test]
async fn unacquire_is_the_inverse_of_acquire() {
    let transform: PullTransform<Bytes, Bytes> =
        PullTransform::new(FlowOptions::new(), |t: Pull<Bytes, Bytes>| async move {
            let Some(data) = t.acquire(2).await? else {
                return Ok(None);
            };
            t.unacquire(chunk(b"xy"));
            let Some(back) = t.acquire(2).await? else {
                return Ok(None);
            };
            let mut joined = data.to_vec();
            joined.extend_from_slice(&back);
            Ok(Some(Bytes::from(joined)))
        });

    transform.deliver(chunk(b"cat")).await.unwrap();
    transform.close();

    assert_eq!(transform.acquire(4).await.unwrap(), Some(chunk(b"caxy")));
    assert_eq!(transform.acquire(4).await.unwrap(), Some(chunk(b"txy")));
    assert_eq!(transform.acquire(4).await.unwrap(), None);
}

/// Reads `size` bytes from wherever its acquires are served, emits them
/// as its own output, and terminates.
fn frame_reader(size: usize) -> PullTransform<Bytes, Bytes> {
    PullTransform::new(
        FlowOptions::new().name("frame-reader"),
        move |t: Pull<Bytes, Bytes>| async move {
            if let Some(data) = t.acquire(size).await? {
                t.push(data).await?;
            }
            t.finish();
            Ok(None)
        },
    )
}

#[tokio::test]
async fn delegation_segments_the_stream() {
    // Frame decoder: one length byte, then that many data bytes. Each
    // frame is handed out as a delegated child stream that reads the
    // parent's buffer directly.
    let transform = PullTransform::new(
        FlowOptions::new().name("segmenter"),
        |t: Pull<Bytes, Item<PullTransform<Bytes, Bytes>>>| async move {
            let Some(header) = t.acquire(1).await? else {
                return Ok(None);
            };
            let child = frame_reader(header[0] as usize);
            t.delegate(&child);
            t.push(Item(child.clone())).await?;
            child.ended().await?;
            Ok(None)
        },
    );

    transform
        .deliver(Bytes::from_static(&[3, 0x4a, 0x4b, 0x4c, 2, 0x32, 0x33]))
        .await
        .unwrap();
    transform.close();

    let Some(Item(first)) = transform.next().await.unwrap() else {
        panic!("expected a first child stream");
    };
    assert_eq!(first.acquire(10).await.unwrap(), Some(chunk(b"JKL")));
    assert_eq!(first.acquire(10).await.unwrap(), None);

    let Some(Item(second)) = transform.next().await.unwrap() else {
        panic!("expected a second child stream");
    };
    assert_eq!(second.acquire(10).await.unwrap(), Some(chunk(b"23")));
    assert_eq!(second.acquire(10).await.unwrap(), None);

    assert!(transform.next().await.unwrap().is_none());
}

#[tokio::test]
async fn transform_error_is_terminal() {
    let transform: PullTransform<Bytes, Bytes> = PullTransform::new(
        FlowOptions::new(),
        |t: Pull<Bytes, Bytes>| async move {
            let _ = t.acquire(1).await?;
            Err(gjoll::GjollError::transform("bad frame"))
        },
    );

    transform.deliver(chunk(b"abc")).await.unwrap();

    assert_eq!(
        transform.ended().await,
        Err(gjoll::GjollError::transform("bad frame"))
    );
    assert_eq!(
        transform.next().await,
        Err(gjoll::GjollError::transform("bad frame"))
    );
}
