//! The input and output roles shared by every stream endpoint.
//!
//! [`Feed`] is the input role: it accepts chunks under backpressure and
//! carries the close/fail lifecycle of a stream's write side. [`Tap`] is
//! the output role: it yields chunks, supports weighted acquires with
//! push-back, and carries the end lifecycle of the read side. A duplex
//! (transform, weld) implements both under one lifecycle.
//!
//! [`pipe`] welds a tap to a feed with terminal-close and error
//! forwarding — the drain loop every composite adapter is built from.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::chunk::Chunk;
use crate::conduit::{Intake, Outlet};
use crate::error::{GjollError, Result};

/// The input role: accepts chunks, may suspend the producer.
#[async_trait]
pub trait Feed<T: Chunk>: Send + Sync {
    /// Deliver one chunk; resolves once it has been accepted.
    async fn deliver(&self, chunk: T) -> Result<()>;

    /// Signal end-of-input. Idempotent.
    fn close(&self);

    /// Terminate the stream with an error. First failure wins.
    fn fail(&self, error: GjollError);

    /// Resolves once the input side has drained and closed.
    async fn flushed(&self) -> Result<()>;
}

/// The output role: yields chunks and the terminal marker.
#[async_trait]
pub trait Tap<T: Chunk>: Send + Sync {
    /// The next chunk as produced, or `None` once the stream has ended.
    async fn next(&self) -> Result<Option<T>>;

    /// Push a chunk back; the next read sees it first.
    fn unacquire(&self, chunk: T);

    /// Resolves once the output side has fully terminated.
    async fn ended(&self) -> Result<()>;

    /// Acquire at least `count` units of weight gathered into one chunk,
    /// or whatever remains once the stream ends (`None` when nothing
    /// does). On structured streams this is exactly [`next`](Tap::next).
    ///
    /// This default accumulates whole chunks and pushes overshoot back
    /// via [`unacquire`](Tap::unacquire); conduit-backed taps override
    /// it with the queue-native version.
    async fn acquire(&self, count: usize) -> Result<Option<T>> {
        if T::STRUCTURED {
            return self.next().await;
        }
        if count == 0 {
            return Ok(Some(T::empty()));
        }
        let mut parts = Vec::new();
        let mut have = 0;
        while have < count {
            match self.next().await? {
                Some(chunk) => {
                    have += chunk.weight();
                    parts.push(chunk);
                }
                None => break,
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        let mut gathered = if parts.len() == 1 {
            parts.swap_remove(0)
        } else {
            T::gather(parts)
        };
        if have > count {
            let front = gathered.carve(count);
            self.unacquire(gathered);
            return Ok(Some(front));
        }
        Ok(Some(gathered))
    }
}

// The conduit halves are the native implementations of the two roles.

#[async_trait]
impl<T: Chunk> Feed<T> for Intake<T> {
    async fn deliver(&self, chunk: T) -> Result<()> {
        Intake::deliver(self, chunk).await
    }

    fn close(&self) {
        Intake::close(self);
    }

    fn fail(&self, error: GjollError) {
        Intake::fail(self, error);
    }

    async fn flushed(&self) -> Result<()> {
        Intake::flushed(self).await
    }
}

#[async_trait]
impl<T: Chunk> Tap<T> for Outlet<T> {
    async fn next(&self) -> Result<Option<T>> {
        Outlet::next(self).await
    }

    fn unacquire(&self, chunk: T) {
        Outlet::unacquire(self, chunk);
    }

    async fn ended(&self) -> Result<()> {
        Outlet::ended(self).await
    }

    async fn acquire(&self, count: usize) -> Result<Option<T>> {
        Outlet::acquire(self, count).await
    }
}

#[async_trait]
impl<T: Chunk, F: Feed<T> + ?Sized> Feed<T> for Arc<F> {
    async fn deliver(&self, chunk: T) -> Result<()> {
        (**self).deliver(chunk).await
    }

    fn close(&self) {
        (**self).close();
    }

    fn fail(&self, error: GjollError) {
        (**self).fail(error);
    }

    async fn flushed(&self) -> Result<()> {
        (**self).flushed().await
    }
}

#[async_trait]
impl<T: Chunk, S: Tap<T> + ?Sized> Tap<T> for Arc<S> {
    async fn next(&self) -> Result<Option<T>> {
        (**self).next().await
    }

    fn unacquire(&self, chunk: T) {
        (**self).unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        (**self).ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<T>> {
        (**self).acquire(count).await
    }
}

#[async_trait]
impl<T: Chunk, S: Tap<T> + ?Sized> Tap<T> for Box<S> {
    async fn next(&self) -> Result<Option<T>> {
        (**self).next().await
    }

    fn unacquire(&self, chunk: T) {
        (**self).unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        (**self).ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<T>> {
        (**self).acquire(count).await
    }
}

/// Drain `tap` into `feed` until the stream ends or fails. The terminal
/// marker closes the feed; a tap error fails it and is returned.
pub async fn pipe<T, S, D>(tap: S, feed: D) -> Result<()>
where
    T: Chunk,
    S: Tap<T>,
    D: Feed<T>,
{
    relay(&tap, &feed, true).await
}

/// The shared drain loop. `close_downstream` distinguishes a final pipe
/// (terminal closes the feed) from one leg of a concatenation (the feed
/// stays open for the next sub-stream).
pub(crate) async fn relay<T, S, D>(tap: &S, feed: &D, close_downstream: bool) -> Result<()>
where
    T: Chunk,
    S: Tap<T> + ?Sized,
    D: Feed<T> + ?Sized,
{
    loop {
        match tap.next().await {
            Ok(Some(chunk)) => feed.deliver(chunk).await?,
            Ok(None) => {
                if close_downstream {
                    feed.close();
                }
                return Ok(());
            }
            Err(error) => {
                feed.fail(error.clone());
                return Err(error);
            }
        }
    }
}

/// Drain a binary tap to completion and return the gathered bytes.
pub async fn pipe_to_buffer<S: Tap<Bytes>>(tap: S) -> Result<Bytes> {
    let mut gathered = BytesMut::new();
    while let Some(chunk) = tap.next().await? {
        gathered.extend_from_slice(&chunk);
    }
    Ok(gathered.freeze())
}

/// Deliver one byte sequence into a feed and close it.
pub async fn pipe_from_buffer<D: Feed<Bytes>>(data: impl Into<Bytes>, feed: D) -> Result<()> {
    feed.deliver(data.into()).await?;
    feed.close();
    Ok(())
}
