//! Chaining transform stages into one externally-visible duplex.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::{GjollError, Result};
use crate::flow::{Feed, Tap, relay};

/// An ordered chain of transform-like stages exposed as one duplex.
///
/// [`Weld::new`] starts the chain; every [`then`](Weld::then) physically
/// links the previous tail to the next stage's input by spawning a relay
/// that forwards chunks, the terminal close and errors. The weld's input
/// role feeds the first stage directly (closing the weld closes stage
/// zero) and its output role drains from the last stage's output
/// conduit. Chunk-type agreement between adjacent stages is checked at
/// compile time.
///
/// Backpressure threads through transparently: an unread weld output
/// parks the final relay, which parks the last stage's pump, and so on
/// back to the producer.
///
/// ```rust
/// use bytes::Bytes;
/// use gjoll::{FlowOptions, Push, Transform, Weld, pipe_from_buffer, pipe_to_buffer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> gjoll::Result<()> {
/// let upper = Transform::new(FlowOptions::new(), |_: Push<Bytes>, chunk: Bytes| async move {
///     Ok(Some(Bytes::from(chunk.to_ascii_uppercase())))
/// });
/// let shout = Transform::with_flush(
///     FlowOptions::new(),
///     |_: Push<Bytes>, chunk: Bytes| async move { Ok(Some(chunk)) },
///     |push: Push<Bytes>| async move { push.push(Bytes::from_static(b"!")).await },
/// );
///
/// let weld = Weld::new(upper).then(shout);
/// pipe_from_buffer("hello sailor", weld.clone()).await?;
/// assert_eq!(&pipe_to_buffer(weld).await?[..], b"HELLO SAILOR!");
/// # Ok(())
/// # }
/// ```
///
/// # Panics
///
/// [`then`](Weld::then) spawns the linking relay and requires a tokio
/// runtime context.
pub struct Weld<I: Chunk, O: Chunk> {
    head: Arc<dyn Feed<I>>,
    tail: Arc<dyn Tap<O>>,
}

impl<I: Chunk, O: Chunk> Weld<I, O> {
    /// Start a chain with its first stage.
    pub fn new<S>(stage: S) -> Self
    where
        S: Feed<I> + Tap<O> + Clone + 'static,
    {
        Self {
            head: Arc::new(stage.clone()),
            tail: Arc::new(stage),
        }
    }

    /// Link the current tail into `stage` and extend the chain.
    pub fn then<P, S>(self, stage: S) -> Weld<I, P>
    where
        P: Chunk,
        S: Feed<O> + Tap<P> + Clone + 'static,
    {
        let tail = self.tail;
        let feed = stage.clone();
        tokio::spawn(async move {
            let _ = relay(&tail, &feed, true).await;
        });
        Weld {
            head: self.head,
            tail: Arc::new(stage),
        }
    }
}

#[async_trait]
impl<I: Chunk, O: Chunk> Feed<I> for Weld<I, O> {
    async fn deliver(&self, chunk: I) -> Result<()> {
        self.head.deliver(chunk).await
    }

    fn close(&self) {
        self.head.close();
    }

    fn fail(&self, error: GjollError) {
        self.head.fail(error);
    }

    async fn flushed(&self) -> Result<()> {
        self.head.flushed().await
    }
}

#[async_trait]
impl<I: Chunk, O: Chunk> Tap<O> for Weld<I, O> {
    async fn next(&self) -> Result<Option<O>> {
        self.tail.next().await
    }

    fn unacquire(&self, chunk: O) {
        self.tail.unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        self.tail.ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<O>> {
        self.tail.acquire(count).await
    }
}

impl<I: Chunk, O: Chunk> Clone for Weld<I, O> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            tail: self.tail.clone(),
        }
    }
}

impl<I: Chunk, O: Chunk> std::fmt::Debug for Weld<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weld").finish_non_exhaustive()
    }
}
