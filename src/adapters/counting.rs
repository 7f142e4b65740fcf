//! A byte-counting pass-through.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::error::{GjollError, Result};
use crate::flow::{Feed, Tap};
use crate::options::FlowOptions;
use crate::transform::{Push, Transform};

/// Pass-through duplex that publishes a running byte total after each
/// forwarded chunk.
#[derive(Clone, Debug)]
pub struct Counting {
    inner: Transform<Bytes, Bytes>,
    total: watch::Receiver<u64>,
}

/// Create a counting pass-through.
///
/// # Panics
///
/// Spawns the underlying transform's pump task and requires a tokio
/// runtime context.
pub fn counting(options: FlowOptions) -> Counting {
    let (publish, total) = watch::channel(0u64);
    let inner = Transform::new(options, move |_: Push<Bytes>, chunk: Bytes| {
        publish.send_modify(|total| *total += chunk.len() as u64);
        async move { Ok(Some(chunk)) }
    });
    Counting { inner, total }
}

impl Counting {
    /// Bytes forwarded so far.
    pub fn total(&self) -> u64 {
        *self.total.borrow()
    }

    /// A watch on the running total; changes once per forwarded chunk.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.total.clone()
    }
}

#[async_trait]
impl Feed<Bytes> for Counting {
    async fn deliver(&self, chunk: Bytes) -> Result<()> {
        self.inner.deliver(chunk).await
    }

    fn close(&self) {
        self.inner.close();
    }

    fn fail(&self, error: GjollError) {
        self.inner.fail(error);
    }

    async fn flushed(&self) -> Result<()> {
        self.inner.flushed().await
    }
}

#[async_trait]
impl Tap<Bytes> for Counting {
    async fn next(&self) -> Result<Option<Bytes>> {
        self.inner.next().await
    }

    fn unacquire(&self, chunk: Bytes) {
        self.inner.unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        self.inner.ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<Bytes>> {
        self.inner.acquire(count).await
    }
}
