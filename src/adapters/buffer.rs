//! Fixed byte-sequence sources and byte-accumulating sinks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::bridge::Gate;
use crate::conduit::{self, Outlet};
use crate::error::{GjollError, Result};
use crate::flow::Feed;
use crate::options::FlowOptions;

/// A source that replays one fixed byte sequence and terminates.
///
/// ```rust
/// # use gjoll::adapters::source;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> gjoll::Result<()> {
/// let source = source("hello sailor");
/// assert_eq!(source.acquire(5).await?.as_deref(), Some(&b"hello"[..]));
/// assert_eq!(source.acquire(7).await?.as_deref(), Some(&b" sailor"[..]));
/// assert_eq!(source.acquire(1).await?, None);
/// # Ok(())
/// # }
/// ```
pub fn source(data: impl Into<Bytes>) -> Outlet<Bytes> {
    conduit::preloaded(vec![data.into()], FlowOptions::new().name("source"))
}

struct SinkState {
    gathered: BytesMut,
    failed: Option<GjollError>,
}

/// A sink that accumulates (or discards) every delivered chunk.
///
/// Always accepts immediately; the input side flushes when closed.
#[derive(Clone)]
pub struct BufferSink {
    state: Arc<Mutex<SinkState>>,
    flush: Arc<Gate>,
    discard: bool,
}

impl BufferSink {
    fn new(discard: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                gathered: BytesMut::new(),
                failed: None,
            })),
            flush: Arc::new(Gate::new()),
            discard,
        }
    }

    /// Everything delivered so far, as one contiguous byte sequence.
    pub fn collected(&self) -> Bytes {
        self.lock().gathered.clone().freeze()
    }

    /// Forget everything collected so far.
    pub fn reset(&self) {
        self.lock().gathered.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Feed<Bytes> for BufferSink {
    async fn deliver(&self, chunk: Bytes) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.failed {
            return Err(error.clone());
        }
        if self.flush.is_settled() {
            return Err(GjollError::Closed);
        }
        if !self.discard {
            state.gathered.extend_from_slice(&chunk);
        }
        Ok(())
    }

    fn close(&self) {
        self.flush.open();
    }

    fn fail(&self, error: GjollError) {
        let mut state = self.lock();
        if state.failed.is_some() {
            return;
        }
        state.failed = Some(error.clone());
        drop(state);
        self.flush.fail(error);
    }

    async fn flushed(&self) -> Result<()> {
        self.flush.wait().await
    }
}

impl std::fmt::Debug for BufferSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSink")
            .field("discard", &self.discard)
            .field("collected", &self.lock().gathered.len())
            .finish()
    }
}

/// A sink that keeps everything delivered to it.
pub fn sink() -> BufferSink {
    BufferSink::new(false)
}

/// A sink that throws delivered data away.
pub fn null_sink() -> BufferSink {
    BufferSink::new(true)
}
