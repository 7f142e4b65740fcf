//! A size limit over an upstream output side.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::bridge::Gate;
use crate::chunk::Chunk;
use crate::error::Result;
use crate::flow::Tap;

/// Forwards at most `size` bytes from an upstream tap, then terminates.
///
/// An overshoot chunk is carved at the limit and the remainder pushed
/// back *upstream* — never buffered here — so whatever follows the limit
/// stays readable from the underlying source. Limits chain (consecutive
/// windows over one source) and nest (a limit over a limit).
pub struct LimitTap {
    upstream: Arc<dyn Tap<Bytes>>,
    remaining: Mutex<usize>,
    end: Gate,
}

/// Limit `tap` to the next `size` bytes.
pub fn limit(tap: impl Tap<Bytes> + 'static, size: usize) -> Arc<LimitTap> {
    Arc::new(LimitTap {
        upstream: Arc::new(tap),
        remaining: Mutex::new(size),
        end: Gate::new(),
    })
}

impl LimitTap {
    /// True once the full `size` bytes have been forwarded. Stays false
    /// when the upstream ends short — the way to tell a truncated window
    /// from a complete one.
    pub fn is_finished(&self) -> bool {
        *self.lock() == 0
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Tap<Bytes> for LimitTap {
    async fn next(&self) -> Result<Option<Bytes>> {
        let remaining = *self.lock();
        if remaining == 0 {
            self.end.open();
            return Ok(None);
        }
        match self.upstream.next().await? {
            None => {
                self.end.open();
                Ok(None)
            }
            Some(mut chunk) => {
                if chunk.weight() > remaining {
                    let inside = chunk.carve(remaining);
                    self.upstream.unacquire(chunk);
                    chunk = inside;
                }
                *self.lock() -= chunk.weight();
                Ok(Some(chunk))
            }
        }
    }

    fn unacquire(&self, chunk: Bytes) {
        *self.lock() += chunk.weight();
        self.upstream.unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        self.end.wait().await
    }
}

impl std::fmt::Debug for LimitTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitTap")
            .field("remaining", &*self.lock())
            .finish_non_exhaustive()
    }
}
