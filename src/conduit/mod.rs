//! The backpressure-aware pipe shared by every adapter.
//!
//! A conduit is a pair of halves over one queue: an [`Intake`] (input
//! role) that accepts chunks and suspends the producer once the buffered
//! weight reaches the high-water mark, and an [`Outlet`] (output role)
//! that serves serialized acquire requests out of the queue. The drain
//! logic consumes whole chunks front-to-back while the remaining
//! requested weight covers them and carves a partial chunk when it does
//! not; a request that cannot yet be satisfied releases the producer
//! even above the high-water mark, so a demanding consumer always pulls
//! more data through.
//!
//! The conduit does not bound the queue on its own — it only gates
//! forwarding. Upstream stops because its own `deliver` suspends.
//!
//! # Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use gjoll::{FlowOptions, conduit};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> gjoll::Result<()> {
//! let (intake, outlet) = conduit::<Bytes>(FlowOptions::new());
//! intake.deliver(Bytes::from_static(b"hello ")).await?;
//! intake.deliver(Bytes::from_static(b"sailor")).await?;
//! intake.close();
//!
//! assert_eq!(outlet.acquire(12).await?, Some(Bytes::from_static(b"hello sailor")));
//! assert_eq!(outlet.acquire(1).await?, None);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use crate::bridge::Gate;
use crate::chunk::Chunk;
use crate::error::{GjollError, Result};
use crate::options::{DEFAULT_HIGH_WATER_MARK, DEFAULT_STRUCTURED_HIGH_WATER_MARK, FlowOptions};
use crate::telemetry;

/// Create a conduit, returning its input and output halves.
///
/// Both halves are cheap clones over shared state; the conduit is
/// destroyed when the last half is dropped.
pub fn conduit<T: Chunk>(options: FlowOptions) -> (Intake<T>, Outlet<T>) {
    let shared = Arc::new(Shared::new(options));
    (
        Intake {
            shared: shared.clone(),
        },
        Outlet { shared },
    )
}

/// An already-closed conduit outlet preloaded with `chunks`, bypassing
/// the high-water mark. Backs the fixed byte-sequence source adapter.
pub(crate) fn preloaded<T: Chunk>(chunks: Vec<T>, options: FlowOptions) -> Outlet<T> {
    let (_, outlet) = conduit(options);
    let completed = {
        let mut state = outlet.shared.lock();
        for chunk in chunks {
            state.buffered += chunk.weight();
            state.queue.push_back(chunk);
        }
        state.closed = true;
        state.complete_if_drained()
    };
    if completed {
        outlet.shared.completed();
    }
    outlet
}

/// What a registered acquire is waiting for.
#[derive(Debug, Clone, Copy)]
enum Want {
    /// The next chunk, whole, as it was delivered.
    One,
    /// At least this much gathered weight (binary streams only).
    Weight(usize),
}

struct State<T> {
    queue: VecDeque<T>,
    /// Total weight of `queue`.
    buffered: usize,
    /// Input side closed; no further delivers accepted.
    closed: bool,
    /// Closed and fully drained; the terminal marker is now the only
    /// thing the output side will ever yield.
    finished: bool,
    failed: Option<GjollError>,
    /// The single in-flight acquire. Registering a second one is a
    /// protocol error.
    pending: Option<Want>,
}

impl<T: Chunk> State<T> {
    /// Marks the conduit finished once closed and drained. Returns true
    /// on the transition so the caller can settle the gates outside the
    /// lock.
    fn complete_if_drained(&mut self) -> bool {
        if self.closed && self.queue.is_empty() && self.failed.is_none() && !self.finished {
            self.finished = true;
            true
        } else {
            false
        }
    }

    /// Whether a parked deliver may resolve: below the high-water mark,
    /// or the pending acquire demands more than is buffered (the
    /// pull-on-resume rule — a starved consumer releases the producer
    /// even above the mark).
    fn accepts(&self, high_water: usize) -> bool {
        if self.buffered < high_water {
            return true;
        }
        match self.pending {
            Some(Want::Weight(count)) => count > self.buffered,
            Some(Want::One) => self.queue.is_empty(),
            None => false,
        }
    }

    /// Try to satisfy `want` from the queue. `None` means "not yet";
    /// `Some(None)` is the terminal marker.
    fn satisfy(&mut self, want: Want) -> Option<Option<T>> {
        match want {
            Want::One => {
                if let Some(chunk) = self.queue.pop_front() {
                    self.buffered -= chunk.weight();
                    return Some(Some(chunk));
                }
                if self.closed { Some(None) } else { None }
            }
            Want::Weight(count) => {
                if count > self.buffered && !self.closed {
                    return None;
                }
                if self.queue.is_empty() {
                    return Some(None);
                }
                let mut parts = Vec::new();
                let mut need = count;
                loop {
                    let Some(front) = self.queue.front() else { break };
                    let weight = front.weight();
                    if weight > need {
                        break;
                    }
                    if let Some(chunk) = self.queue.pop_front() {
                        self.buffered -= weight;
                        need -= weight;
                        parts.push(chunk);
                    }
                }
                if need > 0 {
                    if let Some(front) = self.queue.front_mut() {
                        parts.push(front.carve(need));
                        self.buffered -= need;
                    }
                }
                let gathered = if parts.len() == 1 {
                    parts.pop()
                } else {
                    Some(T::gather(parts))
                };
                Some(gathered)
            }
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Wakes parked delivers: the consumer took data or demands more.
    writable: Notify,
    /// Wakes the pending acquire: data arrived, input closed, or failure.
    readable: Notify,
    /// Output side fully terminated (closed and drained), or failed.
    end: Gate,
    /// Input side fully flushed (closed and drained), or failed.
    flush: Gate,
    high_water: usize,
    name: Arc<str>,
}

impl<T: Chunk> Shared<T> {
    fn new(options: FlowOptions) -> Self {
        let default_mark = if T::STRUCTURED {
            DEFAULT_STRUCTURED_HIGH_WATER_MARK
        } else {
            DEFAULT_HIGH_WATER_MARK
        };
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                buffered: 0,
                closed: false,
                finished: false,
                failed: None,
                pending: None,
            }),
            writable: Notify::new(),
            readable: Notify::new(),
            end: Gate::new(),
            flush: Gate::new(),
            high_water: options.high_water_mark.unwrap_or(default_mark),
            name: options.name.unwrap_or_else(|| "conduit".to_owned()).into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settle both gates after the closed-and-drained transition.
    fn completed(&self) {
        trace!(stage = %self.name, "completed");
        metrics::counter!(telemetry::STREAMS_COMPLETED_TOTAL, "stage" => self.name.to_string())
            .increment(1);
        self.end.open();
        self.flush.open();
    }

    fn fail(&self, error: GjollError) {
        {
            let mut state = self.lock();
            if state.failed.is_some() {
                return;
            }
            state.failed = Some(error.clone());
        }
        trace!(stage = %self.name, %error, "failed");
        metrics::counter!(telemetry::STAGE_ERRORS_TOTAL, "stage" => self.name.to_string())
            .increment(1);
        self.end.fail(error.clone());
        self.flush.fail(error);
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}

/// Clears the registered acquire when its future settles or is dropped
/// mid-wait, so a cancelled acquire does not poison the outlet.
struct PendingGuard<'a, T: Chunk> {
    shared: &'a Shared<T>,
}

impl<T: Chunk> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        self.shared.lock().pending = None;
        self.shared.writable.notify_waiters();
    }
}

/// The input role of a conduit: accepts chunks under backpressure.
pub struct Intake<T: Chunk> {
    shared: Arc<Shared<T>>,
}

impl<T: Chunk> Intake<T> {
    /// Deliver one chunk. Resolves once the conduit accepts it: right
    /// away below the high-water mark, otherwise when the consumer has
    /// taken enough data (or demands more than is buffered).
    pub async fn deliver(&self, chunk: T) -> Result<()> {
        let weight = chunk.weight();
        {
            let mut state = self.shared.lock();
            if let Some(error) = &state.failed {
                return Err(error.clone());
            }
            if state.closed {
                return Err(GjollError::Closed);
            }
            state.buffered += weight;
            state.queue.push_back(chunk);
            trace!(stage = %self.shared.name, weight, buffered = state.buffered, "deliver");
        }
        metrics::counter!(telemetry::CHUNKS_DELIVERED_TOTAL, "stage" => self.shared.name.to_string())
            .increment(1);
        metrics::counter!(telemetry::WEIGHT_DELIVERED_TOTAL, "stage" => self.shared.name.to_string())
            .increment(weight as u64);
        self.shared.readable.notify_waiters();

        loop {
            let notified = self.shared.writable.notified();
            {
                let state = self.shared.lock();
                if let Some(error) = &state.failed {
                    return Err(error.clone());
                }
                if state.accepts(self.shared.high_water) {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Close the input side: no more chunks will ever be delivered.
    /// Idempotent; a second close (or a close after failure) is a no-op.
    pub fn close(&self) {
        let completed = {
            let mut state = self.shared.lock();
            if state.closed || state.failed.is_some() {
                return;
            }
            state.closed = true;
            state.complete_if_drained()
        };
        trace!(stage = %self.shared.name, "close");
        self.shared.readable.notify_waiters();
        if completed {
            self.shared.completed();
        }
    }

    /// Fail the conduit. The first failure wins; it settles both gates,
    /// every parked deliver and the pending acquire.
    pub fn fail(&self, error: GjollError) {
        self.shared.fail(error);
    }

    /// Resolves once the input side has been closed and every delivered
    /// chunk consumed, or fails with the conduit's terminal error.
    pub async fn flushed(&self) -> Result<()> {
        self.shared.flush.wait().await
    }

    /// Whether the input side has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl<T: Chunk> Clone for Intake<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Chunk> std::fmt::Debug for Intake<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intake")
            .field("stage", &self.shared.name)
            .finish_non_exhaustive()
    }
}

/// The output role of a conduit: serves serialized acquire requests.
pub struct Outlet<T: Chunk> {
    shared: Arc<Shared<T>>,
}

impl<T: Chunk> Outlet<T> {
    /// Acquire at least `count` units of weight, gathered into one
    /// chunk. On a structured conduit the count is pinned to one chunk.
    ///
    /// Resolves immediately when enough is buffered (or the input has
    /// ended — then with whatever remains, or the terminal `None`).
    /// An acquire of zero units resolves immediately to an empty chunk
    /// without touching the queue.
    ///
    /// At most one acquire may be in flight; issuing another before the
    /// previous future settles is a [`GjollError::Protocol`] error.
    pub async fn acquire(&self, count: usize) -> Result<Option<T>> {
        if !T::STRUCTURED && count == 0 {
            return Ok(Some(T::empty()));
        }
        let want = if T::STRUCTURED {
            Want::One
        } else {
            Want::Weight(count)
        };
        self.take(want).await
    }

    /// Take the next chunk whole, exactly as it was delivered, or the
    /// terminal `None`. Subject to the same single-in-flight protocol
    /// as [`acquire`](Outlet::acquire).
    pub async fn next(&self) -> Result<Option<T>> {
        self.take(Want::One).await
    }

    /// Push a chunk back onto the front of the queue, restoring its
    /// weight. The next acquire sees it first.
    pub fn unacquire(&self, chunk: T) {
        {
            let mut state = self.shared.lock();
            state.buffered += chunk.weight();
            state.queue.push_front(chunk);
            trace!(stage = %self.shared.name, buffered = state.buffered, "unacquire");
        }
        self.shared.readable.notify_waiters();
    }

    /// Resolves once the output side has fully terminated (input closed
    /// and every chunk consumed), or fails with the terminal error.
    pub async fn ended(&self) -> Result<()> {
        self.shared.end.wait().await
    }

    /// Whether the conduit can never yield data again: input closed and
    /// queue drained.
    pub fn is_exhausted(&self) -> bool {
        let state = self.shared.lock();
        state.closed && state.queue.is_empty()
    }

    async fn take(&self, want: Want) -> Result<Option<T>> {
        {
            let mut state = self.shared.lock();
            if state.finished {
                if state.buffered > 0 {
                    return Err(GjollError::protocol(
                        "acquire on a terminated stream with residual pushed-back data",
                    ));
                }
                return Ok(None);
            }
            if state.pending.is_some() {
                return Err(GjollError::protocol(
                    "acquire issued before the previous one settled",
                ));
            }
            state.pending = Some(want);
        }
        let _pending = PendingGuard {
            shared: &self.shared,
        };

        loop {
            let notified = self.shared.readable.notified();
            {
                let mut state = self.shared.lock();
                // Chunks buffered before a failure stay deliverable;
                // the error surfaces once the queue cannot satisfy us.
                if let Some(result) = state.satisfy(want) {
                    let completed = state.complete_if_drained();
                    trace!(
                        stage = %self.shared.name,
                        took = ?result.as_ref().map(Chunk::weight),
                        buffered = state.buffered,
                        "acquire",
                    );
                    drop(state);
                    if completed {
                        self.shared.completed();
                    }
                    return Ok(result);
                }
                if let Some(error) = &state.failed {
                    return Err(error.clone());
                }
            }
            // Starved: release a parked deliver so upstream refills us.
            self.shared.writable.notify_waiters();
            notified.await;
        }
    }
}

impl<T: Chunk> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Chunk> std::fmt::Debug for Outlet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("stage", &self.shared.name)
            .finish_non_exhaustive()
    }
}
