//! The push-oriented transform: one chunk in, an optional chunk out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Notify, oneshot};
use tracing::trace;

use crate::bridge::Gate;
use crate::chunk::Chunk;
use crate::conduit::{Intake, Outlet, conduit};
use crate::error::{GjollError, Result};
use crate::flow::{Feed, Tap};
use crate::options::FlowOptions;

type TransformFn<I, O> =
    Box<dyn FnMut(Push<O>, I) -> BoxFuture<'static, Result<Option<O>>> + Send>;
type FlushFn<O> = Box<dyn FnOnce(Push<O>) -> BoxFuture<'static, Result<()>> + Send>;

/// Handle passed to the user function for pushing extra output chunks
/// directly (beyond the function's optional return value). Suspends when
/// the output side is saturated.
pub struct Push<O: Chunk> {
    out: Intake<O>,
}

impl<O: Chunk> Push<O> {
    /// Forward one chunk to the output side.
    pub async fn push(&self, chunk: O) -> Result<()> {
        self.out.deliver(chunk).await
    }
}

impl<O: Chunk> Clone for Push<O> {
    fn clone(&self) -> Self {
        Self {
            out: self.out.clone(),
        }
    }
}

/// A chunk waiting in the submit slot, or the marker that the pump is
/// still working on the previous one. The slot holds exactly one chunk;
/// a second submit waits for the first's completion.
enum Cell<I> {
    Empty,
    Pending {
        chunk: I,
        ack: oneshot::Sender<Result<()>>,
    },
    Processing,
}

struct SlotState<I> {
    cell: Cell<I>,
    closed: bool,
    failed: Option<GjollError>,
}

struct Slot<I> {
    state: Mutex<SlotState<I>>,
    /// Slot freed: a waiting submit may claim it.
    space: Notify,
    /// Chunk submitted or input closed: the pump has work.
    filled: Notify,
}

impl<I> Slot<I> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                cell: Cell::Empty,
                closed: false,
                failed: None,
            }),
            space: Notify::new(),
            filled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<I>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transformation stage fed one chunk at a time.
///
/// Each delivered chunk is handed to the user function together with a
/// [`Push`] handle; the function's future resolves to an optional result
/// chunk, which is forwarded to the output side. Submissions are
/// serialized through a one-chunk slot, and a saturated output parks the
/// pump (and therefore the producer) until the consumer catches up.
///
/// On end-of-input the optional flush function runs, then the terminal
/// marker is forwarded. A failed user future is terminal for the whole
/// stage.
///
/// # Panics
///
/// Construction spawns the pump task and requires a tokio runtime
/// context.
pub struct Transform<I: Chunk, O: Chunk> {
    slot: Arc<Slot<I>>,
    out: Intake<O>,
    output: Outlet<O>,
    flush_gate: Arc<Gate>,
    name: Arc<str>,
}

impl<I: Chunk, O: Chunk> Transform<I, O> {
    /// Create a transform from a user function.
    pub fn new<F, Fut>(options: FlowOptions, mut transform: F) -> Self
    where
        F: FnMut(Push<O>, I) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<O>>> + Send + 'static,
    {
        Self::build(
            options,
            Box::new(move |push, chunk| transform(push, chunk).boxed()),
            None,
        )
    }

    /// Create a transform with a flush function, run after the last
    /// chunk and before the terminal marker is forwarded.
    pub fn with_flush<F, Fut, G, GFut>(options: FlowOptions, mut transform: F, flush: G) -> Self
    where
        F: FnMut(Push<O>, I) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<O>>> + Send + 'static,
        G: FnOnce(Push<O>) -> GFut + Send + 'static,
        GFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::build(
            options,
            Box::new(move |push, chunk| transform(push, chunk).boxed()),
            Some(Box::new(move |push| flush(push).boxed())),
        )
    }

    fn build(options: FlowOptions, transform: TransformFn<I, O>, flush: Option<FlushFn<O>>) -> Self {
        let name: Arc<str> = options
            .name
            .clone()
            .unwrap_or_else(|| "transform".to_owned())
            .into();
        let (out, output) = conduit::<O>(options);
        let slot = Arc::new(Slot::new());
        let flush_gate = Arc::new(Gate::new());
        tokio::spawn(pump(
            slot.clone(),
            out.clone(),
            transform,
            flush,
            flush_gate.clone(),
            name.clone(),
        ));
        Self {
            slot,
            out,
            output,
            flush_gate,
            name,
        }
    }

    fn poisoned(&self) -> GjollError {
        self.slot.lock().failed.clone().unwrap_or(GjollError::Closed)
    }
}

enum Step<I> {
    Work(I, oneshot::Sender<Result<()>>),
    Finish,
    Abort,
}

async fn pump<I: Chunk, O: Chunk>(
    slot: Arc<Slot<I>>,
    out: Intake<O>,
    mut transform: TransformFn<I, O>,
    mut flush: Option<FlushFn<O>>,
    flush_gate: Arc<Gate>,
    name: Arc<str>,
) {
    loop {
        let step = loop {
            let notified = slot.filled.notified();
            {
                let mut state = slot.lock();
                if state.failed.is_some() {
                    break Step::Abort;
                }
                if matches!(state.cell, Cell::Pending { .. }) {
                    if let Cell::Pending { chunk, ack } =
                        std::mem::replace(&mut state.cell, Cell::Processing)
                    {
                        break Step::Work(chunk, ack);
                    }
                }
                if state.closed {
                    break Step::Finish;
                }
            }
            notified.await;
        };

        let (chunk, ack) = match step {
            Step::Work(chunk, ack) => (chunk, ack),
            Step::Abort => return,
            Step::Finish => {
                if let Some(flush) = flush.take() {
                    if let Err(error) = flush(Push { out: out.clone() }).await {
                        trace!(stage = %name, %error, "flush failed");
                        out.fail(error.clone());
                        flush_gate.fail(error);
                        return;
                    }
                }
                out.close();
                flush_gate.open();
                return;
            }
        };

        let result = transform(Push { out: out.clone() }, chunk).await;
        let outcome = match result {
            Ok(Some(produced)) => out.deliver(produced).await,
            Ok(None) => Ok(()),
            Err(error) => Err(error),
        };
        match outcome {
            Ok(()) => {
                slot.lock().cell = Cell::Empty;
                let _ = ack.send(Ok(()));
                slot.space.notify_waiters();
            }
            Err(error) => {
                trace!(stage = %name, %error, "transform failed");
                {
                    let mut state = slot.lock();
                    state.failed = Some(error.clone());
                    state.cell = Cell::Empty;
                }
                out.fail(error.clone());
                flush_gate.fail(error.clone());
                let _ = ack.send(Err(error));
                slot.space.notify_waiters();
                slot.filled.notify_waiters();
                return;
            }
        }
    }
}

#[async_trait]
impl<I: Chunk, O: Chunk> Feed<I> for Transform<I, O> {
    async fn deliver(&self, chunk: I) -> Result<()> {
        let mut chunk = Some(chunk);
        let ack = loop {
            let notified = self.slot.space.notified();
            {
                let mut state = self.slot.lock();
                if let Some(error) = &state.failed {
                    return Err(error.clone());
                }
                if state.closed {
                    return Err(GjollError::Closed);
                }
                if matches!(state.cell, Cell::Empty) {
                    let (tx, rx) = oneshot::channel();
                    if let Some(chunk) = chunk.take() {
                        state.cell = Cell::Pending { chunk, ack: tx };
                    }
                    break rx;
                }
            }
            notified.await;
        };
        trace!(stage = %self.name, "submit");
        self.slot.filled.notify_waiters();
        match ack.await {
            Ok(result) => result,
            // Pump task is gone; surface its terminal error.
            Err(_) => Err(self.poisoned()),
        }
    }

    fn close(&self) {
        {
            let mut state = self.slot.lock();
            if state.closed || state.failed.is_some() {
                return;
            }
            state.closed = true;
        }
        trace!(stage = %self.name, "close");
        self.slot.filled.notify_waiters();
    }

    fn fail(&self, error: GjollError) {
        {
            let mut state = self.slot.lock();
            if state.failed.is_some() {
                return;
            }
            state.failed = Some(error.clone());
            if let Cell::Pending { ack, .. } = std::mem::replace(&mut state.cell, Cell::Empty) {
                let _ = ack.send(Err(error.clone()));
            }
        }
        self.out.fail(error.clone());
        self.flush_gate.fail(error);
        self.slot.space.notify_waiters();
        self.slot.filled.notify_waiters();
    }

    async fn flushed(&self) -> Result<()> {
        self.flush_gate.wait().await
    }
}

#[async_trait]
impl<I: Chunk, O: Chunk> Tap<O> for Transform<I, O> {
    async fn next(&self) -> Result<Option<O>> {
        self.output.next().await
    }

    fn unacquire(&self, chunk: O) {
        self.output.unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        self.output.ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<O>> {
        self.output.acquire(count).await
    }
}

impl<I: Chunk, O: Chunk> Clone for Transform<I, O> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            out: self.out.clone(),
            output: self.output.clone(),
            flush_gate: self.flush_gate.clone(),
            name: self.name.clone(),
        }
    }
}

impl<I: Chunk, O: Chunk> std::fmt::Debug for Transform<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("stage", &self.name)
            .finish_non_exhaustive()
    }
}
