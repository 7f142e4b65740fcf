//! The pull-oriented transform: user code requests exactly the input it
//! needs instead of reacting to arbitrary chunk boundaries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tracing::trace;

use crate::chunk::Chunk;
use crate::conduit::{Intake, Outlet, conduit};
use crate::error::{GjollError, Result};
use crate::flow::{Feed, Tap};
use crate::options::FlowOptions;

type PullFn<I, O> = Box<dyn FnMut(Pull<I, O>) -> BoxFuture<'static, Result<Option<O>>> + Send>;

/// The upstream link: where this transform's acquires are served from.
/// A root transform reads its own input conduit; a delegated child reads
/// the delegation root's buffer directly (never a copy). The link is
/// re-pointed by [`Pull::delegate`] and reverts when the child's output
/// terminates.
struct Link<I: Chunk> {
    upstream: Mutex<Outlet<I>>,
    delegated: Mutex<bool>,
    /// Signals an in-flight acquire to re-resolve the link (delegation
    /// handoff); the cancelled registration is cleared before the retry,
    /// so the root never sees two acquires in flight.
    relink: Notify,
}

impl<I: Chunk> Link<I> {
    fn new(own: Outlet<I>) -> Self {
        Self {
            upstream: Mutex::new(own),
            delegated: Mutex::new(false),
            relink: Notify::new(),
        }
    }

    fn current(&self) -> Outlet<I> {
        self.lock().clone()
    }

    fn adopt(&self, root: Outlet<I>) {
        *self.lock() = root;
        *self.delegated.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.relink.notify_one();
    }

    fn revert(&self, own: Outlet<I>) {
        *self.lock() = own;
        *self.delegated.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn is_delegated(&self) -> bool {
        *self.delegated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Outlet<I>> {
        self.upstream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle passed to the user function of a [`PullTransform`].
///
/// All input comes through [`acquire`](Pull::acquire) (serialized — do
/// not issue a second acquire before the previous future settles) and
/// all output goes through [`push`](Pull::push) or the function's return
/// value.
pub struct Pull<I: Chunk, O: Chunk> {
    link: Arc<Link<I>>,
    out: Intake<O>,
    name: Arc<str>,
}

impl<I: Chunk, O: Chunk> Pull<I, O> {
    /// Acquire at least `count` units of input (exactly one chunk on a
    /// structured input). Resolves with whatever remains — or `None` —
    /// once the input has ended. Routed through the delegation link.
    pub async fn acquire(&self, count: usize) -> Result<Option<I>> {
        loop {
            let upstream = self.link.current();
            tokio::select! {
                result = upstream.acquire(count) => return result,
                // Delegation handoff while waiting: retry on the new root.
                _ = self.link.relink.notified() => {}
            }
        }
    }

    /// Push over-read input back for the next acquire to see first.
    pub fn unacquire(&self, chunk: I) {
        self.link.current().unacquire(chunk);
    }

    /// Forward one chunk to the output side; suspends while the output
    /// is saturated.
    pub async fn push(&self, chunk: O) -> Result<()> {
        self.out.deliver(chunk).await
    }

    /// Terminate the output side early. The pump stops after the current
    /// invocation; the terminal marker is forwarded exactly once.
    pub fn finish(&self) {
        self.out.close();
    }

    /// Hand this transform's flow-control authority to `child`: until
    /// the child's output terminates, the child's acquires and push-backs
    /// are served from this transform's current upstream buffer.
    pub fn delegate<X: Chunk>(&self, child: &PullTransform<I, X>) {
        trace!(stage = %self.name, child = %child.name, "delegate");
        child.link.adopt(self.link.current());
    }

    /// Whether this transform currently reads a parent's buffer.
    pub fn is_delegated(&self) -> bool {
        self.link.is_delegated()
    }
}

impl<I: Chunk, O: Chunk> Clone for Pull<I, O> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            out: self.out.clone(),
            name: self.name.clone(),
        }
    }
}

/// A transformation stage whose user function *pulls* its input.
///
/// The engine buffers the write side; the user function is invoked in a
/// pump loop with a [`Pull`] handle and reads exactly what it needs via
/// serialized acquires. A non-`None` result (or any direct
/// [`Pull::push`]) is forwarded to the output side under backpressure.
/// The pump stops — and forwards the terminal marker exactly once — when
/// the input is closed and fully drained, or when the output has been
/// finished early. A failed user future is terminal for both sides.
///
/// Decoding a framed stream by handing each frame to a delegated child:
///
/// ```rust
/// use bytes::Bytes;
/// use gjoll::{FlowOptions, Pull, PullTransform};
///
/// fn frame_reader(size: usize) -> PullTransform<Bytes, Bytes> {
///     PullTransform::new(FlowOptions::new(), move |t: Pull<Bytes, Bytes>| async move {
///         if let Some(frame) = t.acquire(size).await? {
///             t.push(frame).await?;
///         }
///         t.finish();
///         Ok(None)
///     })
/// }
/// ```
///
/// # Panics
///
/// Construction spawns the pump task and requires a tokio runtime
/// context.
pub struct PullTransform<I: Chunk, O: Chunk> {
    input: Intake<I>,
    own: Outlet<I>,
    out: Intake<O>,
    output: Outlet<O>,
    link: Arc<Link<I>>,
    name: Arc<str>,
}

impl<I: Chunk, O: Chunk> PullTransform<I, O> {
    /// Create a pull transform from a user function.
    pub fn new<F, Fut>(options: FlowOptions, mut transform: F) -> Self
    where
        F: FnMut(Pull<I, O>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<O>>> + Send + 'static,
    {
        Self::build(options, Box::new(move |pull| transform(pull).boxed()))
    }

    fn build(options: FlowOptions, transform: PullFn<I, O>) -> Self {
        let name: Arc<str> = options
            .name
            .clone()
            .unwrap_or_else(|| "pull-transform".to_owned())
            .into();
        let side = |role: &str| FlowOptions {
            high_water_mark: options.high_water_mark,
            name: Some(format!("{name}/{role}")),
        };
        let (input, own) = conduit::<I>(side("in"));
        let (out, output) = conduit::<O>(side("out"));
        let link = Arc::new(Link::new(own.clone()));
        let pull = Pull {
            link: link.clone(),
            out: out.clone(),
            name: name.clone(),
        };
        tokio::spawn(pump(
            pull,
            transform,
            own.clone(),
            input.clone(),
            out.clone(),
            name.clone(),
        ));
        Self {
            input,
            own,
            out,
            output,
            link,
            name,
        }
    }
}

async fn pump<I: Chunk, O: Chunk>(
    pull: Pull<I, O>,
    mut transform: PullFn<I, O>,
    own: Outlet<I>,
    input: Intake<I>,
    out: Intake<O>,
    name: Arc<str>,
) {
    loop {
        // Finished early, or the own input is exhausted: wrap it up. A
        // delegated child never exhausts its own (unused) input and exits
        // through the finished-output branch.
        if out.is_closed() || own.is_exhausted() {
            break;
        }
        match transform(pull.clone()).await {
            Ok(Some(chunk)) => match out.deliver(chunk).await {
                Ok(()) => {}
                // finish() raced the forward; the terminal wins.
                Err(GjollError::Closed) => break,
                Err(error) => {
                    input.fail(error);
                    break;
                }
            },
            Ok(None) => {}
            Err(error) => {
                trace!(stage = %name, %error, "transform failed");
                out.fail(error.clone());
                input.fail(error);
                break;
            }
        }
    }
    // Delegation (if any) ends with the output: drop the borrowed root
    // buffer and fall back to the own input conduit.
    pull.link.revert(own);
    out.close();
    trace!(stage = %name, "pump stopped");
}

#[async_trait]
impl<I: Chunk, O: Chunk> Feed<I> for PullTransform<I, O> {
    async fn deliver(&self, chunk: I) -> Result<()> {
        self.input.deliver(chunk).await
    }

    fn close(&self) {
        self.input.close();
    }

    fn fail(&self, error: GjollError) {
        self.input.fail(error.clone());
        self.out.fail(error);
    }

    async fn flushed(&self) -> Result<()> {
        self.input.flushed().await
    }
}

#[async_trait]
impl<I: Chunk, O: Chunk> Tap<O> for PullTransform<I, O> {
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

impl<I: Chunk, O: Chunk> Clone for PullTransform<I, O> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            own: self.own.clone(),
            out: self.out.clone(),
            output: self.output.clone(),
            link: self.link.clone(),
            name: self.name.clone(),
        }
    }
}

impl<I: Chunk, O: Chunk> std::fmt::Debug for PullTransform<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullTransform")
            .field("stage", &self.name)
            .field("delegated", &self.link.is_delegated())
            .finish_non_exhaustive()
    }
}
