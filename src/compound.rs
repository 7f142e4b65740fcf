//! Sequential concatenation of sub-streams into one output stream.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::trace;

use crate::chunk::{Chunk, Item};
use crate::conduit::{Intake, Outlet, conduit};
use crate::error::{GjollError, Result};
use crate::flow::{Tap, relay};
use crate::options::FlowOptions;

/// A boxed output role, the form sub-streams are supplied in.
pub type BoxTap<T> = Box<dyn Tap<T>>;

/// Drains a series of sub-streams, in order, into one logical output
/// stream with end-to-end backpressure.
///
/// Sub-streams may be supplied up front ([`from_list`](Compound::from_list)),
/// fetched lazily ([`from_generator`](Compound::from_generator)), awaited
/// in order ([`from_futures`](Compound::from_futures)), or attached
/// incrementally at arbitrary later times with
/// [`append`](Compound::append) + [`finish`](Compound::finish). Each
/// sub-stream is drained fully before the next is started; a sub-stream
/// error becomes the compound's own error and no further sub-streams are
/// attempted. A consumer that outpaces the supply waits; one that lags
/// is buffered against the output conduit's high-water mark.
///
/// # Panics
///
/// Construction spawns the drain task and requires a tokio runtime
/// context.
pub struct Compound<T: Chunk> {
    output: Outlet<T>,
    supply: Option<Intake<Item<BoxTap<T>>>>,
}

impl<T: Chunk> Compound<T> {
    /// Create an empty compound; supply sub-streams with
    /// [`append`](Compound::append) and end the series with
    /// [`finish`](Compound::finish).
    pub fn new(options: FlowOptions) -> Self {
        let name = options.name.clone().unwrap_or_else(|| "compound".to_owned());
        // One sub-stream ahead is enough: the drain task only moves on
        // once the previous sub-stream is exhausted.
        let (supply, pending) = conduit::<Item<BoxTap<T>>>(
            FlowOptions::new()
                .high_water_mark(1)
                .name(format!("{name}/supply")),
        );
        let (out, output) = conduit::<T>(options);
        tokio::spawn(async move {
            loop {
                match pending.next().await {
                    Ok(Some(Item(tap))) => {
                        trace!(stage = %name, "draining sub-stream");
                        if relay(&tap, &out, false).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        out.close();
                        return;
                    }
                    Err(error) => {
                        out.fail(error);
                        return;
                    }
                }
            }
        });
        Self {
            output,
            supply: Some(supply),
        }
    }

    /// Concatenate an already-materialized, ordered list of sub-streams.
    pub fn from_list(options: FlowOptions, taps: Vec<BoxTap<T>>) -> Self {
        let compound = Self::new(options);
        let feeder = compound.clone();
        tokio::spawn(async move {
            for tap in taps {
                if feeder.append_boxed(tap).await.is_err() {
                    return;
                }
            }
            feeder.finish();
        });
        compound
    }

    /// Concatenate sub-streams fetched lazily from `generator`; `None`
    /// signals the end of the series.
    pub fn from_generator<G>(options: FlowOptions, mut generator: G) -> Self
    where
        G: FnMut() -> Option<BoxTap<T>> + Send + 'static,
    {
        let name = options.name.clone().unwrap_or_else(|| "compound".to_owned());
        let (out, output) = conduit::<T>(options);
        tokio::spawn(async move {
            while let Some(tap) = generator() {
                trace!(stage = %name, "draining generated sub-stream");
                if relay(&tap, &out, false).await.is_err() {
                    return;
                }
            }
            out.close();
        });
        Self {
            output,
            supply: None,
        }
    }

    /// Concatenate sub-streams that are not yet available; the futures
    /// are awaited strictly in list order, so chunks are neither lost
    /// nor reordered however late each sub-stream materialises.
    pub fn from_futures(options: FlowOptions, futures: Vec<BoxFuture<'static, BoxTap<T>>>) -> Self {
        let compound = Self::new(options);
        let feeder = compound.clone();
        tokio::spawn(async move {
            for future in futures {
                let tap = future.await;
                if feeder.append_boxed(tap).await.is_err() {
                    return;
                }
            }
            feeder.finish();
        });
        compound
    }

    /// Attach the next sub-stream. Resolves once the drain task can take
    /// it (at most one sub-stream is held in reserve).
    pub async fn append(&self, tap: impl Tap<T> + 'static) -> Result<()> {
        self.append_boxed(Box::new(tap)).await
    }

    /// End the series of sub-streams; the output terminates once every
    /// attached sub-stream has drained.
    pub fn finish(&self) {
        if let Some(supply) = &self.supply {
            supply.close();
        }
    }

    async fn append_boxed(&self, tap: BoxTap<T>) -> Result<()> {
        match &self.supply {
            Some(supply) => supply.deliver(Item(tap)).await,
            None => Err(GjollError::protocol(
                "sub-streams of a generator-supplied compound cannot be appended",
            )),
        }
    }
}

#[async_trait]
impl<T: Chunk> Tap<T> for Compound<T> {
    async fn next(&self) -> Result<Option<T>> {
        self.output.next().await
    }

    fn unacquire(&self, chunk: T) {
        self.output.unacquire(chunk);
    }

    async fn ended(&self) -> Result<()> {
        self.output.ended().await
    }

    async fn acquire(&self, count: usize) -> Result<Option<T>> {
        self.output.acquire(count).await
    }
}

impl<T: Chunk> Clone for Compound<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            supply: self.supply.clone(),
        }
    }
}

impl<T: Chunk> std::fmt::Debug for Compound<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compound")
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Convenience constructor for the incremental supply mode.
pub fn compound<T: Chunk>(options: FlowOptions) -> Compound<T> {
    Compound::new(options)
}
