//! Interop with `futures_util::Stream`.

use futures_util::{Stream, StreamExt};

use crate::chunk::Chunk;
use crate::conduit::{Outlet, conduit};
use crate::error::Result;
use crate::flow::Tap;
use crate::options::FlowOptions;

/// Feed a `Stream` of chunks into a fresh conduit and return its outlet.
///
/// The relay task applies the conduit's backpressure to the stream: it
/// only polls for the next item once the previous chunk was accepted.
/// An `Err` item terminates the outlet with that error.
///
/// # Panics
///
/// Spawns the relay task and requires a tokio runtime context.
pub fn from_stream<T, S>(stream: S, options: FlowOptions) -> Outlet<T>
where
    T: Chunk,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    let (intake, outlet) = conduit(options);
    tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if intake.deliver(chunk).await.is_err() {
                        return;
                    }
                }
                Err(error) => {
                    intake.fail(error);
                    return;
                }
            }
        }
        intake.close();
    });
    outlet
}

/// Expose any tap as a `futures_util::Stream` of chunks.
///
/// The stream yields each chunk as produced and finishes at the terminal
/// marker; a stage error is yielded once and ends the stream.
pub fn into_stream<T, S>(tap: S) -> impl Stream<Item = Result<T>> + Send
where
    T: Chunk,
    S: Tap<T> + 'static,
{
    futures_util::stream::unfold(Some(tap), |tap| async move {
        let tap = tap?;
        match tap.next().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(tap))),
            Ok(None) => None,
            Err(error) => Some((Err(error), None)),
        }
    })
}
