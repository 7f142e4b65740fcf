//! Small single-purpose adapters built on the core primitives.

mod batching;
mod buffer;
mod counting;
mod limit;
mod stream;

pub use batching::{DEFAULT_BLOCK_SIZE, batching};
pub use buffer::{BufferSink, null_sink, sink, source};
pub use counting::{Counting, counting};
pub use limit::{LimitTap, limit};
pub use stream::{from_stream, into_stream};
