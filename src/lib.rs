//! Gjoll - composable flow-controlled stream adapters
//!
//! This crate lets a producer and a consumer exchange a sequence of
//! chunks (binary or structured) under one backpressure contract, and
//! lets asynchronous transformation logic be written as straight-line
//! code awaiting discrete "give me N bytes" operations instead of
//! juggling readiness callbacks.
//!
//! Everything is built from one primitive: the [`conduit`], a
//! backpressure-aware pipe whose [`Intake`] suspends the producer at the
//! high-water mark and whose [`Outlet`] serves serialized, weighted
//! acquire requests. On top of it sit the push-oriented [`Transform`],
//! the pull-oriented [`PullTransform`] (with delegation for stream
//! segmentation), the sequential [`Compound`] concatenator, the
//! stage-chaining [`Weld`], and the small adapters in [`adapters`].
//!
//! # Pull Example
//!
//! Reading exactly 16 bytes at a time, whatever the incoming chunk
//! boundaries:
//!
//! ```rust
//! use bytes::Bytes;
//! use gjoll::{FlowOptions, Item, Pull, PullTransform, Tap, pipe_from_buffer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> gjoll::Result<()> {
//! let frames = PullTransform::new(
//!     FlowOptions::new().name("framer"),
//!     |t: Pull<Bytes, Item<Bytes>>| async move {
//!         match t.acquire(16).await? {
//!             // Discard a short trailing frame.
//!             Some(frame) if frame.len() == 16 => Ok(Some(Item(frame))),
//!             _ => Ok(None),
//!         }
//!     },
//! );
//!
//! pipe_from_buffer(vec![0u8; 40], frames.clone()).await?;
//! let mut count = 0;
//! while let Some(Item(frame)) = frames.next().await? {
//!     assert_eq!(frame.len(), 16);
//!     count += 1;
//! }
//! assert_eq!(count, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Weld Example
//!
//! ```rust
//! use bytes::Bytes;
//! use gjoll::{FlowOptions, Push, Transform, Weld, pipe_from_buffer, pipe_to_buffer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> gjoll::Result<()> {
//! let upper = Transform::new(FlowOptions::new(), |_: Push<Bytes>, c: Bytes| async move {
//!     Ok(Some(Bytes::from(c.to_ascii_uppercase())))
//! });
//! let exclaim = Transform::with_flush(
//!     FlowOptions::new(),
//!     |_: Push<Bytes>, c: Bytes| async move { Ok(Some(c)) },
//!     |push: Push<Bytes>| async move { push.push(Bytes::from_static(b"!")).await },
//! );
//! let weld = Weld::new(upper).then(exclaim);
//!
//! pipe_from_buffer("hello sailor", weld.clone()).await?;
//! assert_eq!(&pipe_to_buffer(weld).await?[..], b"HELLO SAILOR!");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod bridge;
pub mod chunk;
pub mod compound;
pub mod conduit;
pub mod error;
pub mod flow;
pub mod options;
pub mod telemetry;
pub mod transform;
pub mod weld;

// Re-export main types at crate root
pub use chunk::{Chunk, Item};
pub use compound::{BoxTap, Compound, compound};
pub use conduit::{Intake, Outlet, conduit};
pub use error::{GjollError, Result};
pub use flow::{Feed, Tap, pipe, pipe_from_buffer, pipe_to_buffer};
pub use options::{DEFAULT_HIGH_WATER_MARK, FlowOptions};
pub use transform::{Pull, PullTransform, Push, Transform};
pub use weld::Weld;
