//! The unit of data flowing through a stream.

use bytes::{Bytes, BytesMut};

/// One unit of stream data: a contiguous byte region or a structured value.
///
/// A stream's mode is fixed by its chunk type at construction. Binary
/// streams use [`Bytes`]; flow control is weighted by byte length and
/// chunks may be carved at arbitrary offsets and gathered back together.
/// Structured streams wrap values in [`Item`]; every chunk weighs exactly
/// one unit and is never carved, so an acquire always yields one whole
/// value.
///
/// The terminal end-of-stream marker is not a chunk; it is modelled as
/// `None` from the output-role operations.
pub trait Chunk: Sized + Send + 'static {
    /// Structured mode: acquires are pinned to one chunk and `weight`
    /// is always 1.
    const STRUCTURED: bool = false;

    /// Flow-control weight of this chunk: byte length for binary
    /// streams, 1 for structured streams.
    fn weight(&self) -> usize;

    /// The zero-weight chunk returned by an acquire of zero units.
    fn empty() -> Self;

    /// Split off and return the front `at` units, leaving the remainder
    /// in place. Only called with `0 < at < weight()`.
    fn carve(&mut self, at: usize) -> Self;

    /// Concatenate consumed pieces, in order, into one chunk.
    fn gather(parts: Vec<Self>) -> Self;
}

impl Chunk for Bytes {
    fn weight(&self) -> usize {
        self.len()
    }

    fn empty() -> Self {
        Bytes::new()
    }

    fn carve(&mut self, at: usize) -> Self {
        self.split_to(at)
    }

    fn gather(parts: Vec<Self>) -> Self {
        let total = parts.iter().map(Bytes::len).sum();
        let mut gathered = BytesMut::with_capacity(total);
        for part in parts {
            gathered.extend_from_slice(&part);
        }
        gathered.freeze()
    }
}

/// Marks an arbitrary value as a structured-mode chunk.
///
/// ```rust
/// # use gjoll::Item;
/// let chunk = Item("a frame");
/// assert_eq!(chunk.0, "a frame");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<T>(pub T);

impl<T: Send + 'static> Chunk for Item<T> {
    const STRUCTURED: bool = true;

    fn weight(&self) -> usize {
        1
    }

    fn empty() -> Self {
        unreachable!("structured streams have no zero-weight chunk")
    }

    fn carve(&mut self, _at: usize) -> Self {
        unreachable!("structured chunks are never carved")
    }

    fn gather(mut parts: Vec<Self>) -> Self {
        match parts.pop() {
            Some(only) if parts.is_empty() => only,
            _ => unreachable!("structured chunks are never gathered"),
        }
    }
}
