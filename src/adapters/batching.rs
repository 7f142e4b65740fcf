//! Regrouping a byte stream into fixed-size blocks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::options::FlowOptions;
use crate::transform::{Push, Transform};

/// Default block size: 1 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

fn lock(buffer: &Arc<Mutex<BytesMut>>) -> MutexGuard<'_, BytesMut> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn emit_blocks(
    push: &Push<Bytes>,
    buffer: &Arc<Mutex<BytesMut>>,
    block_size: usize,
    exact: bool,
) -> Result<()> {
    if exact {
        loop {
            let block = {
                let mut buffer = lock(buffer);
                if buffer.len() >= block_size {
                    Some(buffer.split_to(block_size).freeze())
                } else {
                    None
                }
            };
            match block {
                Some(block) => push.push(block).await?,
                None => return Ok(()),
            }
        }
    }
    let block = {
        let mut buffer = lock(buffer);
        if buffer.is_empty() {
            None
        } else {
            Some(buffer.split().freeze())
        }
    };
    match block {
        Some(block) => push.push(block).await,
        None => Ok(()),
    }
}

/// A push transform that buffers input until `block_size` bytes are
/// available, then emits a block. With `exact`, blocks are carved to
/// exactly `block_size` bytes; any remainder is emitted on flush.
///
/// # Panics
///
/// Spawns the transform pump task and requires a tokio runtime context.
pub fn batching(options: FlowOptions, block_size: usize, exact: bool) -> Transform<Bytes, Bytes> {
    let buffer = Arc::new(Mutex::new(BytesMut::new()));
    let flush_buffer = buffer.clone();
    Transform::with_flush(
        options,
        move |push: Push<Bytes>, chunk: Bytes| {
            let buffer = buffer.clone();
            async move {
                let ready = {
                    let mut buffer = lock(&buffer);
                    buffer.extend_from_slice(&chunk);
                    buffer.len() >= block_size
                };
                if ready {
                    emit_blocks(&push, &buffer, block_size, exact).await?;
                }
                Ok(None)
            }
        },
        move |push: Push<Bytes>| async move {
            // Whole blocks first (when exact), then whatever is left.
            emit_blocks(&push, &flush_buffer, block_size, exact).await?;
            emit_blocks(&push, &flush_buffer, block_size, false).await
        },
    )
}
