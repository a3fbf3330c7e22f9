#![allow(unsafe_code)] // Memory mapping requires unsafe; confined to region.rs with SAFETY notes.
//! Shared-memory buffers for trigger-paced frame acquisition.
//!
//! This crate provides the hand-off primitives between a frame capture loop
//! (the producer) and its persistence/analysis consumers:
//!
//! - [`SharedRegion`]: a named, file-backed memory map that a consumer can
//!   attach to by name, with creator-only release exactly once
//! - [`SharedDoubleBuffer`]: two chunk-capacity regions alternating between
//!   write and read roles so capture and drain never block each other beyond
//!   the toggle barrier
//! - [`FrameSlot`]: a single-slot region for live analysis consumers, a
//!   bounded one-slot queue rather than a general ring buffer
//! - [`Signal`]: a set/clear/await flag backed by a watch channel, used for
//!   the "done reading" and "new image" hand-off signals
//!
//! # Ownership model
//!
//! Regions are owned by their creator. The capture loop creates the buffers,
//! hands region *names* to consumers, and releases the backing memory exactly
//! once when draining. A second release is a programming error and is
//! rejected, not ignored.

pub mod double_buffer;
pub mod region;
pub mod signal;
pub mod slot;

pub use double_buffer::SharedDoubleBuffer;
pub use region::SharedRegion;
pub use signal::Signal;
pub use slot::FrameSlot;

use thiserror::Error;

/// Convenience alias for buffer results.
pub type BufferResult<T> = std::result::Result<T, BufferError>;

/// Errors raised by shared-memory buffer handling.
///
/// `RegionFull` and `FrameSizeMismatch` indicate misuse by the producer;
/// `AlreadyClosed`/`AlreadyReleased` reject double-free of shared memory.
#[derive(Error, Debug)]
pub enum BufferError {
    /// The active write region already holds a full chunk of frames.
    #[error("write region full: {capacity} frames already buffered; toggle before adding more")]
    RegionFull { capacity: u32 },

    /// A frame's byte length does not match the region stride.
    #[error("frame size {got} bytes does not match the configured frame size {expected} bytes")]
    FrameSizeMismatch { expected: usize, got: usize },

    /// The buffer was closed and its shared memory released.
    #[error("buffer already closed")]
    AlreadyClosed,

    /// The region's backing memory was already released.
    #[error("shared region '{0}' already released")]
    AlreadyReleased(String),

    /// Only the handle that created a region may release it.
    #[error("shared region '{0}' is not owned by this handle")]
    NotOwner(String),

    /// Regions must have a non-zero length.
    #[error("shared region length must be non-zero")]
    ZeroLength,

    /// Computing the region length overflowed usize.
    #[error("size overflow while computing region length")]
    SizeOverflow,

    /// Underlying file or mapping failure.
    #[error("shared region I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
