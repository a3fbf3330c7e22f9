//! Typed errors for session configuration and invariant violations.
//!
//! These are the fatal, pre-capture errors: they abort the session before
//! any stage motion, trigger activity or capture task spawn. Mid-capture
//! hardware failures propagate as `anyhow::Error` out of the capture loop
//! instead.

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Fatal configuration and invariant errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Every writer in the session must use the identical chunk size.
    #[error(
        "chunk size mismatch: writer '{writer}' uses {found} frames per chunk, session uses {expected}"
    )]
    ChunkSizeMismatch {
        writer: String,
        expected: u32,
        found: u32,
    },

    /// The session chunk size is derived from the writers; without writers
    /// there is nothing to persist frames into.
    #[error("no writers registered; cannot derive a session chunk size")]
    NoWriters,

    /// Writers must be configured with a non-zero chunk size.
    #[error("writer '{writer}' is configured with a zero chunk size")]
    ChunkSizeZero { writer: String },

    /// A tile shorter than one chunk can never fill a buffer hand-off.
    #[error("tile {tile} frame count {steps} is less than the chunk size {chunk_count_px}")]
    TileTooShort {
        tile: usize,
        steps: u32,
        chunk_count_px: u32,
    },

    /// Each camera needs at least one writer to drain its frames.
    #[error("camera '{camera}' has no writer registered")]
    MissingWriter { camera: String },

    /// Operation kinds form a closed set validated at load time.
    #[error("unknown operation kind '{0}' (supported: writer, process, routine, transfer)")]
    UnknownOperationKind(String),

    /// A tile references a channel the instrument does not define.
    #[error("tile {tile} references unknown channel '{channel}'")]
    UnknownChannel { tile: usize, channel: String },

    /// Output directory preparation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
