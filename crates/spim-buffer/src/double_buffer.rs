//! Double-buffered chunk store shared with a persistence consumer.

use crate::{BufferError, BufferResult, SharedRegion};
use uuid::Uuid;

/// Two chunk-capacity shared regions alternating between write and read
/// roles.
///
/// The capture loop appends frames into the write region and, at a chunk
/// boundary, calls [`toggle`](Self::toggle) to hand the filled region to the
/// consumer while it keeps filling the other one. The consumer attaches by
/// [`read_region_name`](Self::read_region_name).
///
/// Callers must guarantee the prior read region has been fully drained
/// before toggling; the engine enforces this with the consumer's "done
/// reading" signal and holds a per-buffer lock for the toggle itself.
pub struct SharedDoubleBuffer {
    regions: [SharedRegion; 2],
    write_idx: usize,
    frame_bytes: usize,
    chunk_count_px: u32,
    frames_buffered: u32,
    closed: bool,
}

impl SharedDoubleBuffer {
    /// Allocate both regions, each sized for `chunk_count_px` frames of
    /// `frame_bytes` bytes.
    pub fn new(chunk_count_px: u32, frame_bytes: usize) -> BufferResult<Self> {
        if chunk_count_px == 0 || frame_bytes == 0 {
            return Err(BufferError::ZeroLength);
        }
        let len = frame_bytes
            .checked_mul(chunk_count_px as usize)
            .ok_or(BufferError::SizeOverflow)?;
        let stem = Uuid::new_v4().simple().to_string();
        let regions = [
            SharedRegion::create(&format!("spim-chunk-{stem}-a"), len)?,
            SharedRegion::create(&format!("spim-chunk-{stem}-b"), len)?,
        ];
        Ok(Self {
            regions,
            write_idx: 0,
            frame_bytes,
            chunk_count_px,
            frames_buffered: 0,
            closed: false,
        })
    }

    pub fn chunk_count_px(&self) -> u32 {
        self.chunk_count_px
    }

    /// Frames written into the active write region since the last toggle.
    pub fn frames_buffered(&self) -> u32 {
        self.frames_buffered
    }

    /// Append one frame into the active write region.
    ///
    /// Fails with [`BufferError::RegionFull`] once the region holds a full
    /// chunk; the caller must toggle first.
    pub fn add_frame(&mut self, frame: &[u8]) -> BufferResult<()> {
        if self.closed {
            return Err(BufferError::AlreadyClosed);
        }
        if frame.len() != self.frame_bytes {
            return Err(BufferError::FrameSizeMismatch {
                expected: self.frame_bytes,
                got: frame.len(),
            });
        }
        if self.frames_buffered >= self.chunk_count_px {
            return Err(BufferError::RegionFull {
                capacity: self.chunk_count_px,
            });
        }
        let offset = self.frames_buffered as usize * self.frame_bytes;
        self.regions[self.write_idx].as_mut_slice()[offset..offset + frame.len()]
            .copy_from_slice(frame);
        self.frames_buffered += 1;
        Ok(())
    }

    /// Exchange write and read roles and reset the fill count.
    ///
    /// Only safe once the prior read region has been drained; that ordering
    /// is owned by the caller (consumer signal plus toggle lock).
    pub fn toggle(&mut self) -> BufferResult<()> {
        if self.closed {
            return Err(BufferError::AlreadyClosed);
        }
        self.write_idx ^= 1;
        self.frames_buffered = 0;
        Ok(())
    }

    /// Name of the region currently readable by the consumer.
    pub fn read_region_name(&self) -> &str {
        self.regions[self.write_idx ^ 1].name()
    }

    /// Name of the region currently being filled.
    pub fn write_region_name(&self) -> &str {
        self.regions[self.write_idx].name()
    }

    /// Release both shared regions exactly once.
    ///
    /// A second close is a programming error and is rejected.
    pub fn close(&mut self) -> BufferResult<()> {
        if self.closed {
            return Err(BufferError::AlreadyClosed);
        }
        self.closed = true;
        for region in &mut self.regions {
            region.release()?;
        }
        Ok(())
    }
}
