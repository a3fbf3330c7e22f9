//! Single-slot frame hand-off for live analysis consumers.

use crate::{BufferError, BufferResult, SharedRegion, Signal};
use uuid::Uuid;

/// A one-frame shared region paired with the consumer's "new image" signal.
///
/// This is a bounded one-slot queue, not a ring buffer: the producer must
/// observe the signal clear before publishing the next frame, and the
/// consumer clears the signal once it has copied the slot out.
pub struct FrameSlot {
    region: SharedRegion,
    new_image: Signal,
    closed: bool,
}

impl FrameSlot {
    /// Allocate a slot sized for one frame, wired to the consumer's signal.
    pub fn new(frame_bytes: usize, new_image: Signal) -> BufferResult<Self> {
        let name = format!("spim-slot-{}", Uuid::new_v4().simple());
        let region = SharedRegion::create(&name, frame_bytes)?;
        Ok(Self {
            region,
            new_image,
            closed: false,
        })
    }

    /// Name the consumer uses to attach to the slot region.
    pub fn region_name(&self) -> &str {
        self.region.name()
    }

    pub fn new_image(&self) -> Signal {
        self.new_image.clone()
    }

    /// Copy a frame into the slot and raise the new-image signal.
    ///
    /// The caller must have observed the signal clear first; publishing over
    /// an unconsumed slot would hand the consumer a torn frame.
    pub fn publish(&mut self, frame: &[u8]) -> BufferResult<()> {
        if self.closed {
            return Err(BufferError::AlreadyClosed);
        }
        if frame.len() != self.region.len() {
            return Err(BufferError::FrameSizeMismatch {
                expected: self.region.len(),
                got: frame.len(),
            });
        }
        self.region.as_mut_slice().copy_from_slice(frame);
        self.new_image.set();
        Ok(())
    }

    /// Release the slot region exactly once.
    pub fn close(&mut self) -> BufferResult<()> {
        if self.closed {
            return Err(BufferError::AlreadyClosed);
        }
        self.closed = true;
        self.region.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_consume_cycle() {
        let signal = Signal::new(false);
        let mut slot = FrameSlot::new(4, signal.clone()).unwrap();

        slot.publish(&[9, 8, 7, 6]).unwrap();
        assert!(signal.is_set());

        let reader = SharedRegion::open(slot.region_name()).unwrap();
        assert_eq!(reader.as_slice(), &[9, 8, 7, 6]);
        signal.clear();

        slot.publish(&[1, 2, 3, 4]).unwrap();
        assert_eq!(reader.as_slice(), &[1, 2, 3, 4]);

        slot.close().unwrap();
        assert!(matches!(slot.close(), Err(BufferError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn publish_rejects_wrong_size() {
        let mut slot = FrameSlot::new(4, Signal::new(false)).unwrap();
        assert!(matches!(
            slot.publish(&[0u8; 2]),
            Err(BufferError::FrameSizeMismatch { .. })
        ));
        slot.close().unwrap();
    }
}
