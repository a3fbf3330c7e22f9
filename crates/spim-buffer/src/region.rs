//! Named, file-backed shared memory regions.
//!
//! A region is created by its owner (the capture loop) and attached to by
//! name from a consumer. The backing file lives on tmpfs where available so
//! maps stay in memory; release removes the file and may only be performed
//! by the owner, exactly once.

use crate::{BufferError, BufferResult};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Directory used to back shared regions.
fn region_root() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// A named shared-memory region backed by a memory-mapped file.
pub struct SharedRegion {
    name: String,
    path: PathBuf,
    map: MmapMut,
    owner: bool,
    released: bool,
}

impl SharedRegion {
    /// Create a new region of `len` bytes. The caller becomes the owner and
    /// is responsible for calling [`release`](Self::release) when done.
    pub fn create(name: &str, len: usize) -> BufferResult<Self> {
        if len == 0 {
            return Err(BufferError::ZeroLength);
        }
        let path = region_root().join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(len as u64)?;
        // SAFETY: the file was just created with the requested length and no
        // other handle truncates it while the map is live.
        let map = unsafe { MmapMut::map_mut(&file)? };
        tracing::trace!(region = %name, len, "created shared region");
        Ok(Self {
            name: name.to_string(),
            path,
            map,
            owner: true,
            released: false,
        })
    }

    /// Attach to an existing region by name. The resulting handle does not
    /// own the region and cannot release it.
    pub fn open(name: &str) -> BufferResult<Self> {
        let path = region_root().join(name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        // SAFETY: mapping a region file created by `create`; the owner keeps
        // it sized until release, and unlink does not invalidate live maps.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            name: name.to_string(),
            path,
            map,
            owner: false,
            released: false,
        })
    }

    /// Stable name a consumer can use to attach to this region.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Remove the backing file. Owner-only, exactly once; a second release
    /// is rejected rather than silently ignored.
    pub fn release(&mut self) -> BufferResult<()> {
        if !self.owner {
            return Err(BufferError::NotOwner(self.name.clone()));
        }
        if self.released {
            return Err(BufferError::AlreadyReleased(self.name.clone()));
        }
        std::fs::remove_file(&self.path)?;
        self.released = true;
        tracing::trace!(region = %self.name, "released shared region");
        Ok(())
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if self.owner && !self.released {
            tracing::debug!(region = %self.name, "shared region dropped without release, unlinking");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("{name}-{}", uuid::Uuid::new_v4().simple())
    }

    #[test]
    fn create_write_open_read() {
        let name = unique("region-rw");
        let mut region = SharedRegion::create(&name, 64).unwrap();
        region.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);

        let reader = SharedRegion::open(&name).unwrap();
        assert_eq!(&reader.as_slice()[..4], &[1, 2, 3, 4]);
        assert_eq!(reader.len(), 64);

        region.release().unwrap();
    }

    #[test]
    fn release_is_owner_only_and_exactly_once() {
        let name = unique("region-release");
        let mut region = SharedRegion::create(&name, 16).unwrap();
        let mut reader = SharedRegion::open(&name).unwrap();

        assert!(matches!(
            reader.release(),
            Err(BufferError::NotOwner(_))
        ));

        region.release().unwrap();
        assert!(matches!(
            region.release(),
            Err(BufferError::AlreadyReleased(_))
        ));
    }

    #[test]
    fn zero_length_rejected() {
        assert!(matches!(
            SharedRegion::create(&unique("region-zero"), 0),
            Err(BufferError::ZeroLength)
        ));
    }
}
