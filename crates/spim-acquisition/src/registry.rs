//! Registry of per-device acquisition operations.
//!
//! Operations (writers, processes, routines, transfers) form a closed set of
//! kinds validated at load time, replacing dynamically constructed
//! name-indexed attributes with typed collections.

use spim_core::{EngineError, EngineResult, FrameProcess, FrameWriter, Routine, Transfer};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of operation kinds an acquisition config may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Writer,
    Process,
    Routine,
    Transfer,
}

impl FromStr for OperationKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "writer" | "writers" => Ok(Self::Writer),
            "process" | "processes" => Ok(Self::Process),
            "routine" | "routines" => Ok(Self::Routine),
            "transfer" | "transfers" => Ok(Self::Transfer),
            other => Err(EngineError::UnknownOperationKind(other.to_string())),
        }
    }
}

type NamedMap<T> = HashMap<String, HashMap<String, Arc<T>>>;

/// Typed collections of operation instances, keyed by device then name.
///
/// Writers and processes are keyed by the camera they consume from; routines
/// and transfers by the device whose output they act on.
#[derive(Default)]
pub struct OperationRegistry {
    writers: NamedMap<dyn FrameWriter>,
    processes: NamedMap<dyn FrameProcess>,
    routines: NamedMap<dyn Routine>,
    transfers: NamedMap<dyn Transfer>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_writer(&mut self, camera_id: &str, name: &str, writer: Arc<dyn FrameWriter>) {
        self.writers
            .entry(camera_id.to_string())
            .or_default()
            .insert(name.to_string(), writer);
    }

    pub fn add_process(&mut self, camera_id: &str, name: &str, process: Arc<dyn FrameProcess>) {
        self.processes
            .entry(camera_id.to_string())
            .or_default()
            .insert(name.to_string(), process);
    }

    pub fn add_routine(&mut self, device_id: &str, name: &str, routine: Arc<dyn Routine>) {
        self.routines
            .entry(device_id.to_string())
            .or_default()
            .insert(name.to_string(), routine);
    }

    pub fn add_transfer(&mut self, device_id: &str, name: &str, transfer: Arc<dyn Transfer>) {
        self.transfers
            .entry(device_id.to_string())
            .or_default()
            .insert(name.to_string(), transfer);
    }

    pub fn writers_for(&self, camera_id: &str) -> Option<&HashMap<String, Arc<dyn FrameWriter>>> {
        self.writers.get(camera_id)
    }

    pub fn processes_for(
        &self,
        camera_id: &str,
    ) -> Option<&HashMap<String, Arc<dyn FrameProcess>>> {
        self.processes.get(camera_id)
    }

    pub fn routines(&self) -> &NamedMap<dyn Routine> {
        &self.routines
    }

    pub fn transfers(&self) -> &NamedMap<dyn Transfer> {
        &self.transfers
    }

    /// Iterate every writer with its registry name.
    pub fn all_writers(&self) -> impl Iterator<Item = (&String, &Arc<dyn FrameWriter>)> {
        self.writers.values().flatten()
    }

    /// Derive the session chunk size by validating that every writer uses
    /// the identical, non-zero chunk size. Fatal if violated.
    pub fn session_chunk_size(&self) -> EngineResult<u32> {
        let mut session: Option<u32> = None;
        for (name, writer) in self.all_writers() {
            let chunk = writer.chunk_count_px();
            if chunk == 0 {
                return Err(EngineError::ChunkSizeZero {
                    writer: name.clone(),
                });
            }
            match session {
                None => session = Some(chunk),
                Some(expected) if chunk != expected => {
                    return Err(EngineError::ChunkSizeMismatch {
                        writer: name.clone(),
                        expected,
                        found: chunk,
                    });
                }
                Some(_) => {}
            }
        }
        session.ok_or(EngineError::NoWriters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spim_driver_mock::MockWriter;
    use std::path::Path;

    #[test]
    fn operation_kinds_are_a_closed_set() {
        assert_eq!("writer".parse::<OperationKind>().unwrap(), OperationKind::Writer);
        assert_eq!(
            "transfers".parse::<OperationKind>().unwrap(),
            OperationKind::Transfer
        );
        assert!(matches!(
            "visualizer".parse::<OperationKind>(),
            Err(EngineError::UnknownOperationKind(_))
        ));
    }

    #[test]
    fn uniform_chunk_sizes_are_accepted() {
        let mut registry = OperationRegistry::new();
        registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(8, Path::new("."))));
        registry.add_writer("cam1", "zarr", Arc::new(MockWriter::new(8, Path::new("."))));
        assert_eq!(registry.session_chunk_size().unwrap(), 8);
    }

    #[test]
    fn mismatched_chunk_size_is_fatal() {
        let mut registry = OperationRegistry::new();
        registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(8, Path::new("."))));
        registry.add_writer("cam1", "tiff", Arc::new(MockWriter::new(16, Path::new("."))));
        assert!(matches!(
            registry.session_chunk_size(),
            Err(EngineError::ChunkSizeMismatch {
                expected: 8,
                found: 16,
                ..
            }) | Err(EngineError::ChunkSizeMismatch {
                expected: 16,
                found: 8,
                ..
            })
        ));
    }

    #[test]
    fn no_writers_is_fatal() {
        let registry = OperationRegistry::new();
        assert!(matches!(
            registry.session_chunk_size(),
            Err(EngineError::NoWriters)
        ));
    }
}
