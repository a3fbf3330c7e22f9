//! Scan plan: the ordered list of tiles to acquire.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One stage position / channel combination producing one contiguous frame
/// sequence. Immutable once read from the plan; consumed once per pass.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tile {
    /// Ordinal index within the scan.
    pub tile_number: usize,

    /// Imaging channel identifier (e.g. "488").
    pub channel: String,

    /// Filename prefix for every artifact this tile produces.
    pub prefix: String,

    /// Target position in millimetres, keyed by instrument axis letter.
    pub position_mm: HashMap<String, f64>,

    /// Number of frames ("steps") in this tile's stack.
    pub steps: u32,

    /// Scanning-axis step size in micrometres; becomes the z voxel size.
    pub step_size_um: f64,

    /// Per-device setting overrides applied during channel setup,
    /// device name -> setting name -> value.
    #[serde(default)]
    pub device_settings: HashMap<String, HashMap<String, toml::Value>>,
}

impl Tile {
    /// Position on a given axis, defaulting to 0.0 when the plan omits it.
    pub fn position_on(&self, axis: &str) -> f64 {
        self.position_mm.get(axis).copied().unwrap_or_default()
    }
}

/// Ordered sequence of tiles for one acquisition session.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScanPlan {
    pub tiles: Vec<Tile>,
}

impl ScanPlan {
    pub fn new(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }

    /// Reject any tile whose frame count cannot fill a single chunk.
    ///
    /// Runs before any stage motion or trigger activity; a short tile aborts
    /// the whole session.
    pub fn validate(&self, chunk_count_px: u32) -> EngineResult<()> {
        for tile in &self.tiles {
            if tile.steps < chunk_count_px {
                return Err(EngineError::TileTooShort {
                    tile: tile.tile_number,
                    steps: tile.steps,
                    chunk_count_px,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(number: usize, steps: u32) -> Tile {
        Tile {
            tile_number: number,
            channel: "488".into(),
            prefix: "t".into(),
            position_mm: HashMap::from([("x".into(), 1.5)]),
            steps,
            step_size_um: 1.0,
            device_settings: HashMap::new(),
        }
    }

    #[test]
    fn short_tile_is_rejected() {
        let plan = ScanPlan::new(vec![tile(0, 64), tile(1, 16)]);
        let err = plan.validate(64).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TileTooShort {
                tile: 1,
                steps: 16,
                chunk_count_px: 64
            }
        ));
    }

    #[test]
    fn exact_chunk_length_is_accepted() {
        let plan = ScanPlan::new(vec![tile(0, 64)]);
        plan.validate(64).unwrap();
    }

    #[test]
    fn position_defaults_to_zero_for_missing_axis() {
        let t = tile(0, 64);
        assert_eq!(t.position_on("x"), 1.5);
        assert_eq!(t.position_on("z"), 0.0);
    }

    #[test]
    fn tile_roundtrips_through_toml() {
        let t = tile(2, 128);
        let text = toml::to_string(&t).unwrap();
        let back: Tile = toml::from_str(&text).unwrap();
        assert_eq!(back.tile_number, 2);
        assert_eq!(back.steps, 128);
        assert_eq!(back.position_on("x"), 1.5);
    }
}
