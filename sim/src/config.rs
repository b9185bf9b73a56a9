//! Simulation configuration.
//!
//! `SimConfig` is inserted as a resource at world construction. It can be
//! built from `Default` or loaded from JSON; missing fields fall back to the
//! defaults.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diplomacy::MAX_FACTIONS;
use crate::error::{SimError, SimResult};

/// Largest map area accepted, in tiles (8192 x 8192). Keeps every per-tile
/// index inside `i32` and bounds the per-faction grid allocations.
pub const MAX_MAP_TILES: i64 = 1 << 26;

/// Configuration for map size, indexing and timestep.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Map width in tiles.
    pub map_width: i32,
    /// Map height in tiles.
    pub map_height: i32,
    /// Number of factions, each with its own visibility grid.
    pub faction_count: u8,
    /// Side length of a broad-phase bucket in tiles.
    pub bucket_size: i32,
    /// Largest footprint side any entity may have. Sizes the broad-phase query margin.
    pub max_entity_extent: i32,
    /// Fixed timestep in seconds (e.g. 1/20 = 0.05 for 20 Hz).
    pub fixed_timestep: f32,
    /// Sight range of units built with `SimWorld::unit_spec`.
    pub default_sight_range: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            map_width: 256,
            map_height: 256,
            faction_count: 2,
            bucket_size: 8,
            max_entity_extent: 8,
            fixed_timestep: 1.0 / 20.0,
            default_sight_range: 8,
        }
    }
}

impl SimConfig {
    /// Small square map, mostly for tests.
    pub fn with_map(width: i32, height: i32) -> Self {
        Self {
            map_width: width,
            map_height: height,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(data: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.map_width <= 0 || self.map_height <= 0 {
            return Err(SimError::InvalidConfig(format!(
                "map must be non-empty, got {}x{}",
                self.map_width, self.map_height
            )));
        }
        let tiles = self.map_width as i64 * self.map_height as i64;
        if tiles > MAX_MAP_TILES {
            return Err(SimError::InvalidConfig(format!(
                "map of {}x{} exceeds {MAX_MAP_TILES} tiles",
                self.map_width, self.map_height
            )));
        }
        if self.faction_count == 0 || self.faction_count as usize > MAX_FACTIONS {
            return Err(SimError::InvalidConfig(format!(
                "faction_count must be in 1..={MAX_FACTIONS}, got {}",
                self.faction_count
            )));
        }
        if self.bucket_size <= 0 {
            return Err(SimError::InvalidConfig("bucket_size must be positive".into()));
        }
        if self.max_entity_extent <= 0 {
            return Err(SimError::InvalidConfig(
                "max_entity_extent must be positive".into(),
            ));
        }
        if !(self.fixed_timestep > 0.0) {
            return Err(SimError::InvalidConfig(
                "fixed_timestep must be positive".into(),
            ));
        }
        Ok(())
    }
}
