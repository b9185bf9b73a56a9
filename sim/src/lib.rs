//! Fogline - Simulation Core
//!
//! Fog-of-war visibility, tile occupancy and broad-phase proximity for grid
//! based real-time strategy simulations. Uses `bevy_ecs` for the
//! entity-component-system architecture and runs on a deterministic fixed
//! timestep.
//!
//! - [`visibility`]: per-faction reference-counted visibility grids
//! - [`sight`]: per-entity vision tokens
//! - [`diplomacy`]: stances and shared-vision relays between factions
//! - [`occupancy`]: exclusive per-layer tile claims
//! - [`spatial`]: bucketed broad-phase index
//! - [`api`]: the [`SimWorld`] facade tying them together

pub mod api;
pub mod components;
pub mod config;
pub mod diplomacy;
pub mod error;
pub mod geometry;
pub mod occupancy;
pub mod sight;
pub mod spatial;
pub mod systems;
pub mod visibility;
pub mod world;

pub use api::SimWorld;
pub use components::*;
pub use config::{SimConfig, MAX_MAP_TILES};
pub use diplomacy::{FactionVision, Stance, VisibilityChanged, MAX_FACTIONS};
pub use error::{SimError, SimResult};
pub use geometry::{TileCircle, TilePoint, TileRect};
pub use occupancy::OccupancyGrid;
pub use sight::{VisionShape, VisionToken};
pub use spatial::{BroadPhase, SpatialEntry};
pub use visibility::{ChangeOrigin, TileVisibility, VisibilityGrid, UNDISCOVERED};
pub use world::{Snapshot, UnitSnapshot};
