//! Error type for recoverable failures at the simulation boundary.
//!
//! Invariant violations inside the grids (out-of-bounds tiles, counter
//! underflow, double attachment of a vision token) are programming errors
//! and panic instead of surfacing here.

use bevy_ecs::entity::Entity;
use thiserror::Error;

use crate::components::{FactionId, MovementLayer};
use crate::geometry::{TilePoint, TileRect};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("tile ({}, {}) on the {layer:?} layer is already held by {occupant:?}", tile.x, tile.y)]
    Occupied {
        tile: TilePoint,
        layer: MovementLayer,
        occupant: Entity,
    },

    #[error("{entity:?} does not hold tile ({}, {}) on the {layer:?} layer", tile.x, tile.y)]
    NotOccupant {
        entity: Entity,
        tile: TilePoint,
        layer: MovementLayer,
    },

    #[error("footprint {width}x{height} exceeds the maximum entity extent of {max}")]
    TooLarge { width: i32, height: i32, max: i32 },

    #[error("footprint {0:?} does not fit inside the map")]
    OutOfBounds(TileRect),

    #[error("unknown entity {0:?}")]
    UnknownEntity(Entity),

    #[error("unknown faction {0:?}")]
    UnknownFaction(FactionId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
