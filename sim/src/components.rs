//! ECS Components for the Fogline simulation.
//!
//! Components are pure data containers attached to entities. The grids and
//! indices that mirror them live in resources and are only mutated through
//! `systems::lifecycle`.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{TilePoint, TileRect};

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Faction/player identifier. Indexes the per-faction vision grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FactionId(pub u8);

impl FactionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Faction that owns an entity and whose grid its vision token writes to.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner(pub FactionId);

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Top-left tile of the entity's footprint.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position(pub TilePoint);

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self(TilePoint::new(x, y))
    }
}

/// Size of the entity in tiles.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub width: i32,
    pub height: i32,
}

impl Footprint {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Bounding rectangle when anchored at `position`.
    pub fn bounds_at(&self, position: Position) -> TileRect {
        TileRect::new(position.0.x, position.0.y, self.width, self.height)
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Occupancy layer an entity claims tiles in. Entities without this
/// component (projectiles, markers) never block anything.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementLayer {
    Ground,
    Air,
}

impl MovementLayer {
    pub const ALL: [MovementLayer; 2] = [MovementLayer::Ground, MovementLayer::Air];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            MovementLayer::Ground => 0,
            MovementLayer::Air => 1,
        }
    }
}

// ============================================================================
// STATE COMPONENTS
// ============================================================================

/// Hit points. An entity at zero is queued for removal in the commit phase.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Movement order.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    /// Stay in place.
    #[default]
    Hold,
    /// Step one tile per tick toward the target anchor tile.
    MoveTo(TilePoint),
}

/// Marks a building whose vision is still a construction glow.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct UnderConstruction;

// ============================================================================
// SPAWN DESCRIPTION
// ============================================================================

/// Everything needed to create a unit. Validated by `systems::lifecycle::spawn_unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub owner: FactionId,
    pub position: TilePoint,
    pub footprint: Footprint,
    /// `None` for entities that do not claim occupancy.
    pub layer: Option<MovementLayer>,
    /// Line-of-sight radius in tiles. Zero still reveals the center tile.
    pub sight_range: i32,
    pub health: f32,
    /// Starts with a construction glow instead of line of sight.
    pub under_construction: bool,
}

impl UnitSpec {
    /// A 1×1 ground unit with the given sight range.
    pub fn unit(owner: FactionId, x: i32, y: i32, sight_range: i32) -> Self {
        Self {
            owner,
            position: TilePoint::new(x, y),
            footprint: Footprint::default(),
            layer: Some(MovementLayer::Ground),
            sight_range,
            health: 100.0,
            under_construction: false,
        }
    }

    /// A ground structure that starts under construction.
    pub fn building(owner: FactionId, x: i32, y: i32, width: i32, height: i32, sight_range: i32) -> Self {
        Self {
            owner,
            position: TilePoint::new(x, y),
            footprint: Footprint::new(width, height),
            layer: Some(MovementLayer::Ground),
            sight_range,
            health: 500.0,
            under_construction: true,
        }
    }

    pub fn bounds(&self) -> TileRect {
        self.footprint.bounds_at(Position(self.position))
    }
}
