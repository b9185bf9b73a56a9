//! Snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the simulation state
//! for clients. The visibility grids themselves are not serialized, only a
//! per-faction summary of them.

use bevy_ecs::prelude::*;
use bevy_ecs::query::Has;
use serde::{Deserialize, Serialize};

use crate::components::*;
use crate::diplomacy::FactionVision;
use crate::error::SimResult;
use crate::sight::{VisionShape, VisionToken};

/// Snapshot of a single unit's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// `Entity::to_bits`, stable for the lifetime of the unit.
    pub id: u64,
    pub owner: u8,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub layer: Option<MovementLayer>,
    pub health: f32,
    pub health_max: f32,
    pub order: Order,
    pub sight_range: i32,
    pub vision: Option<VisionShape>,
    pub under_construction: bool,
}

/// Discovered and visible tile counts for one faction's own grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionSnapshot {
    pub faction: u8,
    pub discovered_tiles: usize,
    pub visible_tiles: usize,
    pub fog_disabled: bool,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    /// All units, in entity order.
    pub units: Vec<UnitSnapshot>,
    pub factions: Vec<FactionSnapshot>,
}

type UnitRow = (
    Entity,
    &'static Owner,
    &'static Position,
    &'static Footprint,
    Option<&'static MovementLayer>,
    &'static Health,
    &'static Order,
    Option<&'static VisionToken>,
    Has<UnderConstruction>,
);

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut query = world.query::<UnitRow>();
        let mut units: Vec<UnitSnapshot> = query
            .iter(world)
            .map(
                |(entity, owner, pos, footprint, layer, health, order, token, under_construction)| {
                    UnitSnapshot {
                        id: entity.to_bits(),
                        owner: owner.0 .0,
                        x: pos.0.x,
                        y: pos.0.y,
                        width: footprint.width,
                        height: footprint.height,
                        layer: layer.copied(),
                        health: health.current,
                        health_max: health.max,
                        order: *order,
                        sight_range: token.map_or(0, VisionToken::sight_range),
                        vision: token.map(VisionToken::shape),
                        under_construction,
                    }
                },
            )
            .collect();
        units.sort_unstable_by_key(|u| u.id);

        let factions = world
            .get_resource::<FactionVision>()
            .map(|vision| {
                (0..vision.faction_count())
                    .map(|i| {
                        let grid = vision.grid(FactionId(i as u8));
                        FactionSnapshot {
                            faction: i as u8,
                            discovered_tiles: grid.discovered_count(),
                            visible_tiles: grid.visible_count(),
                            fog_disabled: grid.is_disabled(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            tick,
            time,
            units,
            factions,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to pretty JSON string (for debugging).
    pub fn to_json_pretty(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
