//! Entity lifecycle handlers.
//!
//! Every structural or spatial change to a unit goes through here so the
//! occupancy grid, the broad phase and the unit's vision token stay in step:
//!
//! - **created**: validate, claim occupancy, index, attach a token
//! - **destroyed**: vacate, unindex, dispose the token
//! - **moved / resized**: one relocation across all three structures
//! - **sight range / construction / owner changes**: token only
//!
//! Validation that callers can get wrong (size, bounds, blocked tiles,
//! unknown faction) returns `SimError`. Anything past validation that
//! still fails is an invariant violation.

use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemState;

use crate::components::*;
use crate::config::SimConfig;
use crate::diplomacy::FactionVision;
use crate::error::{SimError, SimResult};
use crate::geometry::{TilePoint, TileRect};
use crate::occupancy::OccupancyGrid;
use crate::sight::{VisionShape, VisionToken};
use crate::spatial::BroadPhase;

/// Mutable view of every structure that mirrors unit placement.
pub struct GridsMut<'a> {
    pub occupancy: &'a mut OccupancyGrid,
    pub broadphase: &'a mut BroadPhase,
    pub vision: &'a mut FactionVision,
}

impl GridsMut<'_> {
    /// Move an entity's footprint from `from` to `to` in every structure.
    ///
    /// Occupancy goes first: if the destination is blocked nothing else is
    /// touched and the error is returned.
    pub fn relocate(
        &mut self,
        entity: Entity,
        owner: FactionId,
        layer: Option<MovementLayer>,
        token: Option<&mut VisionToken>,
        from: TileRect,
        to: TileRect,
    ) -> SimResult<()> {
        if let Some(layer) = layer {
            self.occupancy.move_entity(entity, from, to, layer)?;
        }
        self.broadphase.relocate(entity, from, to);
        if let Some(token) = token {
            let grid = self.vision.grid_mut(owner);
            token.set_bounds(grid, to);
            token.set_center(grid, to.center());
        }
        Ok(())
    }
}

type UnitData = (
    &'static mut Position,
    &'static mut Footprint,
    &'static Owner,
    Option<&'static MovementLayer>,
    Option<&'static mut VisionToken>,
);

type UnitAccess = (
    ResMut<'static, OccupancyGrid>,
    ResMut<'static, BroadPhase>,
    ResMut<'static, FactionVision>,
    Query<'static, 'static, UnitData>,
);

fn check_footprint(config: &SimConfig, bounds: TileRect) -> SimResult<()> {
    if bounds.width > config.max_entity_extent || bounds.height > config.max_entity_extent {
        return Err(SimError::TooLarge {
            width: bounds.width,
            height: bounds.height,
            max: config.max_entity_extent,
        });
    }
    let map = TileRect::new(0, 0, config.map_width, config.map_height);
    if bounds.is_empty() || !map.contains_rect(&bounds) {
        return Err(SimError::OutOfBounds(bounds));
    }
    Ok(())
}

/// Create a unit from `spec`. Nothing is left behind on failure.
pub fn spawn_unit(world: &mut World, spec: UnitSpec) -> SimResult<Entity> {
    assert!(spec.sight_range >= 0, "negative sight range {}", spec.sight_range);
    let bounds = spec.bounds();
    check_footprint(world.resource::<SimConfig>(), bounds)?;
    if !world.resource::<FactionVision>().contains(spec.owner) {
        return Err(SimError::UnknownFaction(spec.owner));
    }
    if let Some(layer) = spec.layer {
        let occupancy = world.resource::<OccupancyGrid>();
        if let Some((tile, occupant)) = occupancy.first_blocker(bounds, layer, None) {
            return Err(SimError::Occupied {
                tile,
                layer,
                occupant,
            });
        }
    }

    let entity = world
        .spawn((
            Position(spec.position),
            spec.footprint,
            Owner(spec.owner),
            Health::new(spec.health),
            Order::Hold,
        ))
        .id();

    if let Some(layer) = spec.layer {
        world.entity_mut(entity).insert(layer);
        world
            .resource_mut::<OccupancyGrid>()
            .place(entity, bounds, layer)?;
    }
    world
        .resource_mut::<BroadPhase>()
        .insert(entity, bounds, spec.owner);

    let shape = if spec.under_construction {
        world.entity_mut(entity).insert(UnderConstruction);
        VisionShape::Glow
    } else {
        VisionShape::LineOfSight
    };
    let mut token = VisionToken::new(spec.owner, shape, bounds.center(), spec.sight_range, bounds);
    token.attach(world.resource_mut::<FactionVision>().grid_mut(spec.owner));
    world.entity_mut(entity).insert(token);

    tracing::debug!(
        target: "fogline::lifecycle",
        ?entity,
        owner = spec.owner.0,
        ?bounds,
        ?shape,
        "unit spawned"
    );
    Ok(entity)
}

/// Remove a unit and everything it holds.
pub fn despawn_unit(world: &mut World, entity: Entity) -> SimResult<()> {
    let (position, footprint, owner) = match (
        world.get::<Position>(entity),
        world.get::<Footprint>(entity),
        world.get::<Owner>(entity),
    ) {
        (Some(p), Some(f), Some(o)) => (*p, *f, o.0),
        _ => return Err(SimError::UnknownEntity(entity)),
    };
    let layer = world.get::<MovementLayer>(entity).copied();
    let token = world.entity_mut(entity).take::<VisionToken>();
    let bounds = footprint.bounds_at(position);

    if let Some(layer) = layer {
        world
            .resource_mut::<OccupancyGrid>()
            .vacate(entity, bounds, layer)?;
    }
    let indexed = world.resource_mut::<BroadPhase>().remove(entity, bounds);
    debug_assert!(indexed, "despawning {entity:?} that was not indexed");
    if let Some(token) = token {
        token.dispose(world.resource_mut::<FactionVision>().grid_mut(owner));
    }
    world.despawn(entity);

    tracing::debug!(target: "fogline::lifecycle", ?entity, "unit despawned");
    Ok(())
}

/// Move and/or resize a unit to `anchor` with `footprint`.
fn reshape(world: &mut World, entity: Entity, anchor: TilePoint, footprint: Footprint) -> SimResult<()> {
    let to = footprint.bounds_at(Position(anchor));
    check_footprint(world.resource::<SimConfig>(), to)?;

    let mut state = SystemState::<UnitAccess>::new(world);
    let (mut occupancy, mut broadphase, mut vision, mut units) = state.get_mut(world);
    let (mut position, mut size, owner, layer, mut token) = units
        .get_mut(entity)
        .map_err(|_| SimError::UnknownEntity(entity))?;

    let from = size.bounds_at(*position);
    if from == to {
        return Ok(());
    }
    let mut grids = GridsMut {
        occupancy: &mut occupancy,
        broadphase: &mut broadphase,
        vision: &mut vision,
    };
    grids.relocate(entity, owner.0, layer.copied(), token.as_deref_mut(), from, to)?;
    *position = Position(anchor);
    *size = footprint;
    Ok(())
}

/// Teleport a unit so its footprint's top-left tile is `anchor`.
pub fn move_unit(world: &mut World, entity: Entity, anchor: TilePoint) -> SimResult<()> {
    let footprint = *world
        .get::<Footprint>(entity)
        .ok_or(SimError::UnknownEntity(entity))?;
    reshape(world, entity, anchor, footprint)
}

/// Change a unit's footprint, keeping its top-left tile.
pub fn resize_unit(world: &mut World, entity: Entity, width: i32, height: i32) -> SimResult<()> {
    let position = *world
        .get::<Position>(entity)
        .ok_or(SimError::UnknownEntity(entity))?;
    reshape(world, entity, position.0, Footprint::new(width, height))
}

/// Run `f` on the entity's token together with its faction's grid.
fn with_token<R>(
    world: &mut World,
    entity: Entity,
    f: impl FnOnce(&mut VisionToken, &mut FactionVision) -> R,
) -> SimResult<R> {
    world.resource_scope(|world, mut vision: Mut<FactionVision>| {
        let mut token = world
            .get_mut::<VisionToken>(entity)
            .ok_or(SimError::UnknownEntity(entity))?;
        Ok(f(&mut token, &mut vision))
    })
}

pub fn set_sight_range(world: &mut World, entity: Entity, range: i32) -> SimResult<()> {
    with_token(world, entity, |token, vision| {
        let grid = vision.grid_mut(token.faction());
        token.set_sight_range(grid, range);
    })
}

/// Swap the construction glow for line of sight.
pub fn finish_construction(world: &mut World, entity: Entity) -> SimResult<()> {
    if world.get::<UnderConstruction>(entity).is_none() {
        return Ok(());
    }
    world.entity_mut(entity).remove::<UnderConstruction>();
    with_token(world, entity, |token, vision| {
        let grid = vision.grid_mut(token.faction());
        token.set_shape(grid, VisionShape::LineOfSight);
    })
}

/// Hand a unit to another faction. Its vision moves to the new owner's grid.
pub fn change_owner(world: &mut World, entity: Entity, owner: FactionId) -> SimResult<()> {
    if !world.resource::<FactionVision>().contains(owner) {
        return Err(SimError::UnknownFaction(owner));
    }
    let (position, footprint, previous) = match (
        world.get::<Position>(entity),
        world.get::<Footprint>(entity),
        world.get::<Owner>(entity),
    ) {
        (Some(p), Some(f), Some(o)) => (*p, *f, o.0),
        _ => return Err(SimError::UnknownEntity(entity)),
    };
    if previous == owner {
        return Ok(());
    }
    let bounds = footprint.bounds_at(position);

    if let Some(old) = world.entity_mut(entity).take::<VisionToken>() {
        let mut token = VisionToken::new(owner, old.shape(), old.center(), old.sight_range(), old.bounds());
        {
            let mut vision = world.resource_mut::<FactionVision>();
            old.dispose(vision.grid_mut(previous));
            token.attach(vision.grid_mut(owner));
        }
        world.entity_mut(entity).insert(token);
    }
    world.entity_mut(entity).insert(Owner(owner));
    world
        .resource_mut::<BroadPhase>()
        .set_owner(entity, bounds, owner);

    tracing::debug!(
        target: "fogline::lifecycle",
        ?entity,
        from = previous.0,
        to = owner.0,
        "owner changed"
    );
    Ok(())
}
