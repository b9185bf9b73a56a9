//! Movement system - steps units toward their move orders.
//!
//! ## Two Phases
//!
//! 1. **Gather** - snapshot every unit with a `MoveTo` order into a reused
//!    scratch buffer, sort it by `Entity` and compute each one's next anchor.
//!    Nothing is mutated, so with `--features parallel` the step computation
//!    runs under rayon.
//! 2. **Apply** - walk the snapshot in order and relocate each unit through
//!    [`GridsMut`]. A step into a blocked tile is skipped for this tick and
//!    retried on the next one.
//!
//! Iterating a snapshot instead of the live query means a unit moving out
//! of a tile frees it for units later in the same pass, in a fixed order.

use bevy_ecs::prelude::*;

use crate::components::*;
use crate::diplomacy::FactionVision;
use crate::error::SimError;
use crate::geometry::TilePoint;
use crate::occupancy::OccupancyGrid;
use crate::sight::VisionToken;
use crate::spatial::BroadPhase;
use crate::systems::lifecycle::GridsMut;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One unit's step for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub entity: Entity,
    pub anchor: TilePoint,
    pub target: TilePoint,
    pub next: TilePoint,
}

impl MoveIntent {
    fn new(entity: Entity, anchor: TilePoint, target: TilePoint) -> Self {
        Self {
            entity,
            anchor,
            target,
            next: anchor.step_toward(target),
        }
    }
}

type MoverData = (
    Entity,
    &'static mut Position,
    &'static Footprint,
    &'static Owner,
    Option<&'static MovementLayer>,
    Option<&'static mut VisionToken>,
    &'static mut Order,
);

/// Advance every unit with a move order by one tile.
///
/// Buildings still under construction never move.
pub fn movement_system(
    mut scratch: Local<Vec<(Entity, TilePoint, TilePoint)>>,
    mut intents: Local<Vec<MoveIntent>>,
    mut occupancy: ResMut<OccupancyGrid>,
    mut broadphase: ResMut<BroadPhase>,
    mut vision: ResMut<FactionVision>,
    mut units: Query<MoverData, Without<UnderConstruction>>,
) {
    // GATHER PHASE: read-only snapshot in stable entity order
    scratch.clear();
    scratch.extend(units.iter().filter_map(|(entity, pos, .., order)| match *order {
        Order::MoveTo(target) => Some((entity, pos.0, target)),
        Order::Hold => None,
    }));
    if scratch.is_empty() {
        return;
    }
    scratch.sort_unstable_by_key(|(entity, ..)| *entity);

    intents.clear();
    #[cfg(feature = "parallel")]
    {
        scratch
            .par_iter()
            .map(|&(entity, anchor, target)| MoveIntent::new(entity, anchor, target))
            .collect_into_vec(&mut *intents);
    }
    #[cfg(not(feature = "parallel"))]
    {
        intents.extend(
            scratch
                .iter()
                .map(|&(entity, anchor, target)| MoveIntent::new(entity, anchor, target)),
        );
    }

    // APPLY PHASE: sequential, each move sees the ones before it
    let map = occupancy.bounds();
    let mut moved = 0usize;
    let mut blocked = 0usize;
    let mut grids = GridsMut {
        occupancy: &mut occupancy,
        broadphase: &mut broadphase,
        vision: &mut vision,
    };
    for intent in intents.iter() {
        let Ok((entity, mut pos, footprint, owner, layer, mut token, mut order)) =
            units.get_mut(intent.entity)
        else {
            continue;
        };
        if intent.anchor == intent.target {
            *order = Order::Hold;
            continue;
        }

        let from = footprint.bounds_at(*pos);
        let to = footprint.bounds_at(Position(intent.next));
        if !map.contains_rect(&to) {
            // Target would push the footprint off the map; give up on it.
            *order = Order::Hold;
            continue;
        }

        match grids.relocate(entity, owner.0, layer.copied(), token.as_deref_mut(), from, to) {
            Ok(()) => {
                pos.0 = intent.next;
                moved += 1;
                if intent.next == intent.target {
                    *order = Order::Hold;
                }
            }
            Err(SimError::Occupied { tile, occupant, .. }) => {
                blocked += 1;
                tracing::trace!(
                    target: "fogline::movement",
                    ?entity,
                    ?tile,
                    ?occupant,
                    "step blocked"
                );
            }
            Err(err) => {
                tracing::warn!(target: "fogline::movement", ?entity, %err, "move failed");
                *order = Order::Hold;
            }
        }
    }

    tracing::debug!(
        target: "fogline::movement",
        movers = intents.len(),
        moved,
        blocked,
        "movement applied"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::geometry::TileRect;
    use crate::sight::VisionShape;
    use crate::systems::lifecycle::spawn_unit;
    use crate::visibility::TileVisibility;

    fn world() -> World {
        let config = SimConfig::with_map(16, 16);
        let mut world = World::new();
        world.insert_resource(OccupancyGrid::new(16, 16));
        world.insert_resource(BroadPhase::new(16, 16, config.bucket_size, config.max_entity_extent));
        world.insert_resource(FactionVision::new(2, 16, 16));
        world.insert_resource(config);
        world
    }

    fn run(world: &mut World, ticks: usize) {
        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        for _ in 0..ticks {
            schedule.run(world);
        }
    }

    #[test]
    fn test_unit_walks_to_target_and_holds() {
        let mut world = world();
        let e = spawn_unit(&mut world, UnitSpec::unit(FactionId(0), 1, 1, 1)).unwrap();
        world.entity_mut(e).insert(Order::MoveTo(TilePoint::new(4, 2)));

        run(&mut world, 2);
        assert_eq!(world.get::<Position>(e), Some(&Position::new(3, 2)));
        assert_eq!(world.get::<Order>(e), Some(&Order::MoveTo(TilePoint::new(4, 2))));

        run(&mut world, 5);
        assert_eq!(world.get::<Position>(e), Some(&Position::new(4, 2)));
        assert_eq!(world.get::<Order>(e), Some(&Order::Hold));

        let occupancy = world.resource::<OccupancyGrid>();
        assert_eq!(occupancy.occupant_at(TilePoint::new(4, 2), MovementLayer::Ground), Some(e));
        assert_eq!(occupancy.occupant_at(TilePoint::new(1, 1), MovementLayer::Ground), None);
        assert_eq!(world.resource::<BroadPhase>().query_rectangle(TileRect::new(4, 2, 1, 1)).count(), 1);
        let vision = world.resource::<FactionVision>();
        assert_eq!(vision.tile_visibility(FactionId(0), TilePoint::new(1, 1)), TileVisibility::Discovered);
        assert_eq!(vision.tile_visibility(FactionId(0), TilePoint::new(5, 2)), TileVisibility::Visible);
    }

    #[test]
    fn test_blocked_step_waits() {
        let mut world = world();
        let mover = spawn_unit(&mut world, UnitSpec::unit(FactionId(0), 1, 1, 1)).unwrap();
        let wall = spawn_unit(&mut world, UnitSpec::unit(FactionId(1), 2, 1, 1)).unwrap();
        world.entity_mut(mover).insert(Order::MoveTo(TilePoint::new(3, 1)));

        run(&mut world, 3);
        assert_eq!(world.get::<Position>(mover), Some(&Position::new(1, 1)));
        assert_eq!(world.get::<Order>(mover), Some(&Order::MoveTo(TilePoint::new(3, 1))));

        world.entity_mut(wall).insert(Order::MoveTo(TilePoint::new(2, 5)));
        run(&mut world, 1);
        assert_eq!(world.get::<Position>(wall), Some(&Position::new(2, 2)));
        // The wall moved away this tick but ran after the mover in entity order.
        run(&mut world, 2);
        assert_eq!(world.get::<Position>(mover), Some(&Position::new(3, 1)));
    }

    #[test]
    fn test_followers_move_in_entity_order() {
        let mut world = world();
        let leader = spawn_unit(&mut world, UnitSpec::unit(FactionId(0), 2, 0, 0)).unwrap();
        let follower = spawn_unit(&mut world, UnitSpec::unit(FactionId(0), 1, 0, 0)).unwrap();
        world.entity_mut(leader).insert(Order::MoveTo(TilePoint::new(5, 0)));
        world.entity_mut(follower).insert(Order::MoveTo(TilePoint::new(4, 0)));

        // The leader is processed first and frees its tile for the follower.
        run(&mut world, 1);
        assert_eq!(world.get::<Position>(leader), Some(&Position::new(3, 0)));
        assert_eq!(world.get::<Position>(follower), Some(&Position::new(2, 0)));
    }

    #[test]
    fn test_construction_sites_do_not_move() {
        let mut world = world();
        let site = spawn_unit(&mut world, UnitSpec::building(FactionId(0), 4, 4, 2, 2, 2)).unwrap();
        world.entity_mut(site).insert(Order::MoveTo(TilePoint::new(8, 8)));
        run(&mut world, 3);
        assert_eq!(world.get::<Position>(site), Some(&Position::new(4, 4)));
        assert_eq!(world.get::<VisionToken>(site).map(|t| t.shape()), Some(VisionShape::Glow));
    }

    #[test]
    fn test_target_off_map_is_dropped() {
        let mut world = world();
        let e = spawn_unit(&mut world, UnitSpec::unit(FactionId(0), 15, 3, 1)).unwrap();
        world.entity_mut(e).insert(Order::MoveTo(TilePoint::new(20, 3)));
        run(&mut world, 1);
        assert_eq!(world.get::<Position>(e), Some(&Position::new(15, 3)));
        assert_eq!(world.get::<Order>(e), Some(&Order::Hold));
    }
}
