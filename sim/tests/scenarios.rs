//! End-to-end scenarios and invariants across the grids, tokens and facade.

use fogline::*;

/// Small deterministic generator so property runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn range(&mut self, lo: i32, hi: i32) -> i32 {
        lo + (self.next() % (hi - lo) as u64) as i32
    }
}

fn world(width: i32, height: i32) -> SimWorld {
    SimWorld::with_config(SimConfig::with_map(width, height)).unwrap()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn scenario_a_circle_reveal() {
    let mut grid = VisibilityGrid::new(FactionId(0), 10, 10);
    let center = TilePoint::new(5, 5);
    grid.add_circle(TileCircle::new(center, 2));

    for p in grid.bounds().tiles() {
        let expected = if center.distance_sq(p) <= 4 {
            TileVisibility::Visible
        } else {
            TileVisibility::Undiscovered
        };
        assert_eq!(grid.tile_visibility(p), expected, "tile {p:?}");
    }
    assert_eq!(grid.tile_visibility(TilePoint::new(0, 0)), TileVisibility::Undiscovered);
}

#[test]
fn scenario_b_moving_unit_leaves_discovered_trail() {
    let mut sim = world(10, 10);
    let e = sim.spawn_unit(UnitSpec::unit(FactionId(0), 5, 5, 2)).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(5, 3)), TileVisibility::Visible);
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(5, 8)), TileVisibility::Undiscovered);

    sim.move_unit(e, TilePoint::new(5, 6)).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(5, 3)), TileVisibility::Discovered);
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(5, 8)), TileVisibility::Visible);
    // Exactly radius 2 from the new center, so still in range.
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(5, 4)), TileVisibility::Visible);
}

#[test]
fn scenario_c_shared_vision_copies_discovery() {
    let mut sim = world(10, 10);
    let scout = sim.spawn_unit(UnitSpec::unit(FactionId(1), 3, 3, 1)).unwrap();
    // B walks away; (3, 3) stays discovered but not visible for B.
    sim.move_unit(scout, TilePoint::new(8, 8)).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(1), TilePoint::new(3, 3)), TileVisibility::Discovered);
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(3, 3)), TileVisibility::Undiscovered);

    sim.set_stance(FactionId(0), FactionId(1), Stance::SHARED_VISION).unwrap();
    assert!(sim.tile_visibility(FactionId(0), TilePoint::new(3, 3)) >= TileVisibility::Discovered);
    assert!(sim.vision().grid(FactionId(0)).is_discovered(TilePoint::new(3, 3)));

    // Revoking keeps what was copied.
    sim.set_stance(FactionId(0), FactionId(1), Stance::NEUTRAL).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(3, 3)), TileVisibility::Discovered);
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(8, 8)), TileVisibility::Discovered);
}

#[test]
fn scenario_d_second_placement_is_rejected() {
    let mut sim = world(10, 10);
    let first = sim.spawn_unit(UnitSpec::unit(FactionId(0), 2, 2, 1)).unwrap();
    let err = sim
        .spawn_unit(UnitSpec::unit(FactionId(1), 2, 2, 1))
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::Occupied { occupant, layer: MovementLayer::Ground, .. } if occupant == first
    ));
    assert_eq!(sim.occupant_at(TilePoint::new(2, 2), MovementLayer::Ground), Some(first));
    assert_eq!(sim.query_rectangle(TileRect::new(0, 0, 10, 10)).count(), 1);
}

#[test]
fn air_units_share_tiles_with_ground_units() {
    let mut sim = world(10, 10);
    sim.spawn_unit(UnitSpec::unit(FactionId(0), 2, 2, 1)).unwrap();
    let mut flyer = UnitSpec::unit(FactionId(0), 2, 2, 1);
    flyer.layer = Some(MovementLayer::Air);
    sim.spawn_unit(flyer).unwrap();
    assert_eq!(sim.query_rectangle(TileRect::new(2, 2, 1, 1)).count(), 2);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn discovery_is_monotonic() {
    let mut sim = world(40, 40);
    let mut rng = Lcg(7);
    let units: Vec<_> = (0..6)
        .map(|i| {
            sim.spawn_unit(UnitSpec::unit(FactionId(0), i * 6, 0, 3))
                .unwrap()
        })
        .collect();

    let bounds = sim.vision().grid(FactionId(0)).bounds();
    let mut seen = vec![false; (bounds.width * bounds.height) as usize];
    for _ in 0..200 {
        let e = units[rng.range(0, units.len() as i32) as usize];
        let target = TilePoint::new(rng.range(0, 40), rng.range(0, 40));
        match rng.range(0, 3) {
            0 => {
                let _ = sim.move_unit(e, target);
            }
            1 => {
                let _ = sim.set_sight_range(e, rng.range(0, 6));
            }
            _ => {
                let _ = sim.order_move(e, target);
                sim.step(0.05);
            }
        }
        let grid = sim.vision().grid(FactionId(0));
        for (i, p) in bounds.tiles().enumerate() {
            let discovered = grid.is_discovered(p);
            assert!(!seen[i] || discovered, "tile {p:?} was undiscovered again");
            seen[i] |= discovered;
        }
    }
    assert!(seen.iter().any(|&d| d));
}

#[test]
fn token_reservations_match_shape_after_random_edits() {
    let mut sim = world(32, 32);
    let mut rng = Lcg(42);
    let units: Vec<_> = (0..4)
        .map(|i| {
            sim.spawn_unit(UnitSpec::unit(FactionId(0), i * 8, 16, 2))
                .unwrap()
        })
        .collect();

    for _ in 0..300 {
        let e = units[rng.range(0, units.len() as i32) as usize];
        match rng.range(0, 3) {
            0 => {
                let _ = sim.move_unit(e, TilePoint::new(rng.range(0, 30), rng.range(0, 30)));
            }
            1 => {
                let _ = sim.resize_unit(e, rng.range(1, 4), rng.range(1, 4));
            }
            _ => {
                let _ = sim.set_sight_range(e, rng.range(0, 7));
            }
        }
    }

    // Rebuild the expected counts from the tokens alone.
    let grid = sim.vision().grid(FactionId(0));
    let tokens: Vec<TileCircle> = units
        .iter()
        .filter_map(|&e| sim.world().get::<VisionToken>(e))
        .filter_map(VisionToken::circle)
        .collect();
    for p in grid.bounds().tiles() {
        let expected = tokens.iter().filter(|c| c.contains(p)).count() as u16;
        let actual = grid.source_count(p).unwrap_or(0);
        assert_eq!(actual, expected, "tile {p:?}");
    }
}

#[test]
fn place_then_vacate_restores_grid() {
    let mut grid = OccupancyGrid::new(12, 12);
    let mut rng = Lcg(3);
    let resident = sim_entity(100);
    grid.place(resident, TileRect::new(0, 0, 2, 2), MovementLayer::Ground).unwrap();

    for i in 0..50 {
        let rect = TileRect::new(rng.range(2, 9), rng.range(2, 9), rng.range(1, 4), rng.range(1, 4));
        let e = sim_entity(i);
        grid.place(e, rect, MovementLayer::Ground).unwrap();
        grid.vacate(e, rect, MovementLayer::Ground).unwrap();
        assert_eq!(grid.occupied_count(MovementLayer::Ground), 4);
        for p in grid.bounds().tiles() {
            let expected = (p.x < 2 && p.y < 2).then_some(resident);
            assert_eq!(grid.occupant_at(p, MovementLayer::Ground), expected);
        }
    }
}

fn sim_entity(index: u32) -> bevy_ecs::entity::Entity {
    bevy_ecs::entity::Entity::from_raw(index)
}

#[test]
fn enabling_shared_vision_twice_equals_once() {
    let build = |times: usize| {
        let mut sim = world(20, 20);
        sim.spawn_unit(UnitSpec::unit(FactionId(1), 10, 10, 3)).unwrap();
        for _ in 0..times {
            sim.set_stance(FactionId(0), FactionId(1), Stance::ALLIED | Stance::SHARED_VISION)
                .unwrap();
        }
        sim
    };
    let once = build(1);
    let twice = build(2);

    assert_eq!(once.vision().relay().subscription_count(), 1);
    assert_eq!(twice.vision().relay().subscription_count(), 1);
    for p in TileRect::new(0, 0, 20, 20).tiles() {
        assert_eq!(
            once.tile_visibility(FactionId(0), p),
            twice.tile_visibility(FactionId(0), p)
        );
        assert_eq!(
            once.vision().grid(FactionId(0)).source_count(p),
            twice.vision().grid(FactionId(0)).source_count(p)
        );
    }
}

#[test]
fn relayed_discovery_follows_live_changes() {
    let mut sim = world(30, 30);
    let scout = sim.spawn_unit(UnitSpec::unit(FactionId(1), 2, 2, 2)).unwrap();
    sim.set_stance(FactionId(0), FactionId(1), Stance::SHARED_VISION).unwrap();
    sim.set_stance(FactionId(1), FactionId(0), Stance::SHARED_VISION).unwrap();

    sim.order_move(scout, TilePoint::new(20, 2)).unwrap();
    for _ in 0..30 {
        sim.step(0.05);
    }
    // Discovery reached faction 0's own grid through the relay.
    assert!(sim.vision().grid(FactionId(0)).is_discovered(TilePoint::new(12, 2)));
    assert!(sim
        .visibility_changes()
        .iter()
        .all(|c| c.faction == FactionId(0) || c.faction == FactionId(1)));

    sim.retire_faction(FactionId(1)).unwrap();
    assert_eq!(sim.vision().relay().subscription_count(), 0);
    assert_eq!(sim.stance(FactionId(0), FactionId(1)).unwrap(), Stance::NEUTRAL);
}

#[test]
fn broad_phase_finds_entities_across_bucket_borders() {
    let mut sim = SimWorld::with_config(SimConfig {
        bucket_size: 4,
        max_entity_extent: 6,
        ..SimConfig::with_map(48, 48)
    })
    .unwrap();
    let mut rng = Lcg(11);
    let mut placed = Vec::new();
    for _ in 0..60 {
        let mut spec = UnitSpec::unit(FactionId(0), rng.range(0, 42), rng.range(0, 42), 0);
        spec.footprint = Footprint::new(rng.range(1, 7), rng.range(1, 7));
        spec.layer = None;
        let e = sim.spawn_unit(spec.clone()).unwrap();
        placed.push((e, spec.bounds()));
    }

    for _ in 0..100 {
        let area = TileRect::new(rng.range(0, 44), rng.range(0, 44), rng.range(1, 5), rng.range(1, 5));
        let found: Vec<_> = sim.query_rectangle(area).collect();
        for (e, bounds) in &placed {
            assert_eq!(found.contains(e), bounds.intersects(&area), "{e:?} {bounds:?} vs {area:?}");
        }

        let circle = TileCircle::new(TilePoint::new(rng.range(0, 48), rng.range(0, 48)), rng.range(0, 5));
        let found: Vec<_> = sim.query_circle(circle).collect();
        for (e, bounds) in &placed {
            assert_eq!(found.contains(e), circle.intersects_rect(bounds), "{e:?} {bounds:?} vs {circle:?}");
        }
    }
}

#[test]
fn spectator_sees_everything() {
    let mut sim = world(16, 16);
    sim.disable_fog(FactionId(1)).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(1), TilePoint::new(15, 15)), TileVisibility::Visible);
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(15, 15)), TileVisibility::Undiscovered);

    sim.reveal_all(FactionId(0)).unwrap();
    assert_eq!(sim.tile_visibility(FactionId(0), TilePoint::new(15, 15)), TileVisibility::Discovered);
}
