//! Public API for the simulation.
//!
//! [`SimWorld`] is the interface for any client (renderer, server loop, AI
//! harness) to drive the simulation and ask it questions.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 20 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed. This ensures deterministic behavior regardless of
//! frame rate.
//!
//! ## Tick Order
//!
//! 1. `movement_system` - snapshot movers, step them one tile
//! 2. `health_system` - queue dead units for removal
//! 3. `commit_system` - apply queued spawns/despawns, flush vision
//!
//! Direct calls on `SimWorld` between steps (spawning, moving, diplomacy)
//! apply immediately and flush vision before returning.

use bevy_ecs::prelude::*;

use crate::components::*;
use crate::config::SimConfig;
use crate::diplomacy::{FactionVision, Stance, VisibilityChanged};
use crate::error::{SimError, SimResult};
use crate::geometry::{TileCircle, TilePoint, TileRect};
use crate::occupancy::OccupancyGrid;
use crate::spatial::{BroadPhase, SpatialEntry};
use crate::systems::*;
use crate::visibility::TileVisibility;
use crate::world::Snapshot;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Initializing the simulation
/// - Stepping the simulation forward
/// - Creating, moving and removing units
/// - Visibility, occupancy and proximity queries
/// - Extracting state snapshots
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl SimWorld {
    /// Create a new simulation world with the default configuration.
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(OccupancyGrid::new(config.map_width, config.map_height));
        world.insert_resource(BroadPhase::new(
            config.map_width,
            config.map_height,
            config.bucket_size,
            config.max_entity_extent,
        ));
        world.insert_resource(FactionVision::new(
            config.faction_count as usize,
            config.map_width,
            config.map_height,
        ));
        world.insert_resource(PendingChanges::default());

        tracing::info!(
            target: "fogline::world",
            width = config.map_width,
            height = config.map_height,
            factions = config.faction_count,
            bucket_size = config.bucket_size,
            "simulation world created"
        );
        world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems((movement_system, health_system, commit_system).chain());

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    /// A 1×1 ground unit with the configured default sight range.
    pub fn unit_spec(&self, owner: FactionId, x: i32, y: i32) -> UnitSpec {
        UnitSpec::unit(owner, x, y, self.config().default_sight_range)
    }

    // ========================================================================
    // STEPPING
    // ========================================================================

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed. Visibility notifications from before this call are dropped.
    pub fn step(&mut self, dt: f32) {
        self.vision_mut().clear_changes();

        let fixed_dt = self.config().fixed_timestep;
        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        let _span = tracing::debug_span!(target: "fogline::world", "tick", tick = self.tick).entered();
        self.schedule.run(&mut self.world);
        self.tick += 1;
        self.time += dt;
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f32 {
        self.time
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a unit now. See [`spawn_unit`] for the failure cases.
    pub fn spawn_unit(&mut self, spec: UnitSpec) -> SimResult<Entity> {
        let result = spawn_unit(&mut self.world, spec);
        self.flush_vision();
        result
    }

    /// Queue a unit to be created in the next commit phase.
    pub fn queue_spawn(&mut self, spec: UnitSpec) {
        self.world.resource_mut::<PendingChanges>().spawn(spec);
    }

    /// Remove a unit now.
    pub fn despawn_unit(&mut self, entity: Entity) -> SimResult<()> {
        let result = despawn_unit(&mut self.world, entity);
        self.flush_vision();
        result
    }

    /// Queue a unit for removal in the next commit phase.
    pub fn kill(&mut self, entity: Entity) -> SimResult<()> {
        self.check_entity(entity)?;
        self.world.resource_mut::<PendingChanges>().despawn(entity);
        Ok(())
    }

    /// Teleport a unit so its top-left tile is `position`.
    pub fn move_unit(&mut self, entity: Entity, position: TilePoint) -> SimResult<()> {
        let result = move_unit(&mut self.world, entity, position);
        self.flush_vision();
        result
    }

    pub fn resize_unit(&mut self, entity: Entity, width: i32, height: i32) -> SimResult<()> {
        let result = resize_unit(&mut self.world, entity, width, height);
        self.flush_vision();
        result
    }

    pub fn set_sight_range(&mut self, entity: Entity, range: i32) -> SimResult<()> {
        let result = set_sight_range(&mut self.world, entity, range);
        self.flush_vision();
        result
    }

    pub fn finish_construction(&mut self, entity: Entity) -> SimResult<()> {
        let result = finish_construction(&mut self.world, entity);
        self.flush_vision();
        result
    }

    pub fn change_owner(&mut self, entity: Entity, owner: FactionId) -> SimResult<()> {
        let result = change_owner(&mut self.world, entity, owner);
        self.flush_vision();
        result
    }

    // ========================================================================
    // ORDERS
    // ========================================================================

    /// Order a unit to walk so its top-left tile ends at `target`.
    pub fn order_move(&mut self, entity: Entity, target: TilePoint) -> SimResult<()> {
        let footprint = *self
            .world
            .get::<Footprint>(entity)
            .ok_or(SimError::UnknownEntity(entity))?;
        let bounds = footprint.bounds_at(Position(target));
        if !self.world.resource::<OccupancyGrid>().bounds().contains_rect(&bounds) {
            return Err(SimError::OutOfBounds(bounds));
        }
        self.set_order(entity, Order::MoveTo(target))
    }

    pub fn order_hold(&mut self, entity: Entity) -> SimResult<()> {
        self.set_order(entity, Order::Hold)
    }

    fn set_order(&mut self, entity: Entity, order: Order) -> SimResult<()> {
        let mut current = self
            .world
            .get_mut::<Order>(entity)
            .ok_or(SimError::UnknownEntity(entity))?;
        *current = order;
        Ok(())
    }

    /// Apply damage. A unit at zero health is removed in the next commit phase.
    pub fn damage(&mut self, entity: Entity, amount: f32) -> SimResult<()> {
        let mut health = self
            .world
            .get_mut::<Health>(entity)
            .ok_or(SimError::UnknownEntity(entity))?;
        health.damage(amount);
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// What `faction` knows about `point`, including shared vision.
    ///
    /// # Panics
    ///
    /// If `faction` is not configured or `point` is off the map. This runs
    /// per tile in pathfinding, so callers validate once up front.
    pub fn tile_visibility(&self, faction: FactionId, point: TilePoint) -> TileVisibility {
        self.vision().tile_visibility(faction, point)
    }

    /// Entity holding `point` on `layer`.
    ///
    /// # Panics
    ///
    /// If `point` is off the map.
    pub fn occupant_at(&self, point: TilePoint, layer: MovementLayer) -> Option<Entity> {
        self.world.resource::<OccupancyGrid>().occupant_at(point, layer)
    }

    pub fn query_rectangle(&self, area: TileRect) -> impl Iterator<Item = Entity> + '_ {
        self.world.resource::<BroadPhase>().query_rectangle(area)
    }

    pub fn query_circle(&self, circle: TileCircle) -> impl Iterator<Item = Entity> + '_ {
        self.world.resource::<BroadPhase>().query_circle(circle)
    }

    /// Closest indexed entity inside `circle` that `predicate` accepts.
    pub fn nearest<F>(&self, circle: TileCircle, predicate: F) -> Option<SpatialEntry>
    where
        F: FnMut(&SpatialEntry) -> bool,
    {
        self.world.resource::<BroadPhase>().nearest(circle, predicate)
    }

    // ========================================================================
    // VISION CONTROLS
    // ========================================================================

    pub fn stance(&self, source: FactionId, target: FactionId) -> SimResult<Stance> {
        self.check_faction(source)?;
        self.check_faction(target)?;
        Ok(self.vision().stance(source, target))
    }

    /// Change how `source` regards `target`. Changes toward self are ignored.
    pub fn set_stance(&mut self, source: FactionId, target: FactionId, stance: Stance) -> SimResult<()> {
        self.check_faction(source)?;
        self.check_faction(target)?;
        self.vision_mut().set_stance(source, target, stance);
        Ok(())
    }

    pub fn reveal_all(&mut self, faction: FactionId) -> SimResult<()> {
        self.check_faction(faction)?;
        self.vision_mut().reveal_all(faction);
        Ok(())
    }

    /// Treat every tile as permanently visible for `faction` (spectators).
    pub fn disable_fog(&mut self, faction: FactionId) -> SimResult<()> {
        self.check_faction(faction)?;
        self.vision_mut().disable(faction);
        Ok(())
    }

    /// Drop a defeated faction from diplomacy and vision relays.
    pub fn retire_faction(&mut self, faction: FactionId) -> SimResult<()> {
        self.check_faction(faction)?;
        self.vision_mut().retire_faction(faction);
        Ok(())
    }

    /// Every visibility change published since the start of the last `step`.
    pub fn visibility_changes(&self) -> &[VisibilityChanged] {
        self.vision().changes()
    }

    pub fn vision(&self) -> &FactionVision {
        self.world.resource::<FactionVision>()
    }

    fn vision_mut(&mut self) -> Mut<'_, FactionVision> {
        self.world.resource_mut::<FactionVision>()
    }

    fn flush_vision(&mut self) {
        self.vision_mut().flush();
    }

    fn check_faction(&self, faction: FactionId) -> SimResult<()> {
        if self.vision().contains(faction) {
            Ok(())
        } else {
            Err(SimError::UnknownFaction(faction))
        }
    }

    fn check_entity(&self, entity: Entity) -> SimResult<()> {
        if self.world.get::<Position>(entity).is_some() {
            Ok(())
        } else {
            Err(SimError::UnknownEntity(entity))
        }
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> SimResult<String> {
        self.snapshot().to_json()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    ///
    /// Changes made here bypass the lifecycle handlers and can desync the
    /// grids from the components.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
