//! Commit phase - applies structural changes queued during the tick.
//!
//! Systems never spawn or despawn units directly. They push a
//! [`StructuralChange`] into [`PendingChanges`] and the exclusive
//! [`commit_system`] applies the queue in FIFO order once every other
//! system of the tick has finished. Vision notifications are flushed last,
//! so relays see the final state of the tick.

use bevy_ecs::prelude::*;

use crate::components::*;
use crate::diplomacy::FactionVision;
use crate::systems::lifecycle::{despawn_unit, spawn_unit};

/// A deferred spawn or despawn.
#[derive(Debug, Clone)]
pub enum StructuralChange {
    Spawn(UnitSpec),
    Despawn(Entity),
}

/// Changes waiting for the next commit phase.
#[derive(Resource, Debug, Default)]
pub struct PendingChanges {
    queue: Vec<StructuralChange>,
}

impl PendingChanges {
    pub fn push(&mut self, change: StructuralChange) {
        self.queue.push(change);
    }

    pub fn spawn(&mut self, spec: UnitSpec) {
        self.push(StructuralChange::Spawn(spec));
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.push(StructuralChange::Despawn(entity));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Queue a despawn for every unit whose health reached zero.
pub fn health_system(
    mut pending: ResMut<PendingChanges>,
    query: Query<(Entity, &Health), Changed<Health>>,
) {
    for (entity, health) in query.iter() {
        if !health.is_alive() {
            tracing::trace!(target: "fogline::commit", ?entity, "queued despawn of dead unit");
            pending.despawn(entity);
        }
    }
}

/// Apply every queued change, then flush vision notifications.
///
/// Failures have no caller to go back to, so they are logged and dropped.
/// Despawns of entities that are already gone are skipped quietly, which
/// covers a unit killed twice in one tick.
pub fn commit_system(world: &mut World) {
    let mut queue = std::mem::take(&mut world.resource_mut::<PendingChanges>().queue);
    let _span = tracing::debug_span!(target: "fogline::commit", "commit", changes = queue.len()).entered();

    for change in queue.drain(..) {
        match change {
            StructuralChange::Spawn(spec) => {
                if let Err(err) = spawn_unit(world, spec) {
                    tracing::warn!(target: "fogline::commit", %err, "dropped queued spawn");
                }
            }
            StructuralChange::Despawn(entity) => {
                if !world.entities().contains(entity) {
                    continue;
                }
                if let Err(err) = despawn_unit(world, entity) {
                    tracing::warn!(target: "fogline::commit", ?entity, %err, "dropped queued despawn");
                }
            }
        }
    }

    // Hand the emptied buffer back so its capacity is reused next tick.
    let mut pending = world.resource_mut::<PendingChanges>();
    if pending.queue.is_empty() {
        pending.queue = queue;
    }

    world.resource_mut::<FactionVision>().flush();
}
