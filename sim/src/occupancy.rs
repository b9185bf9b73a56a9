//! Exclusive tile occupancy for movement and placement.
//!
//! One dense slot array per [`MovementLayer`]. An entity occupies exactly the
//! tiles of its footprint on its layer and no two entities share a slot.
//! Placement checks the whole rectangle before writing, so a rejected
//! placement leaves the grid untouched.

use bevy_ecs::prelude::*;

use crate::components::MovementLayer;
use crate::error::{SimError, SimResult};
use crate::geometry::{TilePoint, TileRect};

#[derive(Resource, Debug, Clone)]
pub struct OccupancyGrid {
    width: i32,
    height: i32,
    layers: [Vec<Option<Entity>>; 2],
}

impl OccupancyGrid {
    pub fn new(width: i32, height: i32) -> Self {
        assert!(
            width > 0 && height > 0,
            "occupancy grid must be non-empty, got {width}x{height}"
        );
        let size = (width * height) as usize;
        Self {
            width,
            height,
            layers: [vec![None; size], vec![None; size]],
        }
    }

    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.width, self.height)
    }

    #[inline]
    fn index(&self, p: TilePoint) -> usize {
        assert!(
            p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height,
            "tile ({}, {}) outside {}x{} occupancy grid",
            p.x,
            p.y,
            self.width,
            self.height
        );
        (p.y * self.width + p.x) as usize
    }

    fn check_rect(&self, rect: TileRect) {
        assert!(
            !rect.is_empty() && self.bounds().contains_rect(&rect),
            "footprint {rect:?} outside {}x{} occupancy grid",
            self.width,
            self.height
        );
    }

    /// Entity blocking `p` on `layer`, if any.
    #[inline]
    pub fn occupant_at(&self, p: TilePoint, layer: MovementLayer) -> Option<Entity> {
        self.layers[layer.index()][self.index(p)]
    }

    /// First tile of `rect` held by someone other than `ignoring`.
    pub fn first_blocker(
        &self,
        rect: TileRect,
        layer: MovementLayer,
        ignoring: Option<Entity>,
    ) -> Option<(TilePoint, Entity)> {
        self.check_rect(rect);
        let slots = &self.layers[layer.index()];
        rect.tiles().find_map(|p| match slots[(p.y * self.width + p.x) as usize] {
            Some(e) if Some(e) != ignoring => Some((p, e)),
            _ => None,
        })
    }

    /// Whether `rect` is free on `layer`, treating `ignoring`'s own claim as free.
    pub fn is_free(&self, rect: TileRect, layer: MovementLayer, ignoring: Option<Entity>) -> bool {
        self.first_blocker(rect, layer, ignoring).is_none()
    }

    /// Claim every tile of `rect`. Rejects without writing if any tile is held.
    pub fn place(&mut self, entity: Entity, rect: TileRect, layer: MovementLayer) -> SimResult<()> {
        if let Some((tile, occupant)) = self.first_blocker(rect, layer, None) {
            return Err(SimError::Occupied {
                tile,
                layer,
                occupant,
            });
        }
        let width = self.width;
        let slots = &mut self.layers[layer.index()];
        for p in rect.tiles() {
            slots[(p.y * width + p.x) as usize] = Some(entity);
        }
        Ok(())
    }

    /// Release every tile of `rect`. Each tile must be held by `entity`.
    pub fn vacate(&mut self, entity: Entity, rect: TileRect, layer: MovementLayer) -> SimResult<()> {
        self.check_rect(rect);
        let width = self.width;
        let slots = &mut self.layers[layer.index()];
        if let Some(tile) = rect
            .tiles()
            .find(|p| slots[(p.y * width + p.x) as usize] != Some(entity))
        {
            return Err(SimError::NotOccupant {
                entity,
                tile,
                layer,
            });
        }
        for p in rect.tiles() {
            slots[(p.y * width + p.x) as usize] = None;
        }
        Ok(())
    }

    /// Vacate `from` then place `to`. On rejection the old claim is restored.
    pub fn move_entity(
        &mut self,
        entity: Entity,
        from: TileRect,
        to: TileRect,
        layer: MovementLayer,
    ) -> SimResult<()> {
        if from == to {
            return Ok(());
        }
        self.vacate(entity, from, layer)?;
        if let Err(err) = self.place(entity, to, layer) {
            // `from` was ours a moment ago, so this cannot fail.
            self.place(entity, from, layer)?;
            return Err(err);
        }
        Ok(())
    }

    /// Number of held slots on a layer.
    pub fn occupied_count(&self, layer: MovementLayer) -> usize {
        self.layers[layer.index()].iter().filter(|s| s.is_some()).count()
    }
}
