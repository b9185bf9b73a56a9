//! Per-entity vision reservation.
//!
//! A [`VisionToken`] is the only path through which an entity adds to or
//! removes from its faction's [`VisibilityGrid`]. It remembers what it added,
//! so every change is applied as remove-old/add-new and disposal removes
//! exactly what is still held.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::FactionId;
use crate::geometry::{TileCircle, TilePoint, TileRect};
use crate::visibility::VisibilityGrid;

/// Shape an entity projects into its faction's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisionShape {
    /// Contributes nothing.
    None,
    /// Counted circle of radius `range` around the center.
    LineOfSight,
    /// Discovery-only rectangle over the entity's bounds (construction sites).
    Glow,
}

/// Vision reservation held by one entity.
#[derive(Component, Debug)]
pub struct VisionToken {
    faction: FactionId,
    shape: VisionShape,
    center: TilePoint,
    range: i32,
    bounds: TileRect,
    attached: bool,
}

impl VisionToken {
    /// Detached token. Call [`VisionToken::attach`] to start contributing.
    pub fn new(faction: FactionId, shape: VisionShape, center: TilePoint, range: i32, bounds: TileRect) -> Self {
        assert!(range >= 0, "negative sight range {range}");
        Self {
            faction,
            shape,
            center,
            range,
            bounds,
            attached: false,
        }
    }

    pub fn faction(&self) -> FactionId {
        self.faction
    }

    pub fn shape(&self) -> VisionShape {
        self.shape
    }

    pub fn center(&self) -> TilePoint {
        self.center
    }

    pub fn sight_range(&self) -> i32 {
        self.range
    }

    pub fn bounds(&self) -> TileRect {
        self.bounds
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The circle currently reserved, if the shape is line of sight.
    pub fn circle(&self) -> Option<TileCircle> {
        (self.shape == VisionShape::LineOfSight).then(|| TileCircle::new(self.center, self.range))
    }

    /// Start contributing to `grid`. Attaching twice is a programming error.
    pub fn attach(&mut self, grid: &mut VisibilityGrid) {
        assert!(!self.attached, "vision token attached twice");
        self.check_grid(grid);
        self.add_shape(grid);
        self.attached = true;
    }

    pub fn set_center(&mut self, grid: &mut VisibilityGrid, center: TilePoint) {
        if center == self.center {
            return;
        }
        self.check_grid(grid);
        if self.attached && self.shape == VisionShape::LineOfSight {
            grid.move_circle(self.center, center, self.range);
        }
        self.center = center;
    }

    pub fn set_sight_range(&mut self, grid: &mut VisibilityGrid, range: i32) {
        assert!(range >= 0, "negative sight range {range}");
        if range == self.range {
            return;
        }
        self.check_grid(grid);
        let counted = self.attached && self.shape == VisionShape::LineOfSight;
        if counted {
            self.remove_shape(grid);
        }
        self.range = range;
        if counted {
            self.add_shape(grid);
        }
    }

    pub fn set_shape(&mut self, grid: &mut VisibilityGrid, shape: VisionShape) {
        if shape == self.shape {
            return;
        }
        self.check_grid(grid);
        if self.attached {
            self.remove_shape(grid);
        }
        self.shape = shape;
        if self.attached {
            self.add_shape(grid);
        }
    }

    /// Update the footprint the glow covers. Line of sight ignores bounds.
    pub fn set_bounds(&mut self, grid: &mut VisibilityGrid, bounds: TileRect) {
        if bounds == self.bounds {
            return;
        }
        self.check_grid(grid);
        self.bounds = bounds;
        if self.attached && self.shape == VisionShape::Glow {
            self.add_shape(grid);
        }
    }

    /// Remove whatever is still held. Consumes the token.
    pub fn dispose(self, grid: &mut VisibilityGrid) {
        self.check_grid(grid);
        if self.attached {
            self.remove_shape(grid);
        }
    }

    fn add_shape(&self, grid: &mut VisibilityGrid) {
        match self.shape {
            VisionShape::None => {}
            VisionShape::LineOfSight => grid.add_circle(TileCircle::new(self.center, self.range)),
            VisionShape::Glow => grid.reveal_rectangle(self.bounds),
        }
    }

    fn remove_shape(&self, grid: &mut VisibilityGrid) {
        // Glow only ever discovers, so there is no count to give back.
        if self.shape == VisionShape::LineOfSight {
            grid.remove_circle(TileCircle::new(self.center, self.range));
        }
    }

    #[inline]
    fn check_grid(&self, grid: &VisibilityGrid) {
        debug_assert_eq!(
            grid.faction(),
            self.faction,
            "vision token used with another faction's grid"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::TileVisibility;

    fn setup(range: i32) -> (VisibilityGrid, VisionToken) {
        let grid = VisibilityGrid::new(FactionId(0), 12, 12);
        let center = TilePoint::new(5, 5);
        let token = VisionToken::new(
            FactionId(0),
            VisionShape::LineOfSight,
            center,
            range,
            TileRect::new(5, 5, 1, 1),
        );
        (grid, token)
    }

    /// Tiles with a nonzero count must be exactly the token's circle.
    fn assert_reservation_matches(grid: &VisibilityGrid, token: &VisionToken) {
        for p in grid.bounds().tiles() {
            let expected = token.circle().is_some_and(|c| c.contains(p));
            assert_eq!(grid.is_visible(p), expected, "tile {p:?}");
        }
    }

    #[test]
    fn test_attach_and_dispose() {
        let (mut grid, mut token) = setup(2);
        token.attach(&mut grid);
        assert_reservation_matches(&grid, &token);

        token.dispose(&mut grid);
        assert_eq!(grid.visible_count(), 0);
        assert_eq!(grid.tile_visibility(TilePoint::new(5, 5)), TileVisibility::Discovered);
    }

    #[test]
    fn test_moves_and_resizes_keep_reservation_exact() {
        let (mut grid, mut token) = setup(2);
        token.attach(&mut grid);

        token.set_center(&mut grid, TilePoint::new(6, 5));
        assert_reservation_matches(&grid, &token);
        token.set_sight_range(&mut grid, 4);
        assert_reservation_matches(&grid, &token);
        token.set_center(&mut grid, TilePoint::new(0, 11));
        assert_reservation_matches(&grid, &token);
        token.set_sight_range(&mut grid, 0);
        assert_reservation_matches(&grid, &token);
        token.set_center(&mut grid, TilePoint::new(11, 0));
        assert_reservation_matches(&grid, &token);
    }

    #[test]
    fn test_unchanged_values_publish_nothing() {
        let (mut grid, mut token) = setup(3);
        token.attach(&mut grid);
        grid.drain_changes().for_each(drop);

        token.set_center(&mut grid, TilePoint::new(5, 5));
        token.set_sight_range(&mut grid, 3);
        token.set_shape(&mut grid, VisionShape::LineOfSight);
        assert!(!grid.has_pending_changes());
    }

    #[test]
    fn test_shape_none_only_removes() {
        let (mut grid, mut token) = setup(2);
        token.attach(&mut grid);
        token.set_shape(&mut grid, VisionShape::None);
        assert_eq!(grid.visible_count(), 0);
        // Moving with no shape is free.
        token.set_center(&mut grid, TilePoint::new(1, 1));
        assert_eq!(grid.visible_count(), 0);

        token.set_shape(&mut grid, VisionShape::LineOfSight);
        assert_reservation_matches(&grid, &token);
    }

    #[test]
    fn test_glow_discovers_without_visibility() {
        let mut grid = VisibilityGrid::new(FactionId(0), 12, 12);
        let bounds = TileRect::new(2, 2, 3, 3);
        let mut token = VisionToken::new(FactionId(0), VisionShape::Glow, bounds.center(), 4, bounds);
        token.attach(&mut grid);
        assert_eq!(grid.visible_count(), 0);
        assert_eq!(grid.discovered_count(), 9);

        // Finishing construction switches to a counted circle.
        token.set_shape(&mut grid, VisionShape::LineOfSight);
        assert!(grid.is_visible(TilePoint::new(3, 7)));
        token.dispose(&mut grid);
        assert_eq!(grid.visible_count(), 0);
    }

    #[test]
    fn test_detached_token_changes_are_cached_only() {
        let (mut grid, mut token) = setup(2);
        token.set_center(&mut grid, TilePoint::new(8, 8));
        token.set_sight_range(&mut grid, 1);
        assert_eq!(grid.discovered_count(), 0);

        token.attach(&mut grid);
        assert!(grid.is_visible(TilePoint::new(8, 9)));
        assert!(!grid.is_discovered(TilePoint::new(5, 5)));
    }

    #[test]
    #[should_panic(expected = "attached twice")]
    fn test_double_attach_panics() {
        let (mut grid, mut token) = setup(1);
        token.attach(&mut grid);
        token.attach(&mut grid);
    }
}
