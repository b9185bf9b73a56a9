//! Per-faction fog-of-war grid.
//!
//! Each tile holds a `u16` counter. The reserved value [`UNDISCOVERED`] marks
//! a tile that was never seen; any other value is the number of vision
//! sources currently covering the tile. A tile is visible while its count is
//! above zero and stays discovered forever once it leaves the sentinel.
//!
//! Circle footprints are rasterized once per radius into a boolean mask owned
//! by the grid, so repeated adds and removes only re-derive the origin offset.
//!
//! Every mutation records a [`VisibilityChange`] carrying the clipped
//! rectangle it touched. The owner drains them with
//! [`VisibilityGrid::drain_changes`] to drive the relay and incremental
//! renderers.
//!
//! Coordinates outside the map, negative radii and counter underflow are
//! programming errors and panic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::components::FactionId;
use crate::geometry::{TileCircle, TilePoint, TileRect};

/// Counter value of a tile that has never been discovered.
pub const UNDISCOVERED: u16 = u16::MAX;

/// Highest number of overlapping vision sources a tile can track.
pub const MAX_SOURCES: u16 = u16::MAX - 1;

/// Three-state visibility of a tile from one faction's perspective.
///
/// Ordered so that `max` picks the most informative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TileVisibility {
    /// Never seen.
    #[default]
    Undiscovered,
    /// Seen before, not covered by any vision source now.
    Discovered,
    /// Covered by at least one vision source now.
    Visible,
}

/// Who caused a change. Relayed changes are never forwarded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// The faction's own sources or an explicit reveal.
    Local,
    /// Discovery copied in from an ally through shared vision.
    Relayed,
}

/// Dirty rectangle published by a grid mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub rect: TileRect,
    pub origin: ChangeOrigin,
}

// ============================================================================
// CIRCLE MASKS
// ============================================================================

/// Rasterized disc of a given radius, `(2r + 1)²` cells, centered on `(r, r)`.
#[derive(Debug, Clone)]
struct CircleMask {
    radius: i32,
    side: usize,
    cells: Vec<bool>,
}

impl CircleMask {
    fn build(radius: i32) -> Self {
        let side = 2 * radius as usize + 1;
        let r_sq = radius as i64 * radius as i64;
        let mut cells = Vec::with_capacity(side * side);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                cells.push((dx as i64 * dx as i64 + dy as i64 * dy as i64) <= r_sq);
            }
        }
        Self { radius, side, cells }
    }

    /// Whether the offset `(dx, dy)` from the center lies in the disc.
    #[inline]
    fn contains(&self, dx: i32, dy: i32) -> bool {
        if dx.abs() > self.radius || dy.abs() > self.radius {
            return false;
        }
        let row = (dy + self.radius) as usize;
        let col = (dx + self.radius) as usize;
        self.cells[row * self.side + col]
    }
}

/// Masks keyed by radius. Owned per grid; nothing is shared between factions.
#[derive(Debug, Clone, Default)]
pub struct CircleMaskCache {
    masks: HashMap<i32, CircleMask>,
}

impl CircleMaskCache {
    fn get(&mut self, radius: i32) -> &CircleMask {
        self.masks
            .entry(radius)
            .or_insert_with(|| CircleMask::build(radius))
    }

    /// Number of distinct radii rasterized so far.
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

// ============================================================================
// GRID
// ============================================================================

/// Reference-counted visibility for one faction.
#[derive(Debug, Clone)]
pub struct VisibilityGrid {
    faction: FactionId,
    width: i32,
    height: i32,
    counts: Vec<u16>,
    /// Spectator mode: every tile reads as visible.
    disabled: bool,
    masks: CircleMaskCache,
    pending: Vec<VisibilityChange>,
}

impl VisibilityGrid {
    pub fn new(faction: FactionId, width: i32, height: i32) -> Self {
        assert!(
            width > 0 && height > 0,
            "visibility grid must be non-empty, got {width}x{height}"
        );
        Self {
            faction,
            width,
            height,
            counts: vec![UNDISCOVERED; (width * height) as usize],
            disabled: false,
            masks: CircleMaskCache::default(),
            pending: Vec::new(),
        }
    }

    pub fn faction(&self) -> FactionId {
        self.faction
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.width, self.height)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn mask_cache(&self) -> &CircleMaskCache {
        &self.masks
    }

    #[inline]
    fn index(&self, p: TilePoint) -> usize {
        assert!(
            p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height,
            "tile ({}, {}) outside {}x{} visibility grid",
            p.x,
            p.y,
            self.width,
            self.height
        );
        (p.y * self.width + p.x) as usize
    }

    /// State of a tile. Panics if `p` is outside the map.
    #[inline]
    pub fn tile_visibility(&self, p: TilePoint) -> TileVisibility {
        let i = self.index(p);
        if self.disabled {
            return TileVisibility::Visible;
        }
        match self.counts[i] {
            UNDISCOVERED => TileVisibility::Undiscovered,
            0 => TileVisibility::Discovered,
            _ => TileVisibility::Visible,
        }
    }

    #[inline]
    pub fn is_discovered(&self, p: TilePoint) -> bool {
        self.tile_visibility(p) != TileVisibility::Undiscovered
    }

    #[inline]
    pub fn is_visible(&self, p: TilePoint) -> bool {
        self.tile_visibility(p) == TileVisibility::Visible
    }

    /// Raw reference count, `None` while undiscovered. Ignores spectator mode.
    pub fn source_count(&self, p: TilePoint) -> Option<u16> {
        match self.counts[self.index(p)] {
            UNDISCOVERED => None,
            n => Some(n),
        }
    }

    pub fn discovered_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c != UNDISCOVERED).count()
    }

    pub fn visible_count(&self) -> usize {
        self.counts
            .iter()
            .filter(|&&c| c != UNDISCOVERED && c > 0)
            .count()
    }

    // ------------------------------------------------------------------
    // Counted shapes
    // ------------------------------------------------------------------

    pub fn add_circle(&mut self, circle: TileCircle) {
        self.apply_circle(circle, true);
    }

    pub fn remove_circle(&mut self, circle: TileCircle) {
        self.apply_circle(circle, false);
    }

    fn apply_circle(&mut self, circle: TileCircle, add: bool) {
        self.check_circle(circle);
        let circle = TileCircle::new(circle.center, self.clamp_radius(circle.radius));
        let Some(area) = circle.bounds().intersection(&self.bounds()) else {
            return;
        };
        let mask = self.masks.get(circle.radius);
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for x in area.x..area.right() {
                if mask.contains(x - circle.center.x, y - circle.center.y) {
                    let i = row + x as usize;
                    if add {
                        increment(&mut self.counts[i]);
                    } else {
                        decrement(&mut self.counts[i]);
                    }
                }
            }
        }
        self.publish(area, ChangeOrigin::Local);
    }

    /// Move a circle in one pass: tiles covered by both positions are left
    /// untouched, tiles leaving the circle are decremented and tiles entering
    /// it are incremented.
    pub fn move_circle(&mut self, from: TilePoint, to: TilePoint, radius: i32) {
        let old = TileCircle::new(from, radius);
        let new = TileCircle::new(to, radius);
        self.check_circle(old);
        self.check_circle(new);
        if from == to {
            return;
        }
        let radius = self.clamp_radius(radius);
        let (old, new) = (TileCircle::new(from, radius), TileCircle::new(to, radius));
        let map = self.bounds();
        let (Some(old_area), Some(new_area)) = (
            old.bounds().intersection(&map),
            new.bounds().intersection(&map),
        ) else {
            return;
        };
        let area = old_area.union(&new_area);
        let mask = self.masks.get(radius);
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for x in area.x..area.right() {
                let in_old = mask.contains(x - from.x, y - from.y);
                let in_new = mask.contains(x - to.x, y - to.y);
                match (in_old, in_new) {
                    (true, false) => decrement(&mut self.counts[row + x as usize]),
                    (false, true) => increment(&mut self.counts[row + x as usize]),
                    _ => {}
                }
            }
        }
        self.publish(area, ChangeOrigin::Local);
    }

    /// Counted rectangle, clipped to the map.
    pub fn add_rectangle(&mut self, rect: TileRect) {
        self.apply_rectangle(rect, true);
    }

    pub fn remove_rectangle(&mut self, rect: TileRect) {
        self.apply_rectangle(rect, false);
    }

    fn apply_rectangle(&mut self, rect: TileRect, add: bool) {
        let Some(area) = rect.intersection(&self.bounds()) else {
            return;
        };
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for c in &mut self.counts[row + area.x as usize..row + area.right() as usize] {
                if add {
                    increment(c);
                } else {
                    decrement(c);
                }
            }
        }
        self.publish(area, ChangeOrigin::Local);
    }

    // ------------------------------------------------------------------
    // Discovery only
    // ------------------------------------------------------------------

    /// Mark a rectangle discovered without adding a vision source.
    pub fn reveal_rectangle(&mut self, rect: TileRect) {
        let Some(area) = rect.intersection(&self.bounds()) else {
            return;
        };
        let mut changed = false;
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for c in &mut self.counts[row + area.x as usize..row + area.right() as usize] {
                if *c == UNDISCOVERED {
                    *c = 0;
                    changed = true;
                }
            }
        }
        if changed {
            self.publish(area, ChangeOrigin::Local);
        }
    }

    /// Discover the whole map.
    pub fn reveal_all(&mut self) {
        for c in &mut self.counts {
            if *c == UNDISCOVERED {
                *c = 0;
            }
        }
        self.publish(self.bounds(), ChangeOrigin::Local);
    }

    /// Spectator mode: every tile reads as visible from now on.
    pub fn disable(&mut self) {
        if self.disabled {
            return;
        }
        self.disabled = true;
        self.publish(self.bounds(), ChangeOrigin::Local);
    }

    /// Copy discovery from `source` over `rect` without touching counts.
    ///
    /// Publishes a `Relayed` change covering the tiles that became
    /// discovered, if any. Returns whether anything changed.
    pub fn absorb_discovery(&mut self, source: &VisibilityGrid, rect: TileRect) -> bool {
        assert!(
            source.width == self.width && source.height == self.height,
            "cannot relay between grids of different sizes"
        );
        let Some(area) = rect.intersection(&self.bounds()) else {
            return false;
        };
        let mut touched: Option<TileRect> = None;
        for y in area.y..area.bottom() {
            let row = (y * self.width) as usize;
            for x in area.x..area.right() {
                let i = row + x as usize;
                let source_discovered = source.disabled || source.counts[i] != UNDISCOVERED;
                if source_discovered && self.counts[i] == UNDISCOVERED {
                    self.counts[i] = 0;
                    let tile = TileRect::new(x, y, 1, 1);
                    touched = Some(touched.map_or(tile, |t| t.union(&tile)));
                }
            }
        }
        match touched {
            Some(rect) => {
                self.publish(rect, ChangeOrigin::Relayed);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn drain_changes(&mut self) -> std::vec::Drain<'_, VisibilityChange> {
        self.pending.drain(..)
    }

    fn publish(&mut self, rect: TileRect, origin: ChangeOrigin) {
        tracing::trace!(
            target: "fogline::visibility",
            faction = self.faction.0,
            ?rect,
            ?origin,
            "visibility.changed"
        );
        self.pending.push(VisibilityChange { rect, origin });
    }

    /// A disc centered on the map with radius `width + height` already covers
    /// every tile, so larger radii rasterize the same set.
    #[inline]
    fn clamp_radius(&self, radius: i32) -> i32 {
        radius.min(self.width.saturating_add(self.height))
    }

    fn check_circle(&self, circle: TileCircle) {
        assert!(
            circle.radius >= 0,
            "negative vision radius {}",
            circle.radius
        );
        // Panics for centers off the map.
        self.index(circle.center);
    }
}

#[inline]
fn increment(c: &mut u16) {
    *c = match *c {
        UNDISCOVERED => 1,
        n => {
            assert!(n < MAX_SOURCES, "visibility counter overflow");
            n + 1
        }
    };
}

#[inline]
fn decrement(c: &mut u16) {
    assert!(
        *c != UNDISCOVERED && *c > 0,
        "removing a vision source from a tile that has none"
    );
    *c -= 1;
}
