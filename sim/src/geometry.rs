//! Integer tile geometry shared by every grid and index.
//!
//! All coordinates are in tiles. Rectangles are half-open: a rectangle at
//! `(x, y)` with size `w × h` covers columns `x..x + w` and rows `y..y + h`.

use serde::{Deserialize, Serialize};

/// A tile coordinate on the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
}

impl TilePoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another tile.
    #[inline]
    pub fn distance_sq(&self, other: TilePoint) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }

    /// One step toward `target` along each axis (Chebyshev step).
    pub fn step_toward(&self, target: TilePoint) -> TilePoint {
        TilePoint {
            x: self.x + (target.x - self.x).signum(),
            y: self.y + (target.y - self.y).signum(),
        }
    }
}

/// An axis-aligned rectangle of tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl TileRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning the inclusive corners `min` and `max`.
    pub fn from_corners(min: TilePoint, max: TilePoint) -> Self {
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x + 1,
            height: max.y - min.y + 1,
        }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Integer center tile. For even sizes this rounds toward the bottom-right.
    #[inline]
    pub fn center(&self) -> TilePoint {
        TilePoint::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    #[inline]
    pub fn contains(&self, p: TilePoint) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &TileRect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    #[inline]
    pub fn intersects(&self, other: &TileRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Overlap of two rectangles, or `None` if they are disjoint.
    pub fn intersection(&self, other: &TileRect) -> Option<TileRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| TileRect::new(x, y, right - x, bottom - y))
    }

    /// Smallest rectangle covering both. Empty inputs are ignored.
    pub fn union(&self, other: &TileRect) -> TileRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        TileRect::new(x, y, right - x, bottom - y)
    }

    /// Grow by `margin` tiles on every side.
    pub fn expand(&self, margin: i32) -> TileRect {
        TileRect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    /// Same size, moved so its top-left corner sits at `anchor`.
    pub fn with_anchor(&self, anchor: TilePoint) -> TileRect {
        TileRect::new(anchor.x, anchor.y, self.width, self.height)
    }

    /// Tile of this rectangle closest to `p`.
    #[inline]
    pub fn closest_tile(&self, p: TilePoint) -> TilePoint {
        TilePoint::new(
            p.x.clamp(self.x, self.right() - 1),
            p.y.clamp(self.y, self.bottom() - 1),
        )
    }

    /// Row-major iterator over every tile.
    pub fn tiles(&self) -> impl Iterator<Item = TilePoint> {
        let (x0, x1) = (self.x, self.right());
        (self.y..self.bottom()).flat_map(move |y| (x0..x1).map(move |x| TilePoint::new(x, y)))
    }
}

/// A disc of tiles: every tile whose squared distance to `center` is at most `radius²`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCircle {
    pub center: TilePoint,
    pub radius: i32,
}

impl TileCircle {
    pub const fn new(center: TilePoint, radius: i32) -> Self {
        Self { center, radius }
    }

    #[inline]
    pub fn contains(&self, p: TilePoint) -> bool {
        let r = self.radius as i64;
        self.center.distance_sq(p) <= r * r
    }

    /// Tight bounding rectangle.
    pub fn bounds(&self) -> TileRect {
        let side = self.radius.saturating_mul(2).saturating_add(1);
        TileRect::new(
            self.center.x.saturating_sub(self.radius),
            self.center.y.saturating_sub(self.radius),
            side,
            side,
        )
    }

    /// Whether any tile of `rect` lies inside the circle.
    #[inline]
    pub fn intersects_rect(&self, rect: &TileRect) -> bool {
        !rect.is_empty() && self.contains(rect.closest_tile(self.center))
    }
}
