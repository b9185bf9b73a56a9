//! Broad-phase spatial index for area queries.
//!
//! The map is split into square buckets. Each entity lives in the bucket
//! containing the center of its bounds. Queries expand their area by half the
//! maximum entity extent so that entities overlapping the area from a
//! neighboring bucket are still found, then run an exact bounds test per
//! candidate.
//!
//! Bucket lookup is O(1) and queries are O(k) in the number of entities in
//! nearby buckets, rather than O(n) for brute force.

use bevy_ecs::prelude::*;

use crate::components::FactionId;
use crate::geometry::{TileCircle, TilePoint, TileRect};

/// Entry in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub bounds: TileRect,
    pub owner: FactionId,
}

/// Grid-of-buckets broad phase.
#[derive(Resource, Debug)]
pub struct BroadPhase {
    /// Bucket side in tiles.
    bucket_size: i32,
    buckets_wide: i32,
    buckets_high: i32,
    /// Query expansion margin: half the maximum entity extent, rounded up.
    margin: i32,
    buckets: Vec<Vec<SpatialEntry>>,
    /// Backing arrays of buckets that emptied, reused on the next insert.
    pool: Vec<Vec<SpatialEntry>>,
    count: usize,
}

impl BroadPhase {
    pub fn new(map_width: i32, map_height: i32, bucket_size: i32, max_entity_extent: i32) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        assert!(max_entity_extent > 0, "max entity extent must be positive");
        let buckets_wide = (map_width + bucket_size - 1) / bucket_size;
        let buckets_high = (map_height + bucket_size - 1) / bucket_size;
        Self {
            bucket_size,
            buckets_wide,
            buckets_high,
            margin: (max_entity_extent + 1) / 2,
            buckets: vec![Vec::new(); (buckets_wide * buckets_high) as usize],
            pool: Vec::new(),
            count: 0,
        }
    }

    pub fn bucket_size(&self) -> i32 {
        self.bucket_size
    }

    pub fn margin(&self) -> i32 {
        self.margin
    }

    /// Bucket coordinates holding tile `p`, clamped to the bucket grid.
    #[inline]
    pub fn bucket_of(&self, p: TilePoint) -> (i32, i32) {
        (
            (p.x.div_euclid(self.bucket_size)).clamp(0, self.buckets_wide - 1),
            (p.y.div_euclid(self.bucket_size)).clamp(0, self.buckets_high - 1),
        )
    }

    #[inline]
    fn bucket_index(&self, bounds: &TileRect) -> usize {
        let (bx, by) = self.bucket_of(bounds.center());
        (by * self.buckets_wide + bx) as usize
    }

    pub fn insert(&mut self, entity: Entity, bounds: TileRect, owner: FactionId) {
        let index = self.bucket_index(&bounds);
        self.push(index, SpatialEntry { entity, bounds, owner });
        self.count += 1;
    }

    /// Remove an entity last seen at `bounds`. Returns whether it was found.
    pub fn remove(&mut self, entity: Entity, bounds: TileRect) -> bool {
        let index = self.bucket_index(&bounds);
        let found = self.take(index, entity).is_some();
        if found {
            self.count -= 1;
        }
        found
    }

    /// Move an entity from `old` to `new` bounds. Staying in the same bucket
    /// only rewrites the stored bounds.
    pub fn relocate(&mut self, entity: Entity, old: TileRect, new: TileRect) {
        let from = self.bucket_index(&old);
        let to = self.bucket_index(&new);
        if from == to {
            if let Some(entry) = self.buckets[from].iter_mut().find(|e| e.entity == entity) {
                entry.bounds = new;
            } else {
                debug_assert!(false, "relocating {entity:?} that is not indexed");
            }
            return;
        }
        match self.take(from, entity) {
            Some(mut entry) => {
                entry.bounds = new;
                self.push(to, entry);
            }
            None => debug_assert!(false, "relocating {entity:?} that is not indexed"),
        }
    }

    /// Change the recorded owner in place.
    pub fn set_owner(&mut self, entity: Entity, bounds: TileRect, owner: FactionId) {
        let index = self.bucket_index(&bounds);
        if let Some(entry) = self.buckets[index].iter_mut().find(|e| e.entity == entity) {
            entry.owner = owner;
        }
    }

    fn push(&mut self, index: usize, entry: SpatialEntry) {
        let bucket = &mut self.buckets[index];
        if bucket.capacity() == 0 {
            if let Some(pooled) = self.pool.pop() {
                *bucket = pooled;
            }
        }
        bucket.push(entry);
    }

    fn take(&mut self, index: usize, entity: Entity) -> Option<SpatialEntry> {
        let bucket = &mut self.buckets[index];
        let pos = bucket.iter().position(|e| e.entity == entity)?;
        let entry = bucket.swap_remove(pos);
        if bucket.is_empty() {
            self.pool.push(std::mem::take(bucket));
        }
        Some(entry)
    }

    /// Candidate entries from every bucket that could hold an entity overlapping `area`.
    fn candidates(&self, area: TileRect) -> impl Iterator<Item = &SpatialEntry> + '_ {
        let search = area.expand(self.margin);
        let (bx0, by0) = self.bucket_of(TilePoint::new(search.x, search.y));
        let (bx1, by1) = self.bucket_of(TilePoint::new(search.right() - 1, search.bottom() - 1));
        let wide = self.buckets_wide;
        let rows = if area.is_empty() { by0..by0 } else { by0..by1 + 1 };
        rows.flat_map(move |by| (bx0..=bx1).map(move |bx| (by * wide + bx) as usize))
            .flat_map(move |i| self.buckets[i].iter())
    }

    /// Every entity whose bounds intersect `area`.
    pub fn query_rectangle(&self, area: TileRect) -> impl Iterator<Item = Entity> + '_ {
        self.candidates(area)
            .filter(move |e| e.bounds.intersects(&area))
            .map(|e| e.entity)
    }

    /// Every entity whose bounds contain at least one tile of `circle`.
    pub fn query_circle(&self, circle: TileCircle) -> impl Iterator<Item = Entity> + '_ {
        self.query_circle_entries(circle).map(|e| e.entity)
    }

    pub fn query_circle_entries(&self, circle: TileCircle) -> impl Iterator<Item = &SpatialEntry> + '_ {
        assert!(circle.radius >= 0, "negative query radius {}", circle.radius);
        self.candidates(circle.bounds())
            .filter(move |e| circle.intersects_rect(&e.bounds))
    }

    /// Closest entry within `circle` accepted by `filter`, by distance between
    /// the circle center and the nearest tile of the entry.
    pub fn nearest<F>(&self, circle: TileCircle, mut filter: F) -> Option<SpatialEntry>
    where
        F: FnMut(&SpatialEntry) -> bool,
    {
        self.query_circle_entries(circle)
            .filter(|e| filter(*e))
            .min_by_key(|e| {
                (
                    circle.center.distance_sq(e.bounds.closest_tile(circle.center)),
                    e.entity,
                )
            })
            .copied()
    }

    /// Entities in the bucket at bucket coordinates `(bx, by)`.
    pub fn bucket_len(&self, bucket: (i32, i32)) -> usize {
        self.buckets[(bucket.1 * self.buckets_wide + bucket.0) as usize].len()
    }

    pub fn pooled_buffers(&self) -> usize {
        self.pool.len()
    }

    /// Total entity count.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
