//! Diplomacy and shared vision between factions.
//!
//! `Stance` is directional: `stance(a, b)` is how `a` regards `b`. When it
//! carries [`Stance::SHARED_VISION`], faction `a` perceives what `b`
//! perceives:
//!
//! - On grant, everything `b` has discovered is copied into `a`'s grid
//!   immediately and `a` subscribes to `b`'s future changes.
//! - On revoke, the subscription ends. Discovery already copied stays.
//! - Live visibility is never copied. [`FactionVision::tile_visibility`]
//!   aggregates it at query time.
//!
//! [`FactionVision`] owns every grid and routes change notifications. Only
//! `Local` changes are forwarded to subscribers, so a relayed reveal can
//! never bounce back.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::FactionId;
use crate::geometry::{TilePoint, TileRect};
use crate::visibility::{ChangeOrigin, TileVisibility, VisibilityChange, VisibilityGrid};

/// Upper bound on factions; keeps the diplomacy table a small dense array.
pub const MAX_FACTIONS: usize = 16;

// ============================================================================
// STANCE
// ============================================================================

/// Flag set describing how one faction regards another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Stance(u8);

impl Stance {
    pub const NEUTRAL: Stance = Stance(0);
    pub const ALLIED: Stance = Stance(1);
    pub const SHARED_VISION: Stance = Stance(1 << 1);
    pub const ALL: Stance = Stance(Self::ALLIED.0 | Self::SHARED_VISION.0);

    #[inline]
    pub fn contains(self, other: Stance) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: Stance) -> Stance {
        Stance(self.0 | other.0)
    }

    pub fn without(self, other: Stance) -> Stance {
        Stance(self.0 & !other.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for Stance {
    type Output = Stance;

    fn bitor(self, rhs: Stance) -> Stance {
        self.with(rhs)
    }
}

/// Dense `n × n` stance table. The diagonal always reads [`Stance::ALL`].
#[derive(Debug, Clone)]
pub struct Diplomacy {
    count: usize,
    stances: Vec<Stance>,
}

impl Diplomacy {
    pub fn new(count: usize) -> Self {
        assert!(
            count > 0 && count <= MAX_FACTIONS,
            "faction count {count} outside 1..={MAX_FACTIONS}"
        );
        Self {
            count,
            stances: vec![Stance::NEUTRAL; count * count],
        }
    }

    pub fn faction_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn stance(&self, source: FactionId, target: FactionId) -> Stance {
        if source == target {
            return Stance::ALL;
        }
        self.stances[source.index() * self.count + target.index()]
    }

    #[inline]
    pub fn shares_vision(&self, source: FactionId, target: FactionId) -> bool {
        self.stance(source, target).contains(Stance::SHARED_VISION)
    }

    /// Returns the previous stance. Self-stances are fixed and ignored.
    fn set(&mut self, source: FactionId, target: FactionId, stance: Stance) -> Stance {
        if source == target {
            return Stance::ALL;
        }
        let slot = &mut self.stances[source.index() * self.count + target.index()];
        std::mem::replace(slot, stance)
    }
}

// ============================================================================
// RELAY
// ============================================================================

/// Explicit observer lists: `receivers[b]` holds every faction subscribed to `b`.
#[derive(Debug, Clone)]
pub struct VisionRelay {
    receivers: Vec<Vec<FactionId>>,
}

impl VisionRelay {
    pub fn new(count: usize) -> Self {
        Self {
            receivers: vec![Vec::new(); count],
        }
    }

    pub fn receivers_of(&self, source: FactionId) -> &[FactionId] {
        &self.receivers[source.index()]
    }

    pub fn is_subscribed(&self, receiver: FactionId, source: FactionId) -> bool {
        self.receivers[source.index()].contains(&receiver)
    }

    /// Returns whether a new subscription was created.
    fn subscribe(&mut self, receiver: FactionId, source: FactionId) -> bool {
        let list = &mut self.receivers[source.index()];
        if list.contains(&receiver) {
            return false;
        }
        list.push(receiver);
        true
    }

    fn unsubscribe(&mut self, receiver: FactionId, source: FactionId) {
        self.receivers[source.index()].retain(|&f| f != receiver);
    }

    /// Drop every subscription the faction takes part in.
    fn remove_faction(&mut self, faction: FactionId) {
        self.receivers[faction.index()].clear();
        for list in &mut self.receivers {
            list.retain(|&f| f != faction);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.receivers.iter().map(Vec::len).sum()
    }
}

// ============================================================================
// FACTION VISION
// ============================================================================

/// Notification published to renderers and other consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChanged {
    pub faction: FactionId,
    pub rect: TileRect,
    pub origin: ChangeOrigin,
}

/// Owner of every faction's grid plus diplomacy and relay wiring.
#[derive(Resource, Debug)]
pub struct FactionVision {
    grids: Vec<VisibilityGrid>,
    diplomacy: Diplomacy,
    relay: VisionRelay,
    outbox: Vec<VisibilityChanged>,
    scratch: Vec<VisibilityChange>,
}

impl FactionVision {
    pub fn new(faction_count: usize, width: i32, height: i32) -> Self {
        let diplomacy = Diplomacy::new(faction_count);
        let grids = (0..faction_count)
            .map(|f| VisibilityGrid::new(FactionId(f as u8), width, height))
            .collect();
        Self {
            grids,
            diplomacy,
            relay: VisionRelay::new(faction_count),
            outbox: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn faction_count(&self) -> usize {
        self.grids.len()
    }

    pub fn contains(&self, faction: FactionId) -> bool {
        faction.index() < self.grids.len()
    }

    pub fn grid(&self, faction: FactionId) -> &VisibilityGrid {
        &self.grids[faction.index()]
    }

    pub fn grid_mut(&mut self, faction: FactionId) -> &mut VisibilityGrid {
        &mut self.grids[faction.index()]
    }

    pub fn diplomacy(&self) -> &Diplomacy {
        &self.diplomacy
    }

    pub fn relay(&self) -> &VisionRelay {
        &self.relay
    }

    pub fn stance(&self, source: FactionId, target: FactionId) -> Stance {
        self.diplomacy.stance(source, target)
    }

    pub fn shares_vision(&self, source: FactionId, target: FactionId) -> bool {
        self.diplomacy.shares_vision(source, target)
    }

    /// What `faction` knows about a tile, including allies it shares vision with.
    ///
    /// Runs on the pathfinding hot path: no allocation, one pass over the
    /// fixed diplomacy row.
    pub fn tile_visibility(&self, faction: FactionId, p: TilePoint) -> TileVisibility {
        assert!(
            self.contains(faction),
            "unknown faction {} (have {})",
            faction.0,
            self.grids.len()
        );
        let own = self.grids[faction.index()].tile_visibility(p);
        if own == TileVisibility::Visible {
            return own;
        }
        let mut best = own;
        for (i, grid) in self.grids.iter().enumerate() {
            let other = FactionId(i as u8);
            if other == faction || !self.diplomacy.shares_vision(faction, other) {
                continue;
            }
            match grid.tile_visibility(p) {
                TileVisibility::Visible => return TileVisibility::Visible,
                state => best = best.max(state),
            }
        }
        best
    }

    /// Change how `source` regards `target`.
    ///
    /// Gaining shared vision copies `target`'s discovery into `source` at once
    /// and subscribes to its future changes. Losing it unsubscribes and keeps
    /// whatever was discovered.
    pub fn set_stance(&mut self, source: FactionId, target: FactionId, stance: Stance) {
        if source == target {
            tracing::warn!(
                target: "fogline::diplomacy",
                faction = source.0,
                "ignoring stance change toward self"
            );
            return;
        }
        // Anything `target` discovered up to now must reach `source` before
        // the wiring changes.
        self.flush();

        let previous = self.diplomacy.set(source, target, stance);
        let had = previous.contains(Stance::SHARED_VISION);
        let has = stance.contains(Stance::SHARED_VISION);
        tracing::info!(
            target: "fogline::diplomacy",
            source = source.0,
            target_faction = target.0,
            from = previous.bits(),
            to = stance.bits(),
            "stance changed"
        );

        match (had, has) {
            (false, true) => {
                if self.relay.subscribe(source, target) {
                    let bounds = self.grids[target.index()].bounds();
                    let (dst, src) = pair_mut(&mut self.grids, source, target);
                    dst.absorb_discovery(src, bounds);
                }
            }
            (true, false) => self.relay.unsubscribe(source, target),
            _ => {}
        }
        self.flush();
    }

    pub fn reveal_all(&mut self, faction: FactionId) {
        self.grids[faction.index()].reveal_all();
        self.flush();
    }

    /// Spectator mode for one faction.
    pub fn disable(&mut self, faction: FactionId) {
        self.grids[faction.index()].disable();
        self.flush();
    }

    /// Remove a defeated faction from diplomacy and every relay list.
    pub fn retire_faction(&mut self, faction: FactionId) {
        self.flush();
        for i in 0..self.grids.len() {
            let other = FactionId(i as u8);
            if other != faction {
                self.diplomacy.set(faction, other, Stance::NEUTRAL);
                self.diplomacy.set(other, faction, Stance::NEUTRAL);
            }
        }
        self.relay.remove_faction(faction);
        tracing::info!(target: "fogline::diplomacy", faction = faction.0, "faction retired");
    }

    /// Drain pending grid changes into the outbox, relaying local ones.
    ///
    /// Relayed changes are not forwarded again, so this settles after at
    /// most two passes.
    pub fn flush(&mut self) {
        let mut scratch = std::mem::take(&mut self.scratch);
        loop {
            let mut any = false;
            for i in 0..self.grids.len() {
                if !self.grids[i].has_pending_changes() {
                    continue;
                }
                any = true;
                let source = FactionId(i as u8);
                scratch.clear();
                scratch.extend(self.grids[i].drain_changes());
                for change in &scratch {
                    self.outbox.push(VisibilityChanged {
                        faction: source,
                        rect: change.rect,
                        origin: change.origin,
                    });
                    if change.origin != ChangeOrigin::Local {
                        continue;
                    }
                    for r in 0..self.relay.receivers[i].len() {
                        let receiver = self.relay.receivers[i][r];
                        let (dst, src) = pair_mut(&mut self.grids, receiver, source);
                        dst.absorb_discovery(src, change.rect);
                    }
                }
            }
            if !any {
                break;
            }
        }
        scratch.clear();
        self.scratch = scratch;
    }

    /// Notifications published since the last [`FactionVision::clear_changes`].
    pub fn changes(&self) -> &[VisibilityChanged] {
        &self.outbox
    }

    pub fn clear_changes(&mut self) {
        self.outbox.clear();
    }
}

/// Mutable `dst` and shared `src` from the same slice.
fn pair_mut(
    grids: &mut [VisibilityGrid],
    dst: FactionId,
    src: FactionId,
) -> (&mut VisibilityGrid, &VisibilityGrid) {
    let (d, s) = (dst.index(), src.index());
    assert_ne!(d, s, "relay between a faction and itself");
    if d < s {
        let (left, right) = grids.split_at_mut(s);
        (&mut left[d], &right[0])
    } else {
        let (left, right) = grids.split_at_mut(d);
        (&mut right[0], &left[s])
    }
}
