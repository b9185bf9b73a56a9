//! ECS systems and lifecycle handlers for the Fogline simulation.
//!
//! ## Tick Schedule
//!
//! Each fixed tick runs a strict chain:
//!
//! 1. `movement_system` - snapshot-iterate movers, relocate them through
//!    every structure at once
//! 2. `health_system` - queue dead units for removal
//! 3. `commit_system` - exclusive; apply queued structural changes, then
//!    flush vision notifications and relays
//!
//! `lifecycle` holds the world-level handlers the facade and the commit
//! phase share. They are the only code that writes to the occupancy grid,
//! the broad phase and vision tokens.

pub mod commit;
pub mod lifecycle;
pub mod movement;

pub use commit::*;
pub use lifecycle::*;
pub use movement::*;
