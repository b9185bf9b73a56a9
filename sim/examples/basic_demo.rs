//! Basic demonstration of the Fogline simulation.
//!
//! Run with: cargo run --example basic_demo
//! Set `RUST_LOG=fogline=debug` for per-tick detail.

use fogline::{FactionId, SimConfig, SimResult, SimWorld, Stance, TilePoint, TileVisibility, UnitSpec};
use tracing_subscriber::prelude::*;

const RED: FactionId = FactionId(0);
const BLUE: FactionId = FactionId(1);

fn main() -> SimResult<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Fogline - Simulation Demo ===\n");

    let mut sim = SimWorld::with_config(SimConfig::with_map(48, 24))?;

    // Red scouts on the left, Blue outpost on the right.
    let scouts: Vec<_> = (0..3)
        .map(|i| sim.spawn_unit(sim.unit_spec(RED, 2, 6 + i * 6)))
        .collect::<SimResult<_>>()?;
    let outpost = sim.spawn_unit(UnitSpec::building(BLUE, 40, 10, 3, 3, 6))?;
    sim.spawn_unit(UnitSpec::unit(BLUE, 38, 12, 3))?;

    println!("Initial Red view:");
    print_fog(&sim, RED);

    for (i, &scout) in scouts.iter().enumerate() {
        sim.order_move(scout, TilePoint::new(30, 4 + i as i32 * 7))?;
    }

    println!("\nRunning simulation for 40 ticks (2 seconds at 20 ticks/sec)...\n");
    for tick in 0..40 {
        sim.step(0.05);
        if (tick + 1) % 20 == 0 {
            println!(
                "--- Tick {} (t={:.1}s), {} visibility changes ---",
                sim.current_tick(),
                sim.current_time(),
                sim.visibility_changes().len()
            );
            print_fog(&sim, RED);
        }
    }

    println!("\n--- Blue finishes its outpost and shares vision with Red ---\n");
    sim.finish_construction(outpost)?;
    sim.set_stance(RED, BLUE, Stance::ALLIED | Stance::SHARED_VISION)?;
    print_fog(&sim, RED);

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty()?);
    Ok(())
}

/// `#` visible, `.` discovered, blank undiscovered.
fn print_fog(sim: &SimWorld, faction: FactionId) {
    let config = sim.config();
    for y in 0..config.map_height {
        let row: String = (0..config.map_width)
            .map(|x| match sim.tile_visibility(faction, TilePoint::new(x, y)) {
                TileVisibility::Visible => '#',
                TileVisibility::Discovered => '.',
                TileVisibility::Undiscovered => ' ',
            })
            .collect();
        println!("  |{row}|");
    }
}
