//! Arena Sim headless runner
//!
//! Runs a local room for a few seconds with a weapon script and a scripted
//! input driver, logging what happens.
//!
//! ```text
//! arena-sim [weapon.rhai] [config.json]
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arena_sim::{SimConfig, Simulation, TICK_RATE, VERSION};
use arena_sim::core::Vec2;

const DEFAULT_WEAPON: &str = include_str!("../scripts/homing_burst.rhai");

/// Wall-clock length of the demo.
const DEMO_SECONDS: u64 = 5;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Arena Sim v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let mut args = std::env::args().skip(1);
    let script_path = args.next();
    let config_path = args.next();

    let config = match &config_path {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => SimConfig::default(),
    };

    let (name, source) = match &script_path {
        Some(path) => {
            let source = std::fs::read_to_string(path).with_context(|| format!("reading script {path}"))?;
            (path.clone(), source)
        }
        None => ("homing_burst".to_string(), DEFAULT_WEAPON.to_string()),
    };

    let mut sim = Simulation::new(config);
    sim.load_rhai(&name, &source)
        .with_context(|| format!("loading weapon script {name}"))?;

    let frames = Rc::new(Cell::new(0u64));
    let seen = Rc::clone(&frames);
    sim.subscribe(move |state| {
        let n = seen.get() + 1;
        seen.set(n);
        if n % u64::from(TICK_RATE) == 0 {
            info!(
                second = n / u64::from(TICK_RATE),
                score = state.score,
                projectiles = state.projectiles.len(),
                "Frame"
            );
        }
    });

    let input = sim.input_handle();
    let center = sim.config().arena.center();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Strafe in a circle and fire at a point sweeping around the arena
    let driver = async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let steps = DEMO_SECONDS * 4;
        for step in 0..steps {
            ticker.tick().await;
            let angle = step as f32 * 0.4;
            let dir = Vec2::from_angle(angle);
            let target = center + Vec2::from_angle(-angle).scale(250.0);
            if input.move_towards(dir.x, dir.y).is_err() || input.fire(target).is_err() {
                break;
            }
        }
        let _ = shutdown_tx.send(());
    };

    tokio::join!(sim.run(shutdown_rx), driver);

    let state = sim.state();
    info!("=== Results ===");
    info!("Ticks: {}", sim.tick_count());
    info!("Score: {}", state.score);
    info!("Script faults: {}", sim.bridge().fault_count());
    if let Some(board) = &state.leaderboard {
        for (rank, entry) in board.iter().enumerate() {
            info!("#{}: Player {} - Kills: {} Deaths: {}", rank + 1, entry.id, entry.kills, entry.deaths);
        }
    }

    Ok(())
}
