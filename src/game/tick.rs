//! Simulation Tick
//!
//! The single writer of the Entity Store. One call advances a local
//! (single-player) room by one fixed step; the networked path reuses the
//! step functions below from `network::reconcile`.

use std::rc::Rc;

use crate::config::{ArenaConfig, SimConfig};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::behavior::update_projectiles;
use crate::game::collision::resolve_collisions;
use crate::game::events::GameEvent;
use crate::game::input::TickInputs;
use crate::game::params::{ProjectileParams, ProjectileSpec};
use crate::game::state::{EntityId, GameState};
use crate::script::{ScriptBridge, ScriptContext, ScriptWorld};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick number this result belongs to
    pub tick: u64,
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Projectiles the local player created this tick
    pub fired: Vec<ProjectileSpec>,
    /// New local movement velocity, if input changed it
    pub movement: Option<Vec2>,
}

/// Everything a tick borrows besides the state and inputs.
pub struct TickEnv<'a> {
    pub bridge: &'a mut ScriptBridge,
    pub rng: &'a mut DeterministicRng,
    pub config: &'a SimConfig,
    /// Tick counter
    pub tick: u64,
    /// Simulation time at the start of the tick (seconds)
    pub time: f64,
}

/// Run one local simulation tick.
///
/// Order:
/// 1. Apply queued movement
/// 2. Fire requests (`on_fire`)
/// 3. Script `update(dt)`
/// 4. Integrate players
/// 5. Projectile behaviors
/// 6. Integrate enemies
/// 7. Collisions
pub fn tick(state: &mut GameState, inputs: &TickInputs, env: TickEnv<'_>) -> TickResult {
    let TickEnv { bridge, rng, config, tick, time } = env;
    let dt = config.tick_dt();
    let arena = &config.arena;
    let mut result = TickResult {
        tick,
        ..TickResult::default()
    };

    let world = Rc::new(ScriptWorld::capture(state, arena));
    let mut ctx = ScriptContext::new(world, rng, time);

    // 1. Movement
    result.movement = apply_movement(state, inputs, arena);

    // 2. Fire
    result.fired = fire_requests(state, &inputs.fires, bridge, &mut ctx, arena, tick, &mut result.events);

    // 3. Script update
    result
        .fired
        .extend(run_update(state, bridge, &mut ctx, dt, arena, tick, &mut result.events));

    // 4. Players
    integrate_players(state, dt, arena);

    // 5. Projectiles
    update_projectiles(state, dt, config, tick, &mut result.events);

    // 6. Enemies
    integrate_enemies(state, dt, arena);

    // 7. Collisions
    resolve_collisions(state, bridge, &mut ctx, arena, tick, &mut result.events);

    collect_faults(bridge, tick, &mut result.events);
    result
}

// =============================================================================
// STEPS
// =============================================================================

/// Set the local player's velocity from the latest movement input.
pub fn apply_movement(state: &mut GameState, inputs: &TickInputs, arena: &ArenaConfig) -> Option<Vec2> {
    let dir = inputs.movement?;
    let velocity = dir.scale(arena.player_speed);
    let player = state.local_player_mut()?;
    player.velocity = velocity;
    Some(velocity)
}

/// Ask the script for a projectile per fire target and spawn the results.
#[allow(clippy::too_many_arguments)]
pub fn fire_requests(
    state: &mut GameState,
    targets: &[Vec2],
    bridge: &mut ScriptBridge,
    ctx: &mut ScriptContext<'_>,
    arena: &ArenaConfig,
    tick: u64,
    events: &mut Vec<GameEvent>,
) -> Vec<ProjectileSpec> {
    let mut fired = Vec::new();
    let Some((owner, origin)) = state.local_player().map(|p| (p.id, p.position)) else {
        return fired;
    };

    for &target in targets {
        ctx.refresh(Rc::new(ScriptWorld::capture(state, arena)));
        let mut requests: Vec<ProjectileParams> = bridge.on_fire(ctx, target, origin).into_iter().collect();
        requests.extend(ctx.take_spawned());
        fired.extend(spawn_requested(state, requests, owner, origin, Some(target), tick, events));
    }
    fired
}

/// Script `update(dt)`; spawns whatever it queued.
#[allow(clippy::too_many_arguments)]
pub fn run_update(
    state: &mut GameState,
    bridge: &mut ScriptBridge,
    ctx: &mut ScriptContext<'_>,
    dt: f32,
    arena: &ArenaConfig,
    tick: u64,
    events: &mut Vec<GameEvent>,
) -> Vec<ProjectileSpec> {
    if !bridge.has_script() {
        return Vec::new();
    }
    ctx.refresh(Rc::new(ScriptWorld::capture(state, arena)));
    bridge.update(ctx, dt);

    let requests = ctx.take_spawned();
    match state.local_player().map(|p| (p.id, p.position)) {
        Some((owner, origin)) if !requests.is_empty() => {
            spawn_requested(state, requests, owner, origin, None, tick, events)
        }
        _ => Vec::new(),
    }
}

/// Normalize and create script-requested projectiles.
pub fn spawn_requested(
    state: &mut GameState,
    requests: Vec<ProjectileParams>,
    owner: EntityId,
    origin: Vec2,
    target: Option<Vec2>,
    tick: u64,
    events: &mut Vec<GameEvent>,
) -> Vec<ProjectileSpec> {
    requests
        .into_iter()
        .map(|params| {
            let spec = params.normalize(origin, target);
            let id = state.spawn_projectile(&spec, owner);
            events.push(GameEvent::projectile_spawned(tick, id, owner, spec.position));
            spec
        })
        .collect()
}

/// Move players by velocity and keep them inside the walls.
pub fn integrate_players(state: &mut GameState, dt: f32, arena: &ArenaConfig) {
    for player in state.entities.iter_mut().filter(|e| e.is_player()) {
        player.position = arena.clamp_inside(player.position + player.velocity.scale(dt), player.radius);
    }
}

/// Move enemies by their (knockback/attraction) velocity with damping.
pub fn integrate_enemies(state: &mut GameState, dt: f32, arena: &ArenaConfig) {
    let damping = (-arena.enemy_damping.max(0.0) * dt).exp();
    for enemy in state.entities.iter_mut().filter(|e| e.is_enemy()) {
        if enemy.velocity == Vec2::ZERO {
            continue;
        }
        enemy.position = arena.clamp_inside(enemy.position + enemy.velocity.scale(dt), enemy.radius);
        enemy.velocity = enemy.velocity.scale(damping);
        if enemy.velocity.length_squared() < 1e-4 {
            enemy.velocity = Vec2::ZERO;
        }
    }
}

/// Turn caught script faults into events.
pub fn collect_faults(bridge: &mut ScriptBridge, tick: u64, events: &mut Vec<GameEvent>) {
    events.extend(
        bridge
            .take_faults()
            .into_iter()
            .map(|f| GameEvent::script_fault(tick, f.callback, f.message)),
    );
}

// =============================================================================
// TESTS
// =============================================================================
