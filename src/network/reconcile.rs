//! Network Reconciliation Layer
//!
//! Merges authoritative snapshots with locally predicted state:
//!
//! - Fewer than two snapshots: only the local player moves, from its own
//!   velocity (already applied by the tick), clamped to the arena.
//! - Two or more: everything except the local player is interpolated at
//!   `now - interpolation_offset`.
//!
//! The local player keeps its own position and velocity; hp and stats come
//! from the server. Projectiles the local player owns are simulated here and
//! their server echo is discarded.

use std::rc::Rc;

use tracing::{debug, info};

use crate::config::{ArenaConfig, SimConfig};
use crate::game::behavior::update_projectiles;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::TickInputs;
use crate::game::state::{Entity, EntityId, GameState, PREDICTED_ID_BASE};
use crate::game::tick::{
    apply_movement, collect_faults, fire_requests, run_update, spawn_requested, TickEnv, TickResult,
};
use crate::script::{ScriptContext, ScriptWorld};

use super::link::NetworkLink;
use super::protocol::{ClientMessage, ServerMessage, WireSnapshot};
use super::snapshot::{Snapshot, SnapshotBuffer};

/// Which reconciliation path the last `advance` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Not enough snapshots; local extrapolation only
    InsufficientHistory,
    /// Interpolating remote entities
    Interpolating,
}

/// Per-room reconciliation state.
#[derive(Debug, Clone)]
pub struct Reconciler {
    buffer: SnapshotBuffer,
    offset: f64,
    player_count: u32,
}

impl Reconciler {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            buffer: SnapshotBuffer::new(config.snapshot_capacity),
            offset: config.interpolation_offset.max(0.0),
            player_count: 0,
        }
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn mode(&self) -> ReconcileMode {
        if self.buffer.len() >= 2 {
            ReconcileMode::Interpolating
        } else {
            ReconcileMode::InsufficientHistory
        }
    }

    /// Connected players as last reported.
    pub fn player_count(&self) -> u32 {
        self.player_count
    }

    /// Apply one inbound message received at `now`. Returns the enemy id of
    /// a `kill` so the caller can run `on_kill`.
    pub fn handle_message(
        &mut self,
        msg: ServerMessage,
        now: f64,
        state: &mut GameState,
        tick: u64,
        events: &mut Vec<GameEvent>,
    ) -> Option<EntityId> {
        match msg {
            ServerMessage::Init { player_id, snapshot } => {
                info!(player = %player_id, "Joined server session");
                self.buffer.clear();
                state.local_player = Some(player_id);
                state.entities = snapshot.entities();
                state.projectiles.clear();
                state.reserve_ids_from(PREDICTED_ID_BASE);
                apply_scalars(state, &snapshot);
                self.buffer.push(Snapshot::from_wire(now, &snapshot));
                None
            }
            ServerMessage::State { snapshot } => {
                apply_scalars(state, &snapshot);
                adopt_local_player(state, &snapshot);
                self.buffer.push(Snapshot::from_wire(now, &snapshot));
                None
            }
            ServerMessage::PlayerJoined { count } | ServerMessage::PlayerLeft { count } => {
                self.player_count = count;
                events.push(GameEvent::new(tick, GameEventData::PlayerCountChanged { count }));
                None
            }
            ServerMessage::Kill { enemy_id } => {
                events.push(GameEvent::new(tick, GameEventData::RemoteKill { enemy: enemy_id }));
                Some(enemy_id)
            }
            ServerMessage::VisualEffect(payload) => {
                events.push(GameEvent::new(tick, GameEventData::VisualEffect { payload }));
                None
            }
        }
    }

    /// Step local projectiles and, with enough history, interpolate
    /// everything remote.
    pub fn advance(
        &mut self,
        state: &mut GameState,
        now: f64,
        dt: f32,
        config: &SimConfig,
        tick: u64,
        events: &mut Vec<GameEvent>,
    ) -> ReconcileMode {
        let local = state.local_player;
        let owned_locally = |p: &Entity| local.is_some() && p.projectile().map(|ps| ps.owner()) == local;

        let (local_shots, mut remote_shots): (Vec<Entity>, Vec<Entity>) =
            std::mem::take(&mut state.projectiles).into_iter().partition(|p| owned_locally(p));

        // Local projectiles: same lifetime/velocity rules as local mode
        state.projectiles = local_shots;
        update_projectiles(state, dt, config, tick, events);
        let local_shots = std::mem::take(&mut state.projectiles);

        let mode = self.mode();
        if let Some(frame) = self.buffer.interpolate(now - self.offset) {
            merge_entities(state, frame.entities);
            remote_shots = frame
                .projectiles
                .into_iter()
                .filter(|p| !owned_locally(p))
                .collect();
        }

        state.projectiles = remote_shots;
        state.projectiles.extend(local_shots);

        #[cfg(feature = "debug-tracing")]
        debug!(?mode, entities = state.entities.len(), projectiles = state.projectiles.len(), "Reconciled");
        mode
    }
}

/// Score, leaderboard and game-over are taken straight from the server.
fn apply_scalars(state: &mut GameState, snapshot: &WireSnapshot) {
    state.score = snapshot.score;
    state.leaderboard = snapshot.leaderboard.clone();
    state.game_over = snapshot.game_over;
}

/// If the local player isn't in the store yet, take it from the snapshot
/// once.
fn adopt_local_player(state: &mut GameState, snapshot: &WireSnapshot) {
    let Some(id) = state.local_player else {
        return;
    };
    if state.entity(id).is_some() {
        return;
    }
    if let Some(player) = snapshot.entities().into_iter().find(|e| e.id == id) {
        debug!(player = %id, "Adopting local player from snapshot");
        state.entities.push(player);
    }
}

/// Replace players/enemies with interpolated ones, keeping the local
/// player's own position and velocity.
fn merge_entities(state: &mut GameState, frame: Vec<Entity>) {
    let local_id = state.local_player;
    let local = local_id.and_then(|id| state.entity(id).cloned());

    let mut merged: Vec<Entity> = frame
        .into_iter()
        .map(|mut e| {
            if let Some(mine) = local.as_ref().filter(|l| l.id == e.id) {
                e.position = mine.position;
                e.velocity = mine.velocity;
            }
            e
        })
        .collect();

    if let Some(mine) = local {
        if !merged.iter().any(|e| e.id == mine.id) {
            merged.push(mine);
        }
    }
    state.entities = merged;
}

fn integrate_local_player(state: &mut GameState, dt: f32, arena: &ArenaConfig) {
    if let Some(player) = state.local_player_mut() {
        player.position = arena.clamp_inside(player.position + player.velocity.scale(dt), player.radius);
    }
}

// =============================================================================
// NETWORKED TICK
// =============================================================================

/// One networked tick.
///
/// 1. Drain inbound messages (snapshots stamped with `env.time`)
/// 2. Movement, sent as `move`
/// 3. Fire requests, predicted locally and sent as `fire`
/// 4. Script `update(dt)`
/// 5. Integrate the local player
/// 6. Reconcile
pub fn networked_tick(
    state: &mut GameState,
    inputs: &TickInputs,
    env: TickEnv<'_>,
    reconciler: &mut Reconciler,
    link: &mut NetworkLink,
) -> TickResult {
    let TickEnv { bridge, rng, config, tick, time } = env;
    let dt = config.tick_dt();
    let arena = &config.arena;
    let mut result = TickResult {
        tick,
        ..TickResult::default()
    };

    let world = Rc::new(ScriptWorld::capture(state, arena));
    let mut ctx = ScriptContext::new(world, rng, time);

    // 1. Inbound
    for (received, msg) in link.drain_inbound(time) {
        let Some(enemy) = reconciler.handle_message(msg, received, state, tick, &mut result.events) else {
            continue;
        };
        if bridge.has_script() {
            ctx.refresh(Rc::new(ScriptWorld::capture(state, arena)));
            bridge.on_kill(&mut ctx, enemy);
            let requests = ctx.take_spawned();
            if let Some((owner, origin)) = state.local_player().map(|p| (p.id, p.position)) {
                result
                    .fired
                    .extend(spawn_requested(state, requests, owner, origin, None, tick, &mut result.events));
            }
        }
    }

    // 2. Movement
    result.movement = apply_movement(state, inputs, arena);
    if let Some(v) = result.movement {
        link.send(ClientMessage::Move { vx: v.x, vy: v.y });
    }

    // 3. Fire
    let fired = fire_requests(state, &inputs.fires, bridge, &mut ctx, arena, tick, &mut result.events);
    result.fired.extend(fired);

    // 4. Script update
    let spawned = run_update(state, bridge, &mut ctx, dt, arena, tick, &mut result.events);
    result.fired.extend(spawned);

    for spec in &result.fired {
        link.send(ClientMessage::Fire(spec.to_params()));
    }

    // 5. Local player
    integrate_local_player(state, dt, arena);

    // 6. Reconcile
    reconciler.advance(state, time, dt, config, tick, &mut result.events);

    collect_faults(bridge, tick, &mut result.events);
    result
}

// =============================================================================
// TESTS
// =============================================================================
