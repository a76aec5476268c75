//! Collision Resolver
//!
//! Projectile/enemy hits: damage, vampirism, knockback, `on_hit`, kills and
//! respawns, then chain or pierce continuation.
//!
//! Chain and pierce are resolved with one rule: a successful chain jump
//! keeps the projectile, consumes no pierce and ends its testing for this
//! tick. Pierce is only consumed when there is no chain target.

use std::rc::Rc;

use tracing::debug;

use crate::config::ArenaConfig;
use crate::core::vec2::Vec2;
use crate::game::events::{GameEvent, GameEventData, RemovalCause};
use crate::game::state::{nearest_enemy, EntityId, GameState};
use crate::game::tick::spawn_requested;
use crate::script::{ScriptBridge, ScriptContext, ScriptWorld};

/// How a projectile continues after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Redirected to another enemy
    Chained(EntityId),
    /// Pierce consumed; keep testing
    Pierced,
    /// Remove the projectile
    Destroyed,
}

/// Resolve all projectile/enemy overlaps for this tick.
///
/// Projectiles are walked in reverse so removal is index-safe; projectiles
/// spawned by callbacks are appended and not tested until the next tick.
pub fn resolve_collisions(
    state: &mut GameState,
    bridge: &mut ScriptBridge,
    ctx: &mut ScriptContext<'_>,
    arena: &ArenaConfig,
    tick: u64,
    events: &mut Vec<GameEvent>,
) {
    let mut i = state.projectiles.len();
    while i > 0 {
        i -= 1;

        let mut destroyed = false;
        let mut j = 0;
        while j < state.entities.len() {
            if !projectile_overlaps(state, i, j) {
                j += 1;
                continue;
            }

            match resolve_hit(state, i, j, bridge, ctx, arena, tick, events) {
                Continuation::Chained(_) => break,
                Continuation::Pierced => j += 1,
                Continuation::Destroyed => {
                    destroyed = true;
                    break;
                }
            }
        }

        if destroyed {
            let removed = state.projectiles.remove(i);
            events.push(GameEvent::projectile_removed(tick, removed.id, RemovalCause::Collision));
        }
    }
}

/// Projectile `i` overlaps enemy `j` and has not just hit it.
fn projectile_overlaps(state: &GameState, i: usize, j: usize) -> bool {
    let (Some(projectile), Some(enemy)) = (state.projectiles.get(i), state.entities.get(j)) else {
        return false;
    };
    let Some(ps) = projectile.projectile() else {
        return false;
    };
    enemy.is_enemy() && ps.last_hit != Some(enemy.id) && projectile.overlaps(enemy)
}

/// Apply one hit of projectile `i` on enemy `j`.
#[allow(clippy::too_many_arguments)]
pub fn resolve_hit(
    state: &mut GameState,
    i: usize,
    j: usize,
    bridge: &mut ScriptBridge,
    ctx: &mut ScriptContext<'_>,
    arena: &ArenaConfig,
    tick: u64,
    events: &mut Vec<GameEvent>,
) -> Continuation {
    let projectile = &state.projectiles[i];
    let projectile_id = projectile.id;
    let projectile_pos = projectile.position;
    let projectile_vel = projectile.velocity;
    let Some(ps) = projectile.projectile().cloned() else {
        return Continuation::Destroyed;
    };
    let owner = ps.owner();

    // Damage and knockback
    let enemy = &mut state.entities[j];
    let enemy_id = enemy.id;
    enemy.apply_damage(ps.damage);
    if ps.knockback > 0.0 {
        let mut away = (enemy.position - projectile_pos).normalize();
        if away == Vec2::ZERO {
            away = projectile_vel.normalize();
        }
        enemy.velocity += away.scale(ps.knockback);
    }
    let killed = enemy.hp <= 0.0;

    // Vampirism
    if ps.vampirism > 0.0 {
        if let Some(owner_entity) = state.entity_mut(owner) {
            owner_entity.heal(ps.damage * ps.vampirism / 100.0);
        }
    }

    events.push(GameEvent::enemy_hit(tick, projectile_id, enemy_id, ps.damage));
    notify(state, bridge, ctx, arena, owner, projectile_pos, tick, events, |b, c| b.on_hit(c, enemy_id));

    if killed {
        state.respawn_enemy(enemy_id, arena, ctx.rng_mut());
        state.score += 1;
        state.record_kill(owner);
        let respawn = state.entity(enemy_id).map(|e| e.position).unwrap_or_default();
        debug!(enemy = %enemy_id, killer = %owner, score = state.score, "Enemy killed");
        events.push(GameEvent::enemy_killed(tick, enemy_id, owner, respawn));
        notify(state, bridge, ctx, arena, owner, projectile_pos, tick, events, |b, c| b.on_kill(c, enemy_id));
    }

    // Continuation
    let chain_target = if ps.chain_range > 0.0 {
        nearest_enemy(&state.entities, projectile_pos, Some(enemy_id), Some(ps.chain_range))
            .map(|e| (e.id, e.position))
    } else {
        None
    };

    let projectile = &mut state.projectiles[i];
    let position = projectile.position;
    let speed = projectile.velocity.length();
    let Some(slot) = projectile.projectile_mut() else {
        return Continuation::Destroyed;
    };
    slot.last_hit = Some(enemy_id);

    let continuation = match chain_target {
        Some((target_id, _)) => Continuation::Chained(target_id),
        None if slot.pierce > 1 => {
            slot.pierce -= 1;
            Continuation::Pierced
        }
        None => Continuation::Destroyed,
    };

    if let Some((target_id, target_pos)) = chain_target {
        projectile.velocity = (target_pos - position).normalize().scale(speed);
        events.push(GameEvent::new(
            tick,
            GameEventData::ProjectileChained {
                projectile: projectile_id,
                from: enemy_id,
                to: target_id,
            },
        ));
    }
    continuation
}

/// Run a hit/kill callback against a fresh world view and create whatever it
/// spawned.
#[allow(clippy::too_many_arguments)]
fn notify(
    state: &mut GameState,
    bridge: &mut ScriptBridge,
    ctx: &mut ScriptContext<'_>,
    arena: &ArenaConfig,
    owner: EntityId,
    fallback_origin: Vec2,
    tick: u64,
    events: &mut Vec<GameEvent>,
    call: impl FnOnce(&mut ScriptBridge, &mut ScriptContext<'_>),
) {
    if !bridge.has_script() {
        return;
    }
    ctx.refresh(Rc::new(ScriptWorld::capture(state, arena)));
    call(bridge, ctx);
    let requests = ctx.take_spawned();
    if !requests.is_empty() {
        let origin = state.entity(owner).map(|e| e.position).unwrap_or(fallback_origin);
        spawn_requested(state, requests, owner, origin, None, tick, events);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::params::ProjectileParams;
    use crate::script::{ScriptError, WeaponScript};
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Calls {
        hits: Vec<EntityId>,
        kills: Vec<EntityId>,
    }

    struct Recorder(Rc<RefCell<Calls>>);

    impl WeaponScript for Recorder {
        fn on_hit(&mut self, _ctx: &mut ScriptContext<'_>, target: EntityId) -> Result<(), ScriptError> {
            self.0.borrow_mut().hits.push(target);
            Ok(())
        }

        fn on_kill(&mut self, ctx: &mut ScriptContext<'_>, target: EntityId) -> Result<(), ScriptError> {
            self.0.borrow_mut().kills.push(target);
            ctx.spawn_projectile(ProjectileParams {
                speed: Some(0.0),
                ..Default::default()
            });
            Ok(())
        }
    }

    struct Harness {
        state: GameState,
        arena: ArenaConfig,
        rng: DeterministicRng,
        bridge: ScriptBridge,
        calls: Rc<RefCell<Calls>>,
        me: EntityId,
    }

    impl Harness {
        /// Player at the center, enemies at the given points.
        fn new(enemies: &[Vec2]) -> Self {
            let arena = ArenaConfig::default();
            let mut rng = DeterministicRng::new(11);
            let mut state = GameState::new();
            state.reset(&arena, &mut rng);
            state.entities.retain(|e| e.is_player());
            for p in enemies {
                state.spawn_enemy(*p, &arena);
            }
            let calls = Rc::new(RefCell::new(Calls::default()));
            let bridge = ScriptBridge::new(Box::new(Recorder(Rc::clone(&calls))));
            let me = state.local_player.unwrap();
            Self { state, arena, rng, bridge, calls, me }
        }

        fn fire(&mut self, params: serde_json::Value) -> EntityId {
            let origin = self.state.entity(self.me).unwrap().position;
            let spec = ProjectileParams::from_value(&params).normalize(origin, None);
            self.state.spawn_projectile(&spec, self.me)
        }

        fn resolve(&mut self) -> Vec<GameEvent> {
            let mut events = Vec::new();
            let world = Rc::new(ScriptWorld::capture(&self.state, &self.arena));
            let mut ctx = ScriptContext::new(world, &mut self.rng, 0.0);
            resolve_collisions(&mut self.state, &mut self.bridge, &mut ctx, &self.arena, 0, &mut events);
            events
        }

        fn enemy(&self, index: usize) -> &crate::game::state::Entity {
            self.state.enemies().nth(index).unwrap()
        }
    }

    #[test]
    fn test_kill_respawns_and_scores() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
        let enemy_id = h.enemy(0).id;
        let shot = h.fire(json!({ "x": 600, "y": 300, "damage": 50, "pierce": 1, "speed": 0 }));
        let before = h.state.projectiles.len();

        h.resolve();

        let enemy = h.enemy(0);
        assert_eq!(enemy.hp, 50.0);
        assert_eq!(enemy.velocity, Vec2::ZERO);
        assert!(enemy.position.x >= 50.0 && enemy.position.x <= 750.0);
        assert!(enemy.position.y >= 50.0 && enemy.position.y <= 550.0);
        assert_eq!(h.state.score, 1);
        assert_eq!(h.calls.borrow().kills, vec![enemy_id]);
        assert_eq!(h.calls.borrow().hits, vec![enemy_id]);
        assert!(h.state.projectile(shot).is_none());
        // on_kill spawned one projectile; the shot itself is gone
        assert_eq!(h.state.projectiles.len(), before);

        let board = h.state.leaderboard.as_ref().unwrap();
        assert_eq!(board[0].kills, 1);
    }

    #[test]
    fn test_vampirism_heals_owner() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
        h.state.entity_mut(h.me).unwrap().hp = 50.0;
        h.fire(json!({ "x": 600, "y": 300, "damage": 20, "vampirism": 50 }));
        h.resolve();
        assert_eq!(h.state.entity(h.me).unwrap().hp, 60.0);
    }

    #[test]
    fn test_vampirism_clamped() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
        h.state.entity_mut(h.me).unwrap().hp = 95.0;
        h.fire(json!({ "x": 600, "y": 300, "damage": 20, "vampirism": 50 }));
        h.resolve();
        assert_eq!(h.state.entity(h.me).unwrap().hp, 100.0);
    }

    #[test]
    fn test_knockback_pushes_away() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
        h.fire(json!({ "x": 590, "y": 300, "damage": 1, "knockback": 100 }));
        h.resolve();
        let v = h.enemy(0).velocity;
        assert!((v.x - 100.0).abs() < 1e-3);
        assert!(v.y.abs() < 1e-3);
    }

    #[test]
    fn test_pierce_hits_stacked_enemies_same_tick() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0), Vec2::new(605.0, 300.0)]);
        let shot = h.fire(json!({ "x": 602, "y": 300, "damage": 1, "pierce": 3 }));
        h.resolve();
        assert_eq!(h.calls.borrow().hits.len(), 2);
        let ps = h.state.projectile(shot).unwrap().projectile().unwrap();
        assert_eq!(ps.pierce, 1);
    }

    #[test]
    fn test_chain_redirects_without_consuming_pierce() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0), Vec2::new(600.0, 400.0)]);
        let second = h.enemy(1).id;
        let shot = h.fire(json!({ "x": 600, "y": 300, "vx": 300, "vy": 0, "damage": 1, "chain_range": 150 }));
        let events = h.resolve();

        let p = h.state.projectile(shot).unwrap();
        let ps = p.projectile().unwrap();
        assert_eq!(ps.pierce, 1);
        assert!(p.velocity.x.abs() < 1e-3);
        assert!((p.velocity.y - 300.0).abs() < 1e-3);
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::ProjectileChained { to, .. } if to == second)));
    }

    #[test]
    fn test_chain_without_target_falls_back_to_pierce() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0), Vec2::new(100.0, 100.0)]);
        let shot = h.fire(json!({ "x": 600, "y": 300, "damage": 1, "chain_range": 50 }));
        h.resolve();
        assert!(h.state.projectile(shot).is_none());
    }

    #[test]
    fn test_no_immediate_rehit() {
        let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
        h.fire(json!({ "x": 600, "y": 300, "damage": 1, "pierce": 5, "speed": 0 }));
        h.resolve();
        h.resolve();
        assert_eq!(h.calls.borrow().hits.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_pierce_destroyed_on_nth_hit(n in 1u32..8) {
            let mut h = Harness::new(&[Vec2::new(600.0, 300.0), Vec2::new(100.0, 100.0)]);
            let shot = h.fire(json!({ "x": 600, "y": 300, "damage": 1, "pierce": n, "speed": 0 }));

            for hit in 1..=n {
                // Alternate enemies so last_hit never blocks the next hit
                let target = h.enemy(((hit - 1) % 2) as usize).position;
                h.state.projectiles.iter_mut().find(|p| p.id == shot).unwrap().position = target;
                h.resolve();
                let alive = h.state.projectile(shot).is_some();
                prop_assert_eq!(alive, hit < n);
            }
        }

        #[test]
        fn prop_hp_never_exceeds_max(start in 0.0f32..100.0, damage in 0.0f32..500.0, vamp in 0.0f32..100.0) {
            let mut h = Harness::new(&[Vec2::new(600.0, 300.0)]);
            h.state.entity_mut(h.me).unwrap().hp = start;
            h.fire(json!({ "x": 600, "y": 300, "damage": damage, "vampirism": vamp }));
            h.resolve();
            for e in &h.state.entities {
                prop_assert!(e.hp <= e.max_hp);
                prop_assert!(e.hp >= 0.0);
            }
        }
    }
}
