//! Projectile Behavior Engine
//!
//! Per-tick kinematics for every projectile:
//!
//! 1. Orbit (if active): circle the owner; skips step 2
//! 2. Free flight: acceleration, spin, homing, integrate, wall bounce
//! 3. Area attraction on nearby enemies (always)
//! 4. Lifetime; expiry may split into fragments
//! 5. Out-of-bounds removal

use std::f32::consts::TAU;

use crate::config::{ArenaConfig, SimConfig};
use crate::core::vec2::{wrap_angle, Vec2};
use crate::game::events::{GameEvent, GameEventData, RemovalCause};
use crate::game::params::ProjectileSpec;
use crate::game::state::{nearest_enemy, Entity, EntityId, GameState, ProjectileState};

#[cfg(feature = "debug-tracing")]
use tracing::debug;

/// Homing turn rate per unit of homing strength (radians/s).
pub const HOMING_TURN_RATE: f32 = 5.0;
/// Enemies within this distance feel attraction.
pub const ATTRACTION_RANGE: f32 = 200.0;
/// Distance floor for the attraction falloff.
pub const ATTRACTION_MIN_DISTANCE: f32 = 20.0;
/// Attraction force scale.
pub const ATTRACTION_SCALE: f32 = 10_000.0;
/// Fragment launch speed.
pub const FRAGMENT_SPEED: f32 = 200.0;
/// Fragment lifetime in seconds.
pub const FRAGMENT_LIFETIME: f32 = 1.0;
/// Smallest fragment radius.
pub const FRAGMENT_MIN_RADIUS: f32 = 2.0;

/// Result of stepping one projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Alive,
    Expired,
    OutOfBounds,
}

/// Margins past the arena walls before a projectile is discarded.
#[derive(Debug, Clone, Copy)]
pub struct Bounds<'a> {
    pub arena: &'a ArenaConfig,
    pub margin: f32,
    pub bounce_margin: f32,
}

impl<'a> Bounds<'a> {
    pub fn from_config(config: &'a SimConfig) -> Self {
        Self {
            arena: &config.arena,
            margin: config.out_of_bounds_margin,
            bounce_margin: config.bounce_out_of_bounds_margin,
        }
    }

    fn contains(&self, position: Vec2, bouncing: bool) -> bool {
        let m = if bouncing { self.bounce_margin } else { self.margin };
        position.x >= -m
            && position.x <= self.arena.width + m
            && position.y >= -m
            && position.y <= self.arena.height + m
    }
}

// =============================================================================
// WHOLE-STATE UPDATE
// =============================================================================

/// Step every projectile in `state`, removing the dead and spawning
/// fragments. Fragments are not stepped until the next tick.
pub fn update_projectiles(
    state: &mut GameState,
    dt: f32,
    config: &SimConfig,
    tick: u64,
    events: &mut Vec<GameEvent>,
) {
    let bounds = Bounds::from_config(config);
    let mut fragments: Vec<(ProjectileSpec, EntityId)> = Vec::new();

    let GameState { entities, projectiles, .. } = state;
    projectiles.retain_mut(|projectile| {
        let outcome = step_projectile(projectile, entities, dt, &bounds);
        match outcome {
            StepOutcome::Alive => true,
            StepOutcome::Expired => {
                #[cfg(feature = "debug-tracing")]
                debug!(id = projectile.id.0, tick, "Projectile expired");
                if let Some(ps) = projectile.projectile() {
                    let specs = fragment_specs(projectile, ps);
                    if !specs.is_empty() {
                        events.push(GameEvent::new(
                            tick,
                            GameEventData::ProjectileSplit {
                                id: projectile.id,
                                fragments: specs.len() as u32,
                            },
                        ));
                        #[cfg(feature = "debug-tracing")]
                        debug!(id = projectile.id.0, fragments = specs.len(), "Projectile split");
                        let owner = ps.owner();
                        fragments.extend(specs.into_iter().map(|s| (s, owner)));
                    }
                }
                events.push(GameEvent::projectile_removed(tick, projectile.id, RemovalCause::Expired));
                false
            }
            StepOutcome::OutOfBounds => {
                #[cfg(feature = "debug-tracing")]
                debug!(id = projectile.id.0, x = projectile.position.x, y = projectile.position.y, "Projectile left the arena");
                events.push(GameEvent::projectile_removed(tick, projectile.id, RemovalCause::OutOfBounds));
                false
            }
        }
    });

    for (spec, owner) in fragments {
        let id = state.spawn_projectile(&spec, owner);
        events.push(GameEvent::projectile_spawned(tick, id, owner, spec.position));
    }
}

// =============================================================================
// SINGLE PROJECTILE
// =============================================================================

/// Step one projectile against the current players/enemies.
///
/// `entities` is mutable only for area attraction.
pub fn step_projectile(
    projectile: &mut Entity,
    entities: &mut [Entity],
    dt: f32,
    bounds: &Bounds<'_>,
) -> StepOutcome {
    let Some(ps) = projectile.projectile().cloned() else {
        return StepOutcome::OutOfBounds;
    };

    let owner_position = entities
        .iter()
        .find(|e| e.id == ps.owner())
        .map(|e| e.position);

    let mut next = ps;
    if owner_position.is_none() {
        // Owner gone: orbiters fall back to free flight from here on
        next.orbit = None;
    }

    match (next.orbit, owner_position) {
        (Some(mut orbit), Some(center)) => {
            orbit.angle = wrap_angle(orbit.angle + orbit.angular_speed * dt);
            let dir = Vec2::from_angle(orbit.angle);
            projectile.position = center + dir.scale(orbit.radius);
            projectile.velocity = dir.perpendicular().scale(orbit.radius * orbit.angular_speed);
            next.orbit = Some(orbit);
        }
        _ => free_flight(projectile, &next, entities, dt, bounds.arena),
    }

    if next.attraction_force > 0.0 {
        attract(projectile.position, next.attraction_force, entities, dt);
    }

    next.lifetime -= dt;
    let expired = next.lifetime <= 0.0;
    let bouncing = next.bounciness > 0.0;
    if let Some(slot) = projectile.projectile_mut() {
        *slot = next;
    }

    if expired {
        StepOutcome::Expired
    } else if !bounds.contains(projectile.position, bouncing) {
        StepOutcome::OutOfBounds
    } else {
        StepOutcome::Alive
    }
}

fn free_flight(
    projectile: &mut Entity,
    ps: &ProjectileState,
    entities: &[Entity],
    dt: f32,
    arena: &ArenaConfig,
) {
    let mut velocity = projectile.velocity;

    if ps.acceleration != 0.0 {
        velocity = velocity.scale((1.0 + ps.acceleration * dt).max(0.0));
    }

    if ps.spin != 0.0 {
        velocity = velocity.rotate((ps.spin * dt).to_radians());
    }

    if ps.homing > 0.0 && velocity.length_squared() > f32::EPSILON {
        if let Some(target) = nearest_enemy(entities, projectile.position, None, None) {
            velocity = steer_towards(velocity, target.position - projectile.position, ps.homing * HOMING_TURN_RATE * dt);
        }
    }

    projectile.position += velocity.scale(dt);

    if ps.bounciness > 0.0 {
        bounce(&mut projectile.position, &mut velocity, projectile.radius, ps.bounciness, arena);
    }

    projectile.velocity = velocity;
}

/// Rotate `velocity` toward `to_target` by at most `max_turn` radians.
pub fn steer_towards(velocity: Vec2, to_target: Vec2, max_turn: f32) -> Vec2 {
    if to_target.length_squared() <= f32::EPSILON {
        return velocity;
    }
    let diff = wrap_angle(to_target.angle() - velocity.angle());
    velocity.rotate(diff.clamp(-max_turn, max_turn))
}

/// Reflect off the arena walls, scaling the reflected component.
fn bounce(position: &mut Vec2, velocity: &mut Vec2, radius: f32, bounciness: f32, arena: &ArenaConfig) {
    if position.x - radius < 0.0 {
        position.x = radius;
        velocity.x = velocity.x.abs() * bounciness;
    } else if position.x + radius > arena.width {
        position.x = arena.width - radius;
        velocity.x = -velocity.x.abs() * bounciness;
    }

    if position.y - radius < 0.0 {
        position.y = radius;
        velocity.y = velocity.y.abs() * bounciness;
    } else if position.y + radius > arena.height {
        position.y = arena.height - radius;
        velocity.y = -velocity.y.abs() * bounciness;
    }
}

/// Pull enemies toward `center` with inverse-square falloff.
fn attract(center: Vec2, force: f32, entities: &mut [Entity], dt: f32) {
    let range2 = ATTRACTION_RANGE * ATTRACTION_RANGE;
    for enemy in entities.iter_mut().filter(|e| e.is_enemy()) {
        let offset = center - enemy.position;
        let d2 = offset.length_squared();
        if d2 > range2 {
            continue;
        }
        let dist = d2.sqrt().max(ATTRACTION_MIN_DISTANCE);
        let accel = force * ATTRACTION_SCALE / (dist * dist);
        enemy.velocity += offset.normalize().scale(accel * dt);
    }
}

/// Fragments for an expiring projectile, evenly fanned out.
fn fragment_specs(parent: &Entity, ps: &ProjectileState) -> Vec<ProjectileSpec> {
    let n = ps.split_on_death;
    (0..n)
        .map(|i| {
            let angle = i as f32 * TAU / n as f32;
            ProjectileSpec {
                position: parent.position,
                velocity: Vec2::from_angle(angle).scale(FRAGMENT_SPEED),
                radius: (parent.radius * 0.5).max(FRAGMENT_MIN_RADIUS),
                damage: ps.damage * 0.5,
                pierce: 1,
                lifetime: FRAGMENT_LIFETIME,
                knockback: 0.0,
                homing: 0.0,
                acceleration: 0.0,
                orbit: None,
                vampirism: 0.0,
                split_on_death: 0,
                attraction_force: 0.0,
                bounciness: 0.0,
                spin: 0.0,
                chain_range: 0.0,
                color: parent.color.clone(),
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::params::ProjectileParams;
    use proptest::prelude::*;
    use serde_json::json;

    /// State with the local player at the center and no enemies.
    fn empty_arena() -> (GameState, SimConfig, EntityId) {
        let config = SimConfig::default();
        let mut state = GameState::new();
        state.reset(&config.arena, &mut DeterministicRng::new(1));
        state.entities.retain(|e| e.is_player());
        let me = state.local_player.unwrap();
        (state, config, me)
    }

    fn fire(state: &mut GameState, owner: EntityId, params: serde_json::Value) -> EntityId {
        let origin = state.entity(owner).unwrap().position;
        let spec = ProjectileParams::from_value(&params).normalize(origin, None);
        state.spawn_projectile(&spec, owner)
    }

    #[test]
    fn test_straight_flight_one_second() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "speed": 300, "angle": 0 }));
        let mut events = Vec::new();
        update_projectiles(&mut state, 1.0, &config, 0, &mut events);

        let p = state.projectile(id).unwrap();
        assert!((p.position.x - 700.0).abs() < 1e-3);
        assert!((p.position.y - 300.0).abs() < 1e-3);
        assert!(events.is_empty());
    }

    #[test]
    fn test_lifetime_expiry_and_split() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "speed": 0, "lifetime": 0.05, "split_on_death": 4, "damage": 10 }));
        let mut events = Vec::new();
        for tick in 0..4 {
            update_projectiles(&mut state, 1.0 / 60.0, &config, tick, &mut events);
        }
        assert!(state.projectile(id).is_none());
        assert_eq!(state.projectiles.len(), 4);
        for frag in &state.projectiles {
            let ps = frag.projectile().unwrap();
            assert_eq!(ps.split_on_death, 0);
            assert_eq!(ps.damage, 5.0);
            assert!((frag.velocity.length() - FRAGMENT_SPEED).abs() < 1e-2);
        }
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::ProjectileSplit { fragments: 4, .. })));
    }

    #[test]
    fn test_out_of_bounds_removed() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "x": 880, "y": 300, "vx": 1000, "vy": 0 }));
        let mut events = Vec::new();
        update_projectiles(&mut state, 0.1, &config, 0, &mut events);
        assert!(state.projectile(id).is_none());
        assert!(matches!(
            events[0].data,
            GameEventData::ProjectileRemoved { cause: RemovalCause::OutOfBounds, .. }
        ));
    }

    #[test]
    fn test_bouncing_shot_survives_past_wall() {
        let (mut state, config, me) = empty_arena();
        let plain = fire(&mut state, me, json!({ "x": 950, "y": 300, "vx": 0, "vy": 0 }));
        let bouncy = fire(&mut state, me, json!({ "x": 950, "y": 300, "vx": 0, "vy": 0, "bounciness": 0.5 }));
        update_projectiles(&mut state, 1.0 / 60.0, &config, 0, &mut Vec::new());

        assert!(state.projectile(plain).is_none());
        let p = state.projectile(bouncy).unwrap();
        assert!(p.position.x <= config.arena.width);
    }

    #[test]
    fn test_bouncing_orbiter_uses_wide_margin() {
        let (mut state, config, me) = empty_arena();
        state.entity_mut(me).unwrap().position = Vec2::new(790.0, 300.0);
        let orbit = json!({ "radius": 250, "speed": 0.01, "angle": 0 });
        let plain = fire(&mut state, me, json!({ "orbit": orbit.clone(), "lifetime": 10 }));
        let bouncy = fire(&mut state, me, json!({ "orbit": orbit, "lifetime": 10, "bounciness": 0.5 }));
        update_projectiles(&mut state, 1.0 / 60.0, &config, 0, &mut Vec::new());

        assert!(state.projectile(plain).is_none());
        let p = state.projectile(bouncy).unwrap();
        assert!(p.position.x > config.arena.width + config.out_of_bounds_margin);
    }

    #[test]
    fn test_bounds_margins() {
        let config = SimConfig::default();
        let bounds = Bounds::from_config(&config);
        let past_wall = Vec2::new(config.arena.width + 150.0, 300.0);
        assert!(!bounds.contains(past_wall, false));
        assert!(bounds.contains(past_wall, true));
        assert!(!bounds.contains(Vec2::new(-450.0, 300.0), true));
    }

    #[test]
    fn test_bounce_reflects_and_scales() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "x": 790, "y": 300, "vx": 600, "vy": 0, "bounciness": 0.5 }));
        let mut events = Vec::new();
        update_projectiles(&mut state, 0.1, &config, 0, &mut events);
        let p = state.projectile(id).unwrap();
        assert_eq!(p.position.x, 800.0 - p.radius);
        assert_eq!(p.velocity.x, -300.0);
    }

    #[test]
    fn test_acceleration_scales_speed() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "speed": 100, "angle": 0, "acceleration": 1.0 }));
        update_projectiles(&mut state, 0.5, &config, 0, &mut Vec::new());
        let p = state.projectile(id).unwrap();
        assert!((p.velocity.x - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_spin_rotates_velocity() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "speed": 100, "angle": 0, "spin": 90 }));
        update_projectiles(&mut state, 1.0, &config, 0, &mut Vec::new());
        let v = state.projectile(id).unwrap().velocity;
        assert!(v.x.abs() < 1e-3);
        assert!((v.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_attraction_pulls_enemy() {
        let (mut state, config, me) = empty_arena();
        let enemy = state.spawn_enemy(Vec2::new(500.0, 300.0), &config.arena);
        fire(&mut state, me, json!({ "speed": 0, "attraction_force": 1.0 }));
        update_projectiles(&mut state, 0.1, &config, 0, &mut Vec::new());
        let v = state.entity(enemy).unwrap().velocity;
        assert!(v.x < 0.0);
        assert!(v.y.abs() < 1e-4);
    }

    #[test]
    fn test_orbit_without_owner_flies_free() {
        let (mut state, config, me) = empty_arena();
        let id = fire(&mut state, me, json!({ "orbit": true, "speed": 100, "angle": 0 }));
        state.entities.clear();
        update_projectiles(&mut state, 0.1, &config, 0, &mut Vec::new());
        let ps = state.projectile(id).unwrap().projectile().unwrap();
        assert!(ps.orbit.is_none());
    }

    proptest! {
        #[test]
        fn prop_homing_turn_bounded(
            heading in -3.1f32..3.1,
            ex in 50.0f32..750.0,
            ey in 50.0f32..550.0,
            homing in 0.1f32..5.0,
        ) {
            let (mut state, config, me) = empty_arena();
            state.spawn_enemy(Vec2::new(ex, ey), &config.arena);
            let speed = 200.0;
            let id = fire(&mut state, me, json!({
                "vx": speed * heading.cos(),
                "vy": speed * heading.sin(),
                "homing": homing,
            }));
            let dt = 1.0 / 60.0;
            let before = state.projectile(id).unwrap().velocity;
            update_projectiles(&mut state, dt, &config, 0, &mut Vec::new());
            let after = state.projectile(id).unwrap().velocity;

            let turned = wrap_angle(after.angle() - before.angle()).abs();
            prop_assert!(turned <= homing * HOMING_TURN_RATE * dt + 1e-4);
            prop_assert!((after.length() - speed).abs() < 1e-2);
        }

        #[test]
        fn prop_orbit_radius_held(radius in 10.0f32..150.0, speed in -8.0f32..8.0, ticks in 1usize..120) {
            let (mut state, config, me) = empty_arena();
            let id = fire(&mut state, me, json!({ "orbit": { "radius": radius, "speed": speed }, "lifetime": 100 }));
            for tick in 0..ticks {
                update_projectiles(&mut state, 1.0 / 60.0, &config, tick as u64, &mut Vec::new());
            }
            let center = state.entity(me).unwrap().position;
            let p = state.projectile(id).unwrap();
            prop_assert!((p.position.distance(center) - radius).abs() < 1e-2);
        }
    }
}
