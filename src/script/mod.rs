//! Script Bridge
//!
//! Weapon behavior lives in untrusted scripts. This module defines the
//! callback contract ([`WeaponScript`]), the read-mostly view scripts query
//! ([`ScriptWorld`]), the per-call context ([`ScriptContext`]) and the
//! fault-isolating wrapper the tick talks to ([`ScriptBridge`]).
//!
//! A failing callback never escapes the bridge: the error (or panic) is
//! logged, counted, and the call is treated as a no-op, including discarding
//! any projectiles it asked to spawn.

pub mod rhai_host;

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::warn;

use crate::config::ArenaConfig;
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::events::Callback;
use crate::game::params::ProjectileParams;
use crate::game::state::{self, Entity, EntityId, GameState};

pub use rhai_host::RhaiWeapon;

/// Script failures.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script could not be read from disk
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),

    /// Source failed to parse or its top level failed to run
    #[error("Script failed to load: {0}")]
    Load(String),

    /// A callback raised an error
    #[error("Script error in {callback}: {message}")]
    Runtime {
        callback: &'static str,
        message: String,
    },

    /// A native script panicked
    #[error("Script panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// WORLD VIEW
// =============================================================================

/// Read-only copy of the Entity Store handed to scripts.
#[derive(Debug, Clone, Default)]
pub struct ScriptWorld {
    /// Players and enemies.
    pub entities: Vec<Entity>,
    pub projectiles: Vec<Entity>,
    pub arena_size: Vec2,
    pub local_player: Option<EntityId>,
}

impl ScriptWorld {
    /// Copy the current state.
    pub fn capture(state: &GameState, arena: &ArenaConfig) -> Self {
        Self {
            entities: state.entities.clone(),
            projectiles: state.projectiles.clone(),
            arena_size: arena.size(),
            local_player: state.local_player,
        }
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_enemy())
    }

    pub fn nearest_enemy(&self, point: Vec2) -> Option<&Entity> {
        state::nearest_enemy(&self.entities, point, None, None)
    }

    pub fn entities_in_range(&self, point: Vec2, radius: f32) -> Vec<&Entity> {
        state::entities_in_range(&self.entities, point, radius)
    }

    pub fn local_player(&self) -> Option<&Entity> {
        let id = self.local_player?;
        self.entities.iter().find(|e| e.id == id)
    }
}

// =============================================================================
// CALL CONTEXT
// =============================================================================

/// What a callback can see and do during one call.
pub struct ScriptContext<'a> {
    world: Rc<ScriptWorld>,
    rng: &'a mut DeterministicRng,
    time: f64,
    spawned: Vec<ProjectileParams>,
}

impl<'a> ScriptContext<'a> {
    pub fn new(world: Rc<ScriptWorld>, rng: &'a mut DeterministicRng, time: f64) -> Self {
        Self {
            world,
            rng,
            time,
            spawned: Vec::new(),
        }
    }

    pub fn world(&self) -> &ScriptWorld {
        &self.world
    }

    /// Shared handle to the world view.
    pub fn world_handle(&self) -> Rc<ScriptWorld> {
        Rc::clone(&self.world)
    }

    /// Replace the world view (after the tick mutated the store).
    pub fn refresh(&mut self, world: Rc<ScriptWorld>) {
        self.world = world;
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Uniform float in `[0, 1)` from the room's RNG.
    pub fn rand_float(&mut self) -> f32 {
        self.rng.next_f32()
    }

    pub fn rng(&self) -> &DeterministicRng {
        self.rng
    }

    pub fn rng_mut(&mut self) -> &mut DeterministicRng {
        self.rng
    }

    /// Queue a projectile. It is created as soon as the callback returns.
    pub fn spawn_projectile(&mut self, params: ProjectileParams) {
        self.spawned.push(params);
    }

    /// Take the queued spawns.
    pub fn take_spawned(&mut self) -> Vec<ProjectileParams> {
        std::mem::take(&mut self.spawned)
    }
}

// =============================================================================
// CALLBACK CONTRACT
// =============================================================================

/// Weapon script callbacks. Every method defaults to a no-op.
pub trait WeaponScript {
    /// Called once after load.
    fn init(&mut self, _ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Called once per tick before physics.
    fn update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Called on a fire input. `None` means "don't fire".
    fn on_fire(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _target: Vec2,
        _origin: Vec2,
    ) -> Result<Option<ProjectileParams>, ScriptError> {
        Ok(None)
    }

    fn on_hit(&mut self, _ctx: &mut ScriptContext<'_>, _target: EntityId) -> Result<(), ScriptError> {
        Ok(())
    }

    fn on_kill(&mut self, _ctx: &mut ScriptContext<'_>, _target: EntityId) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// A caught script failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFault {
    pub callback: Callback,
    pub message: String,
}

/// Fault-isolating wrapper around an optional weapon script.
#[derive(Default)]
pub struct ScriptBridge {
    script: Option<Box<dyn WeaponScript>>,
    fault_count: u64,
    pending_faults: Vec<ScriptFault>,
}

impl ScriptBridge {
    pub fn new(script: Box<dyn WeaponScript>) -> Self {
        Self {
            script: Some(script),
            ..Self::default()
        }
    }

    /// Swap in a new script. Call `init` afterwards.
    pub fn replace(&mut self, script: Box<dyn WeaponScript>) {
        self.script = Some(script);
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    /// Total faults caught since creation.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    /// Faults caught since the last call.
    pub fn take_faults(&mut self) -> Vec<ScriptFault> {
        std::mem::take(&mut self.pending_faults)
    }

    pub fn init(&mut self, ctx: &mut ScriptContext<'_>) {
        self.invoke(Callback::Init, ctx, |s, ctx| s.init(ctx));
    }

    pub fn update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) {
        self.invoke(Callback::Update, ctx, |s, ctx| s.update(ctx, dt));
    }

    pub fn on_fire(&mut self, ctx: &mut ScriptContext<'_>, target: Vec2, origin: Vec2) -> Option<ProjectileParams> {
        self.invoke(Callback::OnFire, ctx, |s, ctx| s.on_fire(ctx, target, origin))
    }

    pub fn on_hit(&mut self, ctx: &mut ScriptContext<'_>, target: EntityId) {
        self.invoke(Callback::OnHit, ctx, |s, ctx| s.on_hit(ctx, target));
    }

    pub fn on_kill(&mut self, ctx: &mut ScriptContext<'_>, target: EntityId) {
        self.invoke(Callback::OnKill, ctx, |s, ctx| s.on_kill(ctx, target));
    }

    fn invoke<T: Default>(
        &mut self,
        callback: Callback,
        ctx: &mut ScriptContext<'_>,
        call: impl FnOnce(&mut dyn WeaponScript, &mut ScriptContext<'_>) -> Result<T, ScriptError>,
    ) -> T {
        let Some(script) = self.script.as_mut() else {
            return T::default();
        };

        let queued = ctx.spawned.len();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(script.as_mut(), ctx)))
            .unwrap_or_else(|payload| Err(ScriptError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(value) => value,
            Err(err) => {
                ctx.spawned.truncate(queued);
                self.fault_count += 1;
                warn!(callback = callback.name(), error = %err, "Weapon script fault");
                self.pending_faults.push(ScriptFault {
                    callback,
                    message: err.to_string(),
                });
                T::default()
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Faulty;

    impl WeaponScript for Faulty {
        fn update(&mut self, ctx: &mut ScriptContext<'_>, _dt: f32) -> Result<(), ScriptError> {
            ctx.spawn_projectile(ProjectileParams::default());
            Err(ScriptError::Runtime {
                callback: "update",
                message: "nope".into(),
            })
        }

        fn on_fire(
            &mut self,
            _ctx: &mut ScriptContext<'_>,
            _target: Vec2,
            _origin: Vec2,
        ) -> Result<Option<ProjectileParams>, ScriptError> {
            panic!("script blew up");
        }
    }

    struct Spawner;

    impl WeaponScript for Spawner {
        fn on_hit(&mut self, ctx: &mut ScriptContext<'_>, _target: EntityId) -> Result<(), ScriptError> {
            ctx.spawn_projectile(ProjectileParams {
                damage: Some(3.0),
                ..Default::default()
            });
            Ok(())
        }
    }

    fn ctx(rng: &mut DeterministicRng) -> ScriptContext<'_> {
        ScriptContext::new(Rc::new(ScriptWorld::default()), rng, 0.0)
    }

    #[test]
    fn test_error_is_swallowed_and_spawns_discarded() {
        let mut rng = DeterministicRng::new(1);
        let mut ctx = ctx(&mut rng);
        let mut bridge = ScriptBridge::new(Box::new(Faulty));

        bridge.update(&mut ctx, 0.016);
        assert!(ctx.take_spawned().is_empty());
        assert_eq!(bridge.fault_count(), 1);

        let faults = bridge.take_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].callback, Callback::Update);
        assert!(bridge.take_faults().is_empty());
    }

    #[test]
    fn test_panic_is_caught() {
        let mut rng = DeterministicRng::new(1);
        let mut ctx = ctx(&mut rng);
        let mut bridge = ScriptBridge::new(Box::new(Faulty));

        let fired = bridge.on_fire(&mut ctx, Vec2::ZERO, Vec2::ZERO);
        assert!(fired.is_none());
        assert_eq!(bridge.fault_count(), 1);
        assert!(bridge.take_faults()[0].message.contains("blew up"));
    }

    #[test]
    fn test_missing_callbacks_are_noops() {
        let mut rng = DeterministicRng::new(1);
        let mut ctx = ctx(&mut rng);
        let mut bridge = ScriptBridge::new(Box::new(Spawner));

        bridge.init(&mut ctx);
        bridge.on_kill(&mut ctx, EntityId(2));
        assert!(bridge.on_fire(&mut ctx, Vec2::ZERO, Vec2::ZERO).is_none());
        assert_eq!(bridge.fault_count(), 0);
    }

    #[test]
    fn test_spawn_buffered_until_taken() {
        let mut rng = DeterministicRng::new(1);
        let mut ctx = ctx(&mut rng);
        let mut bridge = ScriptBridge::new(Box::new(Spawner));

        bridge.on_hit(&mut ctx, EntityId(2));
        let spawned = ctx.take_spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].damage, Some(3.0));
    }

    #[test]
    fn test_empty_bridge() {
        let mut rng = DeterministicRng::new(1);
        let mut ctx = ctx(&mut rng);
        let mut bridge = ScriptBridge::default();
        assert!(!bridge.has_script());
        assert!(bridge.on_fire(&mut ctx, Vec2::ZERO, Vec2::ZERO).is_none());
    }
}
