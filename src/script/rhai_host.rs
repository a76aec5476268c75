//! Rhai Weapon Scripts
//!
//! Loads a weapon script from Rhai source. The script defines any subset of
//! `init()`, `update(dt)`, `on_fire(tx, ty, mx, my)`, `on_hit(id)` and
//! `on_kill(id)`; missing ones are skipped. Host functions give it the query
//! surface plus `spawn_projectile(map)`.
//!
//! Host functions read from a shared slot that is filled from the
//! [`ScriptContext`] right before each call and drained right after.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use rhai::{Array, CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST, FLOAT, INT};
use serde_json::Value;
use tracing::{debug, info};

use super::{ScriptContext, ScriptError, ScriptWorld, WeaponScript};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use crate::game::events::Callback;
use crate::game::params::ProjectileParams;
use crate::game::state::{Entity, EntityId};

/// Operations allowed per callback before the script is cut off.
pub const MAX_OPERATIONS: u64 = 200_000;
/// Maximum function call depth.
pub const MAX_CALL_LEVELS: usize = 32;
/// Maximum expression nesting, at top level and inside functions.
pub const MAX_EXPR_DEPTH: usize = 64;

#[derive(Default)]
struct HostState {
    world: Rc<ScriptWorld>,
    rng: DeterministicRng,
    time: f64,
    spawned: Vec<ProjectileParams>,
}

/// A weapon script compiled from Rhai source.
pub struct RhaiWeapon {
    name: String,
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    shared: Rc<RefCell<HostState>>,
}

impl RhaiWeapon {
    /// Compile `source` and run its top-level statements.
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self, ScriptError> {
        let name = name.into();
        let shared = Rc::new(RefCell::new(HostState::default()));

        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.set_max_string_size(64 * 1024);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);
        let label = name.clone();
        engine.on_print(move |text| info!(script = %label, "{text}"));
        register_api(&mut engine, &shared);

        let ast = engine
            .compile(source)
            .map_err(|err| ScriptError::Load(format!("{name}: {err}")))?;
        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|err| ScriptError::Load(format!("{name}: {err}")))?;

        debug!(script = %name, "Weapon script compiled");
        Ok(Self {
            name,
            engine,
            ast,
            scope,
            shared,
        })
    }

    /// Read and compile a script file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_source(path.display().to_string(), &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call a callback with the context mirrored into the host slot.
    fn call(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        callback: Callback,
        args: impl FuncArgs,
    ) -> Result<Dynamic, ScriptError> {
        {
            let mut host = self.shared.borrow_mut();
            host.world = ctx.world_handle();
            host.rng = ctx.rng().clone();
            host.time = ctx.time();
            host.spawned.clear();
        }

        // Top-level statements ran once in `from_source`
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.scope,
            &self.ast,
            callback.name(),
            args,
        );

        let (rng, spawned) = {
            let mut host = self.shared.borrow_mut();
            (host.rng.clone(), std::mem::take(&mut host.spawned))
        };
        *ctx.rng_mut() = rng;
        for params in spawned {
            ctx.spawn_projectile(params);
        }

        match result {
            Ok(value) => Ok(value),
            Err(err) => match err.as_ref() {
                EvalAltResult::ErrorFunctionNotFound(signature, _)
                    if signature.split_whitespace().next() == Some(callback.name()) =>
                {
                    Ok(Dynamic::UNIT)
                }
                _ => Err(ScriptError::Runtime {
                    callback: callback.name(),
                    message: err.to_string(),
                }),
            },
        }
    }
}

impl WeaponScript for RhaiWeapon {
    fn init(&mut self, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        self.call(ctx, Callback::Init, ()).map(drop)
    }

    fn update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) -> Result<(), ScriptError> {
        self.call(ctx, Callback::Update, (dt as FLOAT,)).map(drop)
    }

    fn on_fire(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        target: Vec2,
        origin: Vec2,
    ) -> Result<Option<ProjectileParams>, ScriptError> {
        let args = (
            target.x as FLOAT,
            target.y as FLOAT,
            origin.x as FLOAT,
            origin.y as FLOAT,
        );
        let value = self.call(ctx, Callback::OnFire, args)?;
        if value.is_unit() {
            return Ok(None);
        }
        Ok(Some(ProjectileParams::from_value(&dynamic_to_json(&value))))
    }

    fn on_hit(&mut self, ctx: &mut ScriptContext<'_>, target: EntityId) -> Result<(), ScriptError> {
        self.call(ctx, Callback::OnHit, (target.0 as INT,)).map(drop)
    }

    fn on_kill(&mut self, ctx: &mut ScriptContext<'_>, target: EntityId) -> Result<(), ScriptError> {
        self.call(ctx, Callback::OnKill, (target.0 as INT,)).map(drop)
    }
}

// =============================================================================
// HOST API
// =============================================================================

fn register_api(engine: &mut Engine, shared: &Rc<RefCell<HostState>>) {
    let host = Rc::clone(shared);
    engine.register_fn("get_enemies", move || -> Array {
        host.borrow().world.enemies().map(entity_to_dynamic).collect()
    });

    let host = Rc::clone(shared);
    engine.register_fn("get_projectiles", move || -> Array {
        host.borrow().world.projectiles.iter().map(entity_to_dynamic).collect()
    });

    let host = Rc::clone(shared);
    engine.register_fn(
        "get_entities_in_range",
        move |x: Dynamic, y: Dynamic, radius: Dynamic| -> Array {
            let (Some(x), Some(y), Some(r)) = (number(&x), number(&y), number(&radius)) else {
                return Array::new();
            };
            let host = host.borrow();
            let found: Array = host
                .world
                .entities_in_range(Vec2::new(x, y), r)
                .into_iter()
                .map(entity_to_dynamic)
                .collect();
            found
        },
    );

    let host = Rc::clone(shared);
    engine.register_fn("get_nearest_enemy", move |x: Dynamic, y: Dynamic| -> Dynamic {
        let (Some(x), Some(y)) = (number(&x), number(&y)) else {
            return Dynamic::UNIT;
        };
        host.borrow()
            .world
            .nearest_enemy(Vec2::new(x, y))
            .map(entity_to_dynamic)
            .unwrap_or(Dynamic::UNIT)
    });

    let host = Rc::clone(shared);
    engine.register_fn("get_player", move || -> Dynamic {
        host.borrow()
            .world
            .local_player()
            .map(entity_to_dynamic)
            .unwrap_or(Dynamic::UNIT)
    });

    let host = Rc::clone(shared);
    engine.register_fn("get_arena_size", move || -> Map {
        let size = host.borrow().world.arena_size;
        let mut map = Map::new();
        map.insert("width".into(), Dynamic::from(size.x as FLOAT));
        map.insert("height".into(), Dynamic::from(size.y as FLOAT));
        map
    });

    let host = Rc::clone(shared);
    engine.register_fn("spawn_projectile", move |params: Dynamic| {
        if params.is_map() {
            let params = ProjectileParams::from_value(&dynamic_to_json(&params));
            host.borrow_mut().spawned.push(params);
        }
    });

    let host = Rc::clone(shared);
    engine.register_fn("get_time", move || -> FLOAT { host.borrow().time });

    let host = Rc::clone(shared);
    engine.register_fn("rand_float", move || -> FLOAT {
        host.borrow_mut().rng.next_f32() as FLOAT
    });

    let host = Rc::clone(shared);
    engine.register_fn("rand_float", move |min: Dynamic, max: Dynamic| -> FLOAT {
        let (min, max) = (number(&min).unwrap_or(0.0), number(&max).unwrap_or(1.0));
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        host.borrow_mut().rng.next_range(lo, hi) as FLOAT
    });

    engine.register_fn("log", |message: &str| info!(target: "weapon_script", "{message}"));
}

/// Int or float argument as `f32`.
fn number(value: &Dynamic) -> Option<f32> {
    let n = value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|i| i as FLOAT))?;
    let n = n as f32;
    n.is_finite().then_some(n)
}

fn entity_to_dynamic(entity: &Entity) -> Dynamic {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from(entity.id.0 as INT));
    map.insert("x".into(), Dynamic::from(entity.position.x as FLOAT));
    map.insert("y".into(), Dynamic::from(entity.position.y as FLOAT));
    map.insert("vx".into(), Dynamic::from(entity.velocity.x as FLOAT));
    map.insert("vy".into(), Dynamic::from(entity.velocity.y as FLOAT));
    map.insert("radius".into(), Dynamic::from(entity.radius as FLOAT));
    map.insert("hp".into(), Dynamic::from(entity.hp as FLOAT));
    map.insert("max_hp".into(), Dynamic::from(entity.max_hp as FLOAT));
    if let Some(p) = entity.projectile() {
        map.insert("owner".into(), Dynamic::from(p.owner().0 as INT));
        map.insert("damage".into(), Dynamic::from(p.damage as FLOAT));
        map.insert("lifetime".into(), Dynamic::from(p.lifetime as FLOAT));
    }
    Dynamic::from_map(map)
}

/// Convert a script value to JSON. Unsupported types become `null`.
fn dynamic_to_json(value: &Dynamic) -> Value {
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if value.is_string() {
        return value.clone().into_string().map_or(Value::Null, Value::String);
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        return Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        );
    }
    if let Some(items) = value.clone().try_cast::<Array>() {
        return Value::Array(items.iter().map(dynamic_to_json).collect());
    }
    Value::Null
}
