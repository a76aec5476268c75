//! Simulation Room
//!
//! One arena. Owns the Entity Store, the weapon script, the RNG, the input
//! queue and the publisher; any number of rooms can exist side by side.
//!
//! A room is either `Local` (full physics and collisions) or `Networked`
//! (local player and own projectiles simulated, everything else reconciled
//! from server snapshots). All mutation happens inside `step`.

use std::rc::Rc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, info_span, Span};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::core::rng::DeterministicRng;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::{input_channel, InputHandle, InputQueue};
use crate::game::state::GameState;
use crate::game::tick::{spawn_requested, tick, TickEnv, TickResult};
use crate::network::link::NetworkLink;
use crate::network::protocol::ClientMessage;
use crate::network::reconcile::{networked_tick, Reconciler};
use crate::script::{RhaiWeapon, ScriptBridge, ScriptContext, ScriptError, ScriptWorld, WeaponScript};

/// Errors building or configuring a room.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Failed to load weapon script: {0}")]
    Script(#[from] ScriptError),
}

/// Per-tick state subscriber.
pub type Publisher = Box<dyn FnMut(GameState)>;

/// How non-local entities are driven.
pub enum RoomMode {
    /// Single-player: the room is authoritative.
    Local,
    /// Server-authoritative: snapshots drive everything but the local player.
    Networked {
        link: NetworkLink,
        reconciler: Reconciler,
    },
}

/// A simulation room.
pub struct Simulation {
    id: Uuid,
    span: Span,
    config: SimConfig,
    state: GameState,
    bridge: ScriptBridge,
    rng: DeterministicRng,
    inputs: InputQueue,
    handle: InputHandle,
    mode: RoomMode,
    tick: u64,
    time: f64,
    publisher: Option<Publisher>,
}

impl Simulation {
    /// Local room with the starting layout and no weapon script.
    pub fn new(config: SimConfig) -> Self {
        let mut sim = Self::build(config, RoomMode::Local);
        sim.state.reset(&sim.config.arena, &mut sim.rng);
        sim
    }

    /// Networked room. State stays empty until the server's `init` arrives.
    pub fn networked(config: SimConfig, link: NetworkLink) -> Self {
        let reconciler = Reconciler::new(&config);
        Self::build(config, RoomMode::Networked { link, reconciler })
    }

    fn build(config: SimConfig, mode: RoomMode) -> Self {
        let id = Uuid::new_v4();
        let seed = config.seed.unwrap_or_else(rand::random);
        let span = info_span!("room", id = %id);
        let (handle, inputs) = input_channel();

        info!(
            parent: &span,
            seed,
            networked = matches!(mode, RoomMode::Networked { .. }),
            "Room created"
        );

        Self {
            id,
            span,
            config,
            state: GameState::new(),
            bridge: ScriptBridge::default(),
            rng: DeterministicRng::new(seed),
            inputs,
            handle,
            mode,
            tick: 0,
            time: 0.0,
            publisher: None,
        }
    }

    // =========================================================================
    // SCRIPTS
    // =========================================================================

    /// Install a weapon script and run its `init`.
    pub fn load_script(&mut self, script: Box<dyn WeaponScript>) {
        self.bridge.replace(script);
        self.init_script();
    }

    /// Compile and install a Rhai weapon script.
    pub fn load_rhai(&mut self, name: &str, source: &str) -> Result<(), SimulationError> {
        let weapon = RhaiWeapon::from_source(name, source)?;
        info!(parent: &self.span, script = name, "Weapon script loaded");
        self.load_script(Box::new(weapon));
        Ok(())
    }

    fn init_script(&mut self) {
        let world = Rc::new(ScriptWorld::capture(&self.state, &self.config.arena));
        let mut ctx = ScriptContext::new(world, &mut self.rng, self.time);
        self.bridge.init(&mut ctx);
        let requests = ctx.take_spawned();

        let Some((owner, origin)) = self.state.local_player().map(|p| (p.id, p.position)) else {
            return;
        };
        let mut events = Vec::new();
        let fired = spawn_requested(&mut self.state, requests, owner, origin, None, self.tick, &mut events);
        if let RoomMode::Networked { link, .. } = &self.mode {
            for spec in &fired {
                link.send(ClientMessage::Fire(spec.to_params()));
            }
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulation clock in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    pub fn is_networked(&self) -> bool {
        matches!(self.mode, RoomMode::Networked { .. })
    }

    pub fn reconciler(&self) -> Option<&Reconciler> {
        match &self.mode {
            RoomMode::Networked { reconciler, .. } => Some(reconciler),
            RoomMode::Local => None,
        }
    }

    /// Sender for movement and fire inputs; applied at the next tick.
    pub fn input_handle(&self) -> InputHandle {
        self.handle.clone()
    }

    /// Register the state subscriber, replacing any previous one.
    pub fn subscribe(&mut self, publisher: impl FnMut(GameState) + 'static) {
        if self.publisher.is_some() {
            debug!(parent: &self.span, "Replacing state subscriber");
        }
        self.publisher = Some(Box::new(publisher));
    }

    pub fn unsubscribe(&mut self) {
        self.publisher = None;
    }

    /// Back to the starting layout. Local rooms only; a networked room's
    /// layout belongs to the server.
    pub fn reset(&mut self) {
        if self.is_networked() {
            return;
        }
        self.state.reset(&self.config.arena, &mut self.rng);
        info!(parent: &self.span, "Room reset");
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Run one tick: drain inputs, simulate, publish.
    pub fn step(&mut self) -> TickResult {
        let span = self.span.clone();
        let _guard = span.enter();

        let inputs = self.inputs.drain();
        let env = TickEnv {
            bridge: &mut self.bridge,
            rng: &mut self.rng,
            config: &self.config,
            tick: self.tick,
            time: self.time,
        };
        let result = match &mut self.mode {
            RoomMode::Local => tick(&mut self.state, &inputs, env),
            RoomMode::Networked { link, reconciler } => {
                networked_tick(&mut self.state, &inputs, env, reconciler, link)
            }
        };

        self.tick += 1;
        self.time += f64::from(self.config.tick_dt());

        log_events(&result.events);
        if let Some(publisher) = self.publisher.as_mut() {
            publisher(self.state.clone());
        }
        result
    }

    /// Drive ticks at the configured rate until `shutdown` fires (or its
    /// sender is dropped). A tick due at shutdown is discarded.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.config.tick_rate.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(parent: &self.span, tick_rate = self.config.tick_rate, "Scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    self.step();
                }
            }
        }
        info!(parent: &self.span, ticks = self.tick, "Scheduler stopped");
    }
}

fn log_events(events: &[GameEvent]) {
    for event in events {
        match &event.data {
            GameEventData::EnemyKilled { enemy, killer, .. } => {
                info!(tick = event.tick, enemy = %enemy, killer = %killer, "Enemy killed");
            }
            GameEventData::PlayerCountChanged { count } => {
                info!(tick = event.tick, count, "Player count changed");
            }
            // Already warned by the bridge
            GameEventData::ScriptFault { .. } => {}
            _ => debug!(tick = event.tick, event = ?event.data, "Game event"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
