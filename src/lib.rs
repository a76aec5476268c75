//! # Arena Sim
//!
//! Simulation core for a scriptable 2D arena shooter: players fire
//! projectiles whose behavior is defined by sandboxed weapon scripts, enemies
//! respawn on death, and multiplayer rooms reconcile against an
//! authoritative server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ARENA SIM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Numeric primitives                        │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Simulation                                │
//! │  ├── state.rs    - Entity Store                              │
//! │  ├── params.rs   - Projectile parameter normalization        │
//! │  ├── behavior.rs - Projectile Behavior Engine                │
//! │  ├── collision.rs- Collision Resolver                        │
//! │  ├── input.rs    - Queued player inputs                      │
//! │  ├── tick.rs     - Local simulation tick                     │
//! │  └── simulation.rs - Room handle and scheduler               │
//! │                                                              │
//! │  script/         - Script Bridge                             │
//! │  └── rhai_host.rs- Rhai weapon scripts                       │
//! │                                                              │
//! │  network/        - Network Reconciliation Layer              │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── snapshot.rs - Snapshot ring and interpolation           │
//! │  ├── reconcile.rs- Snapshot/prediction merge                 │
//! │  └── link.rs     - Queued transport boundary                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Discipline
//!
//! Each room has exactly one writer, its tick:
//! - Inputs and network messages are queued and applied at tick start
//! - Script callbacks run synchronously inside the tick
//! - A faulting script never aborts the tick
//! - The subscriber sees one state copy per tick

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod script;

// Re-export commonly used types
pub use config::{ArenaConfig, ConfigError, SimConfig};
pub use core::rng::DeterministicRng;
pub use core::vec2::Vec2;
pub use game::simulation::{Simulation, SimulationError};
pub use game::state::{Entity, EntityId, GameState};
pub use script::{RhaiWeapon, ScriptBridge, WeaponScript};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
