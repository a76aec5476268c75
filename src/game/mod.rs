//! Game Logic Module
//!
//! ## Module Structure
//!
//! - `state`: Entity Store (players, enemies, projectiles)
//! - `params`: Projectile parameter records and normalization
//! - `behavior`: Projectile Behavior Engine
//! - `collision`: Collision Resolver
//! - `input`: Queued movement/fire inputs
//! - `events`: Per-tick event log
//! - `tick`: Local simulation tick
//! - `simulation`: Room handle and scheduler

pub mod behavior;
pub mod collision;
pub mod events;
pub mod input;
pub mod params;
pub mod simulation;
pub mod state;
pub mod tick;

// Re-export key types
pub use events::{GameEvent, GameEventData};
pub use input::{InputHandle, PlayerInput};
pub use params::{ProjectileParams, ProjectileSpec};
pub use simulation::{RoomMode, Simulation, SimulationError};
pub use state::{Entity, EntityId, EntityKind, GameState};
pub use tick::TickResult;
