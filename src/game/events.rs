//! Game Events
//!
//! Things that happened during a tick. Collected into `TickResult` and
//! logged; never read back by the simulation.

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::vec2::Vec2;
use crate::game::state::EntityId;

/// Which script callback a fault came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callback {
    Init,
    Update,
    OnFire,
    OnHit,
    OnKill,
}

impl Callback {
    /// Callback name as scripts define it.
    pub fn name(self) -> &'static str {
        match self {
            Callback::Init => "init",
            Callback::Update => "update",
            Callback::OnFire => "on_fire",
            Callback::OnHit => "on_hit",
            Callback::OnKill => "on_kill",
        }
    }
}

/// Why a projectile left the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalCause {
    Expired,
    OutOfBounds,
    Collision,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEventData {
    /// A projectile entered the world
    ProjectileSpawned {
        id: EntityId,
        owner: EntityId,
        position: Vec2,
    },

    /// A projectile was removed
    ProjectileRemoved {
        id: EntityId,
        cause: RemovalCause,
    },

    /// An expiring projectile split into fragments
    ProjectileSplit {
        id: EntityId,
        fragments: u32,
    },

    /// A projectile struck an enemy
    EnemyHit {
        projectile: EntityId,
        enemy: EntityId,
        damage: f32,
    },

    /// A projectile jumped to another enemy
    ProjectileChained {
        projectile: EntityId,
        from: EntityId,
        to: EntityId,
    },

    /// An enemy reached zero hp and respawned
    EnemyKilled {
        enemy: EntityId,
        killer: EntityId,
        respawn: Vec2,
    },

    /// Server reported a kill
    RemoteKill {
        enemy: EntityId,
    },

    /// Connected-player count changed
    PlayerCountChanged {
        count: u32,
    },

    /// Server asked for a cosmetic effect
    VisualEffect {
        payload: Value,
    },

    /// A script callback failed and was skipped
    ScriptFault {
        callback: Callback,
        message: String,
    },
}

/// A game event stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    pub fn projectile_spawned(tick: u64, id: EntityId, owner: EntityId, position: Vec2) -> Self {
        Self::new(tick, GameEventData::ProjectileSpawned { id, owner, position })
    }

    pub fn projectile_removed(tick: u64, id: EntityId, cause: RemovalCause) -> Self {
        Self::new(tick, GameEventData::ProjectileRemoved { id, cause })
    }

    pub fn enemy_hit(tick: u64, projectile: EntityId, enemy: EntityId, damage: f32) -> Self {
        Self::new(tick, GameEventData::EnemyHit { projectile, enemy, damage })
    }

    pub fn enemy_killed(tick: u64, enemy: EntityId, killer: EntityId, respawn: Vec2) -> Self {
        Self::new(tick, GameEventData::EnemyKilled { enemy, killer, respawn })
    }

    pub fn script_fault(tick: u64, callback: Callback, message: impl Into<String>) -> Self {
        Self::new(
            tick,
            GameEventData::ScriptFault {
                callback,
                message: message.into(),
            },
        )
    }

    /// Entity this event is mostly about, for log correlation.
    pub fn subject(&self) -> Option<EntityId> {
        match &self.data {
            GameEventData::ProjectileSpawned { id, .. }
            | GameEventData::ProjectileRemoved { id, .. }
            | GameEventData::ProjectileSplit { id, .. } => Some(*id),
            GameEventData::EnemyHit { enemy, .. }
            | GameEventData::EnemyKilled { enemy, .. }
            | GameEventData::RemoteKill { enemy } => Some(*enemy),
            GameEventData::ProjectileChained { projectile, .. } => Some(*projectile),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_subject() {
        let e = GameEvent::enemy_killed(3, EntityId(7), EntityId(1), Vec2::ZERO);
        assert_eq!(e.subject(), Some(EntityId(7)));
        assert_eq!(e.tick, 3);

        let fault = GameEvent::script_fault(1, Callback::OnHit, "boom");
        assert_eq!(fault.subject(), None);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let e = GameEvent::projectile_removed(9, EntityId(4), RemovalCause::OutOfBounds);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["data"]["event"], "projectile_removed");
        assert_eq!(json["data"]["cause"], "out_of_bounds");
    }
}
