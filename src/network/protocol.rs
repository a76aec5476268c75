//! Protocol Messages
//!
//! JSON wire format between a networked room and its authoritative server.
//! Message tags keep the server's spelling (`playerJoined`, `visual_effect`);
//! payload fields are camelCase.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::vec2::Vec2;
use crate::game::params::ProjectileParams;
use crate::game::state::{
    Entity, EntityId, EntityKind, LeaderboardEntry, PlayerStats, ProjectileState,
};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from the room to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Local player velocity changed.
    #[serde(rename = "move")]
    Move { vx: f32, vy: f32 },

    /// Local player fired; normalized params including velocity.
    #[serde(rename = "fire")]
    Fire(ProjectileParams),
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Assigns the local player and the starting state.
    #[serde(rename = "init")]
    Init {
        #[serde(rename = "playerId")]
        player_id: EntityId,
        snapshot: WireSnapshot,
    },

    /// Periodic authoritative state.
    #[serde(rename = "state")]
    State { snapshot: WireSnapshot },

    #[serde(rename = "playerJoined")]
    PlayerJoined { count: u32 },

    #[serde(rename = "playerLeft")]
    PlayerLeft { count: u32 },

    /// An enemy died server-side.
    #[serde(rename = "kill")]
    Kill {
        #[serde(rename = "enemyId")]
        enemy_id: EntityId,
    },

    /// Cosmetic effect; passed through untouched.
    #[serde(rename = "visual_effect")]
    VisualEffect(Value),
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SNAPSHOT PAYLOAD
// =============================================================================

fn default_radius() -> f32 {
    15.0
}

fn default_projectile_radius() -> f32 {
    crate::game::params::DEFAULT_RADIUS
}

fn default_hp() -> f32 {
    100.0
}

/// Player as the server reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlayer {
    /// Falls back to the map key when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default = "default_hp")]
    pub hp: f32,
    #[serde(default = "default_hp")]
    pub max_hp: f32,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Enemy as the server reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnemy {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default = "default_hp")]
    pub hp: f32,
    #[serde(default = "default_hp")]
    pub max_hp: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Projectile as the server reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProjectile {
    pub id: EntityId,
    #[serde(alias = "owner")]
    pub owner_id: EntityId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    #[serde(default = "default_projectile_radius")]
    pub radius: f32,
    #[serde(default)]
    pub damage: f32,
    #[serde(default)]
    pub lifetime: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Full authoritative state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSnapshot {
    #[serde(default)]
    pub players: BTreeMap<String, WirePlayer>,
    #[serde(default)]
    pub enemies: Vec<WireEnemy>,
    #[serde(default)]
    pub projectiles: Vec<WireProjectile>,
    #[serde(default)]
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    #[serde(default)]
    pub game_over: bool,
}

impl WireSnapshot {
    /// Players and enemies as entities. Players whose id can't be resolved
    /// are skipped.
    pub fn entities(&self) -> Vec<Entity> {
        let players = self.players.iter().filter_map(|(key, p)| {
            let id = p.id.or_else(|| key.parse().ok().map(EntityId))?;
            Some(Entity {
                id,
                position: Vec2::new(p.x, p.y),
                velocity: Vec2::new(p.vx, p.vy),
                radius: p.radius,
                color: p.color.clone().unwrap_or_else(|| "#4aa3ff".to_string()),
                hp: p.hp.min(p.max_hp).max(0.0),
                max_hp: p.max_hp,
                kind: EntityKind::Player(PlayerStats {
                    kills: p.kills,
                    deaths: p.deaths,
                }),
            })
        });

        let enemies = self.enemies.iter().map(|e| Entity {
            id: e.id,
            position: Vec2::new(e.x, e.y),
            velocity: Vec2::new(e.vx, e.vy),
            radius: e.radius,
            color: e.color.clone().unwrap_or_else(|| "#ff5a5a".to_string()),
            hp: e.hp.min(e.max_hp).max(0.0),
            max_hp: e.max_hp,
            kind: EntityKind::Enemy,
        });

        players.chain(enemies).collect()
    }

    /// Projectiles as entities.
    pub fn projectile_entities(&self) -> Vec<Entity> {
        self.projectiles
            .iter()
            .map(|p| Entity {
                id: p.id,
                position: Vec2::new(p.x, p.y),
                velocity: Vec2::new(p.vx, p.vy),
                radius: p.radius,
                color: p.color.clone().unwrap_or_else(|| crate::game::params::DEFAULT_COLOR.to_string()),
                hp: 1.0,
                max_hp: 1.0,
                kind: EntityKind::Projectile(ProjectileState::remote(p.owner_id, p.damage, p.lifetime)),
            })
            .collect()
    }
}
