//! Entity Store
//!
//! Players, enemies and projectiles for one arena, plus score and the
//! leaderboard. Owned by exactly one simulation room and mutated only from
//! its tick.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::config::ArenaConfig;
use crate::core::rng::DeterministicRng;
use crate::core::vec2::Vec2;
use super::params::ProjectileSpec;

/// Ids at or above this value are reserved for client-predicted projectiles.
pub const PREDICTED_ID_BASE: u32 = 1 << 30;

/// Entity identifier, unique within a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// Per-player counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
}

/// Orbit state: the projectile circles its owner instead of flying free.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitMode {
    /// Current angle around the owner (radians).
    pub angle: f32,
    /// Radians per second.
    pub angular_speed: f32,
    pub radius: f32,
}

/// Behavior parameters carried by a projectile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    owner: EntityId,
    pub damage: f32,
    pub knockback: f32,
    /// Remaining hits before the projectile is destroyed.
    pub pierce: u32,
    pub homing: f32,
    /// Seconds left to live.
    pub lifetime: f32,
    pub max_lifetime: f32,
    pub acceleration: f32,
    /// Degrees per second.
    pub spin: f32,
    pub bounciness: f32,
    pub chain_range: f32,
    pub attraction_force: f32,
    pub vampirism: f32,
    pub split_on_death: u32,
    pub orbit: Option<OrbitMode>,
    /// Last enemy struck; a chained projectile never re-hits it immediately.
    pub last_hit: Option<EntityId>,
}

impl ProjectileState {
    /// Inert state for a projectile known only from a server snapshot.
    pub fn remote(owner: EntityId, damage: f32, lifetime: f32) -> Self {
        Self {
            owner,
            damage,
            knockback: 0.0,
            pierce: 1,
            homing: 0.0,
            lifetime,
            max_lifetime: lifetime,
            acceleration: 0.0,
            spin: 0.0,
            bounciness: 0.0,
            chain_range: 0.0,
            attraction_force: 0.0,
            vampirism: 0.0,
            split_on_death: 0,
            orbit: None,
            last_hit: None,
        }
    }

    /// Owner of this projectile. Fixed at creation.
    pub fn owner(&self) -> EntityId {
        self.owner
    }
}

/// What an entity is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    Player(PlayerStats),
    Enemy,
    Projectile(ProjectileState),
}

/// A circle in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub color: String,
    pub hp: f32,
    pub max_hp: f32,
    pub kind: EntityKind,
}

impl Entity {
    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    pub fn is_enemy(&self) -> bool {
        matches!(self.kind, EntityKind::Enemy)
    }

    pub fn projectile(&self) -> Option<&ProjectileState> {
        match &self.kind {
            EntityKind::Projectile(p) => Some(p),
            _ => None,
        }
    }

    pub fn projectile_mut(&mut self) -> Option<&mut ProjectileState> {
        match &mut self.kind {
            EntityKind::Projectile(p) => Some(p),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&PlayerStats> {
        match &self.kind {
            EntityKind::Player(s) => Some(s),
            _ => None,
        }
    }

    pub fn stats_mut(&mut self) -> Option<&mut PlayerStats> {
        match &mut self.kind {
            EntityKind::Player(s) => Some(s),
            _ => None,
        }
    }

    /// Subtract damage, flooring hp at zero. Returns true if this brought hp
    /// to zero.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        let was_alive = self.hp > 0.0;
        self.hp = (self.hp - amount.max(0.0)).max(0.0);
        was_alive && self.hp <= 0.0
    }

    /// Heal, capped at `max_hp`.
    pub fn heal(&mut self, amount: f32) {
        self.hp = (self.hp + amount.max(0.0)).min(self.max_hp);
    }

    /// Circle overlap: `distance < r1 + r2`.
    #[inline]
    pub fn overlaps(&self, other: &Entity) -> bool {
        circles_overlap(self.position, self.radius, other.position, other.radius)
    }
}

/// Strict circle overlap test.
#[inline]
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let r = ra + rb;
    a.distance_squared(b) < r * r
}

// =============================================================================
// QUERIES
// =============================================================================
//
// Free functions over slices so the script world view can share them.

/// Nearest enemy to `point`, skipping `exclude`, optionally within `max_range`.
pub fn nearest_enemy<'a>(
    entities: &'a [Entity],
    point: Vec2,
    exclude: Option<EntityId>,
    max_range: Option<f32>,
) -> Option<&'a Entity> {
    entities
        .iter()
        .filter(|e| e.is_enemy() && Some(e.id) != exclude)
        .map(|e| (e, e.position.distance_squared(point)))
        .filter(|(_, d2)| max_range.map_or(true, |r| *d2 <= r * r))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(e, _)| e)
}

/// Entities whose centers lie within `radius` of `point`.
pub fn entities_in_range(entities: &[Entity], point: Vec2, radius: f32) -> Vec<&Entity> {
    let r2 = radius * radius;
    entities
        .iter()
        .filter(|e| e.position.distance_squared(point) <= r2)
        .collect()
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Leaderboard row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: EntityId,
    pub kills: u32,
    pub deaths: u32,
}

/// Everything a frame needs to draw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Players and enemies.
    pub entities: Vec<Entity>,
    pub projectiles: Vec<Entity>,
    pub score: u32,
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    pub game_over: bool,
    /// The player this room controls.
    pub local_player: Option<EntityId>,
    #[serde(skip)]
    next_id: u32,
}

impl GameState {
    /// Empty state.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuild the starting layout: one player at the center, one enemy at
    /// three quarters of the width, the rest at random respawn points.
    pub fn reset(&mut self, arena: &ArenaConfig, rng: &mut DeterministicRng) {
        *self = Self::new();

        let player_id = self.allocate_id();
        self.entities.push(Entity {
            id: player_id,
            position: arena.center(),
            velocity: Vec2::ZERO,
            radius: arena.player_radius,
            color: "#4aa3ff".to_string(),
            hp: arena.player_max_hp,
            max_hp: arena.player_max_hp,
            kind: EntityKind::Player(PlayerStats::default()),
        });
        self.local_player = Some(player_id);

        let (min, max) = arena.respawn_rect();
        for i in 0..arena.enemy_count.max(1) {
            let position = if i == 0 {
                Vec2::new(arena.width * 0.75, arena.height * 0.5)
            } else {
                rng.random_point(min, max)
            };
            self.spawn_enemy(position, arena);
        }
    }

    /// Next free id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Move the id allocator to `base` if it is behind it.
    pub fn reserve_ids_from(&mut self, base: u32) {
        self.next_id = self.next_id.max(base);
    }

    /// Add an enemy at full hp.
    pub fn spawn_enemy(&mut self, position: Vec2, arena: &ArenaConfig) -> EntityId {
        let id = self.allocate_id();
        self.entities.push(Entity {
            id,
            position,
            velocity: Vec2::ZERO,
            radius: arena.enemy_radius,
            color: "#ff5a5a".to_string(),
            hp: arena.enemy_max_hp,
            max_hp: arena.enemy_max_hp,
            kind: EntityKind::Enemy,
        });
        id
    }

    /// Create a projectile from a normalized spec.
    ///
    /// In orbit mode the starting angle comes from `spec.orbit`, or else from the
    /// offset between owner and spawn point, or else the velocity heading; the
    /// projectile is then placed on its circle.
    pub fn spawn_projectile(&mut self, spec: &ProjectileSpec, owner: EntityId) -> EntityId {
        let id = self.allocate_id();
        let owner_pos = self.entity(owner).map(|e| e.position);

        let mut position = spec.position;
        let orbit = match (spec.orbit, owner_pos) {
            (Some(o), Some(center)) => {
                let offset = spec.position - center;
                let angle = o.start_angle.unwrap_or_else(|| {
                    if offset.length_squared() > f32::EPSILON {
                        offset.angle()
                    } else {
                        spec.velocity.angle()
                    }
                });
                position = center + Vec2::from_angle(angle).scale(o.radius);
                Some(OrbitMode {
                    angle,
                    angular_speed: o.angular_speed,
                    radius: o.radius,
                })
            }
            _ => None,
        };

        self.projectiles.push(Entity {
            id,
            position,
            velocity: spec.velocity,
            radius: spec.radius,
            color: spec.color.clone(),
            hp: 1.0,
            max_hp: 1.0,
            kind: EntityKind::Projectile(ProjectileState {
                owner,
                damage: spec.damage,
                knockback: spec.knockback,
                pierce: spec.pierce,
                homing: spec.homing,
                lifetime: spec.lifetime,
                max_lifetime: spec.lifetime,
                acceleration: spec.acceleration,
                spin: spec.spin,
                bounciness: spec.bounciness,
                chain_range: spec.chain_range,
                attraction_force: spec.attraction_force,
                vampirism: spec.vampirism,
                split_on_death: spec.split_on_death,
                orbit,
                last_hit: None,
            }),
        });
        id
    }

    /// Player or enemy by id.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Entity> {
        self.projectiles.iter().find(|e| e.id == id)
    }

    pub fn local_player(&self) -> Option<&Entity> {
        self.local_player.and_then(|id| self.entity(id))
    }

    pub fn local_player_mut(&mut self) -> Option<&mut Entity> {
        let id = self.local_player?;
        self.entity_mut(id)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_enemy())
    }

    pub fn nearest_enemy(&self, point: Vec2, exclude: Option<EntityId>) -> Option<&Entity> {
        nearest_enemy(&self.entities, point, exclude, None)
    }

    pub fn entities_in_range(&self, point: Vec2, radius: f32) -> Vec<&Entity> {
        entities_in_range(&self.entities, point, radius)
    }

    /// Put an enemy back at a random point with full hp and no velocity.
    pub fn respawn_enemy(&mut self, id: EntityId, arena: &ArenaConfig, rng: &mut DeterministicRng) {
        let (min, max) = arena.respawn_rect();
        if let Some(enemy) = self.entity_mut(id) {
            enemy.position = rng.random_point(min, max);
            enemy.velocity = Vec2::ZERO;
            enemy.hp = enemy.max_hp;
        }
    }

    /// Credit a kill to `killer` and refresh the leaderboard.
    pub fn record_kill(&mut self, killer: EntityId) {
        if let Some(stats) = self.entity_mut(killer).and_then(Entity::stats_mut) {
            stats.kills += 1;
        }
        self.rebuild_leaderboard();
    }

    /// Leaderboard sorted by kills, then fewest deaths, then id.
    pub fn rebuild_leaderboard(&mut self) {
        let mut rows: Vec<LeaderboardEntry> = self
            .entities
            .iter()
            .filter_map(|e| {
                e.stats().map(|s| LeaderboardEntry {
                    id: e.id,
                    kills: s.kills,
                    deaths: s.deaths,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.kills
                .cmp(&a.kills)
                .then(a.deaths.cmp(&b.deaths))
                .then(a.id.cmp(&b.id))
        });
        self.leaderboard = Some(rows);
    }

}

// =============================================================================
// TESTS
// =============================================================================
