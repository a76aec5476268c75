//! Simulation Configuration
//!
//! Every field has a default so a partial JSON file only overrides what it
//! names.

use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Arena geometry and starting layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Arena width in world units.
    pub width: f32,
    /// Arena height in world units.
    pub height: f32,
    /// Distance from the walls inside which enemies respawn.
    pub respawn_margin: f32,
    /// Enemies created by `reset()` (at least one is always created).
    pub enemy_count: u32,
    /// Enemy max hp.
    pub enemy_max_hp: f32,
    /// Enemy collision radius.
    pub enemy_radius: f32,
    /// Player max hp.
    pub player_max_hp: f32,
    /// Player collision radius.
    pub player_radius: f32,
    /// Player movement speed (units/s) for full-deflection input.
    pub player_speed: f32,
    /// Fraction of enemy velocity lost per second (exponential).
    pub enemy_damping: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            respawn_margin: 50.0,
            enemy_count: 3,
            enemy_max_hp: 50.0,
            enemy_radius: 15.0,
            player_max_hp: 100.0,
            player_radius: 15.0,
            player_speed: 200.0,
            enemy_damping: 4.0,
        }
    }
}

impl ArenaConfig {
    /// Arena size as a vector.
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Arena center.
    pub fn center(&self) -> Vec2 {
        self.size().scale(0.5)
    }

    /// Clamp a circle of `radius` inside the walls.
    pub fn clamp_inside(&self, position: Vec2, radius: f32) -> Vec2 {
        let r = radius.min(self.width * 0.5).min(self.height * 0.5);
        position.clamp(Vec2::new(r, r), Vec2::new(self.width - r, self.height - r))
    }

    /// Rectangle `(min, max)` that respawns are drawn from.
    pub fn respawn_rect(&self) -> (Vec2, Vec2) {
        let m = self
            .respawn_margin
            .min(self.width * 0.5)
            .min(self.height * 0.5);
        (Vec2::new(m, m), Vec2::new(self.width - m, self.height - m))
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Arena layout.
    pub arena: ArenaConfig,
    /// Scheduler tick rate (Hz).
    pub tick_rate: u32,
    /// Rendering lag applied to remote entities (seconds).
    pub interpolation_offset: f64,
    /// Snapshots retained for interpolation.
    pub snapshot_capacity: usize,
    /// Distance past the walls at which a projectile is discarded.
    pub out_of_bounds_margin: f32,
    /// Same, for projectiles with `bounciness > 0`.
    pub bounce_out_of_bounds_margin: f32,
    /// RNG seed; a random one is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            tick_rate: crate::TICK_RATE,
            interpolation_offset: 0.1,
            snapshot_capacity: 20,
            out_of_bounds_margin: 100.0,
            bounce_out_of_bounds_margin: 400.0,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Fixed timestep derived from the tick rate.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Parse from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for `SimConfig`.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "tick_rate": 30, "arena": { "enemy_count": 5 } }"#).unwrap();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.arena.enemy_count, 5);
        assert_eq!(config.arena.width, 800.0);
        assert_eq!(config.snapshot_capacity, 20);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = SimConfig::from_json("{ tick_rate: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_respawn_rect() {
        let arena = ArenaConfig::default();
        let (min, max) = arena.respawn_rect();
        assert_eq!(min, Vec2::new(50.0, 50.0));
        assert_eq!(max, Vec2::new(750.0, 550.0));
    }

    #[test]
    fn test_clamp_inside_respects_radius() {
        let arena = ArenaConfig::default();
        let p = arena.clamp_inside(Vec2::new(-40.0, 900.0), 10.0);
        assert_eq!(p, Vec2::new(10.0, 590.0));
    }
}
