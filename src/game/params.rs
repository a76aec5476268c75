//! Projectile Parameter Normalization
//!
//! Weapon scripts hand back loosely-shaped records. [`ProjectileParams`] is
//! the optional-field form; [`ProjectileParams::normalize`] turns it into a
//! fully populated [`ProjectileSpec`] with every hostile value replaced or
//! clamped. Nothing in here ever fails.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::core::vec2::Vec2;

/// Default projectile radius.
pub const DEFAULT_RADIUS: f32 = 5.0;
/// Default damage per hit.
pub const DEFAULT_DAMAGE: f32 = 10.0;
/// Default pierce count.
pub const DEFAULT_PIERCE: u32 = 1;
/// Default lifetime in seconds.
pub const DEFAULT_LIFETIME: f32 = 5.0;
/// Speed used when a record names neither a velocity nor a speed.
pub const DEFAULT_SPEED: f32 = 300.0;
/// Default orbit radius when orbit mode is requested without one.
pub const DEFAULT_ORBIT_RADIUS: f32 = 60.0;
/// Default orbit angular speed (radians per second).
pub const DEFAULT_ORBIT_SPEED: f32 = 3.0;
/// Upper bound on fragments spawned by one split.
pub const MAX_SPLIT_FRAGMENTS: u32 = 32;
/// Default display color.
pub const DEFAULT_COLOR: &str = "#ffcc00";

/// Orbit request as written by a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitParams {
    /// Orbit radius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    /// Angular speed in radians per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Starting angle in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
}

/// Projectile parameters with every field optional.
///
/// Velocity may be given directly (`vx`/`vy`) or as `speed` + `angle`
/// (degrees). Position defaults to the firing origin. Serialized field
/// names are camelCase to match the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectileParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    /// Heading in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pierce: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knockback: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homing: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbit: Option<OrbitParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vampirism: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_on_death: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attraction_force: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounciness: Option<f32>,
    /// Velocity rotation in degrees per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spin: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_range: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Look up the first of `names` present in `map`.
fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| map.get(*name))
}

/// Numeric field; wrong types read as absent.
fn number(map: &Map<String, Value>, names: &[&str]) -> Option<f32> {
    field(map, names).and_then(Value::as_f64).map(|v| v as f32)
}

impl ProjectileParams {
    /// Read a script return value leniently.
    ///
    /// Anything that is not an object yields all-default params; keys with
    /// the wrong type are ignored. Both `snake_case` and `camelCase` spellings
    /// are accepted.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let mut vx = number(map, &["vx"]);
        let mut vy = number(map, &["vy"]);
        if let Some(Value::Object(vel)) = field(map, &["velocity", "vel"]) {
            vx = vx.or_else(|| number(vel, &["x"]));
            vy = vy.or_else(|| number(vel, &["y"]));
        }

        Self {
            x: number(map, &["x"]),
            y: number(map, &["y"]),
            vx,
            vy,
            speed: number(map, &["speed"]),
            angle: number(map, &["angle"]),
            radius: number(map, &["radius", "size"]),
            damage: number(map, &["damage"]),
            pierce: number(map, &["pierce"]),
            lifetime: number(map, &["lifetime"]),
            knockback: number(map, &["knockback"]),
            homing: number(map, &["homing"]),
            acceleration: number(map, &["acceleration"]),
            orbit: orbit_from_value(map),
            vampirism: number(map, &["vampirism"]),
            split_on_death: number(map, &["split_on_death", "splitOnDeath"]),
            attraction_force: number(map, &["attraction_force", "attractionForce"]),
            bounciness: number(map, &["bounciness"]),
            spin: number(map, &["spin"]),
            chain_range: number(map, &["chain_range", "chainRange"]),
            color: field(map, &["color"]).and_then(Value::as_str).map(str::to_owned),
        }
    }

    /// Fill defaults and clamp hostile values.
    ///
    /// `origin` is where the shot starts when the record names no position;
    /// `target` is used to aim a record that only gives a speed.
    pub fn normalize(&self, origin: Vec2, target: Option<Vec2>) -> ProjectileSpec {
        let position = Vec2::new(
            finite_or(self.x, origin.x),
            finite_or(self.y, origin.y),
        );

        let has_direct_velocity = finite(self.vx).is_some() || finite(self.vy).is_some();
        let velocity = if has_direct_velocity {
            Vec2::new(finite_or(self.vx, 0.0), finite_or(self.vy, 0.0))
        } else {
            let speed = finite_or(self.speed, DEFAULT_SPEED);
            match finite(self.angle) {
                Some(degrees) => Vec2::from_polar_degrees(speed, degrees),
                None => {
                    let aim = target
                        .map(|t| t - origin)
                        .filter(|d| d.length_squared() > f32::EPSILON)
                        .map(Vec2::normalize)
                        .unwrap_or(Vec2::RIGHT);
                    aim.scale(speed)
                }
            }
        };

        let orbit = self.orbit.as_ref().map(|o| OrbitSpec {
            radius: positive_or(o.radius, DEFAULT_ORBIT_RADIUS),
            angular_speed: finite_or(o.speed, DEFAULT_ORBIT_SPEED),
            start_angle: finite(o.angle).map(f32::to_radians),
        });

        ProjectileSpec {
            position,
            velocity,
            radius: positive_or(self.radius, DEFAULT_RADIUS),
            damage: finite_or(self.damage, DEFAULT_DAMAGE).max(0.0),
            pierce: finite(self.pierce)
                .map(|p| p.round().max(0.0) as u32)
                .unwrap_or(DEFAULT_PIERCE),
            lifetime: positive_or(self.lifetime, DEFAULT_LIFETIME),
            knockback: finite_or(self.knockback, 0.0).max(0.0),
            homing: finite_or(self.homing, 0.0).max(0.0),
            acceleration: finite_or(self.acceleration, 0.0),
            orbit,
            vampirism: finite_or(self.vampirism, 0.0).clamp(0.0, 100.0),
            split_on_death: finite(self.split_on_death)
                .map(|n| (n.round().max(0.0) as u32).min(MAX_SPLIT_FRAGMENTS))
                .unwrap_or(0),
            attraction_force: finite_or(self.attraction_force, 0.0).max(0.0),
            bounciness: finite_or(self.bounciness, 0.0).clamp(0.0, 1.0),
            spin: finite_or(self.spin, 0.0),
            chain_range: finite_or(self.chain_range, 0.0).max(0.0),
            color: self.color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        }
    }
}

/// `orbit` may be `true`, a radius, or an object; `orbit_radius` /
/// `orbit_speed` at top level also switch it on.
fn orbit_from_value(map: &Map<String, Value>) -> Option<OrbitParams> {
    let top_radius = number(map, &["orbit_radius", "orbitRadius"]);
    let top_speed = number(map, &["orbit_speed", "orbitSpeed"]);

    let mut orbit = match field(map, &["orbit"]) {
        Some(Value::Bool(true)) => Some(OrbitParams::default()),
        Some(Value::Number(n)) => Some(OrbitParams {
            radius: n.as_f64().map(|r| r as f32),
            ..OrbitParams::default()
        }),
        Some(Value::Object(o)) => Some(OrbitParams {
            radius: number(o, &["radius"]),
            speed: number(o, &["speed", "angular_speed", "angularSpeed"]),
            angle: number(o, &["angle"]),
        }),
        _ => None,
    };

    if orbit.is_none() && (top_radius.is_some() || top_speed.is_some()) {
        orbit = Some(OrbitParams::default());
    }
    if let Some(o) = orbit.as_mut() {
        o.radius = o.radius.or(top_radius);
        o.speed = o.speed.or(top_speed);
    }
    orbit
}

#[inline]
fn finite(v: Option<f32>) -> Option<f32> {
    v.filter(|v| v.is_finite())
}

#[inline]
fn finite_or(v: Option<f32>, default: f32) -> f32 {
    finite(v).unwrap_or(default)
}

#[inline]
fn positive_or(v: Option<f32>, default: f32) -> f32 {
    finite(v).filter(|v| *v > 0.0).unwrap_or(default)
}

/// Normalized orbit request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSpec {
    pub radius: f32,
    /// Radians per second.
    pub angular_speed: f32,
    /// Radians; derived from the spawn offset when absent.
    pub start_angle: Option<f32>,
}

/// Canonical, fully-populated projectile parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpec {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub damage: f32,
    pub pierce: u32,
    pub lifetime: f32,
    pub knockback: f32,
    pub homing: f32,
    pub acceleration: f32,
    pub orbit: Option<OrbitSpec>,
    pub vampirism: f32,
    pub split_on_death: u32,
    pub attraction_force: f32,
    pub bounciness: f32,
    /// Degrees per second.
    pub spin: f32,
    pub chain_range: f32,
    pub color: String,
}

impl ProjectileSpec {
    /// Back to wire form, for the outbound `fire` message.
    pub fn to_params(&self) -> ProjectileParams {
        ProjectileParams {
            x: Some(self.position.x),
            y: Some(self.position.y),
            vx: Some(self.velocity.x),
            vy: Some(self.velocity.y),
            radius: Some(self.radius),
            damage: Some(self.damage),
            pierce: Some(self.pierce as f32),
            lifetime: Some(self.lifetime),
            knockback: Some(self.knockback),
            homing: Some(self.homing),
            acceleration: Some(self.acceleration),
            orbit: self.orbit.map(|o| OrbitParams {
                radius: Some(o.radius),
                speed: Some(o.angular_speed),
                angle: o.start_angle.map(f32::to_degrees),
            }),
            vampirism: Some(self.vampirism),
            split_on_death: Some(self.split_on_death as f32),
            attraction_force: Some(self.attraction_force),
            bounciness: Some(self.bounciness),
            spin: Some(self.spin),
            chain_range: Some(self.chain_range),
            color: Some(self.color.clone()),
            ..ProjectileParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGIN: Vec2 = Vec2::new(400.0, 300.0);

    #[test]
    fn test_empty_record_gets_defaults() {
        let spec = ProjectileParams::from_value(&json!({})).normalize(ORIGIN, None);
        assert_eq!(spec.position, ORIGIN);
        assert_eq!(spec.radius, DEFAULT_RADIUS);
        assert_eq!(spec.damage, DEFAULT_DAMAGE);
        assert_eq!(spec.pierce, DEFAULT_PIERCE);
        assert_eq!(spec.lifetime, DEFAULT_LIFETIME);
        assert_eq!(spec.knockback, 0.0);
        assert_eq!(spec.homing, 0.0);
        assert!(spec.orbit.is_none());
        assert_eq!(spec.split_on_death, 0);
        assert_eq!(spec.bounciness, 0.0);
        assert_eq!(spec.chain_range, 0.0);
    }

    #[test]
    fn test_speed_and_angle() {
        let spec = ProjectileParams::from_value(&json!({ "speed": 300, "angle": 0 }))
            .normalize(ORIGIN, None);
        assert!((spec.velocity.x - 300.0).abs() < 1e-3);
        assert!(spec.velocity.y.abs() < 1e-3);
    }

    #[test]
    fn test_direct_velocity_wins_over_speed() {
        let spec = ProjectileParams::from_value(&json!({ "vx": 10, "speed": 999, "angle": 90 }))
            .normalize(ORIGIN, None);
        assert_eq!(spec.velocity, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_speed_only_aims_at_target() {
        let spec = ProjectileParams::from_value(&json!({ "speed": 100 }))
            .normalize(ORIGIN, Some(Vec2::new(400.0, 500.0)));
        assert!(spec.velocity.x.abs() < 1e-3);
        assert!((spec.velocity.y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_wrong_types_are_ignored() {
        let spec = ProjectileParams::from_value(&json!({
            "damage": "lots",
            "pierce": [1, 2],
            "radius": null,
            "homing": true,
        }))
        .normalize(ORIGIN, None);
        assert_eq!(spec.damage, DEFAULT_DAMAGE);
        assert_eq!(spec.pierce, DEFAULT_PIERCE);
        assert_eq!(spec.radius, DEFAULT_RADIUS);
        assert_eq!(spec.homing, 0.0);
    }

    #[test]
    fn test_non_object_is_default() {
        let spec = ProjectileParams::from_value(&json!(42)).normalize(ORIGIN, None);
        assert_eq!(spec.damage, DEFAULT_DAMAGE);
    }

    #[test]
    fn test_hostile_values_clamped() {
        let params = ProjectileParams {
            radius: Some(-3.0),
            lifetime: Some(f32::NAN),
            bounciness: Some(7.0),
            vampirism: Some(500.0),
            split_on_death: Some(1e9),
            vx: Some(f32::INFINITY),
            ..Default::default()
        };
        let spec = params.normalize(ORIGIN, None);
        assert_eq!(spec.radius, DEFAULT_RADIUS);
        assert_eq!(spec.lifetime, DEFAULT_LIFETIME);
        assert_eq!(spec.bounciness, 1.0);
        assert_eq!(spec.vampirism, 100.0);
        assert_eq!(spec.split_on_death, MAX_SPLIT_FRAGMENTS);
        assert!(spec.velocity.is_finite());
    }

    #[test]
    fn test_orbit_shapes() {
        let on = ProjectileParams::from_value(&json!({ "orbit": true })).normalize(ORIGIN, None);
        let orbit = on.orbit.unwrap();
        assert_eq!(orbit.radius, DEFAULT_ORBIT_RADIUS);
        assert_eq!(orbit.angular_speed, DEFAULT_ORBIT_SPEED);

        let obj = ProjectileParams::from_value(&json!({ "orbit": { "radius": 80, "speed": -2 } }))
            .normalize(ORIGIN, None);
        let orbit = obj.orbit.unwrap();
        assert_eq!(orbit.radius, 80.0);
        assert_eq!(orbit.angular_speed, -2.0);

        let top = ProjectileParams::from_value(&json!({ "orbitRadius": 40 })).normalize(ORIGIN, None);
        assert_eq!(top.orbit.unwrap().radius, 40.0);

        let off = ProjectileParams::from_value(&json!({ "orbit": false })).normalize(ORIGIN, None);
        assert!(off.orbit.is_none());
    }

    #[test]
    fn test_camel_case_aliases() {
        let spec = ProjectileParams::from_value(&json!({
            "splitOnDeath": 4,
            "chainRange": 150,
            "attractionForce": 2.5,
        }))
        .normalize(ORIGIN, None);
        assert_eq!(spec.split_on_death, 4);
        assert_eq!(spec.chain_range, 150.0);
        assert_eq!(spec.attraction_force, 2.5);
    }
}
