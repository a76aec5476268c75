//! Snapshot Buffer
//!
//! Bounded ring of timestamped authoritative states and the linear
//! interpolation between the pair that brackets a render time.

use std::collections::VecDeque;

use crate::game::state::Entity;
use super::protocol::WireSnapshot;

/// Authoritative state stamped with local simulation time on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Seconds, on the room's simulation clock.
    pub time: f64,
    /// Players and enemies.
    pub entities: Vec<Entity>,
    pub projectiles: Vec<Entity>,
}

impl Snapshot {
    pub fn from_wire(time: f64, wire: &WireSnapshot) -> Self {
        Self {
            time,
            entities: wire.entities(),
            projectiles: wire.projectile_entities(),
        }
    }
}

/// Entities at a render time.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedFrame {
    pub entities: Vec<Entity>,
    pub projectiles: Vec<Entity>,
}

/// Fixed-capacity ring of snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest when full. A snapshot older than the
    /// newest one is dropped; one with the same time replaces it.
    pub fn push(&mut self, snapshot: Snapshot) {
        if let Some(last) = self.snapshots.back_mut() {
            if snapshot.time < last.time {
                return;
            }
            if snapshot.time == last.time {
                *last = snapshot;
                return;
            }
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Interpolate at `render_time`. `None` with fewer than two snapshots.
    ///
    /// Outside the buffered range the nearest snapshot is held rather than
    /// extrapolated.
    pub fn interpolate(&self, render_time: f64) -> Option<InterpolatedFrame> {
        let (older, newer, t) = self.bracket(render_time)?;
        Some(InterpolatedFrame {
            entities: lerp_entities(&older.entities, &newer.entities, t),
            projectiles: lerp_entities(&older.projectiles, &newer.projectiles, t),
        })
    }

    /// Bracketing pair and blend factor in `[0, 1]`.
    fn bracket(&self, render_time: f64) -> Option<(&Snapshot, &Snapshot, f32)> {
        if self.snapshots.len() < 2 {
            return None;
        }
        let first = self.snapshots.front()?;
        let last = self.snapshots.back()?;
        if render_time <= first.time {
            return Some((first, first, 0.0));
        }
        if render_time >= last.time {
            return Some((last, last, 0.0));
        }

        // First snapshot strictly after render_time; its predecessor is at
        // or before it.
        let idx = self
            .snapshots
            .iter()
            .position(|s| s.time > render_time)?;
        let older = &self.snapshots[idx - 1];
        let newer = &self.snapshots[idx];
        let span = newer.time - older.time;
        let t = if span > 0.0 {
            ((render_time - older.time) / span).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        Some((older, newer, t))
    }
}

/// Blend positions of entities present in both lists; everything else is
/// taken from `newer`.
pub fn lerp_entities(older: &[Entity], newer: &[Entity], t: f32) -> Vec<Entity> {
    newer
        .iter()
        .map(|n| {
            let mut e = n.clone();
            if let Some(o) = older.iter().find(|o| o.id == n.id) {
                e.position = o.position.lerp(n.position, t);
            }
            e
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::state::{EntityId, EntityKind};
    use proptest::prelude::*;

    fn enemy(id: u32, x: f32, y: f32) -> Entity {
        Entity {
            id: EntityId(id),
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            radius: 15.0,
            color: String::new(),
            hp: 50.0,
            max_hp: 50.0,
            kind: EntityKind::Enemy,
        }
    }

    fn snap(time: f64, entities: Vec<Entity>) -> Snapshot {
        Snapshot {
            time,
            entities,
            projectiles: Vec::new(),
        }
    }

    #[test]
    fn test_needs_two_snapshots() {
        let mut buf = SnapshotBuffer::new(20);
        assert!(buf.interpolate(0.0).is_none());
        buf.push(snap(1.0, vec![enemy(1, 0.0, 0.0)]));
        assert!(buf.interpolate(1.0).is_none());
        buf.push(snap(2.0, vec![enemy(1, 10.0, 0.0)]));
        assert!(buf.interpolate(1.5).is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buf = SnapshotBuffer::new(3);
        for i in 0..5 {
            buf.push(snap(i as f64, Vec::new()));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.snapshots.front().unwrap().time, 2.0);
        assert_eq!(buf.latest().unwrap().time, 4.0);
    }

    #[test]
    fn test_out_of_order_dropped() {
        let mut buf = SnapshotBuffer::new(5);
        buf.push(snap(2.0, Vec::new()));
        buf.push(snap(1.0, Vec::new()));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_holds_outside_range() {
        let mut buf = SnapshotBuffer::new(5);
        buf.push(snap(1.0, vec![enemy(1, 0.0, 0.0)]));
        buf.push(snap(2.0, vec![enemy(1, 10.0, 0.0)]));

        let before = buf.interpolate(0.0).unwrap();
        assert_eq!(before.entities[0].position, Vec2::new(0.0, 0.0));
        let after = buf.interpolate(9.0).unwrap();
        assert_eq!(after.entities[0].position, Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_new_entity_uses_newer_position() {
        let mut buf = SnapshotBuffer::new(5);
        buf.push(snap(1.0, vec![enemy(1, 0.0, 0.0)]));
        buf.push(snap(2.0, vec![enemy(1, 10.0, 0.0), enemy(2, 50.0, 50.0)]));
        let frame = buf.interpolate(1.5).unwrap();
        let fresh = frame.entities.iter().find(|e| e.id == EntityId(2)).unwrap();
        assert_eq!(fresh.position, Vec2::new(50.0, 50.0));
    }

    #[test]
    fn test_picks_correct_bracket() {
        let mut buf = SnapshotBuffer::new(5);
        buf.push(snap(1.0, vec![enemy(1, 0.0, 0.0)]));
        buf.push(snap(2.0, vec![enemy(1, 10.0, 0.0)]));
        buf.push(snap(3.0, vec![enemy(1, 30.0, 0.0)]));
        let frame = buf.interpolate(2.5).unwrap();
        assert!((frame.entities[0].position.x - 20.0).abs() < 1e-4);
    }

    proptest! {
        #[test]
        fn prop_midpoint(
            t0 in 0.0f64..100.0,
            span in 0.01f64..5.0,
            x0 in -1000.0f32..1000.0,
            y0 in -1000.0f32..1000.0,
            x1 in -1000.0f32..1000.0,
            y1 in -1000.0f32..1000.0,
        ) {
            let mut buf = SnapshotBuffer::new(20);
            buf.push(snap(t0, vec![enemy(1, x0, y0)]));
            buf.push(snap(t0 + span, vec![enemy(1, x1, y1)]));
            let frame = buf.interpolate(t0 + 0.5 * span).unwrap();
            let p = frame.entities[0].position;
            prop_assert!((p.x - (x0 + x1) * 0.5).abs() < 1e-2);
            prop_assert!((p.y - (y0 + y1) * 0.5).abs() < 1e-2);
        }
    }
}
