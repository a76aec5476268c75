//! Input Queue
//!
//! Movement and fire requests from the user-facing layer. They are sent
//! through a channel and only applied at the start of the next tick, so the
//! Entity Store is never touched mid-tick from outside.

use serde::{Serialize, Deserialize};
use tokio::sync::mpsc;

use crate::core::vec2::Vec2;

/// One user input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInput {
    /// Movement direction; each axis in `[-1, 1]`, longer vectors are
    /// normalized. `(0, 0)` stops.
    Move { x: f32, y: f32 },

    /// Fire toward a world-space point.
    Fire { target: Vec2 },
}

/// Input queue closed.
#[derive(Debug, thiserror::Error)]
#[error("Simulation input queue is closed")]
pub struct InputClosed;

/// Cloneable sender side of a room's input queue.
#[derive(Debug, Clone)]
pub struct InputHandle {
    tx: mpsc::UnboundedSender<PlayerInput>,
}

impl InputHandle {
    pub fn send(&self, input: PlayerInput) -> Result<(), InputClosed> {
        self.tx.send(input).map_err(|_| InputClosed)
    }

    /// Set movement direction.
    pub fn move_towards(&self, x: f32, y: f32) -> Result<(), InputClosed> {
        self.send(PlayerInput::Move { x, y })
    }

    /// Request a shot at `target`.
    pub fn fire(&self, target: Vec2) -> Result<(), InputClosed> {
        self.send(PlayerInput::Fire { target })
    }
}

/// Receiver side, drained once per tick.
#[derive(Debug)]
pub struct InputQueue {
    rx: mpsc::UnboundedReceiver<PlayerInput>,
}

/// Create a connected handle/queue pair.
pub fn input_channel() -> (InputHandle, InputQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InputHandle { tx }, InputQueue { rx })
}

impl InputQueue {
    /// Everything queued since the last drain, folded into one tick's worth.
    pub fn drain(&mut self) -> TickInputs {
        let mut inputs = TickInputs::default();
        while let Ok(input) = self.rx.try_recv() {
            inputs.push(input);
        }
        inputs
    }
}

/// Inputs applied in one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInputs {
    /// Latest movement direction, if any arrived.
    pub movement: Option<Vec2>,
    /// Fire targets in arrival order.
    pub fires: Vec<Vec2>,
}

impl TickInputs {
    pub fn push(&mut self, input: PlayerInput) {
        match input {
            PlayerInput::Move { x, y } => {
                let dir = Vec2::new(x, y);
                if dir.is_finite() {
                    self.movement = Some(normalize_direction(dir));
                }
            }
            PlayerInput::Fire { target } => {
                if target.is_finite() {
                    self.fires.push(target);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.movement.is_none() && self.fires.is_empty()
    }
}

/// Cap direction length at 1 so diagonals are not faster.
pub fn normalize_direction(dir: Vec2) -> Vec2 {
    if dir.length_squared() > 1.0 {
        dir.normalize()
    } else {
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_folds_inputs() {
        let (handle, mut queue) = input_channel();
        handle.move_towards(1.0, 0.0).unwrap();
        handle.fire(Vec2::new(10.0, 20.0)).unwrap();
        handle.move_towards(0.0, -1.0).unwrap();
        handle.fire(Vec2::new(30.0, 40.0)).unwrap();

        let inputs = queue.drain();
        assert_eq!(inputs.movement, Some(Vec2::new(0.0, -1.0)));
        assert_eq!(inputs.fires, vec![Vec2::new(10.0, 20.0), Vec2::new(30.0, 40.0)]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_diagonal_normalized() {
        let d = normalize_direction(Vec2::new(1.0, 1.0));
        assert!((d.length() - 1.0).abs() < 1e-5);
        assert_eq!(normalize_direction(Vec2::new(0.5, 0.0)), Vec2::new(0.5, 0.0));
    }

    #[test]
    fn test_non_finite_dropped() {
        let mut inputs = TickInputs::default();
        inputs.push(PlayerInput::Move { x: f32::NAN, y: 0.0 });
        inputs.push(PlayerInput::Fire { target: Vec2::new(f32::INFINITY, 0.0) });
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_closed_queue() {
        let (handle, queue) = input_channel();
        drop(queue);
        assert!(handle.fire(Vec2::ZERO).is_err());
    }

    #[test]
    fn test_input_json_shape() {
        let json = serde_json::to_string(&PlayerInput::Move { x: 1.0, y: 0.0 }).unwrap();
        assert!(json.contains("\"type\":\"move\""));
    }
}
