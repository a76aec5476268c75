//! Numeric primitives shared by the simulation.
//!
//! Plain `f32` math: the arena makes no promise of bit-exact results across
//! machines, but every room still draws its randomness from one seeded PRNG
//! so that a recorded seed replays the same respawn layout.

pub mod vec2;
pub mod rng;

// Re-export core types
pub use vec2::Vec2;
pub use rng::DeterministicRng;
