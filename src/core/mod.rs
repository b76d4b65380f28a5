//! Core deterministic primitives.
//!
//! Geometry, seeded randomness and state hashing shared by the simulation
//! and the network layer.

pub mod geometry;
pub mod rng;
pub mod hash;

// Re-export core types
pub use geometry::{Point, Square, squares_overlap};
pub use rng::DeterministicRng;
pub use hash::{StateHash, compute_state_hash};
