//! # Star Rush Game Server
//!
//! Authoritative simulation for Star Rush, a four-player arena race for a
//! shared star, with a local driver and a WebSocket relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     STAR RUSH SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── geometry.rs - Points and square overlap                 │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── config.rs   - Tunables and attempt bounds               │
//! │  ├── state.rs    - Game and player state                     │
//! │  ├── layout.rs   - Obstacle/powerup placement                │
//! │  ├── effects.rs  - Speed boost and penalty timers            │
//! │  ├── tick.rs     - Authoritative transitions                 │
//! │  ├── replay.rs   - Recording and replay                      │
//! │  └── local.rs    - Single-process driver                     │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Shared game session                       │
//! │  └── client.rs   - Remote client driver                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules never read the wall clock: every
//! transition takes `now` from its caller.
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from seeded Xorshift128+
//!
//! Given the same seed and the same timestamped transitions, the simulation
//! produces identical states locally and behind the server.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::config::GameConfig;
pub use game::input::MoveIntent;
pub use game::state::{GameState, PlayerState, PlayerId};
pub use game::tick::{apply_move, tick_clock, SimError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Players per game.
pub const MAX_PLAYERS: usize = 4;
