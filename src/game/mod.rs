//! Game Logic Module
//!
//! All game simulation code. Deterministic for a given seed and
//! transition sequence.
//!
//! ## Module Structure
//!
//! - `config`: Tunables and attempt bounds
//! - `state`: Game state, players, arena entities
//! - `layout`: Obstacle/powerup placement and object relocation
//! - `effects`: Speed boost and penalty timers
//! - `input`: Move intent validation
//! - `tick`: Authoritative transitions (start, move, clock)
//! - `events`: Game events for logging/replay
//! - `replay`: Transition recording and deterministic replay
//! - `local`: Single-process driver

pub mod config;
pub mod state;
pub mod layout;
pub mod effects;
pub mod input;
pub mod tick;
pub mod events;
pub mod replay;
pub mod local;

// Re-export key types
pub use config::{GameConfig, ConfigError};
pub use state::{GameState, PlayerState, PlayerId, GamePhase, PowerupKind};
pub use input::{MoveIntent, Direction};
pub use tick::{apply_move, tick_clock, start_game, SimError, StepResult};
pub use layout::LayoutError;
pub use events::GameEvent;
pub use replay::{GameRecording, replay};
pub use local::{Clock, LocalGame, ManualClock, SystemClock};
