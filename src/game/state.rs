//! Game State Definitions
//!
//! All state types for the arena simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::geometry::{Point, Square};
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::config::GameConfig;
use crate::game::layout::{generate_obstacles, generate_powerups};
use crate::game::tick::SimError;
use crate::MAX_PLAYERS;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Player slot identifier (1..=4).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(u8);

impl PlayerId {
    /// All four slots in id order.
    pub const ALL: [PlayerId; MAX_PLAYERS] = [PlayerId(1), PlayerId(2), PlayerId(3), PlayerId(4)];

    /// The slot allowed to start a game.
    pub const HOST: PlayerId = PlayerId(1);

    /// Create from a raw slot number, rejecting anything outside 1..=4.
    pub const fn new(id: u8) -> Option<Self> {
        if id >= 1 && id as usize <= MAX_PLAYERS {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Raw slot number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display-only identity tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    /// Player 1
    Red,
    /// Player 2
    Purple,
    /// Player 3
    Blue,
    /// Player 4
    Green,
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Expiry timestamps (Unix ms) of a player's speed effects.
///
/// 0 means inactive; a value greater than the current clock means active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerupTimers {
    /// Boost expiry
    pub speed_boost: u64,
    /// Penalty expiry
    pub speed_penalty: u64,
}

/// State of a single player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Slot id
    pub id: PlayerId,
    /// Top-left corner
    pub position: Point,
    /// Base movement per intent
    pub speed: f64,
    /// Objects scored this game
    pub score: u32,
    /// Display colour
    pub color: PlayerColor,
    /// Active speed effects
    pub powerups: PowerupTimers,
}

impl PlayerState {
    /// Create a player at a spawn point.
    pub fn new(id: PlayerId, position: Point, speed: f64, color: PlayerColor) -> Self {
        Self {
            id,
            position,
            speed,
            score: 0,
            color,
            powerups: PowerupTimers::default(),
        }
    }

    /// Footprint at the current position.
    #[inline]
    pub fn footprint(&self, size: f64) -> Square {
        Square::at(self.position, size)
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.id.get());
        hasher.update_point(self.position);
        hasher.update_f64(self.speed);
        hasher.update_u32(self.score);
        hasher.update_u64(self.powerups.speed_boost);
        hasher.update_u64(self.powerups.speed_penalty);
    }
}

/// Fixed spawn layout: one corner per slot, inset 10 units.
pub fn spawn_points(config: &GameConfig) -> [(PlayerId, Point, PlayerColor); MAX_PLAYERS] {
    const INSET: f64 = 10.0;
    let far = config.canvas_size - config.player_size - INSET;
    [
        (PlayerId::ALL[0], Point::new(INSET, INSET), PlayerColor::Red),
        (PlayerId::ALL[1], Point::new(far, far), PlayerColor::Purple),
        (PlayerId::ALL[2], Point::new(INSET, far), PlayerColor::Blue),
        (PlayerId::ALL[3], Point::new(far, INSET), PlayerColor::Green),
    ]
}

// =============================================================================
// ARENA ENTITIES
// =============================================================================

/// The scoring object. Picking it up scores and teleports it at once, so
/// `is_held` never stays true between transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedObject {
    /// Top-left corner
    pub position: Point,
    /// Held flag
    pub is_held: bool,
    /// Holder (set only while held)
    pub holder_id: Option<PlayerId>,
}

impl SharedObject {
    /// Unheld object at a position.
    pub fn at(position: Point) -> Self {
        Self { position, is_held: false, holder_id: None }
    }
}

/// Terrain variant of an obstacle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleKind {
    /// The only terrain placed today
    Ice,
}

/// Immutable movement blocker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Top-left corner
    pub position: Point,
    /// Edge length
    pub size: f64,
    /// Terrain variant
    pub kind: ObstacleKind,
}

impl Obstacle {
    /// Footprint of this obstacle.
    #[inline]
    pub fn footprint(&self) -> Square {
        Square::at(self.position, self.size)
    }
}

/// Powerup effect type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PowerupKind {
    /// Boosts the collector
    Speed = 0,
    /// Penalizes everyone but the collector
    Slow = 1,
}

/// Collectible powerup. Never respawns once collected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Powerup {
    /// Top-left corner
    pub position: Point,
    /// Effect type
    pub kind: PowerupKind,
    /// Still on the board?
    pub active: bool,
}

// =============================================================================
// GAME PHASE
// =============================================================================

/// Phase derived from `game_started` and `winner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// No game has been played yet
    Waiting,
    /// Countdown running
    Running,
    /// Countdown reached zero
    Ended,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Complete state of one game.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    /// Tunables this game was built with
    pub config: GameConfig,

    /// RNG seed (for verification)
    pub seed: u64,

    /// Deterministic RNG state
    #[serde(skip)]
    pub rng: DeterministicRng,

    /// All players in id order
    pub players: BTreeMap<PlayerId, PlayerState>,

    /// The scoring object
    pub object: SharedObject,

    /// Immutable for the game's duration
    pub obstacles: Vec<Obstacle>,

    /// Placed at game start, deactivated on pickup
    pub powerups: Vec<Powerup>,

    /// Whole seconds left on the countdown
    pub time_remaining: u32,

    /// Is the countdown running?
    pub game_started: bool,

    /// Set once, when the countdown reaches zero
    pub winner: Option<PlayerId>,
}

impl GameState {
    /// Board before any game has started: players on their spawns,
    /// no layout, countdown not running.
    pub fn lobby(config: GameConfig, seed: u64) -> Self {
        let players = spawn_points(&config)
            .into_iter()
            .map(|(id, pos, color)| (id, PlayerState::new(id, pos, config.base_speed, color)))
            .collect();
        let (ox, oy) = config.object_start();

        Self {
            seed,
            rng: DeterministicRng::new(seed),
            players,
            object: SharedObject::at(Point::new(ox, oy)),
            obstacles: Vec::new(),
            powerups: Vec::new(),
            time_remaining: config.duration_secs,
            game_started: false,
            winner: None,
            config,
        }
    }

    /// Fresh running game: spawns reset, layout generated from `seed`.
    pub fn new_game(config: GameConfig, seed: u64) -> Result<Self, SimError> {
        config.validate()?;

        let mut state = Self::lobby(config, seed);
        let spawns: Vec<Point> = state.players.values().map(|p| p.position).collect();

        state.obstacles = generate_obstacles(
            &mut state.rng,
            &state.config,
            &spawns,
            state.object.position,
        )?;
        state.powerups = generate_powerups(
            &mut state.rng,
            &state.config,
            &state.obstacles,
            &spawns,
            state.object.position,
        )?;
        state.game_started = true;

        Ok(state)
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        if self.game_started {
            GamePhase::Running
        } else if self.winner.is_some() {
            GamePhase::Ended
        } else {
            GamePhase::Waiting
        }
    }

    /// Is the countdown running?
    #[inline]
    pub fn is_running(&self) -> bool {
        self.game_started
    }

    /// First player with the strictly highest score, in id order.
    pub fn leader(&self) -> Option<PlayerId> {
        let mut best: Option<&PlayerState> = None;
        for player in self.players.values() {
            match best {
                Some(b) if player.score <= b.score => {}
                _ => best = Some(player),
            }
        }
        best.map(|p| p.id)
    }

    /// Scores in id order.
    pub fn scores(&self) -> Vec<(PlayerId, u32)> {
        self.players.values().map(|p| (p.id, p.score)).collect()
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.time_remaining, self.seed, |hasher| {
            // BTreeMap iterates in id order
            for player in self.players.values() {
                player.hash_into(hasher);
            }

            hasher.update_point(self.object.position);
            hasher.update_bool(self.object.is_held);
            hasher.update_opt_u8(self.object.holder_id.map(PlayerId::get));

            for obstacle in &self.obstacles {
                hasher.update_point(obstacle.position);
                hasher.update_f64(obstacle.size);
            }

            for powerup in &self.powerups {
                hasher.update_point(powerup.position);
                hasher.update_u8(powerup.kind as u8);
                hasher.update_bool(powerup.active);
            }

            hasher.update_bool(self.game_started);
            hasher.update_opt_u8(self.winner.map(PlayerId::get));
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
