//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON objects tagged by `type` and stamped with a protocol
//! `version`. Every snapshot carries the full game state, never a diff.
//!
//! Numeric fields are decoded leniently: a number or a numeric string is
//! accepted, anything else is rejected. Missing powerup timers default to 0.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::geometry::Point;
use crate::core::rng::DeterministicRng;
use crate::game::config::GameConfig;
use crate::game::input::MoveIntent;
use crate::game::state::{
    GameState, Obstacle, ObstacleKind, PlayerColor, PlayerId, PlayerState, Powerup, PowerupKind,
    PowerupTimers, SharedObject,
};
use crate::MAX_PLAYERS;

/// Current protocol version.
pub const PROTOCOL_VERSION: u64 = 1;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON, or fields of the wrong shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Top level is not a JSON object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// Peer speaks another protocol version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u64),

    /// Snapshot decoded but describes an impossible state.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Snapshot contents do not hash to the advertised `state_hash`.
    #[error("snapshot hash mismatch")]
    HashMismatch,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a game start (honoured from player 1 only).
    Ready,

    /// One move intent.
    Move(MoveRequest),
}

/// A move intent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Sending player's slot.
    #[serde(deserialize_with = "lenient::int")]
    pub player_id: u32,
    /// Horizontal step.
    #[serde(deserialize_with = "lenient::int")]
    pub dx: i32,
    /// Vertical step.
    #[serde(deserialize_with = "lenient::int")]
    pub dy: i32,
}

impl MoveRequest {
    /// Convert to a simulation intent (validated later by the simulation).
    pub fn to_intent(&self) -> MoveIntent {
        MoveIntent::new(self.player_id, self.dx, self.dy)
    }
}

impl From<MoveIntent> for MoveRequest {
    fn from(intent: MoveIntent) -> Self {
        Self { player_id: intent.player_id, dx: intent.dx, dy: intent.dy }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Slot assigned to this connection.
    Init {
        /// Assigned player id.
        #[serde(deserialize_with = "lenient::int")]
        player_id: u8,
    },

    /// A new game began.
    GameStart {
        /// Full state.
        game_state: Snapshot,
    },

    /// State after a move or clock tick.
    GameStateUpdate {
        /// Full state.
        game_state: Snapshot,
    },

    /// A player's connection closed.
    PlayerDisconnected {
        /// Departed player id.
        #[serde(deserialize_with = "lenient::int")]
        player_id: u8,
        /// Full state.
        game_state: Snapshot,
    },

    /// Request rejected.
    Error(ServerError),
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// All four slots are taken.
    SessionFull,
    /// Only player 1 may start a game.
    NotHost,
    /// A game is already running.
    GameInProgress,
    /// Step outside `{-1, 0, 1}`.
    InvalidIntent,
    /// Unknown player id.
    PlayerNotFound,
    /// Move sent while no game runs.
    GameNotRunning,
    /// Layout search gave up.
    LayoutExhausted,
    /// Payload could not be decoded.
    MalformedMessage,
    /// Version mismatch.
    VersionMismatch,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Full game state as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Players keyed by id text.
    pub players: BTreeMap<String, PlayerSnapshot>,
    /// The scoring object.
    pub shared_object: ObjectSnapshot,
    /// Obstacle field.
    #[serde(default)]
    pub obstacles: Vec<ObstacleSnapshot>,
    /// Powerups, collected ones included.
    #[serde(default)]
    pub powerups: Vec<PowerupSnapshot>,
    /// Seconds left. Absent means unchanged since the last snapshot.
    #[serde(default, deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u32>,
    /// Countdown running?
    #[serde(default, deserialize_with = "lenient::flag")]
    pub game_started: bool,
    /// Winner, once the game ended.
    #[serde(default, deserialize_with = "lenient::opt_player")]
    pub winner: Option<u8>,
    /// Layout seed.
    #[serde(default, deserialize_with = "lenient::int")]
    pub seed: u64,
    /// Hex SHA-256 of the state, checked on decode when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

/// Player on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Slot id.
    #[serde(deserialize_with = "lenient::int")]
    pub id: u8,
    /// Left edge.
    #[serde(deserialize_with = "lenient::float")]
    pub x: f64,
    /// Top edge.
    #[serde(deserialize_with = "lenient::float")]
    pub y: f64,
    /// Base speed.
    #[serde(deserialize_with = "lenient::float")]
    pub speed: f64,
    /// Score.
    #[serde(default, deserialize_with = "lenient::int")]
    pub score: u32,
    /// Display colour.
    pub color: PlayerColor,
    /// Effect expiry timestamps.
    #[serde(default)]
    pub powerups: TimerSnapshot,
}

/// Effect timers on the wire. Missing fields are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Boost expiry (Unix ms).
    #[serde(rename = "speedBoost", default, deserialize_with = "lenient::int")]
    pub speed_boost: u64,
    /// Penalty expiry (Unix ms).
    #[serde(rename = "speedPenalty", default, deserialize_with = "lenient::int")]
    pub speed_penalty: u64,
}

/// Shared object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Left edge.
    #[serde(deserialize_with = "lenient::float")]
    pub x: f64,
    /// Top edge.
    #[serde(deserialize_with = "lenient::float")]
    pub y: f64,
    /// Held flag.
    #[serde(rename = "isHeld", default, deserialize_with = "lenient::flag")]
    pub is_held: bool,
    /// Holder id.
    #[serde(rename = "holderId", default, deserialize_with = "lenient::opt_player")]
    pub holder_id: Option<u8>,
}

/// Obstacle on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSnapshot {
    /// Left edge.
    #[serde(deserialize_with = "lenient::float")]
    pub x: f64,
    /// Top edge.
    #[serde(deserialize_with = "lenient::float")]
    pub y: f64,
    /// Edge length.
    #[serde(deserialize_with = "lenient::float")]
    pub size: f64,
    /// Terrain variant.
    #[serde(rename = "type")]
    pub kind: ObstacleKind,
}

/// Powerup on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerupSnapshot {
    /// Left edge.
    #[serde(deserialize_with = "lenient::float")]
    pub x: f64,
    /// Top edge.
    #[serde(deserialize_with = "lenient::float")]
    pub y: f64,
    /// Effect type.
    #[serde(rename = "type")]
    pub kind: PowerupKind,
    /// Still collectible?
    #[serde(deserialize_with = "lenient::flag")]
    pub active: bool,
}

impl Snapshot {
    /// Capture a game state.
    pub fn from_state(state: &GameState) -> Self {
        let players = state
            .players
            .values()
            .map(|p| {
                let snapshot = PlayerSnapshot {
                    id: p.id.get(),
                    x: p.position.x,
                    y: p.position.y,
                    speed: p.speed,
                    score: p.score,
                    color: p.color,
                    powerups: TimerSnapshot {
                        speed_boost: p.powerups.speed_boost,
                        speed_penalty: p.powerups.speed_penalty,
                    },
                };
                (p.id.to_string(), snapshot)
            })
            .collect();

        Self {
            players,
            shared_object: ObjectSnapshot {
                x: state.object.position.x,
                y: state.object.position.y,
                is_held: state.object.is_held,
                holder_id: state.object.holder_id.map(PlayerId::get),
            },
            obstacles: state
                .obstacles
                .iter()
                .map(|o| ObstacleSnapshot {
                    x: o.position.x,
                    y: o.position.y,
                    size: o.size,
                    kind: o.kind,
                })
                .collect(),
            powerups: state
                .powerups
                .iter()
                .map(|p| PowerupSnapshot {
                    x: p.position.x,
                    y: p.position.y,
                    kind: p.kind,
                    active: p.active,
                })
                .collect(),
            time_remaining: Some(state.time_remaining),
            game_started: state.game_started,
            winner: state.winner.map(PlayerId::get),
            seed: state.seed,
            state_hash: Some(hex::encode(state.compute_hash())),
        }
    }

    /// Rebuild a game state, rejecting snapshots that describe an
    /// impossible state or fail their hash check.
    pub fn into_state(self, config: GameConfig) -> Result<GameState, ProtocolError> {
        if self.players.len() != MAX_PLAYERS {
            return Err(malformed(format!(
                "expected {} players, got {}",
                MAX_PLAYERS,
                self.players.len()
            )));
        }

        let mut players = BTreeMap::new();
        for (key, p) in self.players {
            let raw = key
                .trim()
                .parse::<u8>()
                .map_err(|_| malformed(format!("bad player key {:?}", key)))?;
            let id = player_id(raw)?;
            if p.id != raw {
                return Err(malformed(format!("player keyed {} claims id {}", key, p.id)));
            }
            let mut player = PlayerState::new(id, Point::new(p.x, p.y), p.speed, p.color);
            player.score = p.score;
            player.powerups = PowerupTimers {
                speed_boost: p.powerups.speed_boost,
                speed_penalty: p.powerups.speed_penalty,
            };
            players.insert(id, player);
        }

        // Without a previous value the countdown is assumed untouched
        let time_remaining = self.time_remaining.unwrap_or(config.duration_secs);

        let object = &self.shared_object;
        let holder_id = object.holder_id.map(player_id).transpose()?;
        if object.is_held && holder_id.is_none() {
            return Err(malformed("object held without a holder".to_string()));
        }

        let state = GameState {
            config,
            seed: self.seed,
            rng: DeterministicRng::new(self.seed),
            players,
            object: SharedObject {
                position: Point::new(object.x, object.y),
                is_held: object.is_held,
                holder_id,
            },
            obstacles: self
                .obstacles
                .into_iter()
                .map(|o| Obstacle { position: Point::new(o.x, o.y), size: o.size, kind: o.kind })
                .collect(),
            powerups: self
                .powerups
                .into_iter()
                .map(|p| Powerup { position: Point::new(p.x, p.y), kind: p.kind, active: p.active })
                .collect(),
            time_remaining,
            game_started: self.game_started,
            winner: self.winner.map(player_id).transpose()?,
        };

        if let Some(expected) = &self.state_hash {
            if !hex::encode(state.compute_hash()).eq_ignore_ascii_case(expected) {
                return Err(ProtocolError::HashMismatch);
            }
        }

        Ok(state)
    }
}

fn malformed(reason: String) -> ProtocolError {
    ProtocolError::MalformedSnapshot(reason)
}

fn player_id(raw: u8) -> Result<PlayerId, ProtocolError> {
    PlayerId::new(raw).ok_or_else(|| malformed(format!("unknown player id {}", raw)))
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

/// Serialize a tagged message and stamp it with the protocol version.
fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut value = serde_json::to_value(message)?;
    let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;
    object.insert("version".to_string(), serde_json::Value::from(PROTOCOL_VERSION));
    Ok(serde_json::to_string(&value)?)
}

/// Check the version stamp (absent means current) and decode.
fn decode<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, ProtocolError> {
    let mut value: serde_json::Value = serde_json::from_str(s)?;
    let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;

    if let Some(version) = object.remove("version") {
        let version: u64 = lenient::int(version)?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
    }

    Ok(serde_json::from_value(value)?)
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        decode(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        decode(s)
    }

    /// Error message shorthand.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

/// Lenient field decoders: numbers may arrive as numbers or numeric text.
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Int(i64),
        UInt(u64),
        Float(f64),
        Text(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagOrText {
        Bool(bool),
        Number(NumberOrText),
        Null(()),
    }

    impl NumberOrText {
        fn as_f64(&self) -> Option<f64> {
            let v = match self {
                NumberOrText::Int(v) => *v as f64,
                NumberOrText::UInt(v) => *v as f64,
                NumberOrText::Float(v) => *v,
                NumberOrText::Text(s) => s.trim().parse().ok()?,
            };
            v.is_finite().then_some(v)
        }

        fn as_i128(&self) -> Option<i128> {
            match self {
                NumberOrText::Int(v) => Some(*v as i128),
                NumberOrText::UInt(v) => Some(*v as i128),
                NumberOrText::Text(s) => match s.trim().parse::<i128>() {
                    Ok(v) => Some(v),
                    Err(_) => self.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i128),
                },
                NumberOrText::Float(_) => {
                    self.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i128)
                }
            }
        }
    }

    /// Finite float from a number or numeric text.
    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        NumberOrText::deserialize(d)?
            .as_f64()
            .ok_or_else(|| D::Error::custom("expected a finite number"))
    }

    /// Integer from a number or numeric text, range-checked for `T`.
    pub fn int<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i128>,
    {
        NumberOrText::deserialize(d)?
            .as_i128()
            .and_then(|v| T::try_from(v).ok())
            .ok_or_else(|| D::Error::custom("expected an integer in range"))
    }

    /// Truthiness: booleans, non-zero numbers, `"true"`; null is false.
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match FlagOrText::deserialize(d)? {
            FlagOrText::Bool(b) => Ok(b),
            FlagOrText::Null(()) => Ok(false),
            FlagOrText::Number(NumberOrText::Text(s)) => match s.trim() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                other => other
                    .parse::<f64>()
                    .map(|v| v != 0.0)
                    .map_err(|_| D::Error::custom("expected a boolean")),
            },
            FlagOrText::Number(n) => n
                .as_f64()
                .map(|v| v != 0.0)
                .ok_or_else(|| D::Error::custom("expected a boolean")),
        }
    }

    /// Optional integer: null and missing mean none.
    pub fn opt_int<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i128>,
    {
        match Option::<NumberOrText>::deserialize(d)? {
            None => Ok(None),
            Some(n) => n
                .as_i128()
                .and_then(|v| T::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| D::Error::custom("expected an integer in range")),
        }
    }

    /// Optional player id: null, missing, 0 and empty text all mean none.
    pub fn opt_player<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        match Option::<NumberOrText>::deserialize(d)? {
            None => Ok(None),
            Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(n) => match n.as_i128() {
                Some(0) => Ok(None),
                Some(v) => u8::try_from(v)
                    .map(Some)
                    .map_err(|_| D::Error::custom("player id out of range")),
                None => Err(D::Error::custom("expected a player id")),
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
