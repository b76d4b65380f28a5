//! Game Events
//!
//! Events generated by each transition, for logging and replay checks.

use serde::{Serialize, Deserialize};

use crate::core::geometry::Point;
use crate::game::state::{PlayerId, PowerupKind};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A new game began
    GameStarted {
        seed: u64,
        duration_secs: u32,
    },

    /// Mover changed position
    PlayerMoved {
        player_id: PlayerId,
        from: Point,
        to: Point,
    },

    /// Step hit an obstacle or another player; position unchanged
    MoveBlocked {
        player_id: PlayerId,
        at: Point,
    },

    /// Mover collected a powerup
    PowerupCollected {
        player_id: PlayerId,
        powerup_index: usize,
        kind: PowerupKind,
        affected: Vec<PlayerId>,
    },

    /// Mover touched the object: scored, object relocated
    ObjectScored {
        player_id: PlayerId,
        new_score: u32,
        relocated_to: Point,
    },

    /// One second elapsed
    ClockTicked {
        time_remaining: u32,
    },

    /// Countdown reached zero
    GameEnded {
        winner_id: Option<PlayerId>,
        scores: Vec<(PlayerId, u32)>,
    },
}

/// A game event with its timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Clock value (Unix ms) of the transition
    pub at: u64,

    /// Player involved, if any
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(at: u64, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::PlayerMoved { player_id, .. } => Some(*player_id),
            GameEventData::MoveBlocked { player_id, .. } => Some(*player_id),
            GameEventData::PowerupCollected { player_id, .. } => Some(*player_id),
            GameEventData::ObjectScored { player_id, .. } => Some(*player_id),
            GameEventData::GameEnded { winner_id, .. } => *winner_id,
            _ => None,
        };

        Self { at, player_id, data }
    }

    /// Create game started event.
    pub fn game_started(at: u64, seed: u64, duration_secs: u32) -> Self {
        Self::new(at, GameEventData::GameStarted { seed, duration_secs })
    }

    /// Create player moved event.
    pub fn player_moved(at: u64, player_id: PlayerId, from: Point, to: Point) -> Self {
        Self::new(at, GameEventData::PlayerMoved { player_id, from, to })
    }

    /// Create move blocked event.
    pub fn move_blocked(at: u64, player_id: PlayerId, position: Point) -> Self {
        Self::new(at, GameEventData::MoveBlocked { player_id, at: position })
    }

    /// Create powerup collected event.
    pub fn powerup_collected(
        at: u64,
        player_id: PlayerId,
        powerup_index: usize,
        kind: PowerupKind,
        affected: Vec<PlayerId>,
    ) -> Self {
        Self::new(
            at,
            GameEventData::PowerupCollected {
                player_id,
                powerup_index,
                kind,
                affected,
            },
        )
    }

    /// Create object scored event.
    pub fn object_scored(at: u64, player_id: PlayerId, new_score: u32, relocated_to: Point) -> Self {
        Self::new(
            at,
            GameEventData::ObjectScored {
                player_id,
                new_score,
                relocated_to,
            },
        )
    }

    /// Create clock ticked event.
    pub fn clock_ticked(at: u64, time_remaining: u32) -> Self {
        Self::new(at, GameEventData::ClockTicked { time_remaining })
    }

    /// Create game ended event.
    pub fn game_ended(at: u64, winner_id: Option<PlayerId>, scores: Vec<(PlayerId, u32)>) -> Self {
        Self::new(at, GameEventData::GameEnded { winner_id, scores })
    }

    /// Does this event end the game?
    pub fn is_game_end(&self) -> bool {
        matches!(self.data, GameEventData::GameEnded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_extracted() {
        let p = PlayerId::HOST;
        let moved = GameEvent::player_moved(5, p, Point::ZERO, Point::new(10.0, 0.0));
        assert_eq!(moved.player_id, Some(p));

        let tick = GameEvent::clock_ticked(5, 59);
        assert_eq!(tick.player_id, None);

        let ended = GameEvent::game_ended(5, Some(p), vec![(p, 3)]);
        assert_eq!(ended.player_id, Some(p));
        assert!(ended.is_game_end());
        assert!(!tick.is_game_end());
    }

    #[test]
    fn test_event_json_shape() {
        let event = GameEvent::object_scored(7, PlayerId::HOST, 2, Point::new(3.0, 4.0));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["at"], 7);
        assert_eq!(json["player_id"], 1);
        assert_eq!(json["data"]["ObjectScored"]["new_score"], 2);
    }
}
