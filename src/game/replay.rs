//! Game Recording and Replay
//!
//! A recording is the seed, the config and every transition that was
//! accepted, each with the clock value it ran at. Replaying it through the
//! same transition functions must land on the same state hash.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::hash::StateHash;
use crate::game::config::GameConfig;
use crate::game::events::GameEvent;
use crate::game::input::MoveIntent;
use crate::game::state::GameState;
use crate::game::tick::{apply_move, start_game, tick_clock, SimError};

/// One accepted transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordedTransition {
    /// A move intent applied at `at`
    Move {
        /// Clock value (Unix ms)
        at: u64,
        /// The intent as received
        intent: MoveIntent,
    },
    /// A one-second clock tick at `at`
    Tick {
        /// Clock value (Unix ms)
        at: u64,
    },
}

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A recorded transition failed on replay.
    #[error("transition {index} failed: {source}")]
    Transition {
        /// Position in the recording
        index: usize,
        /// Underlying failure
        source: SimError,
    },

    /// The game itself could not be rebuilt.
    #[error("could not start game: {0}")]
    Start(SimError),

    /// Bytes are not a recording.
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Everything needed to rebuild one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecording {
    /// Game configuration
    pub config: GameConfig,
    /// Layout seed
    pub seed: u64,
    /// Clock value of the start
    pub started_at: u64,
    /// Accepted transitions in order
    pub transitions: Vec<RecordedTransition>,
}

impl GameRecording {
    /// Start a recording for a game built from `config` and `seed`.
    pub fn new(config: GameConfig, seed: u64, started_at: u64) -> Self {
        Self {
            config,
            seed,
            started_at,
            transitions: Vec::with_capacity(1024),
        }
    }

    /// Record an accepted move.
    pub fn record_move(&mut self, at: u64, intent: MoveIntent) {
        self.transitions.push(RecordedTransition::Move { at, intent });
    }

    /// Record a clock tick.
    pub fn record_tick(&mut self, at: u64) {
        self.transitions.push(RecordedTransition::Tick { at });
    }

    /// Number of recorded transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Nothing recorded yet?
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplayError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReplayError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Replay and compare against an expected final hash.
    pub fn verify(&self, expected: &StateHash) -> Result<bool, ReplayError> {
        let (state, _) = replay(self)?;
        Ok(state.compute_hash() == *expected)
    }
}

/// Replay a recording from scratch.
///
/// Returns the final state and every event produced along the way.
pub fn replay(recording: &GameRecording) -> Result<(GameState, Vec<GameEvent>), ReplayError> {
    let start = start_game(recording.config.clone(), recording.seed, recording.started_at)
        .map_err(ReplayError::Start)?;
    let mut state = start.state;
    let mut all_events = start.events;

    for (index, transition) in recording.transitions.iter().enumerate() {
        let result = match *transition {
            RecordedTransition::Move { at, intent } => apply_move(&state, intent, at)
                .map_err(|source| ReplayError::Transition { index, source })?,
            RecordedTransition::Tick { at } => tick_clock(&state, at),
        };
        state = result.state;
        all_events.extend(result.events);
    }

    Ok((state, all_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    const T0: u64 = 1_700_000_000_000;

    /// Play a random game live, recording what was accepted.
    fn play_random(seed: u64, input_seed: u64, seconds: u32) -> (GameState, GameRecording) {
        let config = GameConfig { duration_secs: seconds, ..Default::default() };
        let mut recording = GameRecording::new(config.clone(), seed, T0);
        let mut state = start_game(config, seed, T0).unwrap().state;
        let mut inputs = StdRng::seed_from_u64(input_seed);

        for second in 1..=seconds as u64 {
            for step in 0..40u64 {
                let at = T0 + (second - 1) * 1_000 + step * 25;
                let intent = MoveIntent::new(
                    inputs.gen_range(1..=4),
                    inputs.gen_range(-1..=1),
                    inputs.gen_range(-1..=1),
                );
                if let Ok(result) = apply_move(&state, intent, at) {
                    state = result.state;
                    recording.record_move(at, intent);
                }
            }
            let at = T0 + second * 1_000;
            state = tick_clock(&state, at).state;
            recording.record_tick(at);
        }

        (state, recording)
    }

    #[test]
    fn test_replay_matches_live_game() {
        let (live, recording) = play_random(2024, 7, 10);
        let (replayed, events) = replay(&recording).unwrap();

        assert_eq!(replayed.compute_hash(), live.compute_hash());
        assert_eq!(replayed.winner, live.winner);
        assert!(events.last().unwrap().is_game_end());
        assert!(recording.verify(&live.compute_hash()).unwrap());
    }

    #[test]
    fn test_replay_detects_tampering() {
        let (live, mut recording) = play_random(11, 12, 5);
        recording.seed += 1;
        assert!(!recording.verify(&live.compute_hash()).unwrap());
    }

    #[test]
    fn test_bytes_round_trip() {
        let (_, recording) = play_random(3, 4, 2);
        let bytes = recording.to_bytes().unwrap();
        let decoded = GameRecording::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, recording);

        assert!(matches!(GameRecording::from_bytes(&[1, 2, 3]), Err(ReplayError::Decode(_))));
    }

    #[test]
    fn test_failed_transition_reports_index() {
        let mut recording = GameRecording::new(GameConfig::default(), 1, T0);
        recording.record_tick(T0 + 1_000);
        recording.record_move(T0 + 1_500, MoveIntent::new(1, 5, 0));

        match replay(&recording) {
            Err(ReplayError::Transition { index, source }) => {
                assert_eq!(index, 1);
                assert_eq!(source, SimError::InvalidIntent { dx: 5, dy: 0 });
            }
            other => panic!("expected transition error, got {:?}", other.map(|(s, _)| s.time_remaining)),
        }
    }
}
