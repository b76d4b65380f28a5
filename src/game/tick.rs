//! Authoritative Simulation
//!
//! Every transition takes the current state by reference and returns the
//! next one. A failed transition returns an error and the caller keeps the
//! state it already had, so no half-applied move is ever observable.
//!
//! Three transitions exist: `start_game`, `apply_move` (one per accepted
//! intent) and `tick_clock` (once per second).

use thiserror::Error;

use crate::core::geometry::Square;
use crate::game::config::{ConfigError, GameConfig};
use crate::game::effects::{apply_powerup, effective_speed};
use crate::game::events::GameEvent;
use crate::game::input::MoveIntent;
use crate::game::layout::{relocate_object, LayoutError};
use crate::game::state::{GameState, PlayerId, SharedObject};

/// Simulation errors. None of them is fatal; the prior state stays valid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A step axis outside `{-1, 0, 1}`.
    #[error("invalid step ({dx}, {dy}): each axis must be -1, 0 or 1")]
    InvalidIntent {
        /// Requested horizontal step
        dx: i32,
        /// Requested vertical step
        dy: i32,
    },

    /// No such player slot.
    #[error("player {0} not found")]
    PlayerNotFound(u32),

    /// Move submitted while no countdown is running.
    #[error("no game is running")]
    GameNotRunning,

    /// A bounded layout search gave up.
    #[error("layout generation exhausted: {0}")]
    LayoutGenerationExhausted(#[from] LayoutError),

    /// The game configuration is unusable.
    #[error("invalid game configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The new state
    pub state: GameState,
    /// Events generated by this transition
    pub events: Vec<GameEvent>,
}

impl StepResult {
    fn unchanged(state: &GameState) -> Self {
        Self { state: state.clone(), events: Vec::new() }
    }

    /// Did this transition end the game?
    pub fn game_ended(&self) -> bool {
        self.events.iter().any(GameEvent::is_game_end)
    }
}

/// Build a fresh running game.
///
/// Layout, positions, scores and timers are all regenerated; nothing is
/// carried over from any previous game.
pub fn start_game(config: GameConfig, seed: u64, now: u64) -> Result<StepResult, SimError> {
    let state = GameState::new_game(config, seed)?;
    let event = GameEvent::game_started(now, seed, state.time_remaining);
    Ok(StepResult { state, events: vec![event] })
}

/// Apply one move intent at time `now` (Unix ms).
///
/// # Order of resolution
///
/// 1. effective speed (boost, then penalty override)
/// 2. step and clamp to the canvas
/// 3. revert if the new footprint hits an obstacle or another player
/// 4. collect every active powerup under the final footprint
/// 5. score and relocate the object if the final footprint touches it
/// 6. persist the mover's position
pub fn apply_move(state: &GameState, intent: MoveIntent, now: u64) -> Result<StepResult, SimError> {
    let (player_id, direction) = intent.validate()?;

    if !state.game_started {
        return Err(SimError::GameNotRunning);
    }

    let mut next = state.clone();
    let mut events = Vec::new();
    let config = &state.config;

    let mover = next
        .get_player(player_id)
        .ok_or(SimError::PlayerNotFound(intent.player_id))?;
    let from = mover.position;

    // 1-2. Step and clamp
    let speed = effective_speed(mover, now, config);
    let target = from
        .offset(direction.dx() as f64 * speed, direction.dy() as f64 * speed)
        .clamp(0.0, config.max_player_coord());

    // 3. Collision revert
    let blocked = is_blocked(&next, player_id, Square::at(target, config.player_size));
    let position = if blocked { from } else { target };
    let footprint = Square::at(position, config.player_size);

    if blocked {
        events.push(GameEvent::move_blocked(now, player_id, from));
    } else if position != from {
        events.push(GameEvent::player_moved(now, player_id, from, position));
    }

    // 4. Powerups
    let collected: Vec<usize> = next
        .powerups
        .iter()
        .enumerate()
        .filter(|(_, p)| p.active && Square::at(p.position, config.powerup_size).overlaps(&footprint))
        .map(|(i, _)| i)
        .collect();

    for index in collected {
        let kind = next.powerups[index].kind;
        next.powerups[index].active = false;
        let affected = apply_powerup(&mut next.players, player_id, kind, now, config);
        events.push(GameEvent::powerup_collected(now, player_id, index, kind, affected));
    }

    // 5. Object pickup: score and teleport in one step. Powerups collected
    // in this move still keep the object off their spot.
    let object = Square::at(next.object.position, config.object_size);
    if !next.object.is_held && object.overlaps(&footprint) {
        let relocated = relocate_object(&mut next.rng, config, &next.obstacles, &state.powerups)?;
        next.object = SharedObject::at(relocated);

        if let Some(player) = next.get_player_mut(player_id) {
            player.score = player.score.saturating_add(1);
            events.push(GameEvent::object_scored(now, player_id, player.score, relocated));
        }
    }

    // 6. Persist
    if let Some(player) = next.get_player_mut(player_id) {
        player.position = position;
    }

    Ok(StepResult { state: next, events })
}

/// Would `footprint` collide for `mover`?
fn is_blocked(state: &GameState, mover: PlayerId, footprint: Square) -> bool {
    let size = state.config.player_size;

    state.obstacles.iter().any(|o| o.footprint().overlaps(&footprint))
        || state
            .players
            .values()
            .filter(|p| p.id != mover)
            .any(|p| p.footprint(size).overlaps(&footprint))
}

/// Advance the countdown by one second at time `now` (Unix ms).
///
/// Expired effect timers are reset to 0. When the countdown reaches zero
/// the game stops and the winner is frozen in the same transition, so no
/// later move can change the result. A tick on a game that is not running
/// changes nothing.
pub fn tick_clock(state: &GameState, now: u64) -> StepResult {
    if !state.game_started {
        return StepResult::unchanged(state);
    }

    let mut next = state.clone();
    next.time_remaining = next.time_remaining.saturating_sub(1);

    for player in next.players.values_mut() {
        player.powerups.clear_expired(now);
    }

    let mut events = vec![GameEvent::clock_ticked(now, next.time_remaining)];

    if next.time_remaining == 0 {
        end_game(&mut next);
        events.push(GameEvent::game_ended(now, next.winner, next.scores()));
    }

    StepResult { state: next, events }
}

/// Stop the countdown and freeze the winner.
fn end_game(state: &mut GameState) {
    state.game_started = false;
    state.winner = state.leader();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Point;
    use crate::game::state::{GamePhase, Obstacle, ObstacleKind, Powerup, PowerupKind};
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000_000;

    fn id(n: u8) -> PlayerId {
        PlayerId::new(n).unwrap()
    }

    /// Running game with no obstacles or powerups.
    fn open_arena() -> GameState {
        let mut state = GameState::new_game(GameConfig::default(), 1).unwrap();
        state.obstacles.clear();
        state.powerups.clear();
        state
    }

    fn step(state: &GameState, player: u32, dx: i32, dy: i32) -> StepResult {
        apply_move(state, MoveIntent::new(player, dx, dy), NOW).unwrap()
    }

    #[test]
    fn test_basic_move() {
        let mut state = open_arena();
        state.get_player_mut(id(1)).unwrap().speed = 2.0;

        let result = step(&state, 1, 1, 0);
        let p1 = result.state.get_player(id(1)).unwrap();
        assert_eq!(p1.position, Point::new(12.0, 10.0));
        assert_eq!(
            result.events,
            vec![GameEvent::player_moved(NOW, id(1), Point::new(10.0, 10.0), Point::new(12.0, 10.0))]
        );

        // Input state untouched
        assert_eq!(state.get_player(id(1)).unwrap().position, Point::new(10.0, 10.0));
    }

    #[test]
    fn test_penalty_overrides_boost_when_moving() {
        let mut state = open_arena();
        {
            let p1 = state.get_player_mut(id(1)).unwrap();
            p1.powerups.speed_boost = NOW + 1_000;
            p1.powerups.speed_penalty = NOW + 1_000;
        }

        let result = step(&state, 1, 1, 0);
        assert_eq!(result.state.get_player(id(1)).unwrap().position.x, 13.0);
    }

    #[test]
    fn test_boosted_move() {
        let mut state = open_arena();
        state.get_player_mut(id(1)).unwrap().powerups.speed_boost = NOW + 1;

        let result = step(&state, 1, 0, 1);
        assert_eq!(result.state.get_player(id(1)).unwrap().position, Point::new(10.0, 25.0));
    }

    #[test]
    fn test_clamped_to_canvas() {
        let mut state = open_arena();
        state.get_player_mut(id(1)).unwrap().position = Point::new(3.0, 0.0);

        let result = step(&state, 1, -1, -1);
        assert_eq!(result.state.get_player(id(1)).unwrap().position, Point::new(0.0, 0.0));

        let result = step(&result.state, 1, -1, -1);
        assert_eq!(result.state.get_player(id(1)).unwrap().position, Point::ZERO);
        assert!(result.events.is_empty());

        let max = state.config.max_player_coord();
        let result = step(&state, 2, 1, 1);
        assert_eq!(result.state.get_player(id(2)).unwrap().position, Point::new(max, max));
    }

    #[test]
    fn test_obstacle_blocks_move() {
        let mut state = open_arena();
        state.obstacles.push(Obstacle {
            position: Point::new(45.0, 0.0),
            size: 60.0,
            kind: ObstacleKind::Ice,
        });
        let before = state.get_player(id(1)).unwrap().clone();

        let result = step(&state, 1, 1, 0);
        let after = result.state.get_player(id(1)).unwrap();

        assert_eq!(after.position.x.to_bits(), before.position.x.to_bits());
        assert_eq!(after.position.y.to_bits(), before.position.y.to_bits());
        assert_eq!(result.events, vec![GameEvent::move_blocked(NOW, id(1), before.position)]);
    }

    #[test]
    fn test_player_blocks_move() {
        let mut state = open_arena();
        state.get_player_mut(id(2)).unwrap().position = Point::new(45.0, 10.0);

        let result = step(&state, 1, 1, 0);
        assert_eq!(result.state.get_player(id(1)).unwrap().position, Point::new(10.0, 10.0));

        // Touching edges is allowed
        state.get_player_mut(id(2)).unwrap().position = Point::new(50.0, 10.0);
        let result = step(&state, 1, 1, 0);
        assert_eq!(result.state.get_player(id(1)).unwrap().position, Point::new(20.0, 10.0));
    }

    #[test]
    fn test_speed_powerup_boosts_mover() {
        let mut state = open_arena();
        state.powerups.push(Powerup {
            position: Point::new(25.0, 10.0),
            kind: PowerupKind::Speed,
            active: true,
        });

        let result = step(&state, 1, 1, 0);
        assert!(!result.state.powerups[0].active);
        assert_eq!(result.state.get_player(id(1)).unwrap().powerups.speed_boost, NOW + 8_000);
        assert_eq!(result.state.get_player(id(2)).unwrap().powerups.speed_boost, 0);
    }

    #[test]
    fn test_slow_powerup_penalizes_others() {
        let mut state = open_arena();
        state.powerups.push(Powerup {
            position: Point::new(25.0, 10.0),
            kind: PowerupKind::Slow,
            active: true,
        });

        let result = step(&state, 1, 1, 0);
        assert!(!result.state.powerups[0].active);

        assert_eq!(result.state.get_player(id(1)).unwrap().powerups.speed_penalty, 0);
        for n in 2..=4 {
            assert_eq!(result.state.get_player(id(n)).unwrap().powerups.speed_penalty, NOW + 10_000);
        }
    }

    #[test]
    fn test_multiple_pickups_in_one_move() {
        let mut state = open_arena();
        for (x, kind) in [(25.0, PowerupKind::Speed), (30.0, PowerupKind::Slow)] {
            state.powerups.push(Powerup { position: Point::new(x, 10.0), kind, active: true });
        }

        let result = step(&state, 1, 1, 0);
        assert!(result.state.powerups.iter().all(|p| !p.active));

        let p1 = result.state.get_player(id(1)).unwrap();
        assert_eq!(p1.powerups.speed_boost, NOW + 8_000);
        assert_eq!(p1.powerups.speed_penalty, 0);
    }

    #[test]
    fn test_inactive_powerup_ignored() {
        let mut state = open_arena();
        state.powerups.push(Powerup {
            position: Point::new(25.0, 10.0),
            kind: PowerupKind::Speed,
            active: false,
        });

        let result = step(&state, 1, 1, 0);
        assert_eq!(result.state.get_player(id(1)).unwrap().powerups.speed_boost, 0);
    }

    #[test]
    fn test_object_pickup_scores_and_relocates() {
        let mut state = open_arena();
        state.obstacles.push(Obstacle {
            position: Point::new(300.0, 300.0),
            size: 60.0,
            kind: ObstacleKind::Ice,
        });
        state.object.position = Point::new(45.0, 10.0);

        let result = step(&state, 1, 1, 0);
        let next = &result.state;

        assert_eq!(next.get_player(id(1)).unwrap().score, 1);
        assert!(!next.object.is_held);
        assert_eq!(next.object.holder_id, None);
        assert_ne!(next.object.position, Point::new(45.0, 10.0));

        let object = Square::at(next.object.position, next.config.object_size);
        assert!(next.obstacles.iter().all(|o| !o.footprint().overlaps(&object)));
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, crate::game::events::GameEventData::ObjectScored { new_score: 1, .. })));
    }

    #[test]
    fn test_relocation_failure_rejects_whole_move() {
        let mut state = open_arena();
        state.config.max_layout_attempts = 20;
        // Every object position overlaps this; the blocked mover stays on the object
        state.obstacles.push(Obstacle {
            position: Point::ZERO,
            size: 800.0,
            kind: ObstacleKind::Ice,
        });
        state.object.position = Point::new(15.0, 15.0);

        let result = apply_move(&state, MoveIntent::new(1, 1, 0), NOW);
        assert!(matches!(
            result,
            Err(SimError::LayoutGenerationExhausted(LayoutError::RelocationExhausted { attempts: 20 }))
        ));
        assert_eq!(state.get_player(id(1)).unwrap().score, 0);
    }

    #[test]
    fn test_relocation_avoids_powerup_collected_same_move() {
        let mut state = open_arena();
        // Four walls leave object positions 100..=110 on both axes free
        for (x, y) in [(-1900.0, -500.0), (130.0, -500.0), (-500.0, -1900.0), (-500.0, 130.0)] {
            state.obstacles.push(Obstacle {
                position: Point::new(x, y),
                size: 2000.0,
                kind: ObstacleKind::Ice,
            });
        }
        // ...and this powerup covers all of them
        state.powerups.push(Powerup {
            position: Point::new(100.0, 100.0),
            kind: PowerupKind::Slow,
            active: true,
        });
        state.get_player_mut(id(1)).unwrap().position = Point::new(100.0, 100.0);
        state.object.position = Point::new(100.0, 100.0);

        let result = apply_move(&state, MoveIntent::new(1, 0, 0), NOW);
        assert!(matches!(
            result,
            Err(SimError::LayoutGenerationExhausted(LayoutError::RelocationExhausted { .. }))
        ));
        assert!(state.powerups[0].active);
    }

    #[test]
    fn test_invalid_intents() {
        let state = open_arena();

        assert_eq!(
            apply_move(&state, MoveIntent::new(1, 2, 0), NOW).unwrap_err(),
            SimError::InvalidIntent { dx: 2, dy: 0 }
        );
        assert_eq!(
            apply_move(&state, MoveIntent::new(7, 1, 0), NOW).unwrap_err(),
            SimError::PlayerNotFound(7)
        );
    }

    #[test]
    fn test_move_rejected_when_not_running() {
        let lobby = GameState::lobby(GameConfig::default(), 1);
        assert_eq!(
            apply_move(&lobby, MoveIntent::new(1, 1, 0), NOW).unwrap_err(),
            SimError::GameNotRunning
        );
    }

    #[test]
    fn test_tick_decrements_and_clears_expired() {
        let mut state = open_arena();
        {
            let p1 = state.get_player_mut(id(1)).unwrap();
            p1.powerups.speed_boost = NOW + 1_000;
            p1.powerups.speed_penalty = NOW + 5_000;
        }

        let result = tick_clock(&state, NOW + 1_000);
        assert_eq!(result.state.time_remaining, 59);
        assert_eq!(result.events, vec![GameEvent::clock_ticked(NOW + 1_000, 59)]);

        let timers = result.state.get_player(id(1)).unwrap().powerups;
        assert_eq!(timers.speed_boost, 0);
        assert_eq!(timers.speed_penalty, NOW + 5_000);
    }

    #[test]
    fn test_game_ends_with_first_max_winner() {
        let mut state = open_arena();
        state.time_remaining = 1;
        for (n, score) in [(1, 3), (2, 3), (3, 1), (4, 0)] {
            state.get_player_mut(id(n)).unwrap().score = score;
        }

        let result = tick_clock(&state, NOW);
        let end = &result.state;

        assert_eq!(end.time_remaining, 0);
        assert!(!end.game_started);
        assert_eq!(end.winner, Some(id(1)));
        assert_eq!(end.phase(), GamePhase::Ended);
        assert!(result.game_ended());

        // Terminal: moves rejected, ticks change nothing
        assert_eq!(
            apply_move(end, MoveIntent::new(2, 1, 0), NOW).unwrap_err(),
            SimError::GameNotRunning
        );
        let after = tick_clock(end, NOW + 1_000);
        assert_eq!(after.state.time_remaining, 0);
        assert_eq!(after.state.winner, Some(id(1)));
        assert!(after.events.is_empty());
    }

    #[test]
    fn test_start_game_resets_everything() {
        let first = start_game(GameConfig::default(), 5, NOW).unwrap();
        assert_eq!(first.events, vec![GameEvent::game_started(NOW, 5, 60)]);

        let mut played = first.state.clone();
        played.get_player_mut(id(1)).unwrap().score = 4;

        let second = start_game(GameConfig::default(), 6, NOW).unwrap();
        assert!(second.state.players.values().all(|p| p.score == 0));
        assert_ne!(second.state.obstacles, played.obstacles);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_moves_keep_invariants(
            seed in any::<u64>(),
            moves in prop::collection::vec((1u32..=4, -1i32..=1, -1i32..=1), 1..200),
        ) {
            let mut state = GameState::new_game(GameConfig::default(), seed).unwrap();
            let size = state.config.player_size;
            let max = state.config.max_player_coord();

            for (i, (player, dx, dy)) in moves.into_iter().enumerate() {
                let before = state.clone();
                let now = NOW + i as u64 * 100;
                state = apply_move(&state, MoveIntent::new(player, dx, dy), now).unwrap().state;

                for p in state.players.values() {
                    // Scores never decrease
                    prop_assert!(p.score >= before.players[&p.id].score);

                    prop_assert!(p.position.x >= 0.0 && p.position.x <= max);
                    prop_assert!(p.position.y >= 0.0 && p.position.y <= max);

                    let fp = p.footprint(size);
                    prop_assert!(state.obstacles.iter().all(|o| !o.footprint().overlaps(&fp)));
                    prop_assert!(state
                        .players
                        .values()
                        .filter(|q| q.id != p.id)
                        .all(|q| !q.footprint(size).overlaps(&fp)));
                }

                // Only the mover changes position
                for (pid, p) in &state.players {
                    if pid.get() as u32 != player {
                        prop_assert_eq!(p.position, before.players[pid].position);
                    }
                }
            }
        }

        #[test]
        fn prop_clock_counts_down_to_zero(seed in any::<u64>(), duration in 1u32..20) {
            let config = GameConfig { duration_secs: duration, ..Default::default() };
            let mut state = GameState::new_game(config, seed).unwrap();

            for i in 0..duration + 5 {
                let before = state.time_remaining;
                state = tick_clock(&state, NOW + i as u64 * 1_000).state;
                if before > 0 {
                    prop_assert_eq!(state.time_remaining, before - 1);
                } else {
                    prop_assert_eq!(state.time_remaining, 0);
                }
            }
            prop_assert!(!state.game_started);
            prop_assert!(state.winner.is_some());
        }
    }
}
