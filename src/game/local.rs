//! Local Game Driver
//!
//! Runs all four players in one process: intents are applied directly as
//! they arrive and the countdown is driven from a `Clock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::game::config::GameConfig;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::MoveIntent;
use crate::game::replay::GameRecording;
use crate::game::state::GameState;
use crate::game::tick::{apply_move, start_game, tick_clock, SimError, StepResult};

/// Milliseconds between countdown ticks.
pub const TICK_INTERVAL_MS: u64 = 1_000;

/// Source of the current time in Unix milliseconds.
pub trait Clock {
    /// Current time.
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start_ms)) }
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Single-process game: one `GameState`, four local players.
pub struct LocalGame<C: Clock> {
    config: GameConfig,
    clock: C,
    state: GameState,
    recording: Option<GameRecording>,
    next_tick_at: u64,
    last_events: Vec<GameEvent>,
}

impl<C: Clock> LocalGame<C> {
    /// Board in the lobby, waiting for `start`.
    pub fn new(config: GameConfig, clock: C) -> Self {
        Self {
            state: GameState::lobby(config.clone(), 0),
            config,
            clock,
            recording: None,
            next_tick_at: 0,
            last_events: Vec::new(),
        }
    }

    /// Start a fresh game, discarding whatever was on the board.
    pub fn start(&mut self, seed: u64) -> Result<&GameState, SimError> {
        let now = self.clock.now_ms();
        let result = start_game(self.config.clone(), seed, now)?;

        info!(seed, duration = self.config.duration_secs, "Local game started");
        self.recording = Some(GameRecording::new(self.config.clone(), seed, now));
        self.next_tick_at = now + TICK_INTERVAL_MS;
        self.commit(result);
        Ok(&self.state)
    }

    /// Apply one intent. On error the board is unchanged.
    pub fn move_player(&mut self, player_id: u32, dx: i32, dy: i32) -> Result<&GameState, SimError> {
        // Any second that elapsed before this intent is ticked first
        self.pump();

        let now = self.clock.now_ms();
        let intent = MoveIntent::new(player_id, dx, dy);
        let result = apply_move(&self.state, intent, now)?;

        if let Some(recording) = self.recording.as_mut() {
            recording.record_move(now, intent);
        }
        self.commit(result);
        Ok(&self.state)
    }

    /// Run every countdown tick that is due. Returns how many ran.
    pub fn pump(&mut self) -> u32 {
        let now = self.clock.now_ms();
        let mut ticks = 0;

        while self.state.is_running() && self.next_tick_at <= now {
            let at = self.next_tick_at;
            let result = tick_clock(&self.state, at);
            if let Some(recording) = self.recording.as_mut() {
                recording.record_tick(at);
            }
            self.commit(result);
            self.next_tick_at += TICK_INTERVAL_MS;
            ticks += 1;
        }
        ticks
    }

    fn commit(&mut self, result: StepResult) {
        for event in &result.events {
            match &event.data {
                GameEventData::GameEnded { winner_id, scores } => {
                    info!(?winner_id, ?scores, "Local game ended");
                }
                data => debug!(?data, "Game event"),
            }
        }
        self.state = result.state;
        self.last_events = result.events;
    }

    /// Current board.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Events of the most recent transition.
    pub fn last_events(&self) -> &[GameEvent] {
        &self.last_events
    }

    /// Recording of the current game.
    pub fn recording(&self) -> Option<&GameRecording> {
        self.recording.as_ref()
    }

    /// The clock driving this game.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
