//! Game Session Management
//!
//! One authoritative game shared by up to four connections. Slots 1..4 are
//! handed out on connect, moves and clock ticks run through the simulation,
//! and every accepted transition is broadcast as a full snapshot.

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::core::rng::derive_game_seed;
use crate::game::config::GameConfig;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::replay::GameRecording;
use crate::game::state::{GameState, PlayerId};
use crate::game::tick::{apply_move, start_game, tick_clock, SimError, StepResult};
use crate::network::protocol::{ErrorCode, MoveRequest, ServerMessage, Snapshot};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Session errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// All four slots are taken.
    #[error("Game is full")]
    SessionFull,

    /// The slot has no live connection.
    #[error("Player {0} is not connected")]
    NotConnected(PlayerId),

    /// Only player 1 may start a game.
    #[error("Only player 1 can start the game")]
    NotHost,

    /// A game is already running.
    #[error("Game already in progress")]
    GameInProgress,

    /// The simulation rejected the transition.
    #[error("{0}")]
    Simulation(#[from] SimError),

    /// Slot is not occupied.
    #[error("Player not found")]
    PlayerNotFound,
}

impl SessionError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::SessionFull => ErrorCode::SessionFull,
            SessionError::NotConnected(_) | SessionError::PlayerNotFound => {
                ErrorCode::PlayerNotFound
            }
            SessionError::NotHost => ErrorCode::NotHost,
            SessionError::GameInProgress => ErrorCode::GameInProgress,
            SessionError::Simulation(e) => match e {
                SimError::InvalidIntent { .. } => ErrorCode::InvalidIntent,
                SimError::PlayerNotFound(_) => ErrorCode::PlayerNotFound,
                SimError::GameNotRunning => ErrorCode::GameNotRunning,
                SimError::LayoutGenerationExhausted(_) => ErrorCode::LayoutExhausted,
                SimError::InvalidConfig(_) => ErrorCode::InternalError,
            },
        }
    }

    /// Error message for the offending connection.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// The shared game and its connections.
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Config for every game started here.
    config: GameConfig,
    /// Live connections by slot.
    connections: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    /// Authoritative state (lobby board until the first start).
    state: GameState,
    /// Games started so far; feeds seed derivation.
    games_started: u64,
    /// Overrides seed derivation when set.
    fixed_seed: Option<u64>,
    /// Transitions of the current game.
    recording: Option<GameRecording>,
}

impl GameSession {
    /// Create a new session.
    pub fn new(id: SessionId, config: GameConfig) -> Self {
        Self {
            id,
            state: GameState::lobby(config.clone(), 0),
            config,
            connections: BTreeMap::new(),
            games_started: 0,
            fixed_seed: None,
            recording: None,
        }
    }

    /// Use the same layout seed for every game.
    pub fn with_fixed_seed(mut self, seed: u64) -> Self {
        self.fixed_seed = Some(seed);
        self
    }

    /// Take the lowest free slot and greet the connection with its id and
    /// the current board.
    pub fn connect(
        &mut self,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<PlayerId, SessionError> {
        let player_id = PlayerId::ALL
            .into_iter()
            .find(|id| !self.connections.contains_key(id))
            .ok_or(SessionError::SessionFull)?;

        let greeting = [
            ServerMessage::Init { player_id: player_id.get() },
            ServerMessage::GameStateUpdate { game_state: Snapshot::from_state(&self.state) },
        ];
        for message in greeting {
            deliver(player_id, &sender, message);
        }

        self.connections.insert(player_id, sender);
        info!(%player_id, connected = self.connections.len(), "Player connected");
        Ok(player_id)
    }

    /// Free a slot. The avatar stays on the board.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        self.connections.remove(&player_id).ok_or(SessionError::PlayerNotFound)?;
        info!(%player_id, connected = self.connections.len(), "Player disconnected");

        self.broadcast(ServerMessage::PlayerDisconnected {
            player_id: player_id.get(),
            game_state: Snapshot::from_state(&self.state),
        });
        Ok(())
    }

    /// Start a new game on the host's request.
    pub fn ready(&mut self, from: PlayerId, now: u64) -> Result<Vec<GameEvent>, SessionError> {
        if from != PlayerId::HOST {
            return Err(SessionError::NotHost);
        }
        if self.state.is_running() {
            return Err(SessionError::GameInProgress);
        }

        let seed = self
            .fixed_seed
            .unwrap_or_else(|| derive_game_seed(&self.id, self.games_started));
        let result = start_game(self.config.clone(), seed, now)?;

        self.games_started += 1;
        self.recording = Some(GameRecording::new(self.config.clone(), seed, now));
        info!(seed, game = self.games_started, "Game started");

        let events = self.commit(result);
        self.broadcast(ServerMessage::GameStart { game_state: Snapshot::from_state(&self.state) });
        Ok(events)
    }

    /// Apply a move sent over `from`'s connection.
    pub fn handle_move(
        &mut self,
        from: PlayerId,
        request: MoveRequest,
        now: u64,
    ) -> Result<Vec<GameEvent>, SessionError> {
        if !self.connections.contains_key(&from) {
            return Err(SessionError::NotConnected(from));
        }

        let intent = request.to_intent();
        let result = apply_move(&self.state, intent, now)?;

        if let Some(recording) = self.recording.as_mut() {
            recording.record_move(now, intent);
        }
        let events = self.commit(result);
        self.broadcast_state();
        Ok(events)
    }

    /// One countdown second. No-op unless a game is running.
    pub fn clock_tick(&mut self, now: u64) -> Vec<GameEvent> {
        if !self.state.is_running() {
            return Vec::new();
        }

        let result = tick_clock(&self.state, now);
        if let Some(recording) = self.recording.as_mut() {
            recording.record_tick(now);
        }
        let events = self.commit(result);
        self.broadcast_state();
        events
    }

    fn commit(&mut self, result: StepResult) -> Vec<GameEvent> {
        for event in &result.events {
            match &event.data {
                GameEventData::GameEnded { winner_id, scores } => {
                    info!(?winner_id, ?scores, "Game ended");
                }
                GameEventData::ObjectScored { player_id, new_score, .. } => {
                    info!(%player_id, new_score, "Object scored");
                }
                data => debug!(?data, "Game event"),
            }
        }
        self.state = result.state;
        result.events
    }

    fn broadcast_state(&self) {
        self.broadcast(ServerMessage::GameStateUpdate {
            game_state: Snapshot::from_state(&self.state),
        });
    }

    /// Send a message to every connection without waiting on any of them.
    pub fn broadcast(&self, message: ServerMessage) {
        for (player_id, sender) in &self.connections {
            deliver(*player_id, sender, message.clone());
        }
    }

    /// Send to one connection. A full queue drops the message.
    pub fn send_to(&self, player_id: PlayerId, message: ServerMessage) -> Result<(), SessionError> {
        let sender = self
            .connections
            .get(&player_id)
            .ok_or(SessionError::NotConnected(player_id))?;
        match sender.try_send(message) {
            Err(TrySendError::Closed(_)) => Err(SessionError::NotConnected(player_id)),
            Err(TrySendError::Full(_)) => {
                warn!(%player_id, "Outbound queue full, message dropped");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Current board.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Number of live connections.
    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    /// Is this slot connected?
    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.connections.contains_key(&player_id)
    }

    /// Recording of the current (or last) game.
    pub fn recording(&self) -> Option<&GameRecording> {
        self.recording.as_ref()
    }

    /// Games started in this session.
    pub fn games_started(&self) -> u64 {
        self.games_started
    }
}

/// Queue a message for one connection. Never waits: a connection that
/// stopped reading loses messages instead of stalling the session. Every
/// snapshot carries the full board, so the next one that fits catches it up.
fn deliver(player_id: PlayerId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    match sender.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!(%player_id, "Outbound queue full, message dropped"),
        Err(TrySendError::Closed(_)) => debug!(%player_id, "Dropped message for closed connection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::replay::replay;
    use crate::game::state::GamePhase;

    const T0: u64 = 1_700_000_000_000;

    type Inbox = mpsc::Receiver<ServerMessage>;

    fn create_test_session() -> GameSession {
        let config = GameConfig { duration_secs: 3, ..Default::default() };
        GameSession::new([7; 16], config)
    }

    fn join(session: &mut GameSession) -> (PlayerId, Inbox) {
        let (tx, rx) = mpsc::channel(64);
        let id = session.connect(tx).unwrap();
        (id, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn id(raw: u8) -> PlayerId {
        PlayerId::new(raw).unwrap()
    }

    #[test]
    fn test_slots_assigned_in_order() {
        let mut session = create_test_session();
        let (p1, mut rx1) = join(&mut session);
        let (p2, _) = join(&mut session);
        assert_eq!((p1, p2), (id(1), id(2)));

        let greeting = drain(&mut rx1);
        assert_eq!(greeting[0], ServerMessage::Init { player_id: 1 });
        assert!(matches!(greeting[1], ServerMessage::GameStateUpdate { .. }));
    }

    #[test]
    fn test_session_full() {
        let mut session = create_test_session();
        for _ in 0..4 {
            join(&mut session);
        }
        let (tx, _) = mpsc::channel(8);
        assert_eq!(session.connect(tx).unwrap_err(), SessionError::SessionFull);
        assert_eq!(session.player_count(), 4);
    }

    #[test]
    fn test_freed_slot_reused() {
        let mut session = create_test_session();
        for _ in 0..4 {
            join(&mut session);
        }
        session.disconnect(id(2)).unwrap();
        let (again, _) = join(&mut session);
        assert_eq!(again, id(2));

        assert_eq!(session.disconnect(id(2)), Ok(()));
        assert_eq!(session.disconnect(id(2)), Err(SessionError::PlayerNotFound));
    }

    #[test]
    fn test_only_host_starts() {
        let mut session = create_test_session();
        let (_, mut rx1) = join(&mut session);
        let (p2, _) = join(&mut session);
        drain(&mut rx1);

        assert_eq!(session.ready(p2, T0).unwrap_err(), SessionError::NotHost);
        assert_eq!(session.state().phase(), GamePhase::Waiting);

        let events = session.ready(PlayerId::HOST, T0).unwrap();
        assert!(matches!(events[0].data, GameEventData::GameStarted { .. }));
        assert_eq!(session.state().phase(), GamePhase::Running);
        assert!(matches!(drain(&mut rx1)[0], ServerMessage::GameStart { .. }));

        assert_eq!(
            session.ready(PlayerId::HOST, T0 + 10).unwrap_err(),
            SessionError::GameInProgress
        );
    }

    #[test]
    fn test_moves_broadcast_to_everyone() {
        let mut session = create_test_session();
        let (p1, mut rx1) = join(&mut session);
        let (_, mut rx2) = join(&mut session);
        session.ready(p1, T0).unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        let request = MoveRequest { player_id: 1, dx: 1, dy: 0 };
        session.handle_move(p1, request, T0 + 100).unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            assert!(matches!(msgs[0], ServerMessage::GameStateUpdate { .. }));
        }
    }

    #[test]
    fn test_rejected_move_changes_nothing() {
        let mut session = create_test_session();
        let (p1, mut rx1) = join(&mut session);

        let request = MoveRequest { player_id: 1, dx: 1, dy: 0 };
        assert_eq!(
            session.handle_move(p1, request, T0).unwrap_err(),
            SessionError::Simulation(SimError::GameNotRunning)
        );

        session.ready(p1, T0).unwrap();
        drain(&mut rx1);
        let before = session.state().compute_hash();

        let bad = MoveRequest { player_id: 1, dx: 2, dy: 0 };
        let err = session.handle_move(p1, bad, T0 + 5).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidIntent);
        assert_eq!(session.state().compute_hash(), before);
        assert!(drain(&mut rx1).is_empty());

        assert_eq!(
            session.handle_move(id(3), request, T0 + 5).unwrap_err(),
            SessionError::NotConnected(id(3))
        );
    }

    #[test]
    fn test_clock_ends_game() {
        let mut session = create_test_session();
        let (p1, _rx1) = join(&mut session);

        assert!(session.clock_tick(T0).is_empty());

        session.ready(p1, T0).unwrap();
        session.clock_tick(T0 + 1_000);
        session.clock_tick(T0 + 2_000);
        let events = session.clock_tick(T0 + 3_000);

        assert!(events.iter().any(GameEvent::is_game_end));
        assert_eq!(session.state().phase(), GamePhase::Ended);
        assert!(session.clock_tick(T0 + 4_000).is_empty());

        // Host may start again once the game ended
        session.ready(p1, T0 + 5_000).unwrap();
        assert_eq!(session.games_started(), 2);
    }

    #[test]
    fn test_disconnect_broadcasts_snapshot() {
        let mut session = create_test_session();
        let (p1, mut rx1) = join(&mut session);
        let (p2, _) = join(&mut session);
        session.ready(p1, T0).unwrap();
        drain(&mut rx1);

        session.disconnect(p2).unwrap();
        let msgs = drain(&mut rx1);
        match &msgs[0] {
            ServerMessage::PlayerDisconnected { player_id, game_state } => {
                assert_eq!(*player_id, 2);
                assert_eq!(game_state.players.len(), 4);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        // Avatar stays on the board
        assert!(session.state().get_player(p2).is_some());
    }

    #[test]
    fn test_seeds_differ_per_game_unless_fixed() {
        let mut session = create_test_session();
        let (p1, _rx) = join(&mut session);
        session.ready(p1, T0).unwrap();
        let first = session.state().seed;
        for t in 1..=3 {
            session.clock_tick(T0 + t * 1_000);
        }
        session.ready(p1, T0 + 10_000).unwrap();
        assert_ne!(session.state().seed, first);

        let mut fixed = create_test_session().with_fixed_seed(99);
        let (p1, _rx) = join(&mut fixed);
        fixed.ready(p1, T0).unwrap();
        assert_eq!(fixed.state().seed, 99);
    }

    #[test]
    fn test_stalled_connection_does_not_block_session() {
        let mut session = create_test_session();
        // p1 never reads and its queue holds only the greeting
        let (tx, _stalled) = mpsc::channel(2);
        let p1 = session.connect(tx).unwrap();
        let (p2, mut rx2) = join(&mut session);
        drain(&mut rx2);

        session.ready(p1, T0).unwrap();
        let mut accepted = 0;
        for step in 0..40u64 {
            let request = MoveRequest { player_id: 2, dx: 1, dy: 0 };
            if session.handle_move(p2, request, T0 + step).is_ok() {
                accepted += 1;
            }
        }
        session.clock_tick(T0 + 1_000);

        // The reading connection still saw every transition
        let msgs = drain(&mut rx2);
        assert!(matches!(msgs[0], ServerMessage::GameStart { .. }));
        assert_eq!(msgs.len(), accepted + 2);
        assert!(session.is_connected(p1));
        assert_eq!(session.state().time_remaining, 2);
        assert_eq!(session.send_to(p1, ServerMessage::Init { player_id: 1 }), Ok(()));
    }

    #[test]
    fn test_recording_matches_session() {
        let mut session = create_test_session();
        let (p1, _rx1) = join(&mut session);
        let (p2, _rx2) = join(&mut session);
        session.ready(p1, T0).unwrap();

        for step in 0..20u64 {
            let (from, raw) = if step % 2 == 0 { (p1, 1) } else { (p2, 2) };
            let request = MoveRequest { player_id: raw, dx: 1, dy: (step % 3) as i32 - 1 };
            let _ = session.handle_move(from, request, T0 + step * 40);
        }
        session.clock_tick(T0 + 1_000);

        let (replayed, _) = replay(session.recording().unwrap()).unwrap();
        assert_eq!(replayed.compute_hash(), session.state().compute_hash());
    }
}
