//! Remote Client Driver
//!
//! Client side of the relay. `ClientView` tracks what a remote player sees:
//! connection status, assigned slot, the last good snapshot and the last
//! error. `RemoteClient` wraps a WebSocket connection that keeps a view
//! current and forwards intents while connected.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc::{self, error::TrySendError}, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::game::config::GameConfig;
use crate::game::state::{GameState, PlayerId};
use crate::network::protocol::{ClientMessage, MoveRequest, ProtocolError, ServerMessage, Snapshot};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport is down or no slot was assigned. The intent was dropped.
    #[error("Not connected")]
    NotConnected,

    /// WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Unreadable server message.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Transport status as the player sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Live.
    Connected,
    /// Closed or failed.
    Disconnected,
}

/// What one remote player knows about the game.
#[derive(Clone, Debug)]
pub struct ClientView {
    config: GameConfig,
    status: ConnectionStatus,
    player_id: Option<PlayerId>,
    game: Option<GameState>,
    last_error: Option<String>,
}

impl ClientView {
    /// Fresh view, still connecting.
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Connecting,
            player_id: None,
            game: None,
            last_error: None,
        }
    }

    /// Transport status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Slot assigned by `init`.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Last snapshot that decoded cleanly.
    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    /// Last error reported by the server or by decoding.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Transport opened or closed. The last snapshot is kept across drops.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if status == ConnectionStatus::Connected {
            self.last_error = None;
        }
        self.status = status;
    }

    /// Fold one server message into the view.
    ///
    /// A snapshot that fails to decode leaves the previous one in place.
    pub fn apply(&mut self, message: ServerMessage) -> Result<(), ProtocolError> {
        match message {
            ServerMessage::Init { player_id } => {
                self.player_id = PlayerId::new(player_id);
                if self.player_id.is_none() {
                    return self.fail(ProtocolError::MalformedSnapshot(format!(
                        "assigned unknown player id {}",
                        player_id
                    )));
                }
            }
            ServerMessage::GameStart { game_state }
            | ServerMessage::GameStateUpdate { game_state }
            | ServerMessage::PlayerDisconnected { game_state, .. } => {
                self.accept_snapshot(game_state)?;
            }
            ServerMessage::Error(e) => {
                warn!(code = ?e.code, message = %e.message, "Server error");
                self.last_error = Some(e.message);
            }
        }
        Ok(())
    }

    fn accept_snapshot(&mut self, mut snapshot: Snapshot) -> Result<(), ProtocolError> {
        if snapshot.time_remaining.is_none() {
            snapshot.time_remaining = self.game.as_ref().map(|g| g.time_remaining);
        }
        match snapshot.into_state(self.config.clone()) {
            Ok(state) => {
                self.game = Some(state);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: ProtocolError) -> Result<(), ProtocolError> {
        self.last_error = Some(e.to_string());
        Err(e)
    }

    fn assigned(&self) -> Result<PlayerId, ClientError> {
        match (self.status, self.player_id) {
            (ConnectionStatus::Connected, Some(id)) => Ok(id),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Build a move for this player. Fails while disconnected.
    pub fn prepare_move(&self, dx: i32, dy: i32) -> Result<ClientMessage, ClientError> {
        let id = self.assigned()?;
        Ok(ClientMessage::Move(MoveRequest { player_id: u32::from(id.get()), dx, dy }))
    }

    /// Build a start request. Fails while disconnected.
    pub fn prepare_ready(&self) -> Result<ClientMessage, ClientError> {
        self.assigned()?;
        Ok(ClientMessage::Ready)
    }
}

/// A live connection to a relay server.
pub struct RemoteClient {
    view: Arc<RwLock<ClientView>>,
    outgoing: mpsc::Sender<ClientMessage>,
    incoming: mpsc::Receiver<ServerMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Connect to `url` and keep a view current in the background.
pub async fn connect(url: &str, config: GameConfig) -> Result<RemoteClient, ClientError> {
    let view = Arc::new(RwLock::new(ClientView::new(config)));

    info!("Connecting to {}...", url);
    let (ws_stream, _) = connect_async(url).await?;
    view.write().await.set_status(ConnectionStatus::Connected);
    info!("WebSocket connected");

    let (mut write, mut read) = ws_stream.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientMessage>(100);
    let (incoming_tx, incoming_rx) = mpsc::channel::<ServerMessage>(100);

    let reader_view = view.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let server_msg = match ServerMessage::from_json(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("Failed to parse server message: {}", e);
                            reader_view.write().await.last_error = Some(e.to_string());
                            continue;
                        }
                    };
                    if let Err(e) = reader_view.write().await.apply(server_msg.clone()) {
                        warn!("Rejected server snapshot: {}", e);
                    }
                    // The view is already current; the queue is for callers
                    // that want every message and may fall behind.
                    match incoming_tx.try_send(server_msg) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Message queue full, dropped"),
                        Err(TrySendError::Closed(_)) => debug!("Nobody listening for server messages"),
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Server closed connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        reader_view.write().await.set_status(ConnectionStatus::Disconnected);
        debug!("Reader task ended");
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let json = match msg.to_json() {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json)).await {
                error!("Failed to send message: {}", e);
                break;
            }
        }
        let _ = write.close().await;
        debug!("Writer loop ended");
    });

    Ok(RemoteClient { view, outgoing: outgoing_tx, incoming: incoming_rx, reader, writer })
}

impl RemoteClient {
    /// Send one move intent. Dropped with `NotConnected` while down.
    pub async fn send_move(&self, dx: i32, dy: i32) -> Result<(), ClientError> {
        let msg = self.view.read().await.prepare_move(dx, dy)?;
        self.send(msg).await
    }

    /// Ask the server to start a game.
    pub async fn send_ready(&self) -> Result<(), ClientError> {
        let msg = self.view.read().await.prepare_ready()?;
        self.send(msg).await
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outgoing.send(msg).await.map_err(|_| ClientError::NotConnected)
    }

    /// Next server message, after it has been applied to the view.
    /// Messages are dropped while this queue is full; `view()` never lags.
    pub async fn next_message(&mut self) -> Option<ServerMessage> {
        self.incoming.recv().await
    }

    /// Copy of the current view.
    pub async fn view(&self) -> ClientView {
        self.view.read().await.clone()
    }

    /// Close the connection.
    pub async fn close(self) {
        drop(self.outgoing);
        let _ = self.writer.await;
        self.reader.abort();
        self.view.write().await.set_status(ConnectionStatus::Disconnected);
    }
}
