//! WebSocket Game Server
//!
//! Async WebSocket relay in front of one `GameSession`.
//! Handles slot assignment, message routing and the countdown clock.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::config::{ConfigError, GameConfig};
use crate::game::local::{Clock, SystemClock, TICK_INTERVAL_MS};
use crate::game::state::PlayerId;
use crate::network::protocol::{ClientMessage, ErrorCode, ProtocolError, ServerMessage};
use crate::network::session::{GameSession, SessionError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections (slots beyond four get an error).
    pub max_connections: usize,
    /// Countdown period.
    pub tick_interval: Duration,
    /// Fixed layout seed for every game.
    pub seed: Option<u64>,
    /// Game tunables.
    pub game: GameConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 16,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            seed: None,
            game: GameConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `STAR_RUSH_*` environment variables. Unset or unparseable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("STAR_RUSH_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("STAR_RUSH_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            seed: std::env::var("STAR_RUSH_SEED").ok().and_then(|v| v.parse().ok()),
            game: defaults.game.clone().with_env_overrides(),
            ..defaults
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Game config rejected at startup.
    #[error("Invalid game config: {0}")]
    Config(#[from] ConfigError),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connected client state.
struct ConnectedClient {
    /// Slot, once assigned.
    player_id: Option<PlayerId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

/// Time source shared by the clock loop and connection tasks.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The one shared game.
    session: Arc<RwLock<GameSession>>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Time source.
    clock: SharedClock,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server on the wall clock.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a server on a custom clock.
    pub fn with_clock(config: ServerConfig, clock: SharedClock) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let session_id = *uuid::Uuid::new_v4().as_bytes();

        let mut session = GameSession::new(session_id, config.game.clone());
        if let Some(seed) = config.seed {
            session = session.with_fixed_seed(seed);
        }

        Self {
            config,
            session: Arc::new(RwLock::new(session)),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
            shutdown_tx,
        }
    }

    /// The shared session.
    pub fn session(&self) -> Arc<RwLock<GameSession>> {
        self.session.clone()
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind and run the server.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        self.config.game.validate()?;
        info!(
            "Star Rush server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );

        let clock_handle = tokio::spawn(Self::run_clock_loop(
            self.session.clone(),
            self.clock.clone(),
            self.config.tick_interval,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        clock_handle.abort();
        Ok(())
    }

    /// Advance the countdown once per interval while a game runs.
    async fn run_clock_loop(
        session: Arc<RwLock<GameSession>>,
        clock: SharedClock,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = clock.now_ms();
                    let events = session.write().await.clock_tick(now);
                    if !events.is_empty() {
                        debug!(now, events = events.len(), "Clock tick");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let session = self.session.clone();
        let clock = self.clock.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let joined = session.write().await.connect(msg_tx.clone());
            let player_id = match joined {
                Ok(id) => id,
                Err(e) => {
                    warn!("Rejecting {}: {}", addr, e);
                    let _ = msg_tx.send(e.to_message()).await;
                    drop(msg_tx);
                    let _ = sender_task.await;
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            if let Some(client) = clients.write().await.get_mut(&addr) {
                client.player_id = Some(player_id);
            }

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(
                                            player_id,
                                            client_msg,
                                            &session,
                                            clock.as_ref(),
                                            &msg_tx,
                                        ).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(Self::decode_error(&e)).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();

            if let Err(e) = session.write().await.disconnect(player_id) {
                debug!("Disconnect of {} after slot was freed: {}", player_id, e);
            }

            let mut clients = clients.write().await;
            if let Some(client) = clients.remove(&addr) {
                info!(
                    %player_id,
                    connected_for = ?client.connected_at.elapsed(),
                    idle_for = ?client.last_activity.elapsed(),
                    "Connection closed for {}",
                    addr
                );
            }
        });
    }

    /// Route one decoded message into the session.
    async fn handle_client_message(
        player_id: PlayerId,
        msg: ClientMessage,
        session: &RwLock<GameSession>,
        clock: &(dyn Clock + Send + Sync),
        msg_tx: &mpsc::Sender<ServerMessage>,
    ) {
        let now = clock.now_ms();
        let result = match msg {
            ClientMessage::Ready => {
                session.write().await.ready(player_id, now).map(|_| ())
            }
            ClientMessage::Move(request) => {
                session.write().await.handle_move(player_id, request, now).map(|_| ())
            }
        };

        if let Err(e) = result {
            debug!(%player_id, "Request rejected: {}", e);
            let _ = msg_tx.send(e.to_message()).await;
        }
    }

    fn decode_error(e: &ProtocolError) -> ServerMessage {
        let code = match e {
            ProtocolError::UnsupportedVersion(_) => ErrorCode::VersionMismatch,
            _ => ErrorCode::MalformedMessage,
        };
        ServerMessage::error(code, e.to_string())
    }
}
