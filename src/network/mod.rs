//! Network Layer
//!
//! WebSocket relay for remote play.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;
pub mod client;

pub use protocol::{ClientMessage, ServerMessage, Snapshot, ProtocolError, PROTOCOL_VERSION};
pub use session::{GameSession, SessionId, SessionError};
pub use server::{GameServer, ServerConfig, GameServerError};
pub use client::{ClientView, ClientError, ConnectionStatus, RemoteClient, connect};
