//! Real-time transport: wire envelope, broadcast channels, WebSocket server.

mod broadcast;
mod events;
mod ws_server;

pub use broadcast::{BroadcastHub, Connection, MemoryConnection};
pub use events::{ClientEvent, ServerEvent, VoiceStatus};
pub use ws_server::WsServer;
