//! Websocket-backed implementation of the shared `soul_transport` contract.
//!
//! Frames are JSON text messages tagged by `type`. Credentials come from the
//! engine's token endpoint through [`EngineTokenSource`].

mod connection;
pub mod frames;
mod router;
mod token;

pub use connection::{WebSocketConnection, WebSocketConnector, DEFAULT_HANDSHAKE_TIMEOUT};
pub use router::FrameRouter;
pub use token::{map_token_error, EngineTokenSource, TOKEN_FETCH_FAILED, TOKEN_MISSING};
