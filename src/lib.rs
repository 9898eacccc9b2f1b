//! Session lifecycle and message streaming for a soul chat client.
//!
//! [`SessionController`] owns exactly one live connection attempt at a time. Each attempt
//! resolves a chat identity, opens a fresh transport through a
//! [`soul_transport::SoulConnector`] and feeds inbound replies into the shared [`ChatApp`]
//! message list. Continuations of superseded or torn-down attempts never change visible
//! state: every mutation re-checks the attempt generation under the state lock.
//!
//! Message updates are keyed by id. Streaming replies replace the message content with the
//! running buffer after each chunk; non-streaming replies set it once. `is_streaming` records
//! the event's declared kind and never changes afterwards.

mod attempt;
mod dispatch;
mod stream;

pub mod app;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod session;

pub use app::{ChatApp, ConnectionState, Message, MessageId, Role};
pub use attempt::Generation;
pub use config::{ChatParams, EnvConfig, ParamOverrides};
pub use error::ChatError;
pub use identity::{IdGenerator, UuidGenerator, IDENTITY_KEY};
pub use session::SessionController;
