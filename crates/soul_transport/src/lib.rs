//! Minimal transport-agnostic contract for one realtime soul session.
//!
//! This crate defines only the connection lifecycle, the inbound event shapes and
//! the credential callback shared by transport implementations. It contains no
//! wire protocol, no HTTP code and no session orchestration.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::BoxStream;

mod feed;
mod listeners;

pub use feed::{ChunkFeed, ChunkWriter};
pub use listeners::{ErrorHandler, Listener, ListenerRegistry, SaysHandler, SubscriptionId};

/// Speaker name used for every outbound user action.
pub const USER_SPEAKER: &str = "User";

/// Credential fetch failure surfaced while a transport requests a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenError {
    message: String,
}

impl AuthTokenError {
    /// Creates a new token error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the user-facing error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AuthTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AuthTokenError {}

impl From<String> for AuthTokenError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for AuthTokenError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure reported by a transport while connecting, sending or receiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The credential callback failed.
    Auth(AuthTokenError),
    /// The socket could not be opened or the server rejected the session.
    Handshake(String),
    /// An operation that needs an open session ran without one.
    NotConnected,
    /// An outbound frame could not be written.
    Send(String),
    /// The server reported an error on an open session.
    Server(String),
    /// The server sent something the transport could not interpret.
    Protocol(String),
    /// The underlying channel closed unexpectedly.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(error) => write!(f, "{error}"),
            Self::Handshake(message) => write!(f, "{message}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Send(message) => write!(f, "failed to send message: {message}"),
            Self::Server(message) => write!(f, "{message}"),
            Self::Protocol(message) => write!(f, "protocol error: {message}"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<AuthTokenError> for TransportError {
    fn from(error: AuthTokenError) -> Self {
        Self::Auth(error)
    }
}

/// Exchanges a session identity for a short-lived credential.
///
/// Transports call this on every credential request; implementations perform exactly
/// one attempt per call and never cache.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self, soul_id: &str) -> Result<String, AuthTokenError>;
}

/// Session parameters for one transport instance. The connector owns the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub organization: String,
    pub blueprint: String,
    pub soul_id: String,
}

/// Outbound perception dispatched to the soul.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaidAction {
    pub action: String,
    pub name: String,
    pub content: String,
}

/// Builds a `said` action for `name`.
#[must_use]
pub fn said(name: impl Into<String>, content: impl Into<String>) -> SaidAction {
    SaidAction {
        action: "said".to_string(),
        name: name.into(),
        content: content.into(),
    }
}

/// Full content that becomes available once, shared by every subscriber.
pub type DeferredContent = Shared<BoxFuture<'static, Result<String, TransportError>>>;

/// Payload of one "soul says" event.
#[derive(Clone)]
pub enum SaysBody {
    Streaming(ChunkFeed),
    Deferred(DeferredContent),
}

/// Inbound "soul says" event. Cloning is cheap and every clone observes the same payload.
#[derive(Clone)]
pub struct SaysEvent {
    body: SaysBody,
}

impl SaysEvent {
    /// Event whose content arrives as a live chunk sequence.
    #[must_use]
    pub fn streaming(feed: ChunkFeed) -> Self {
        Self {
            body: SaysBody::Streaming(feed),
        }
    }

    /// Event whose full content resolves later.
    pub fn deferred<F>(content: F) -> Self
    where
        F: std::future::Future<Output = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            body: SaysBody::Deferred(content.boxed().shared()),
        }
    }

    /// Event whose full content is already known.
    #[must_use]
    pub fn complete(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::deferred(async move { Ok(content) })
    }

    /// Returns the declared event kind.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, SaysBody::Streaming(_))
    }

    #[must_use]
    pub fn body(&self) -> &SaysBody {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> SaysBody {
        self.body
    }

    /// Returns a fresh chunk stream for streaming events.
    #[must_use]
    pub fn chunks(&self) -> Option<BoxStream<'static, String>> {
        match &self.body {
            SaysBody::Streaming(feed) => Some(feed.chunks()),
            SaysBody::Deferred(_) => None,
        }
    }
}

impl fmt::Debug for SaysEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaysEvent")
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// One transport instance owned by a single connection attempt.
#[async_trait]
pub trait SoulConnection: Send + Sync + 'static {
    /// Registers an inbound listener. Safe to call before [`SoulConnection::connect`].
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Removes a listener. Returns false when the id was unknown or already removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Performs the handshake, requesting a credential through the connection's token source.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Sends one user action over an open session.
    async fn dispatch(&self, action: SaidAction) -> Result<(), TransportError>;

    /// Requests transport close. Calling it more than once is allowed.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Factory for fresh transport instances.
pub trait SoulConnector: Send + Sync + 'static {
    fn open(&self, options: ConnectOptions, tokens: Arc<dyn TokenSource>)
        -> Arc<dyn SoulConnection>;
}
