use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use soul_engine_api::experience_url;
use soul_transport::{
    ConnectOptions, Listener, ListenerRegistry, SaidAction, SoulConnection, SoulConnector,
    SubscriptionId, TokenSource, TransportError,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::frames::{decode_server_frame, encode_client_frame, ClientFrame, ServerFrame};
use crate::router::FrameRouter;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Opens one [`WebSocketConnection`] per attempt against `<ws_host>/<organization>/experience`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    ws_host: String,
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(ws_host: impl Into<String>) -> Self {
        Self {
            ws_host: ws_host.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ws_host(&self) -> &str {
        &self.ws_host
    }
}

impl SoulConnector for WebSocketConnector {
    fn open(
        &self,
        options: ConnectOptions,
        tokens: Arc<dyn TokenSource>,
    ) -> Arc<dyn SoulConnection> {
        let url = experience_url(&self.ws_host, &options.organization);
        Arc::new(WebSocketConnection::new(
            url,
            options,
            tokens,
            self.handshake_timeout,
        ))
    }
}

struct OpenSession {
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    reader: JoinHandle<()>,
}

/// Websocket transport for a single attempt. Once disconnected it never reconnects.
pub struct WebSocketConnection {
    url: String,
    options: ConnectOptions,
    tokens: Arc<dyn TokenSource>,
    handshake_timeout: Duration,
    listeners: Arc<ListenerRegistry>,
    closing: Arc<AtomicBool>,
    session: Mutex<Option<OpenSession>>,
}

impl WebSocketConnection {
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        options: ConnectOptions,
        tokens: Arc<dyn TokenSource>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            options,
            tokens,
            handshake_timeout,
            listeners: Arc::new(ListenerRegistry::new()),
            closing: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock_session().is_some()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<OpenSession>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn current_sink(&self) -> Option<Arc<tokio::sync::Mutex<WsSink>>> {
        self.lock_session()
            .as_ref()
            .map(|session| Arc::clone(&session.sink))
    }

    async fn handshake(&self, token: String) -> Result<WsStream, TransportError> {
        let (mut stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| {
                TransportError::Handshake(format!("failed to connect to {}: {error}", self.url))
            })?;

        let frame = encode_client_frame(&ClientFrame::Connect {
            token,
            organization: self.options.organization.clone(),
            blueprint: self.options.blueprint.clone(),
            soul_id: self.options.soul_id.clone(),
        })?;
        stream
            .send(Message::Text(frame))
            .await
            .map_err(|error| TransportError::Handshake(error.to_string()))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Handshake(error.to_string())),
                None => {
                    return Err(TransportError::Handshake(
                        "connection closed during handshake".to_string(),
                    ))
                }
            };

            match message {
                Message::Text(text) => match decode_server_frame(&text)? {
                    Some(ServerFrame::Ready) => return Ok(stream),
                    Some(ServerFrame::Error { message }) => {
                        return Err(TransportError::Handshake(message))
                    }
                    Some(frame) => debug!(?frame, "ignoring frame before ready"),
                    None => debug!("ignoring unknown frame before ready"),
                },
                Message::Close(_) => {
                    return Err(TransportError::Handshake(
                        "server closed the connection during handshake".to_string(),
                    ))
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl SoulConnection for WebSocketConnection {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.is_open() {
            return Ok(());
        }

        let token = self.tokens.fetch_token(&self.options.soul_id).await?;
        let stream = tokio::time::timeout(self.handshake_timeout, self.handshake(token))
            .await
            .map_err(|_| {
                TransportError::Handshake(format!(
                    "handshake timed out after {}s",
                    self.handshake_timeout.as_secs_f64()
                ))
            })??;

        let (sink, stream) = stream.split();
        let sink = Arc::new(tokio::sync::Mutex::new(sink));

        if self.closing.load(Ordering::SeqCst) {
            // disconnect() ran while the handshake was in flight.
            let _ = close_sink(&sink).await;
            return Err(TransportError::Closed);
        }

        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&self.listeners),
            Arc::clone(&self.closing),
        ));
        *self.lock_session() = Some(OpenSession { sink, reader });
        info!(url = %self.url, "websocket session ready");
        Ok(())
    }

    async fn dispatch(&self, action: SaidAction) -> Result<(), TransportError> {
        let sink = self.current_sink().ok_or(TransportError::NotConnected)?;
        let frame = encode_client_frame(&ClientFrame::Dispatch {
            action: action.action,
            name: action.name,
            content: action.content,
        })?;

        let mut sink = sink.lock().await;
        sink.send(Message::Text(frame))
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        let Some(session) = self.lock_session().take() else {
            return Ok(());
        };

        let outcome = match tokio::time::timeout(CLOSE_GRACE, close_sink(&session.sink)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url = %self.url, "close handshake timed out");
                Ok(())
            }
        };
        session.reader.abort();
        outcome
    }
}

async fn close_sink(sink: &tokio::sync::Mutex<WsSink>) -> Result<(), TransportError> {
    let mut sink = sink.lock().await;
    sink.send(Message::Close(None))
        .await
        .map_err(|error| TransportError::Send(error.to_string()))?;
    if let Err(error) = sink.close().await {
        debug!(%error, "websocket close did not complete cleanly");
    }
    Ok(())
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    listeners: Arc<ListenerRegistry>,
    closing: Arc<AtomicBool>,
) {
    let mut router = FrameRouter::default();
    let failure = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_server_frame(&text) {
                Ok(Some(frame)) => router.route(frame, &listeners),
                Ok(None) => debug!("ignoring unknown frame"),
                Err(error) => warn!(%error, "dropping malformed frame"),
            },
            Some(Ok(Message::Close(_))) | None => break None,
            Some(Ok(_)) => {}
            Some(Err(error)) => break Some(error),
        }
    };

    router.close_all();
    if closing.load(Ordering::SeqCst) {
        return;
    }
    match failure {
        Some(error) => warn!(%error, "websocket read failed"),
        None => warn!("websocket closed by server"),
    }
    listeners.emit_error(&TransportError::Closed);
}
