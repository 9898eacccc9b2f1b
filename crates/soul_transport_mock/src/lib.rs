//! Deterministic in-memory implementation of the shared `soul_transport` contract.
//!
//! This crate contains no socket or protocol logic and is intended for local
//! development and contract-level integration testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use soul_transport::{
    ChunkFeed, ChunkWriter, ConnectOptions, Listener, ListenerRegistry, SaidAction, SaysEvent,
    SoulConnection, SoulConnector, SubscriptionId, TokenSource, TransportError,
};
use tokio::sync::oneshot;

/// How the next opened connection answers `connect`.
#[derive(Debug)]
enum ConnectPlan {
    Ready,
    Fail(TransportError),
    Gated(oneshot::Receiver<Result<(), TransportError>>),
}

/// Releases a connection whose handshake was scripted with [`MockConnector::script_gated`].
///
/// Dropping the gate without releasing it fails the handshake with [`TransportError::Closed`].
#[derive(Debug)]
pub struct ConnectGate {
    sender: oneshot::Sender<Result<(), TransportError>>,
}

impl ConnectGate {
    pub fn release(self) {
        let _ = self.sender.send(Ok(()));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.sender.send(Err(error));
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    plans: VecDeque<ConnectPlan>,
    opened: Vec<Arc<MockConnection>>,
}

/// Connector handing out [`MockConnection`]s with scripted handshake outcomes.
///
/// Unscripted connections succeed once their token fetch succeeds.
#[derive(Debug, Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
    echo: bool,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose connections answer every dispatch with a streamed echo.
    #[must_use]
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn script_success(&self) {
        lock_unpoisoned(&self.state)
            .plans
            .push_back(ConnectPlan::Ready);
    }

    pub fn script_failure(&self, error: TransportError) {
        lock_unpoisoned(&self.state)
            .plans
            .push_back(ConnectPlan::Fail(error));
    }

    #[must_use]
    pub fn script_gated(&self) -> ConnectGate {
        let (sender, receiver) = oneshot::channel();
        lock_unpoisoned(&self.state)
            .plans
            .push_back(ConnectPlan::Gated(receiver));
        ConnectGate { sender }
    }

    /// Connections opened so far, oldest first.
    #[must_use]
    pub fn opened(&self) -> Vec<Arc<MockConnection>> {
        lock_unpoisoned(&self.state).opened.clone()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        lock_unpoisoned(&self.state).opened.len()
    }

    #[must_use]
    pub fn last_opened(&self) -> Option<Arc<MockConnection>> {
        lock_unpoisoned(&self.state).opened.last().cloned()
    }
}

impl SoulConnector for MockConnector {
    fn open(
        &self,
        options: ConnectOptions,
        tokens: Arc<dyn TokenSource>,
    ) -> Arc<dyn SoulConnection> {
        let mut state = lock_unpoisoned(&self.state);
        let plan = state.plans.pop_front().unwrap_or(ConnectPlan::Ready);
        let connection = Arc::new(MockConnection::new(options, tokens, plan, self.echo));
        state.opened.push(Arc::clone(&connection));
        connection
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    connected: bool,
    connect_calls: usize,
    tokens: Vec<String>,
    dispatched: Vec<SaidAction>,
    disconnect_calls: usize,
    dispatch_failure: Option<TransportError>,
    disconnect_failure: Option<TransportError>,
}

/// In-memory connection with injectable inbound events and recorded outbound calls.
pub struct MockConnection {
    options: ConnectOptions,
    tokens: Arc<dyn TokenSource>,
    listeners: Arc<ListenerRegistry>,
    plan: Mutex<Option<ConnectPlan>>,
    state: Mutex<ConnectionState>,
    echo: bool,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .field("state", &*lock_unpoisoned(&self.state))
            .finish()
    }
}

impl MockConnection {
    const ECHO_DELAY_MS: u64 = 40;

    fn new(
        options: ConnectOptions,
        tokens: Arc<dyn TokenSource>,
        plan: ConnectPlan,
        echo: bool,
    ) -> Self {
        Self {
            options,
            tokens,
            listeners: Arc::new(ListenerRegistry::new()),
            plan: Mutex::new(Some(plan)),
            state: Mutex::new(ConnectionState::default()),
            echo,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock_unpoisoned(&self.state).connected
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        lock_unpoisoned(&self.state).connect_calls
    }

    /// Tokens handed to `connect`, one per successful credential fetch.
    #[must_use]
    pub fn received_tokens(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).tokens.clone()
    }

    #[must_use]
    pub fn dispatched(&self) -> Vec<SaidAction> {
        lock_unpoisoned(&self.state).dispatched.clone()
    }

    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        lock_unpoisoned(&self.state).disconnect_calls
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Makes every later dispatch fail with `error`.
    pub fn fail_dispatch(&self, error: TransportError) {
        lock_unpoisoned(&self.state).dispatch_failure = Some(error);
    }

    /// Makes every later disconnect fail with `error`.
    pub fn fail_disconnect(&self, error: TransportError) {
        lock_unpoisoned(&self.state).disconnect_failure = Some(error);
    }

    /// Emits a streaming says event and returns the writer feeding it.
    pub fn emit_streaming(&self) -> ChunkWriter {
        let (writer, feed) = ChunkFeed::channel();
        self.listeners.emit_says(SaysEvent::streaming(feed));
        writer
    }

    /// Emits a non-streaming says event whose content is already known.
    pub fn emit_complete(&self, content: impl Into<String>) {
        self.listeners.emit_says(SaysEvent::complete(content));
    }

    /// Emits a non-streaming says event whose content resolves through the returned sender.
    ///
    /// Dropping the sender resolves the content to [`TransportError::Closed`].
    pub fn emit_deferred(&self) -> oneshot::Sender<Result<String, TransportError>> {
        let (sender, receiver) = oneshot::channel();
        self.listeners.emit_says(SaysEvent::deferred(async move {
            receiver.await.unwrap_or(Err(TransportError::Closed))
        }));
        sender
    }

    pub fn emit_error(&self, error: TransportError) {
        self.listeners.emit_error(&error);
    }

    fn spawn_echo(&self, content: String) {
        let listeners = Arc::clone(&self.listeners);
        tokio::spawn(async move {
            let (writer, feed) = ChunkFeed::channel();
            listeners.emit_says(SaysEvent::streaming(feed));

            let reply = format!("You said: {content}");
            let mut pending = String::new();
            for ch in reply.chars() {
                pending.push(ch);
                if ch == ' ' {
                    writer.push(std::mem::take(&mut pending));
                    tokio::time::sleep(Duration::from_millis(Self::ECHO_DELAY_MS)).await;
                }
            }
            if !pending.is_empty() {
                writer.push(pending);
            }
            writer.close();
        });
    }
}

#[async_trait]
impl SoulConnection for MockConnection {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    async fn connect(&self) -> Result<(), TransportError> {
        lock_unpoisoned(&self.state).connect_calls += 1;
        let token = self.tokens.fetch_token(&self.options.soul_id).await?;
        lock_unpoisoned(&self.state).tokens.push(token);

        let plan = lock_unpoisoned(&self.plan)
            .take()
            .unwrap_or(ConnectPlan::Ready);
        let outcome = match plan {
            ConnectPlan::Ready => Ok(()),
            ConnectPlan::Fail(error) => Err(error),
            ConnectPlan::Gated(receiver) => receiver.await.unwrap_or(Err(TransportError::Closed)),
        };

        if outcome.is_ok() {
            lock_unpoisoned(&self.state).connected = true;
        }
        outcome
    }

    async fn dispatch(&self, action: SaidAction) -> Result<(), TransportError> {
        let content = {
            let mut state = lock_unpoisoned(&self.state);
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            if let Some(error) = state.dispatch_failure.clone() {
                return Err(error);
            }
            let content = action.content.clone();
            state.dispatched.push(action);
            content
        };

        if self.echo {
            self.spawn_echo(content);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.disconnect_calls += 1;
        state.connected = false;
        match state.disconnect_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use soul_transport::{said, AuthTokenError, SaysBody, USER_SPEAKER};
    use tokio::sync::mpsc;

    use super::*;

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch_token(&self, soul_id: &str) -> Result<String, AuthTokenError> {
            Ok(format!("token-for-{soul_id}"))
        }
    }

    struct RejectingToken;

    #[async_trait]
    impl TokenSource for RejectingToken {
        async fn fetch_token(&self, _soul_id: &str) -> Result<String, AuthTokenError> {
            Err(AuthTokenError::new("Failed to fetch auth token"))
        }
    }

    fn options() -> ConnectOptions {
        ConnectOptions {
            organization: "acme".to_string(),
            blueprint: "samantha".to_string(),
            soul_id: "chat-1".to_string(),
        }
    }

    #[tokio::test]
    async fn unscripted_connection_connects_with_fetched_token() {
        let connector = MockConnector::new();
        let connection = connector.open(options(), Arc::new(StaticToken));

        connection.connect().await.expect("connect should succeed");

        let mock = connector.last_opened().expect("opened connection");
        assert!(mock.is_connected());
        assert_eq!(mock.received_tokens(), vec!["token-for-chat-1".to_string()]);
    }

    #[tokio::test]
    async fn token_failure_is_reported_as_auth_error() {
        let connector = MockConnector::new();
        let connection = connector.open(options(), Arc::new(RejectingToken));

        let error = connection.connect().await.expect_err("connect should fail");

        assert_eq!(
            error,
            TransportError::Auth(AuthTokenError::new("Failed to fetch auth token"))
        );
        assert!(!connector.opened()[0].is_connected());
    }

    #[tokio::test]
    async fn scripted_outcomes_apply_in_open_order() {
        let connector = MockConnector::new();
        connector.script_failure(TransportError::Handshake("rejected".to_string()));
        let gate = connector.script_gated();

        let first = connector.open(options(), Arc::new(StaticToken));
        let second = connector.open(options(), Arc::new(StaticToken));

        assert_eq!(
            first.connect().await,
            Err(TransportError::Handshake("rejected".to_string()))
        );

        let pending = tokio::spawn(async move { second.connect().await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        gate.release();
        assert_eq!(pending.await.expect("join"), Ok(()));
    }

    #[tokio::test]
    async fn dispatch_requires_connection_and_records_actions() {
        let connector = MockConnector::new();
        let connection = connector.open(options(), Arc::new(StaticToken));

        assert_eq!(
            connection.dispatch(said(USER_SPEAKER, "early")).await,
            Err(TransportError::NotConnected)
        );

        connection.connect().await.expect("connect");
        connection
            .dispatch(said(USER_SPEAKER, "hello"))
            .await
            .expect("dispatch");

        let mock = connector.last_opened().expect("opened connection");
        assert_eq!(mock.dispatched(), vec![said(USER_SPEAKER, "hello")]);

        mock.fail_dispatch(TransportError::Send("offline".to_string()));
        assert_eq!(
            connection.dispatch(said(USER_SPEAKER, "again")).await,
            Err(TransportError::Send("offline".to_string()))
        );
    }

    #[tokio::test]
    async fn injected_events_reach_subscribed_listeners_only() {
        let connector = MockConnector::new();
        let connection = connector.open(options(), Arc::new(StaticToken));
        let mock = connector.last_opened().expect("opened connection");

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let id = connection.subscribe(Listener::says(move |event| {
            let _ = events_tx.send(event);
        }));
        assert_eq!(mock.listener_count(), 1);

        let writer = mock.emit_streaming();
        writer.push("Hel");
        writer.push("lo");
        writer.close();
        let event = events_rx.recv().await.expect("streaming event");
        let chunks: Vec<String> = event.chunks().expect("chunks").collect().await;
        assert_eq!(chunks, vec!["Hel", "lo"]);

        let sender = mock.emit_deferred();
        let deferred = events_rx.recv().await.expect("deferred event");
        let _ = sender.send(Ok("Full answer".to_string()));
        match deferred.into_body() {
            SaysBody::Deferred(content) => {
                assert_eq!(content.await, Ok("Full answer".to_string()));
            }
            SaysBody::Streaming(_) => panic!("expected deferred body"),
        }

        assert!(connection.unsubscribe(id));
        assert_eq!(mock.listener_count(), 0);
        mock.emit_complete("unheard");
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_counts_calls_and_reports_scripted_failure() {
        let connector = MockConnector::new();
        let connection = connector.open(options(), Arc::new(StaticToken));
        let mock = connector.last_opened().expect("opened connection");
        connection.connect().await.expect("connect");

        mock.fail_disconnect(TransportError::Closed);
        assert_eq!(connection.disconnect().await, Err(TransportError::Closed));
        assert_eq!(mock.disconnect_calls(), 1);
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn echo_connector_streams_reply_to_dispatch() {
        let connector = MockConnector::echo();
        let connection = connector.open(options(), Arc::new(StaticToken));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        connection.subscribe(Listener::says(move |event| {
            let _ = events_tx.send(event);
        }));
        connection.connect().await.expect("connect");

        connection
            .dispatch(said(USER_SPEAKER, "hi there"))
            .await
            .expect("dispatch");

        let event = events_rx.recv().await.expect("echo event");
        let chunks: Vec<String> = event.chunks().expect("chunks").collect().await;
        assert_eq!(chunks.concat(), "You said: hi there");
    }
}
