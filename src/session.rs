use std::sync::{Arc, Mutex, MutexGuard};

use session_store::KeyValueStore;
use soul_transport::{
    ConnectOptions, Listener, SoulConnection, SoulConnector, SubscriptionId, TokenSource,
    TransportError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{ChatApp, ConnectionState, Message};
use crate::attempt::{lock_unpoisoned, AttemptGuard, Generation, SharedChat};
use crate::config::ChatParams;
use crate::dispatch;
use crate::error::ChatError;
use crate::identity::{resolve_identity, IdGenerator, UuidGenerator};
use crate::stream;

struct ActiveAttempt {
    guard: AttemptGuard,
    params: ChatParams,
    connection: Arc<dyn SoulConnection>,
    subscriptions: Vec<SubscriptionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedIdentity {
    explicit: Option<String>,
    identity: String,
}

/// Owns the single live connection attempt and the chat state it feeds.
///
/// `start`, `submit` and `teardown` spawn tokio tasks and must be called inside a runtime.
/// Dropping the controller tears the session down.
pub struct SessionController {
    shared: Arc<SharedChat>,
    connector: Arc<dyn SoulConnector>,
    tokens: Arc<dyn TokenSource>,
    store: Arc<dyn KeyValueStore>,
    ids: Arc<dyn IdGenerator>,
    active: Mutex<Option<ActiveAttempt>>,
    identity: Mutex<Option<CachedIdentity>>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn SoulConnector>,
        tokens: Arc<dyn TokenSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            shared: SharedChat::new(),
            connector,
            tokens,
            store,
            ids: Arc::new(UuidGenerator),
            active: Mutex::new(None),
            identity: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Supersedes any current attempt and starts a new one for `params`.
    ///
    /// Returns the new attempt's generation. Blank organization or subroutine leaves the
    /// session `idle`.
    pub fn start(&self, params: &ChatParams) -> Result<Generation, ChatError> {
        self.teardown();
        if params.missing_identifiers() {
            debug!("not starting session without organization and subroutine");
            return Err(ChatError::MissingChatIdentifiers);
        }

        let identity = self.identity_for(params.chat_id.as_deref());
        let (generation, ()) = self.shared.advance(|app| {
            app.dismiss_error();
            app.set_state(ConnectionState::Connecting);
        });
        let guard = AttemptGuard::new(generation, Arc::clone(&self.shared));

        let connection = self.connector.open(
            ConnectOptions {
                organization: params.organization.clone(),
                blueprint: params.subroutine.clone(),
                soul_id: identity,
            },
            Arc::clone(&self.tokens),
        );

        let says_guard = guard.clone();
        let error_guard = guard.clone();
        let subscriptions = vec![
            connection.subscribe(Listener::says(move |event| {
                stream::on_says(&says_guard, event);
            })),
            connection.subscribe(Listener::error(move |error| {
                on_transport_error(&error_guard, error);
            })),
        ];

        *self.lock_active() = Some(ActiveAttempt {
            guard: guard.clone(),
            params: params.clone(),
            connection: Arc::clone(&connection),
            subscriptions,
        });

        debug!(
            generation,
            organization = %params.organization,
            subroutine = %params.subroutine,
            "starting connection attempt"
        );
        tokio::spawn(run_attempt(guard, connection));
        Ok(generation)
    }

    /// Starts a new attempt only when `params` differ from the live attempt's.
    pub fn apply_params(&self, params: &ChatParams) -> Result<Option<Generation>, ChatError> {
        let unchanged = self
            .lock_active()
            .as_ref()
            .is_some_and(|active| active.params == *params);
        if unchanged {
            return Ok(None);
        }
        self.start(params).map(Some)
    }

    /// Cancels the live attempt, drops its listeners and requests transport close.
    ///
    /// Never fails and may be called any number of times.
    pub fn teardown(&self) {
        if let Some(connection) = self.detach() {
            dispose(connection);
        }
    }

    /// Like [`SessionController::teardown`], but waits for the transport close request.
    pub async fn shutdown(&self) {
        if let Some(connection) = self.detach() {
            if let Err(error) = connection.disconnect().await {
                debug!(%error, "ignoring teardown failure");
            }
        }
    }

    /// Marks the attempt cancelled, moves to `idle` and deregisters listeners, in that order.
    fn detach(&self) -> Option<Arc<dyn SoulConnection>> {
        let previous = self.lock_active().take();
        if let Some(active) = &previous {
            active.guard.cancel();
        }

        let (_, changed) = self
            .shared
            .advance(|app| app.set_state(ConnectionState::Idle));

        let active = previous?;
        for id in &active.subscriptions {
            active.connection.unsubscribe(*id);
        }
        debug!(
            generation = active.guard.generation(),
            state_changed = changed,
            "tore down connection attempt"
        );
        Some(active.connection)
    }

    /// Sends `text` as the user over the live connection.
    ///
    /// Returns the forwarding task, or `None` when nothing was sent.
    pub fn submit(&self, text: &str) -> Option<JoinHandle<()>> {
        let (guard, connection) = {
            let active = self.lock_active();
            let active = active.as_ref()?;
            (active.guard.clone(), Arc::clone(&active.connection))
        };
        dispatch::submit(&guard, &connection, text)
    }

    /// Submits the current input buffer.
    pub fn submit_input(&self) -> Option<JoinHandle<()>> {
        let input = self.shared.read(|app| app.input().to_string());
        self.submit(&input)
    }

    pub fn set_input(&self, input: impl Into<String>) {
        let input = input.into();
        self.shared.mutate(|app| app.set_input(input));
    }

    pub fn dismiss_error(&self) -> bool {
        self.shared.mutate(ChatApp::dismiss_error)
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatApp {
        self.shared.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.read(|app| app.state().clone())
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.shared.read(|app| app.messages().to_vec())
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.shared.read(|app| app.error().map(str::to_string))
    }

    /// Identity of the most recent attempt, if one was started.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        lock_unpoisoned(&self.identity)
            .as_ref()
            .map(|cached| cached.identity.clone())
    }

    /// Revision counter bumped after every visible change.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.shared.subscribe()
    }

    fn identity_for(&self, explicit: Option<&str>) -> String {
        let mut cached = lock_unpoisoned(&self.identity);
        if let Some(entry) = cached.as_ref() {
            if entry.explicit.as_deref() == explicit {
                return entry.identity.clone();
            }
        }

        let resolved = resolve_identity(explicit, self.store.as_ref(), self.ids.as_ref());
        debug!(source = ?resolved.source, "resolved chat identity");
        *cached = Some(CachedIdentity {
            explicit: explicit.map(str::to_string),
            identity: resolved.identity.clone(),
        });
        resolved.identity
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveAttempt>> {
        lock_unpoisoned(&self.active)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_attempt(guard: AttemptGuard, connection: Arc<dyn SoulConnection>) {
    let generation = guard.generation();
    let outcome = connection.connect().await;

    let applied = match &outcome {
        Ok(()) => guard.apply(|app| {
            app.set_state(ConnectionState::Connected);
        }),
        Err(error) => {
            let message = ChatError::Connection(error.clone()).to_string();
            guard.apply(|app| app.fail(message))
        }
    };

    match (applied, outcome) {
        (Some(()), Ok(())) => info!(generation, "connected"),
        (Some(()), Err(error)) => warn!(generation, %error, "connection attempt failed"),
        (None, outcome) => {
            debug!(
                generation,
                succeeded = outcome.is_ok(),
                "discarding superseded connection attempt"
            );
            dispose(connection);
        }
    }
}

fn on_transport_error(guard: &AttemptGuard, error: &TransportError) {
    let message = ChatError::Connection(error.clone()).to_string();
    if guard.apply(|app| app.fail(message)).is_some() {
        warn!(generation = guard.generation(), %error, "transport error");
    }
}

/// Best-effort close. Failures are logged and never surfaced.
fn dispose(connection: Arc<dyn SoulConnection>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("no runtime available to close connection");
        return;
    };
    runtime.spawn(async move {
        if let Err(error) = connection.disconnect().await {
            debug!(%error, "ignoring teardown failure");
        }
    });
}
