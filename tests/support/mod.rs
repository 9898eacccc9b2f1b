#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use session_store::{KeyValueStore, MemoryStore};
use soul_chat::{ChatApp, ChatParams, IdGenerator, SessionController};
use soul_transport::{AuthTokenError, TokenSource};
use soul_transport_mock::{MockConnection, MockConnector};
use tokio::sync::oneshot;

/// Hands out `token-<soul id>`, optionally holding individual calls until released.
#[derive(Default)]
pub struct TestTokens {
    gates: Mutex<VecDeque<oneshot::Receiver<Result<String, AuthTokenError>>>>,
    calls: AtomicUsize,
}

impl TestTokens {
    /// The next fetch waits for the returned sender.
    pub fn gate_next(&self) -> oneshot::Sender<Result<String, AuthTokenError>> {
        let (sender, receiver) = oneshot::channel();
        lock_unpoisoned(&self.gates).push_back(receiver);
        sender
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for TestTokens {
    async fn fetch_token(&self, soul_id: &str) -> Result<String, AuthTokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock_unpoisoned(&self.gates).pop_front();
        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(AuthTokenError::new("token gate dropped"))),
            None => Ok(format!("token-{soul_id}")),
        }
    }
}

pub struct FailingTokens(pub &'static str);

#[async_trait]
impl TokenSource for FailingTokens {
    async fn fetch_token(&self, _soul_id: &str) -> Result<String, AuthTokenError> {
        Err(AuthTokenError::new(self.0))
    }
}

/// Deterministic `id-1`, `id-2`, ...
#[derive(Default)]
pub struct SequenceIds {
    next: AtomicUsize,
}

impl IdGenerator for SequenceIds {
    fn generate(&self) -> String {
        format!("id-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub connector: Arc<MockConnector>,
    pub tokens: Arc<TestTokens>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let connector = Arc::new(MockConnector::new());
        let tokens = Arc::new(TestTokens::default());
        let store = Arc::new(store);
        let controller = SessionController::new(
            Arc::clone(&connector) as Arc<dyn soul_transport::SoulConnector>,
            Arc::clone(&tokens) as Arc<dyn TokenSource>,
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
        )
        .with_id_generator(Arc::new(SequenceIds::default()));

        Self {
            controller,
            connector,
            tokens,
            store,
        }
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.connector
            .opened()
            .get(index)
            .cloned()
            .unwrap_or_else(|| panic!("connection {index} was not opened"))
    }

    pub async fn connected(&self, params: &ChatParams) -> Arc<MockConnection> {
        self.controller.start(params).expect("start");
        wait_for(&self.controller, |app| app.state().is_connected()).await;
        self.connector.last_opened().expect("opened connection")
    }
}

pub fn params() -> ChatParams {
    ChatParams::new("acme", "samantha")
}

/// Waits until `predicate` holds for the controller's state.
pub async fn wait_for(
    controller: &SessionController,
    mut predicate: impl FnMut(&ChatApp) -> bool,
) -> ChatApp {
    let mut changes = controller.subscribe_changes();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = controller.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            if changes.changed().await.is_err() {
                panic!("change channel closed");
            }
        }
    })
    .await
    .expect("condition should be reached")
}

/// Lets spawned continuations run before a negative assertion.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
