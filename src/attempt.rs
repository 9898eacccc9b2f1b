use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::app::ChatApp;

pub type Generation = u64;

/// State shared by the controller and every continuation it spawns.
pub(crate) struct SharedChat {
    app: Mutex<ChatApp>,
    current: AtomicU64,
    revision: watch::Sender<u64>,
}

impl SharedChat {
    pub(crate) fn new() -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            app: Mutex::new(ChatApp::new()),
            current: AtomicU64::new(0),
            revision,
        })
    }

    pub(crate) fn snapshot(&self) -> ChatApp {
        self.lock_app().clone()
    }

    pub(crate) fn read<R>(&self, read: impl FnOnce(&ChatApp) -> R) -> R {
        read(&self.lock_app())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub(crate) fn current_generation(&self) -> Generation {
        self.current.load(Ordering::SeqCst)
    }

    /// Applies `mutate` regardless of attempt, bumping the revision.
    pub(crate) fn mutate<R>(&self, mutate: impl FnOnce(&mut ChatApp) -> R) -> R {
        let result = {
            let mut app = self.lock_app();
            mutate(&mut app)
        };
        self.bump();
        result
    }

    /// Advances the current generation and applies `mutate` under the same lock, so no
    /// continuation of an older attempt can interleave with the switch.
    pub(crate) fn advance<R>(&self, mutate: impl FnOnce(&mut ChatApp) -> R) -> (Generation, R) {
        let (generation, result) = {
            let mut app = self.lock_app();
            let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, mutate(&mut app))
        };
        self.bump();
        (generation, result)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn lock_app(&self) -> MutexGuard<'_, ChatApp> {
        lock_unpoisoned(&self.app)
    }
}

/// Capability handed to an attempt's continuations.
///
/// Every mutation re-checks, under the state lock, that the attempt is neither cancelled nor
/// superseded. A stale guard never changes visible state.
#[derive(Clone)]
pub(crate) struct AttemptGuard {
    generation: Generation,
    cancelled: Arc<AtomicBool>,
    shared: Arc<SharedChat>,
}

impl AttemptGuard {
    pub(crate) fn new(generation: Generation, shared: Arc<SharedChat>) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
            shared,
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
            && self.shared.current_generation() == self.generation
    }

    /// Runs `mutate` only while the attempt is live. Returns `None` for stale attempts.
    pub(crate) fn apply<R>(&self, mutate: impl FnOnce(&mut ChatApp) -> R) -> Option<R> {
        let result = {
            let mut app = self.shared.lock_app();
            if !self.is_live() {
                return None;
            }
            mutate(&mut app)
        };
        self.shared.bump();
        Some(result)
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
