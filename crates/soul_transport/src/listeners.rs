use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{SaysEvent, TransportError};

/// Token returned by `subscribe`; passing it to `unsubscribe` removes the listener.
pub type SubscriptionId = u64;

pub type SaysHandler = Arc<dyn Fn(SaysEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Inbound listener, keyed by the event kind it handles.
#[derive(Clone)]
pub enum Listener {
    Says(SaysHandler),
    Error(ErrorHandler),
}

impl Listener {
    pub fn says(handler: impl Fn(SaysEvent) + Send + Sync + 'static) -> Self {
        Self::Says(Arc::new(handler))
    }

    pub fn error(handler: impl Fn(&TransportError) + Send + Sync + 'static) -> Self {
        Self::Error(Arc::new(handler))
    }
}

/// Subscription bookkeeping shared by transport implementations.
///
/// Handlers are invoked outside the registry lock, so a handler may subscribe or
/// unsubscribe without deadlocking. A listener removed before an emit starts is never
/// called by that emit.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_entries().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers a says event to every says listener in subscription order.
    pub fn emit_says(&self, event: SaysEvent) {
        let handlers: Vec<SaysHandler> = self
            .lock_entries()
            .iter()
            .filter_map(|(_, listener)| match listener {
                Listener::Says(handler) => Some(Arc::clone(handler)),
                Listener::Error(_) => None,
            })
            .collect();

        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Delivers an error to every error listener in subscription order.
    pub fn emit_error(&self, error: &TransportError) {
        let handlers: Vec<ErrorHandler> = self
            .lock_entries()
            .iter()
            .filter_map(|(_, listener)| match listener {
                Listener::Error(handler) => Some(Arc::clone(handler)),
                Listener::Says(_) => None,
            })
            .collect();

        for handler in handlers {
            handler(error);
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
