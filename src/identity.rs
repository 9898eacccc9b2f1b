//! Session identity resolution: explicit id, then persisted id, then a fresh one.

use session_store::KeyValueStore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Persisted-state key holding the generated session identity.
pub const IDENTITY_KEY: &str = "soul-public-chat-id";

/// Source of globally unique identifiers.
pub trait IdGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Explicit,
    Persisted,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: String,
    pub source: IdentitySource,
}

impl ResolvedIdentity {
    /// Only generated identities are written back.
    #[must_use]
    pub fn should_persist(&self) -> bool {
        self.source == IdentitySource::Generated
    }
}

/// Picks the identity without touching storage.
pub fn resolve(
    explicit: Option<&str>,
    persisted: Option<&str>,
    ids: &dyn IdGenerator,
) -> ResolvedIdentity {
    if let Some(explicit) = explicit.filter(|value| !value.is_empty()) {
        return ResolvedIdentity {
            identity: explicit.to_string(),
            source: IdentitySource::Explicit,
        };
    }

    if let Some(persisted) = persisted.filter(|value| !value.is_empty()) {
        return ResolvedIdentity {
            identity: persisted.to_string(),
            source: IdentitySource::Persisted,
        };
    }

    ResolvedIdentity {
        identity: ids.generate(),
        source: IdentitySource::Generated,
    }
}

/// Resolves against `store`, persisting a freshly generated identity.
///
/// Storage failures never fail resolution: an unreadable store counts as empty and a failed
/// write only loses reuse across restarts.
pub fn resolve_identity(
    explicit: Option<&str>,
    store: &dyn KeyValueStore,
    ids: &dyn IdGenerator,
) -> ResolvedIdentity {
    let has_explicit = explicit.is_some_and(|value| !value.is_empty());
    let persisted = if has_explicit {
        None
    } else {
        match store.get(IDENTITY_KEY) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to read persisted chat id");
                None
            }
        }
    };

    let resolved = resolve(explicit, persisted.as_deref(), ids);
    if resolved.should_persist() {
        match store.set(IDENTITY_KEY, &resolved.identity) {
            Ok(()) => debug!("persisted generated chat id"),
            Err(error) => warn!(%error, "failed to persist generated chat id"),
        }
    }

    resolved
}
