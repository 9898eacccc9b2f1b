//! Outbound user messages.

use std::sync::Arc;

use soul_transport::{said, SoulConnection, USER_SPEAKER};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::attempt::AttemptGuard;
use crate::error::ChatError;

/// Appends the user message and forwards it over `connection`.
///
/// Returns `None` without touching state when the text is blank, the attempt is stale or the
/// connection is not `connected`. A failed send keeps the message and fills the error banner.
pub(crate) fn submit(
    guard: &AttemptGuard,
    connection: &Arc<dyn SoulConnection>,
    text: &str,
) -> Option<JoinHandle<()>> {
    let content = text.trim();
    if content.is_empty() {
        return None;
    }

    let appended = guard.apply(|app| {
        if !app.state().is_connected() {
            return false;
        }
        app.push_user(content);
        app.clear_input();
        true
    });
    if appended != Some(true) {
        return None;
    }

    let action = said(USER_SPEAKER, content);
    let guard = guard.clone();
    let connection = Arc::clone(connection);
    Some(tokio::spawn(async move {
        if let Err(error) = connection.dispatch(action).await {
            warn!(%error, "failed to dispatch user message");
            let message = ChatError::Dispatch(error).to_string();
            let _ = guard.apply(|app| app.set_error(message));
        }
    }))
}
