//! Assembles inbound "soul says" events into assistant messages.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use soul_transport::{DeferredContent, SaysBody, SaysEvent};
use tracing::{debug, warn};

use crate::app::MessageId;
use crate::attempt::AttemptGuard;
use crate::error::ChatError;

/// Appends the placeholder message and spawns the task that fills it.
///
/// Must run inside a tokio runtime. Events for stale attempts are dropped.
pub(crate) fn on_says(guard: &AttemptGuard, event: SaysEvent) {
    let is_streaming = event.is_streaming();
    let Some(id) = guard.apply(|app| app.push_assistant_placeholder(is_streaming)) else {
        debug!(generation = guard.generation(), "dropping says event for stale attempt");
        return;
    };

    let guard = guard.clone();
    match event.into_body() {
        SaysBody::Streaming(feed) => {
            tokio::spawn(accumulate_chunks(guard, id, feed.chunks()));
        }
        SaysBody::Deferred(content) => {
            tokio::spawn(complete_once(guard, id, content));
        }
    }
}

/// Replaces the message content with the running buffer after every chunk.
pub(crate) async fn accumulate_chunks(
    guard: AttemptGuard,
    id: MessageId,
    mut chunks: BoxStream<'static, String>,
) {
    let mut buffer = String::new();
    while let Some(chunk) = chunks.next().await {
        buffer.push_str(&chunk);
        let content = buffer.clone();
        if guard.apply(|app| app.replace_content(id, content)).is_none() {
            debug!(message_id = id, "stopping stream for stale attempt");
            return;
        }
    }
}

/// Sets the message content once the deferred value resolves.
pub(crate) async fn complete_once(guard: AttemptGuard, id: MessageId, content: DeferredContent) {
    match content.await {
        Ok(content) => {
            let _ = guard.apply(|app| app.replace_content(id, content));
        }
        Err(error) => {
            warn!(message_id = id, %error, "reply content failed");
            let message = ChatError::Deferred(error).to_string();
            let _ = guard.apply(|app| app.set_error(message));
        }
    }
}
