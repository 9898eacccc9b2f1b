use std::collections::HashMap;

use soul_transport::{ChunkFeed, ChunkWriter, ListenerRegistry, SaysEvent, TransportError};
use tokio::sync::oneshot;
use tracing::debug;

use crate::frames::ServerFrame;

/// Turns decoded server frames into listener events for one open session.
///
/// Open streams and pending deferred contents are keyed by the server's message id.
#[derive(Debug, Default)]
pub struct FrameRouter {
    streams: HashMap<String, ChunkWriter>,
    pending: HashMap<String, oneshot::Sender<String>>,
}

impl FrameRouter {
    pub fn route(&mut self, frame: ServerFrame, listeners: &ListenerRegistry) {
        match frame {
            ServerFrame::Ready => debug!("ignoring ready frame on open session"),
            ServerFrame::Error { message } => {
                listeners.emit_error(&TransportError::Server(message));
            }
            ServerFrame::Says {
                id,
                streaming: true,
                ..
            } => {
                let (writer, feed) = ChunkFeed::channel();
                self.streams.insert(id, writer);
                listeners.emit_says(SaysEvent::streaming(feed));
            }
            ServerFrame::Says {
                content: Some(content),
                ..
            } => listeners.emit_says(SaysEvent::complete(content)),
            ServerFrame::Says { id, .. } => {
                let (sender, receiver) = oneshot::channel();
                self.pending.insert(id, sender);
                listeners.emit_says(SaysEvent::deferred(async move {
                    receiver.await.map_err(|_| TransportError::Closed)
                }));
            }
            ServerFrame::Chunk { id, text } => match self.streams.get(&id) {
                Some(writer) => writer.push(text),
                None => debug!(message_id = %id, "chunk for unknown stream"),
            },
            ServerFrame::End { id } => {
                if self.streams.remove(&id).is_none() {
                    debug!(message_id = %id, "end for unknown stream");
                }
            }
            ServerFrame::Content { id, text } => match self.pending.remove(&id) {
                Some(sender) => {
                    let _ = sender.send(text);
                }
                None => debug!(message_id = %id, "content for unknown message"),
            },
        }
    }

    /// Closes every open stream and fails every pending content.
    pub fn close_all(&mut self) {
        self.streams.clear();
        self.pending.clear();
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }
}
