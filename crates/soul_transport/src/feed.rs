use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FeedState {
    chunks: Vec<String>,
    closed: bool,
}

#[derive(Debug, Default)]
struct FeedShared {
    state: Mutex<FeedState>,
    changed: Notify,
}

/// Append-only log of text chunks for one streaming event.
///
/// Every call to [`ChunkFeed::chunks`] yields the log from its first chunk, in push order,
/// and ends once the writer closes the feed. A closed feed never reopens.
#[derive(Debug, Clone)]
pub struct ChunkFeed {
    shared: Arc<FeedShared>,
}

/// Producer half of a [`ChunkFeed`]. Dropping the writer closes the feed.
#[derive(Debug)]
pub struct ChunkWriter {
    shared: Arc<FeedShared>,
}

impl ChunkFeed {
    /// Creates a connected writer/feed pair.
    #[must_use]
    pub fn channel() -> (ChunkWriter, ChunkFeed) {
        let shared = Arc::new(FeedShared::default());
        (
            ChunkWriter {
                shared: Arc::clone(&shared),
            },
            ChunkFeed { shared },
        )
    }

    /// Builds an already-closed feed from known chunks.
    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (writer, feed) = Self::channel();
        for chunk in chunks {
            writer.push(chunk);
        }
        writer.close();
        feed
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.shared.state).closed
    }

    /// Returns a finite stream over every chunk, starting from the first one.
    #[must_use]
    pub fn chunks(&self) -> BoxStream<'static, String> {
        let shared = Arc::clone(&self.shared);
        stream::unfold((shared, 0usize), |(shared, cursor)| async move {
            loop {
                let changed = shared.changed.notified();
                let next = {
                    let state = lock_unpoisoned(&shared.state);
                    match state.chunks.get(cursor) {
                        Some(chunk) => Some(Some(chunk.clone())),
                        None if state.closed => Some(None),
                        None => None,
                    }
                };
                match next {
                    Some(Some(chunk)) => return Some((chunk, (Arc::clone(&shared), cursor + 1))),
                    Some(None) => return None,
                    None => changed.await,
                }
            }
        })
        .boxed()
    }
}

impl ChunkWriter {
    /// Appends a chunk. Chunks pushed after close are dropped.
    pub fn push(&self, chunk: impl Into<String>) {
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            if state.closed {
                return;
            }
            state.chunks.push(chunk.into());
        }
        self.shared.changed.notify_waiters();
    }

    /// Ends the chunk sequence.
    pub fn close(&self) {
        lock_unpoisoned(&self.shared.state).closed = true;
        self.shared.changed.notify_waiters();
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
