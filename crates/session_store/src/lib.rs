//! Small persisted key/value state for the chat client.
//!
//! The store holds string values keyed per browsing context, such as the resolved
//! session identity. Nothing here knows about UI lifecycles; callers read and write
//! explicitly.

mod error;
mod paths;
mod store;

pub use error::SessionStoreError;
pub use paths::{state_file_path, state_root, STATE_DIR, STATE_FILE};
pub use store::{FileStore, KeyValueStore, MemoryStore};
