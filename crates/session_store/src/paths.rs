use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".soul-chat";
pub const STATE_FILE: &str = "state.json";

#[must_use]
pub fn state_root(cwd: &Path) -> PathBuf {
    cwd.join(STATE_DIR)
}

#[must_use]
pub fn state_file_path(cwd: &Path) -> PathBuf {
    state_root(cwd).join(STATE_FILE)
}
