//! Writer configuration.
//!
//! [`WriterOptions`] is serializable so that tools embedding the writer can
//! carry it in their own config files; omitted fields take their defaults.

use serde::{Deserialize, Serialize};

/// Default permission bits for files written without an explicit mode.
pub const DEFAULT_MODE: u32 = 0o644;

/// How an existing symbolic link at the destination is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Accept the link; the final rename replaces the link itself.
    #[default]
    Replace,
    /// Resolve the link chain and replace the file it points at.
    Follow,
    /// Refuse to write through a symlink.
    Reject,
}

/// Options for [`AtomicFileWriter`](crate::AtomicFileWriter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriterOptions {
    /// Exact permission bits for the destination. The umask is not applied.
    pub mode: u32,
    /// Symlink handling at the destination.
    pub symlinks: SymlinkPolicy,
    /// Fsync the destination directory after the rename.
    pub sync_parent_dir: bool,
}

impl WriterOptions {
    /// Default options with the given mode.
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            symlinks: SymlinkPolicy::default(),
            sync_parent_dir: true,
        }
    }
}
