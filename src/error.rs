//! Error types for the oa-atomicwriter crate.

use std::path::PathBuf;

/// Errors raised while validating, writing, finalizing or cleaning up.
#[derive(Debug, thiserror::Error)]
pub enum AtomicError {
    /// Destination path was empty.
    #[error("file name is empty")]
    EmptyPath,

    /// Destination exists as an object a rename must not replace.
    #[error("{reason}: {path}")]
    UnsupportedDestination { path: PathBuf, reason: &'static str },

    /// Destination is a symlink and the policy rejects symlinks.
    #[error("cannot write to a symbolic link directly: {path}")]
    SymlinkRejected { path: PathBuf },

    /// Following the destination's symlinks did not terminate.
    #[error("too many levels of symbolic links: {path}")]
    SymlinkLoop { path: PathBuf },

    /// Parent directory of the destination does not exist.
    #[error("invalid file path: parent directory does not exist: {path}")]
    MissingParent {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parent of the destination exists but is not a directory.
    #[error("invalid file path: parent is not a directory: {path}")]
    ParentNotDirectory { path: PathBuf },

    /// Inspecting the destination failed for a reason other than absence.
    #[error("failed to stat output path {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Staged name is absolute or escapes the write-set root.
    #[error("invalid staged file name: {name}")]
    InvalidStagedName { name: PathBuf },

    /// Temp file or staging directory could not be created.
    #[error("failed to create temporary file in {dir}: {source}")]
    CreateTemp {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write call failed.
    #[error("write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write accepted fewer bytes than requested.
    #[error("short write to {path}: {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    /// Flushing contents to storage failed.
    #[error("failed to sync {path}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Applying the configured mode to the temp file failed.
    #[error("failed to set permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Swapping the temp file into place failed.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renaming a write-set root onto its target failed.
    #[error("failed to commit write set to {target}: {source}")]
    Commit {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing a temp artifact failed after every other step succeeded.
    #[error("failed to remove temporary {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on a staged file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AtomicError {
    /// The underlying I/O error kind, if this error wraps one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::MissingParent { source, .. }
            | Self::Stat { source, .. }
            | Self::CreateTemp { source, .. }
            | Self::Write { source, .. }
            | Self::Sync { source, .. }
            | Self::Permissions { source, .. }
            | Self::Rename { source, .. }
            | Self::Commit { source, .. }
            | Self::Cleanup { source, .. }
            | Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Whether this error came from destination or name validation, in
    /// which case nothing on disk was touched.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPath
                | Self::UnsupportedDestination { .. }
                | Self::SymlinkRejected { .. }
                | Self::SymlinkLoop { .. }
                | Self::MissingParent { .. }
                | Self::ParentNotDirectory { .. }
                | Self::Stat { .. }
                | Self::InvalidStagedName { .. }
        )
    }
}

/// Convenience result type for oa-atomicwriter operations.
pub type AtomicResult<T> = Result<T, AtomicError>;
