//! Multi-file atomic write set.
//!
//! Files are staged beneath a private `write-set-XXXXXX` directory and the
//! whole directory is renamed onto a target that must not exist yet, so an
//! observer of the target sees either nothing or every staged file.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{AtomicError, AtomicResult};
use crate::util::atomic::{rename_noreplace, set_create_mode, sync_parent_dir};

/// Prefix of staging directories.
pub const STAGING_PREFIX: &str = "write-set-";

/// A staging directory whose files become visible together on commit.
#[derive(Debug)]
pub struct WriteSet {
    root: TempDir,
}

impl WriteSet {
    /// Create a set staged under the system temp directory.
    ///
    /// Commit renames the staging root, so the system temp directory must be
    /// on the same volume as the eventual target. Use [`new_in`](Self::new_in)
    /// otherwise.
    pub fn new() -> AtomicResult<Self> {
        let root = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir()
            .map_err(|source| AtomicError::CreateTemp {
                dir: std::env::temp_dir(),
                source,
            })?;
        Ok(Self::from_root(root))
    }

    /// Create a set staged under `dir`.
    pub fn new_in(dir: impl AsRef<Path>) -> AtomicResult<Self> {
        let dir = dir.as_ref();
        let root = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(dir)
            .map_err(|source| AtomicError::CreateTemp {
                dir: dir.to_path_buf(),
                source,
            })?;
        Ok(Self::from_root(root))
    }

    fn from_root(root: TempDir) -> Self {
        debug!(root = %root.path().display(), "created write set");
        Self { root }
    }

    /// Current staging location. Diagnostic only: it changes on commit.
    pub fn location(&self) -> &Path {
        self.root.path()
    }

    /// Resolve a staged name beneath the root, rejecting names that could
    /// land outside it.
    fn staged_path(&self, name: &Path) -> AtomicResult<PathBuf> {
        let mut normal = 0usize;
        for component in name.components() {
            match component {
                Component::Normal(_) => normal += 1,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(AtomicError::InvalidStagedName {
                        name: name.to_path_buf(),
                    });
                }
            }
        }
        if normal == 0 {
            return Err(AtomicError::InvalidStagedName {
                name: name.to_path_buf(),
            });
        }
        Ok(self.root.path().join(name))
    }

    /// Stage `data` as `name`, synced and closed before returning.
    ///
    /// `mode` is applied at creation and is subject to the umask.
    pub fn write_file(&self, name: impl AsRef<Path>, data: &[u8], mode: u32) -> AtomicResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let mut file = self.open_file(name, &options, mode)?;

        let outcome = match file.write(data) {
            Ok(n) if n < data.len() => Err(AtomicError::ShortWrite {
                path: file.path.clone(),
                written: n,
                expected: data.len(),
            }),
            Ok(_) => Ok(()),
            Err(source) => Err(AtomicError::Write {
                path: file.path.clone(),
                source,
            }),
        };

        let closed = file.close();
        outcome.and(closed)
    }

    /// Open a staged file with caller-chosen flags. The returned handle syncs
    /// before it closes.
    pub fn open_file(
        &self,
        name: impl AsRef<Path>,
        options: &OpenOptions,
        mode: u32,
    ) -> AtomicResult<StagedFile> {
        let path = self.staged_path(name.as_ref())?;
        let mut options = options.clone();
        set_create_mode(&mut options, mode);
        let file = options.open(&path).map_err(|source| AtomicError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(StagedFile {
            file: Some(file),
            path,
        })
    }

    /// Create `name` and any missing parents inside the staging root.
    pub fn create_dir_all(&self, name: impl AsRef<Path>) -> AtomicResult<()> {
        let path = self.staged_path(name.as_ref())?;
        fs::create_dir_all(&path).map_err(|source| AtomicError::Io { path, source })
    }

    /// Discard the set and everything staged in it. A root that is already
    /// gone is not an error.
    pub fn cancel(self) -> AtomicResult<()> {
        let path = self.root.path().to_path_buf();
        match self.root.close() {
            Ok(()) => {
                debug!(root = %path.display(), "cancelled write set");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AtomicError::Cleanup { path, source }),
        }
    }

    /// Rename the staging root to `target`, making every staged file visible
    /// at once.
    ///
    /// `target` must not exist (not even as an empty directory) and its
    /// parent must. On failure nothing moves and the set is handed back in
    /// the error.
    pub fn commit(self, target: impl AsRef<Path>) -> Result<PathBuf, CommitError> {
        let target = target.as_ref();
        if let Err(source) = rename_noreplace(self.root.path(), target) {
            warn!(
                root = %self.root.path().display(),
                target = %target.display(),
                error = %source,
                "write set commit failed"
            );
            return Err(CommitError {
                target: target.to_path_buf(),
                source,
                set: self,
            });
        }

        // The directory now lives at `target`; stop TempDir from deleting it.
        let _ = self.root.keep();
        sync_parent_dir(target);
        info!(target = %target.display(), "committed write set");
        Ok(target.to_path_buf())
    }
}

impl fmt::Display for WriteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.path().display())
    }
}

/// A failed [`WriteSet::commit`]. Still owns the set, so the caller can
/// retry elsewhere or cancel; dropping it removes the staged files.
#[derive(Debug, thiserror::Error)]
#[error("failed to commit write set to {target}: {source}")]
pub struct CommitError {
    target: PathBuf,
    #[source]
    source: io::Error,
    set: WriteSet,
}

impl CommitError {
    /// The target the commit tried to create.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The rename failure.
    pub const fn io_error(&self) -> &io::Error {
        &self.source
    }

    /// Take back the unspent write set.
    pub fn into_write_set(self) -> WriteSet {
        self.set
    }
}

impl From<CommitError> for AtomicError {
    fn from(err: CommitError) -> Self {
        Self::Commit {
            target: err.target,
            source: err.source,
        }
    }
}

/// Write sink for one staged file. Its contents are synced to storage before
/// the handle closes, whether through [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct StagedFile {
    file: Option<File>,
    path: PathBuf,
}

impl StagedFile {
    /// Path of the staged file inside the staging root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))
    }

    /// Sync and close, reporting failures.
    pub fn close(mut self) -> AtomicResult<()> {
        match self.file.take() {
            Some(file) => file.sync_all().map_err(|source| AtomicError::Sync {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl Write for StagedFile {
    /// Writes the whole buffer or fails, like
    /// [`AtomicFileWriter`](crate::AtomicFileWriter).
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle()?.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!(path = %self.path.display(), error = %e, "failed to sync staged file on drop");
            }
        }
    }
}
