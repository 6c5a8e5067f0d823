//! Destination validation.
//!
//! The object at the destination is inspected with `symlink_metadata`, the
//! same non-following view the final rename has of it, and checked against
//! two explicit tables: file kinds a rename must never replace, and mode
//! bits that make a file unsafe to swap. Anything not listed is allowed,
//! including kinds this platform reports but we cannot classify.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::SymlinkPolicy;
use crate::error::{AtomicError, AtomicResult};

/// Maximum number of links followed under [`SymlinkPolicy::Follow`].
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Classification of an existing filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Regular,
    Directory,
    Symlink,
    NamedPipe,
    Socket,
    CharDevice,
    BlockDevice,
    /// Reported by the OS but not one of the kinds above.
    Unknown,
}

/// Kinds that are always rejected, with the message reported.
const DISALLOWED_KINDS: &[(DestinationKind, &str)] = &[
    (DestinationKind::Directory, "cannot write to a directory"),
    (DestinationKind::NamedPipe, "cannot write to a named pipe (FIFO)"),
    (DestinationKind::Socket, "cannot write to a socket"),
    (DestinationKind::CharDevice, "cannot write to a character device file"),
    (DestinationKind::BlockDevice, "cannot write to a block device file"),
];

/// Special mode bits that are always rejected.
const DISALLOWED_MODE_BITS: &[(u32, &str)] = &[
    (0o4000, "cannot write to a setuid file"),
    (0o2000, "cannot write to a setgid file"),
    (0o1000, "cannot write to a sticky bit file"),
];

impl DestinationKind {
    /// Classify from metadata obtained without following links.
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::FileTypeExt;

        let ft = meta.file_type();
        if ft.is_file() {
            Self::Regular
        } else if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_fifo() {
            Self::NamedPipe
        } else if ft.is_socket() {
            Self::Socket
        } else if ft.is_char_device() {
            Self::CharDevice
        } else if ft.is_block_device() {
            Self::BlockDevice
        } else {
            Self::Unknown
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_file() {
            Self::Regular
        } else if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            Self::Unknown
        }
    }

    /// Reason this kind may not be replaced, or `None` if it may.
    ///
    /// `Symlink` is not in the table; it is decided by [`SymlinkPolicy`].
    pub fn rejection(self) -> Option<&'static str> {
        DISALLOWED_KINDS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, reason)| *reason)
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
const fn mode_bits(_meta: &Metadata) -> u32 {
    0
}

/// Reason the mode bits of `meta` forbid replacing it, if any.
fn mode_rejection(meta: &Metadata) -> Option<&'static str> {
    let mode = mode_bits(meta);
    DISALLOWED_MODE_BITS
        .iter()
        .find(|(bit, _)| mode & bit != 0)
        .map(|(_, reason)| *reason)
}

/// Validate `path` as the destination of an atomic write.
///
/// Returns the path that should actually be replaced: `path` itself, or the
/// end of its link chain under [`SymlinkPolicy::Follow`]. Nothing on disk is
/// modified.
pub fn validate_destination(path: &Path, symlinks: SymlinkPolicy) -> AtomicResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(AtomicError::EmptyPath);
    }

    let effective = match lstat(path)? {
        None => path.to_path_buf(),
        Some(meta) => match DestinationKind::from_metadata(&meta) {
            DestinationKind::Symlink => match symlinks {
                SymlinkPolicy::Replace => path.to_path_buf(),
                SymlinkPolicy::Reject => {
                    return Err(AtomicError::SymlinkRejected {
                        path: path.to_path_buf(),
                    });
                }
                SymlinkPolicy::Follow => {
                    let resolved = resolve_symlinks(path)?;
                    debug!(
                        link = %path.display(),
                        resolved = %resolved.display(),
                        "following destination symlink"
                    );
                    if let Some(meta) = lstat(&resolved)? {
                        check_existing(&resolved, &meta)?;
                    }
                    resolved
                }
            },
            _ => {
                check_existing(path, &meta)?;
                path.to_path_buf()
            }
        },
    };

    check_parent(&effective)?;
    Ok(effective)
}

fn check_existing(path: &Path, meta: &Metadata) -> AtomicResult<()> {
    let reason = DestinationKind::from_metadata(meta)
        .rejection()
        .or_else(|| mode_rejection(meta));
    match reason {
        Some(reason) => Err(AtomicError::UnsupportedDestination {
            path: path.to_path_buf(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_parent(path: &Path) -> AtomicResult<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(AtomicError::ParentNotDirectory {
            path: parent.to_path_buf(),
        }),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Err(AtomicError::MissingParent {
            path: parent.to_path_buf(),
            source,
        }),
        // Other failures surface when the temp file is created.
        Err(_) => Ok(()),
    }
}

/// `symlink_metadata`, with an absent entry mapped to `None`. A parent that
/// is not a directory also means the entry is absent; `check_parent` reports it.
fn lstat(path: &Path) -> AtomicResult<Option<Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(None)
        }
        Err(source) => Err(AtomicError::Stat {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Follow the link chain starting at `path` to the first non-link (or
/// missing) entry. Only the final component is resolved at each hop.
fn resolve_symlinks(path: &Path) -> AtomicResult<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match lstat(&current)? {
            Some(meta) if meta.file_type().is_symlink() => {
                let link = fs::read_link(&current).map_err(|source| AtomicError::Stat {
                    path: current.clone(),
                    source,
                })?;
                current = match current.parent() {
                    Some(dir) if link.is_relative() => dir.join(link),
                    _ => link,
                };
            }
            _ => return Ok(current),
        }
    }
    Err(AtomicError::SymlinkLoop {
        path: path.to_path_buf(),
    })
}
