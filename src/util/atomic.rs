//! Low-level filesystem steps shared by the writer and the write set.
//!
//! Everything here is a thin wrapper over a single syscall (or a short,
//! fixed sequence of them) so the callers can keep their step ordering
//! explicit: sync, chmod, rename, fsync(dir).

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

/// Set the exact permission bits on `path`, bypassing the umask.
#[cfg(unix)]
pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Without unix mode bits only the write permission survives, as read-only.
#[cfg(not(unix))]
pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

/// Set the creation mode on `options` where the platform supports it.
#[cfg(unix)]
pub fn set_create_mode(options: &mut fs::OpenOptions, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(mode);
}

#[cfg(not(unix))]
pub fn set_create_mode(_options: &mut fs::OpenOptions, _mode: u32) {}

/// Fsync the parent directory of `path` so a completed rename survives a crash.
///
/// Best effort: the rename has already made the new content visible, so a
/// failure is logged rather than returned.
pub fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = sync_dir(parent) {
        warn!(dir = %parent.display(), error = %e, "failed to fsync parent directory");
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Rename `from` to `to`, failing with `AlreadyExists` if `to` exists in any
/// form, including an empty directory.
///
/// Uses `renameat2(RENAME_NOREPLACE)` so the check and the rename are one
/// atomic step. Filesystems that do not support the flag fall back to
/// [`rename_checked`].
#[cfg(target_os = "linux")]
pub fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    use rustix::fs::{renameat_with, RenameFlags, CWD};
    use rustix::io::Errno;
    use tracing::debug;

    match renameat_with(CWD, from, CWD, to, RenameFlags::NOREPLACE) {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::INVAL || e == Errno::NOSYS => {
            debug!(to = %to.display(), "RENAME_NOREPLACE unsupported, checking target first");
            rename_checked(from, to)
        }
        Err(e) => Err(io::Error::from_raw_os_error(e.raw_os_error())),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn rename_noreplace(from: &Path, to: &Path) -> io::Result<()> {
    rename_checked(from, to)
}

/// Existence check followed by a plain rename. A racing creator of `to`
/// between the two steps is not detected.
fn rename_checked(from: &Path, to: &Path) -> io::Result<()> {
    match fs::symlink_metadata(to) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::rename(from, to),
        Err(e) => Err(e),
    }
}

/// Duplicate an [`io::Error`], keeping the OS error code when there is one.
pub fn clone_io_error(err: &io::Error) -> io::Error {
    err.raw_os_error().map_or_else(
        || io::Error::new(err.kind(), err.to_string()),
        io::Error::from_raw_os_error,
    )
}
