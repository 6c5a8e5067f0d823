//! Single-file atomic writer.
//!
//! Bytes go to a hidden temp file next to the destination (`.tmp-<name>XXXXXX`,
//! created with [`tempfile::Builder`] so it shares the destination's volume).
//! [`AtomicFileWriter::close`] then runs the fixed sequence
//! sync → close → chmod → rename → remove-leftover, so readers of the
//! destination only ever see the old file or the complete new one.
//!
//! The writer is single-owner: writes take `&mut self`, and `close`/`cancel`
//! consume it. Dropping it without closing discards the temp file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

use crate::config::WriterOptions;
use crate::error::{AtomicError, AtomicResult};
use crate::util::atomic::{apply_mode, clone_io_error, sync_parent_dir};
use crate::validate::validate_destination;

/// Prefix of temp sibling files.
pub const TEMP_PREFIX: &str = ".tmp-";

/// An in-progress atomic replacement of one file.
#[derive(Debug)]
pub struct AtomicFileWriter {
    file: NamedTempFile,
    destination: PathBuf,
    options: WriterOptions,
    written: bool,
    write_error: Option<io::Error>,
}

impl AtomicFileWriter {
    /// Open a writer for `path` that will land with exactly `mode`.
    pub fn open(path: impl AsRef<Path>, mode: u32) -> AtomicResult<Self> {
        Self::with_options(path, &WriterOptions::with_mode(mode))
    }

    /// Open a writer for `path` with full options.
    pub fn with_options(path: impl AsRef<Path>, options: &WriterOptions) -> AtomicResult<Self> {
        let path = path.as_ref();
        let target = validate_destination(path, options.symlinks)?;
        let destination = std::path::absolute(&target).map_err(|source| AtomicError::Stat {
            path: target.clone(),
            source,
        })?;

        // `absolute` never yields a path without a parent for a non-empty input.
        let dir = destination
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        let base = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{TEMP_PREFIX}{base}");

        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(&dir)
            .map_err(|source| AtomicError::CreateTemp {
                dir: dir.clone(),
                source,
            })?;

        debug!(
            destination = %destination.display(),
            temp = %file.path().display(),
            "opened atomic writer"
        );

        Ok(Self {
            file,
            destination,
            options: options.clone(),
            written: false,
            write_error: None,
        })
    }

    /// Absolute path that `close` will replace.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Path of the temp sibling currently receiving writes.
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// Whether any write call has been made.
    pub const fn has_written(&self) -> bool {
        self.written
    }

    fn record_error(&mut self, err: &io::Error) {
        if self.write_error.is_none() {
            self.write_error = Some(clone_io_error(err));
        }
    }

    /// Finalize: sync, close, apply the mode, and rename onto the
    /// destination.
    ///
    /// The rename is skipped when no write was made (the destination is left
    /// alone) or when a write failed (the recorded error is returned). The
    /// temp file is removed on every path; a removal failure is reported only
    /// if nothing else failed first.
    pub fn close(self) -> AtomicResult<()> {
        let Self {
            file,
            destination,
            options,
            written,
            write_error,
        } = self;

        if let Err(source) = file.as_file().sync_all() {
            let path = file.path().to_path_buf();
            return discard(file.into_temp_path(), Err(AtomicError::Sync { path, source }));
        }

        // Closes the handle; the path is still removed on drop.
        let mut temp = file.into_temp_path();

        let mut result = apply_mode(&temp, options.mode).map_err(|source| AtomicError::Permissions {
            path: temp.to_path_buf(),
            source,
        });

        if result.is_ok() {
            if let Some(source) = write_error {
                warn!(
                    destination = %destination.display(),
                    error = %source,
                    "write failed, leaving destination untouched"
                );
                result = Err(AtomicError::Write {
                    path: destination.clone(),
                    source,
                });
            } else if written {
                let from = temp.to_path_buf();
                match temp.persist(&destination) {
                    Ok(()) => {
                        if options.sync_parent_dir {
                            sync_parent_dir(&destination);
                        }
                        info!(destination = %destination.display(), "atomically replaced file");
                        return Ok(());
                    }
                    Err(err) => {
                        result = Err(AtomicError::Rename {
                            from,
                            to: destination.clone(),
                            source: err.error,
                        });
                        temp = err.path;
                    }
                }
            } else {
                debug!(destination = %destination.display(), "nothing written, skipping rename");
            }
        }

        discard(temp, result)
    }

    /// Abandon the write: remove the temp file and leave the destination
    /// untouched.
    pub fn cancel(self) -> AtomicResult<()> {
        debug!(destination = %self.destination.display(), "cancelling atomic writer");
        discard(self.file.into_temp_path(), Ok(()))
    }
}

/// Remove a leftover temp file, keeping `result` unless it was a success
/// and the removal failed for a reason other than "not found".
fn discard(temp: TempPath, result: AtomicResult<()>) -> AtomicResult<()> {
    let path = temp.to_path_buf();
    match temp.close() {
        Ok(()) => result,
        Err(e) if e.kind() == io::ErrorKind::NotFound => result,
        Err(source) => {
            warn!(temp = %path.display(), error = %source, "failed to remove temp file");
            result.and(Err(AtomicError::Cleanup { path, source }))
        }
    }
}

impl Write for AtomicFileWriter {
    /// Writes the whole buffer or fails; a lower-level write that accepts
    /// zero bytes is reported as `WriteZero`. Any failure is remembered and
    /// blocks the rename in [`close`](Self::close).
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = true;
        match self.file.write_all(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                self.record_error(&err);
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush().inspect_err(|err| self.record_error(err))
    }
}

/// Atomically replace `path` with `data`, landing with exactly `mode`.
///
/// An empty `data` still replaces the destination with an empty file.
pub fn write_file(path: impl AsRef<Path>, data: &[u8], mode: u32) -> AtomicResult<()> {
    write_file_with_options(path, data, &WriterOptions::with_mode(mode))
}

/// [`write_file`] with full options.
///
/// Errors are reported in the order write failure, short write, finalize
/// failure.
pub fn write_file_with_options(
    path: impl AsRef<Path>,
    data: &[u8],
    options: &WriterOptions,
) -> AtomicResult<()> {
    let mut writer = AtomicFileWriter::with_options(path, options)?;
    let destination = writer.destination().to_path_buf();

    let outcome = match writer.write(data) {
        Ok(n) if n < data.len() => {
            writer.record_error(&io::Error::from(io::ErrorKind::WriteZero));
            Err(AtomicError::ShortWrite {
                path: destination,
                written: n,
                expected: data.len(),
            })
        }
        Ok(_) => Ok(()),
        Err(source) => Err(AtomicError::Write {
            path: destination,
            source,
        }),
    };

    let closed = writer.close();
    outcome.and(closed)
}
