//! `oa-atomicwriter` — atomic file replacement via temp file + rename.
//!
//! Readers of a destination written through this crate see either its
//! previous complete contents or the new complete contents, never a partial
//! file and never a missing one.
//!
//! # Components
//!
//! - [`AtomicFileWriter`] / [`write_file`] — replace one file. Bytes go to a
//!   hidden sibling temp file which is synced, chmod'ed to the exact
//!   requested mode and renamed over the destination on `close`.
//! - [`WriteSet`] — stage several files in a private directory and rename
//!   the directory onto a new target path in one step.
//! - [`validate_destination`] — the policy shared by both for which existing
//!   objects may be replaced.
//!
//! # Architecture
//!
//! ```text
//! open ─→ validate ─→ temp sibling ─→ write* ─→ close
//!                                                 │ sync → chmod → rename → fsync(dir)
//!                                                 └ remove leftover temp (every path)
//!
//! WriteSet::new ─→ write_file / open_file* ─→ commit (renameat2 NOREPLACE)
//!                                          └→ cancel (remove_dir_all)
//! ```
//!
//! Both rely on rename being atomic within one volume; nothing here ever
//! falls back to copy + delete.

pub mod config;
pub mod error;
pub mod util;
pub mod validate;
pub mod write_set;
pub mod writer;

pub use config::{SymlinkPolicy, WriterOptions};
pub use error::{AtomicError, AtomicResult};
pub use validate::{validate_destination, DestinationKind};
pub use write_set::{CommitError, StagedFile, WriteSet};
pub use writer::{write_file, write_file_with_options, AtomicFileWriter};
