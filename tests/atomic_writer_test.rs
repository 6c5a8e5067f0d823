//! Atomic file writer integration tests.
//!
//! Each test works in its own `tempfile::tempdir()` so tests can run in
//! parallel without sharing destinations.

use std::fs;
use std::io::Write;
use std::path::Path;

use oa_atomicwriter::{
    write_file, write_file_with_options, AtomicError, AtomicFileWriter, SymlinkPolicy,
    WriterOptions,
};

/// Names in `dir` that look like leftover temp siblings.
fn leftover_temps(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("should list dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".tmp-"))
        .collect()
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).expect("should stat").permissions().mode() & 0o7777
}

#[cfg(unix)]
#[test]
fn test_write_file_hello_with_mode() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("out.txt");

    write_file(&dest, b"hello", 0o644).expect("should write");

    assert_eq!(fs::read_to_string(&dest).expect("should read"), "hello");
    assert_eq!(mode_of(&dest), 0o644);
    assert!(leftover_temps(dir.path()).is_empty());
}

#[cfg(unix)]
#[test]
fn test_mode_ignores_umask() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("script.sh");

    // A typical 022 umask would strip group/other write bits.
    write_file(&dest, b"#!/bin/sh\n", 0o777).expect("should write");
    assert_eq!(mode_of(&dest), 0o777);

    write_file(&dest, b"#!/bin/sh\n", 0o600).expect("should rewrite");
    assert_eq!(mode_of(&dest), 0o600);
}

#[test]
fn test_no_writes_is_noop() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("out.txt");

    let writer = AtomicFileWriter::open(&dest, 0o644).expect("should open");
    writer.close().expect("should close");

    assert!(!dest.exists());
    assert!(leftover_temps(dir.path()).is_empty());
}

#[test]
fn test_no_writes_leaves_existing_file() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("out.txt");
    fs::write(&dest, b"previous").expect("should seed");

    AtomicFileWriter::open(&dest, 0o600)
        .expect("should open")
        .close()
        .expect("should close");

    assert_eq!(fs::read(&dest).expect("should read"), b"previous");
}

#[test]
fn test_streaming_writes_replace_existing() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("cache.bin");
    fs::write(&dest, b"old contents that are longer").expect("should seed");

    let mut writer = AtomicFileWriter::open(&dest, 0o644).expect("should open");
    writer.write_all(b"new ").expect("should write");
    writer.write_all(b"contents").expect("should write");

    // Until close the destination is untouched.
    assert_eq!(
        fs::read(&dest).expect("should read"),
        b"old contents that are longer"
    );
    writer.close().expect("should close");

    assert_eq!(fs::read(&dest).expect("should read"), b"new contents");
    assert!(leftover_temps(dir.path()).is_empty());
}

#[test]
fn test_empty_buffer_creates_empty_file() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("empty");

    write_file(&dest, b"", 0o644).expect("should write");
    assert_eq!(fs::read(&dest).expect("should read"), b"");
}

#[test]
fn test_cancel_leaves_destination() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("state.json");
    fs::write(&dest, b"{\"v\":1}").expect("should seed");

    let mut writer = AtomicFileWriter::open(&dest, 0o644).expect("should open");
    writer.write_all(b"{\"v\":2}").expect("should write");
    writer.cancel().expect("should cancel");

    assert_eq!(fs::read(&dest).expect("should read"), b"{\"v\":1}");
    assert!(leftover_temps(dir.path()).is_empty());
}

#[test]
fn test_relative_path_resolved_absolute() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("rel.txt");
    let writer = AtomicFileWriter::open(&dest, 0o644).expect("should open");
    assert!(writer.destination().is_absolute());
    assert!(writer.destination().ends_with("rel.txt"));
    writer.cancel().expect("should cancel");
}

// ---------------------------------------------------------------------------
// Destination validation
// ---------------------------------------------------------------------------

fn assert_rejected(dest: &Path, reason: &str) {
    let err = write_file(dest, b"data", 0o644).expect_err("should reject destination");
    assert!(err.is_validation(), "expected validation error, got {err}");
    assert!(
        err.to_string().contains(reason),
        "error {err} should mention {reason}"
    );
}

#[test]
fn test_rejects_directory() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("sub");
    fs::create_dir(&dest).expect("should create dir");

    assert_rejected(&dest, "cannot write to a directory");
    assert!(dest.is_dir());
    assert!(leftover_temps(dir.path()).is_empty());
}

#[test]
fn test_rejects_missing_parent() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("missing").join("out.txt");

    let err = write_file(&dest, b"data", 0o644).expect_err("should reject");
    assert!(matches!(err, AtomicError::MissingParent { .. }), "got {err}");
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn test_rejects_parent_file() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let parent = dir.path().join("plain");
    fs::write(&parent, b"x").expect("should write");

    let err = write_file(parent.join("out.txt"), b"data", 0o644).expect_err("should reject");
    assert!(matches!(err, AtomicError::ParentNotDirectory { .. }), "got {err}");
}

#[test]
fn test_rejects_empty_path() {
    let err = write_file("", b"data", 0o644).expect_err("should reject");
    assert!(matches!(err, AtomicError::EmptyPath));
}

#[cfg(unix)]
#[test]
fn test_rejects_named_pipe() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("fifo");
    let status = std::process::Command::new("mkfifo")
        .arg(&dest)
        .status()
        .expect("should run mkfifo");
    assert!(status.success());

    assert_rejected(&dest, "named pipe");
}

#[cfg(unix)]
#[test]
fn test_rejects_socket() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let dest = dir.path().join("sock");
    let _listener = std::os::unix::net::UnixListener::bind(&dest).expect("should bind socket");

    assert_rejected(&dest, "socket");
}

#[cfg(unix)]
#[test]
fn test_rejects_char_device() {
    assert_rejected(Path::new("/dev/null"), "character device");
}

#[cfg(unix)]
#[test]
fn test_rejects_block_device_when_present() {
    use std::os::unix::fs::FileTypeExt;

    let Ok(entries) = fs::read_dir("/dev") else {
        return;
    };
    let block = entries.filter_map(Result::ok).find(|e| {
        fs::symlink_metadata(e.path()).is_ok_and(|m| m.file_type().is_block_device())
    });
    if let Some(entry) = block {
        assert_rejected(&entry.path(), "block device");
    }
}

#[cfg(unix)]
#[test]
fn test_rejects_special_mode_bits() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("should create tempdir");
    for (bit, reason) in [
        (0o4000, "setuid"),
        (0o2000, "setgid"),
        (0o1000, "sticky"),
    ] {
        let dest = dir.path().join(format!("special-{bit:o}"));
        fs::write(&dest, b"original").expect("should write");
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755 | bit))
            .expect("should chmod");
        // Some kernels silently drop bits (setgid outside the caller's groups).
        if mode_of(&dest) & bit == 0 {
            continue;
        }

        assert_rejected(&dest, reason);
        assert_eq!(fs::read(&dest).expect("should read"), b"original");
    }
}

// ---------------------------------------------------------------------------
// Symlink policies
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn link_fixture() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let real = dir.path().join("real.conf");
    let link = dir.path().join("current.conf");
    fs::write(&real, b"real").expect("should write");
    std::os::unix::fs::symlink(&real, &link).expect("should link");
    (dir, real, link)
}

#[cfg(unix)]
#[test]
fn test_symlink_replace_swaps_link() {
    let (_dir, real, link) = link_fixture();

    write_file(&link, b"new", 0o644).expect("should write");

    let meta = fs::symlink_metadata(&link).expect("should stat");
    assert!(meta.file_type().is_file(), "link should now be a regular file");
    assert_eq!(fs::read(&link).expect("should read"), b"new");
    assert_eq!(fs::read(&real).expect("should read"), b"real");
}

#[cfg(unix)]
#[test]
fn test_symlink_follow_updates_target() {
    let (_dir, real, link) = link_fixture();
    let options = WriterOptions {
        symlinks: SymlinkPolicy::Follow,
        ..WriterOptions::with_mode(0o640)
    };

    write_file_with_options(&link, b"followed", &options).expect("should write");

    assert!(fs::symlink_metadata(&link).expect("should stat").file_type().is_symlink());
    assert_eq!(fs::read(&real).expect("should read"), b"followed");
    assert_eq!(mode_of(&real), 0o640);
}

#[cfg(unix)]
#[test]
fn test_symlink_follow_dangling_creates_target() {
    let dir = tempfile::tempdir().expect("should create tempdir");
    let link = dir.path().join("link");
    std::os::unix::fs::symlink("target.txt", &link).expect("should link");
    let options = WriterOptions {
        symlinks: SymlinkPolicy::Follow,
        ..WriterOptions::default()
    };

    write_file_with_options(&link, b"created", &options).expect("should write");
    assert_eq!(
        fs::read(dir.path().join("target.txt")).expect("should read"),
        b"created"
    );
}

#[cfg(unix)]
#[test]
fn test_symlink_reject() {
    let (_dir, real, link) = link_fixture();
    let options = WriterOptions {
        symlinks: SymlinkPolicy::Reject,
        ..WriterOptions::default()
    };

    let err = write_file_with_options(&link, b"nope", &options).expect_err("should reject");
    assert!(matches!(err, AtomicError::SymlinkRejected { .. }), "got {err}");
    assert_eq!(fs::read(&real).expect("should read"), b"real");
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_options_from_json_with_defaults() {
    let options: WriterOptions =
        serde_json::from_str(r#"{"mode": 384, "symlinks": "reject"}"#).expect("should parse");
    assert_eq!(options.mode, 0o600);
    assert_eq!(options.symlinks, SymlinkPolicy::Reject);
    assert!(options.sync_parent_dir);

    let empty: WriterOptions = serde_json::from_str("{}").expect("should parse");
    assert_eq!(empty, WriterOptions::default());
}

#[test]
fn test_options_round_trip_field_names() {
    let json = serde_json::to_value(WriterOptions::with_mode(0o644)).expect("should serialize");
    assert_eq!(json["mode"], 0o644);
    assert_eq!(json["symlinks"], "replace");
    assert_eq!(json["syncParentDir"], true);
}
