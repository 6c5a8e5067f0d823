//! oa-atomic-write -- atomically replace a file with the contents of stdin.
//!
//! Usage: oa-atomic-write <path> [--mode <octal>] [--symlinks replace|follow|reject] [--no-sync-dir]

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use oa_atomicwriter::{SymlinkPolicy, WriterOptions};

const USAGE: &str =
    "usage: oa-atomic-write <path> [--mode <octal>] [--symlinks replace|follow|reject] [--no-sync-dir]";

fn parse_args(args: impl Iterator<Item = String>) -> Result<(PathBuf, WriterOptions)> {
    let mut args = args;
    let mut path = None;
    let mut options = WriterOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let raw = args.next().context("--mode needs a value")?;
                let digits = raw.trim_start_matches("0o");
                options.mode = u32::from_str_radix(digits, 8)
                    .with_context(|| format!("invalid octal mode: {raw}"))?;
            }
            "--symlinks" => {
                options.symlinks = match args.next().as_deref() {
                    Some("replace") => SymlinkPolicy::Replace,
                    Some("follow") => SymlinkPolicy::Follow,
                    Some("reject") => SymlinkPolicy::Reject,
                    other => bail!("invalid --symlinks value: {other:?}\n{USAGE}"),
                };
            }
            "--no-sync-dir" => options.sync_parent_dir = false,
            "-h" | "--help" => bail!("{USAGE}"),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument: {arg}\n{USAGE}"),
        }
    }

    let path = path.context(USAGE)?;
    Ok((path, options))
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout is left untouched.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (path, options) = parse_args(std::env::args().skip(1))?;

    let mut data = Vec::new();
    std::io::stdin()
        .lock()
        .read_to_end(&mut data)
        .context("failed to read stdin")?;

    oa_atomicwriter::write_file_with_options(&path, &data, &options)
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "done");
    Ok(())
}
