//! Atomic file writes: temp file in the target directory, fsync, rename.
//!
//! State files must never be observable half-written; a crash between the
//! write and the rename leaves the previous file intact.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use camino::Utf8Path;
use tempfile::NamedTempFile;

/// Atomically write `content` to `path`.
///
/// Line endings are normalized to LF so transcripts and state files diff
/// cleanly across platforms.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory: {parent}"))?;
    }

    // The temp file must live in the same directory as the target so the
    // rename is atomic on the same filesystem.
    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {dir}"))?;

    temp.write_all(normalized.as_bytes())
        .context("failed to write temp file")?;
    temp.as_file().sync_all().context("failed to fsync temp file")?;

    temp.persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("failed to atomically replace {path}"))?;

    Ok(())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
