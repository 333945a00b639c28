//! Whole-file text helpers and the scoped snapshot guard.
//!
//! Writes always replace the whole file (temp file + rename). Callers re-read
//! after a write instead of relying on earlier in-memory content.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::rewrite::{replace_if_match, replace_or_append};

/// Read a text file, treating a missing file as empty content.
pub fn read_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Read a text file that must exist.
pub fn read_required(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Atomically write a text file, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    write_bytes(path, contents.as_bytes())
}

fn write_bytes(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Create an empty file if none exists.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!(path = %path.display(), "creating empty file");
        write_file(path, "")?;
    }
    Ok(())
}

/// `replace_or_append` applied to a file on disk. A missing file reads as empty.
pub fn replace_or_append_file(path: &Path, pattern: &Regex, replacement: &str) -> Result<()> {
    let content = read_content(path)?;
    write_file(path, &replace_or_append(&content, pattern, replacement))
}

/// `replace_if_match` applied to a file on disk.
///
/// Reads `path`, writes the result to `output` (defaulting to `path`) only when
/// the pattern matched. Returns whether a write happened.
pub fn replace_if_match_file(
    path: &Path,
    pattern: &Regex,
    replacement: &str,
    output: Option<&Path>,
) -> Result<bool> {
    let content = read_required(path)?;
    if !pattern.is_match(&content) {
        return Ok(false);
    }
    let updated = replace_if_match(&content, pattern, replacement);
    write_file(output.unwrap_or(path), &updated)?;
    Ok(true)
}

/// Snapshot of a file taken before mutation, restored when the guard ends.
///
/// Restoration runs on [`FileSnapshot::restore`] or, failing that, on drop, so
/// early returns and panics between capture and restore still put the file back.
#[derive(Debug)]
pub struct FileSnapshot {
    path: PathBuf,
    /// `None` when the file did not exist at capture time.
    original: Option<Vec<u8>>,
    restored: bool,
}

impl FileSnapshot {
    pub fn capture(path: &Path) -> Result<Self> {
        let original = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err).with_context(|| format!("snapshot {}", path.display())),
        };
        debug!(path = %path.display(), existed = original.is_some(), "captured snapshot");
        Ok(Self {
            path: path.to_path_buf(),
            original,
            restored: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a copy of the captured content next to the file (e.g. `settings.json_bak`).
    pub fn write_backup(&self, suffix: &str) -> Result<PathBuf> {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        let backup = PathBuf::from(name);
        write_bytes(&backup, self.original.as_deref().unwrap_or_default())?;
        Ok(backup)
    }

    /// Put the captured content back.
    pub fn restore(mut self) -> Result<()> {
        self.restore_in_place()
    }

    fn restore_in_place(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        match &self.original {
            Some(bytes) => write_bytes(&self.path, bytes),
            None => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).with_context(|| format!("remove {}", self.path.display())),
            },
        }?;
        debug!(path = %self.path.display(), "restored snapshot");
        Ok(())
    }
}

impl Drop for FileSnapshot {
    fn drop(&mut self) {
        if let Err(err) = self.restore_in_place() {
            warn!(path = %self.path.display(), err = %format!("{err:#}"), "failed to restore snapshot");
        }
    }
}
