//! Utility modules for prepline
//!
//! This module provides various utility functions and helpers including:
//! - Structured logging setup and configuration
//! - Host port allocation and task-host resolution for run specs
//! - Content fingerprinting and scoped filesystem helpers

pub mod logging;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// Allocates a free host port by binding port 0 and reading back the
/// kernel's choice.
pub fn free_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// A host address the containerized task can reach this machine at.
pub fn task_host() -> String {
    env::var("TASK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Content fingerprint of a directory tree.
///
/// Walks the tree honoring ignore files and skipping hidden entries, in
/// sorted order, hashing each file's relative path and contents. Identical
/// trees produce identical digests on any machine.
pub fn fingerprint_tree(root: &Path) -> io::Result<String> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut hasher = Sha256::new();
    for path in &files {
        let rel = path.strip_prefix(root).unwrap_or(path);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(path)?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A file removed again when the guard drops.
#[derive(Debug)]
pub struct RemoveOnDrop {
    path: PathBuf,
}

impl RemoveOnDrop {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Materializes `src` at `dest` for the duration of the returned guard.
///
/// Hard-links where the filesystem allows it, falling back to a copy
/// across devices. An existing `dest` is replaced.
pub fn temporary_link(src: &Path, dest: &Path) -> io::Result<RemoveOnDrop> {
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    if fs::hard_link(src, dest).is_err() {
        fs::copy(src, dest)?;
    }
    Ok(RemoveOnDrop::new(dest))
}

/// Writes `contents` to `path` and marks it executable, removing it again
/// when the guard drops.
pub fn scoped_executable(path: &Path, contents: &str) -> io::Result<RemoveOnDrop> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(RemoveOnDrop::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_port().unwrap();
        assert!(port > 0);
        // The port was released when the probe listener dropped.
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        fs::write(dir.path().join("b.txt"), "two").unwrap();

        let first = fingerprint_tree(dir.path()).unwrap();
        let second = fingerprint_tree(dir.path()).unwrap();
        assert_eq!(first, second);

        fs::write(dir.path().join("b.txt"), "changed").unwrap();
        assert_ne!(fingerprint_tree(dir.path()).unwrap(), first);
    }

    #[test]
    fn test_fingerprint_skips_hidden_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        let before = fingerprint_tree(dir.path()).unwrap();

        fs::write(dir.path().join(".prepline-tmp.detect.sh"), "#!/bin/sh").unwrap();
        assert_eq!(fingerprint_tree(dir.path()).unwrap(), before);
    }

    #[test]
    fn test_temporary_link_removes_on_drop() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("artifact.tar.gz");
        let dest = dir.path().join("linked.tar.gz");
        fs::write(&src, "payload").unwrap();

        {
            let _guard = temporary_link(&src, &dest).unwrap();
            assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
        }
        assert!(!dest.exists());
        assert!(src.exists());
    }

    #[test]
    fn test_scoped_executable_removes_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compile.sh");
        {
            let _guard = scoped_executable(&path, "#!/bin/sh\ntrue\n").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
