//! Process-scoped build context
//!
//! Everything a build invocation knows about itself: the git identity of the
//! project (consumed as an opaque struct, extraction happens elsewhere), the
//! per-commit build number, the registry images are tagged for, and the
//! working/scratch directories. The context is constructed once at startup
//! and passed to every component that needs it.
//!
//! Build numbers are the one piece of cross-invocation shared state: a
//! counter file per `(canonical_name, commit_sha)` pair in durable per-user
//! storage. Concurrent invocations for the same commit race on the
//! read-increment-write, so the increment runs inside an advisory lock-file
//! critical section. A `BUILD_NUMBER` environment override bypasses storage
//! (and locking) entirely.

use std::env;
use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Git metadata for the project being built.
///
/// Opaque input: prepline consumes this, it does not extract it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    /// Full commit SHA of the working tree's HEAD
    pub commit_sha: String,
    /// Canonical repository name, e.g. "github.com/acme/widgets"
    pub canonical_name: String,
}

impl GitInfo {
    pub fn new(commit_sha: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            commit_sha: commit_sha.into(),
            canonical_name: canonical_name.into(),
        }
    }

    /// Last segment of the canonical name, e.g. "widgets".
    pub fn package_name(&self) -> &str {
        self.canonical_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.canonical_name)
    }

    /// Abbreviated commit SHA used in image tags.
    pub fn short_sha(&self) -> &str {
        self.commit_sha.get(..8).unwrap_or(&self.commit_sha)
    }
}

/// Data consumed by every component of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub git: GitInfo,
    pub build_number: u32,
    pub docker_registry: String,
    /// The project directory scripts run in and images are built from
    pub work_dir: PathBuf,
    /// Invocation-scoped directory for artifacts handed between targets
    pub scratch_dir: PathBuf,
}

impl BuildContext {
    pub fn package_name(&self) -> &str {
        self.git.package_name()
    }

    /// Flattens the context into the environment every buildpack script
    /// receives. The key set is a frozen contract with buildpack authors.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (
                "PREPLINE_PACKAGE_NAME".to_string(),
                self.package_name().to_string(),
            ),
            (
                "PREPLINE_COMMIT_SHA".to_string(),
                self.git.commit_sha.clone(),
            ),
            (
                "PREPLINE_BUILD_NUMBER".to_string(),
                self.build_number.to_string(),
            ),
            (
                "PREPLINE_WORK_DIR".to_string(),
                self.work_dir.display().to_string(),
            ),
            (
                "PREPLINE_DOCKER_REGISTRY".to_string(),
                self.docker_registry.clone(),
            ),
        ]
    }

    /// Image reference for one build of `container`, unique per commit and
    /// build number.
    pub fn image_tag(&self, container: &str) -> String {
        format!(
            "{}/{}:{}-{}",
            self.docker_registry,
            container,
            self.git.short_sha(),
            self.build_number
        )
    }

    /// Image reference keyed by content fingerprint, stable across
    /// invocations for identical content. Used by targets that report
    /// fingerprint-based staleness.
    pub fn fingerprint_tag(&self, container: &str, fingerprint: &str) -> String {
        let short = fingerprint.get(..12).unwrap_or(fingerprint);
        format!("{}/{}:{}", self.docker_registry, container, short)
    }
}

/// Build-number allocation errors
#[derive(Debug, Error)]
pub enum BuildNumberError {
    #[error("Unable to parse $BUILD_NUMBER ({value:?}) as an integer: {source}")]
    InvalidOverride {
        value: String,
        source: ParseIntError,
    },

    #[error("Unable to parse build number {value:?} (from {path}) as an integer: {source}")]
    CorruptCounter {
        value: String,
        path: PathBuf,
        source: ParseIntError,
    },

    #[error("Timed out waiting for build-number lock at {0}")]
    LockTimeout(PathBuf),

    #[error("Build number storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Per-`(canonical_name, commit_sha)` build-number counters on durable
/// storage.
#[derive(Debug, Clone)]
pub struct BuildNumbers {
    root: PathBuf,
}

impl BuildNumbers {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Allocates the next build number for this commit.
    ///
    /// A `BUILD_NUMBER` environment override short-circuits before any
    /// locking or file IO. Otherwise the counter file is incremented inside
    /// an advisory lock so concurrent invocations each observe a unique
    /// number.
    pub fn next(&self, git: &GitInfo) -> Result<u32, BuildNumberError> {
        if let Some(n) = override_from_env()? {
            debug!(build_number = n, "using $BUILD_NUMBER override");
            return Ok(n);
        }

        let path = self.counter_path(git);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| BuildNumberError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let _lock = LockFile::acquire(&path)?;

        let next = match read_counter(&path)? {
            Some(n) => n + 1,
            None => 1,
        };
        write_counter(&path, next)?;
        debug!(build_number = next, path = %path.display(), "allocated build number");
        Ok(next)
    }

    /// Reads the current build number without incrementing it. `None` means
    /// this commit has never been built here.
    pub fn peek(&self, git: &GitInfo) -> Result<Option<u32>, BuildNumberError> {
        if let Some(n) = override_from_env()? {
            return Ok(Some(n));
        }
        read_counter(&self.counter_path(git))
    }

    fn counter_path(&self, git: &GitInfo) -> PathBuf {
        self.root.join(&git.canonical_name).join(&git.commit_sha)
    }
}

fn override_from_env() -> Result<Option<u32>, BuildNumberError> {
    match env::var("BUILD_NUMBER") {
        Ok(value) if !value.is_empty() => {
            let n = value
                .trim()
                .parse::<u32>()
                .map_err(|source| BuildNumberError::InvalidOverride { value, source })?;
            Ok(Some(n))
        }
        _ => Ok(None),
    }
}

fn read_counter(path: &Path) -> Result<Option<u32>, BuildNumberError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(BuildNumberError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let trimmed = raw.trim().to_string();
    let n = trimmed
        .parse::<u32>()
        .map_err(|source| BuildNumberError::CorruptCounter {
            value: trimmed,
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(n))
}

fn write_counter(path: &Path, n: u32) -> Result<(), BuildNumberError> {
    // Write-then-rename so a crash mid-write never leaves a torn counter.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format!("{}\n", n)).map_err(|source| BuildNumberError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| BuildNumberError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Advisory lock held for the duration of a counter increment.
///
/// Acquisition is an atomic create-if-absent of `<counter>.lock`; the file
/// is removed on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(counter_path: &Path) -> Result<Self, BuildNumberError> {
        let path = counter_path.with_extension("lock");
        let started = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if started.elapsed() > LOCK_WAIT_LIMIT {
                        return Err(BuildNumberError::LockTimeout(path));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(source) => return Err(BuildNumberError::Io { path, source }),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn git() -> GitInfo {
        GitInfo::new("0123456789abcdef", "github.com/acme/widgets")
    }

    #[test]
    fn test_package_name_is_last_segment() {
        assert_eq!(git().package_name(), "widgets");
        assert_eq!(GitInfo::new("abc", "flat-name").package_name(), "flat-name");
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(git().short_sha(), "01234567");
        assert_eq!(GitInfo::new("ab12", "x").short_sha(), "ab12");
    }

    #[test]
    #[serial]
    fn test_allocator_increments_per_commit() {
        env::remove_var("BUILD_NUMBER");
        let dir = TempDir::new().unwrap();
        let numbers = BuildNumbers::new(dir.path());

        assert_eq!(numbers.next(&git()).unwrap(), 1);
        assert_eq!(numbers.next(&git()).unwrap(), 2);

        let other = GitInfo::new("fedcba9876543210", "github.com/acme/widgets");
        assert_eq!(numbers.next(&other).unwrap(), 1);
    }

    #[test]
    #[serial]
    fn test_override_bypasses_counter_file() {
        env::remove_var("BUILD_NUMBER");
        let dir = TempDir::new().unwrap();
        let numbers = BuildNumbers::new(dir.path());

        // Seed the counter, then check the override leaves it untouched.
        assert_eq!(numbers.next(&git()).unwrap(), 1);
        let counter = dir
            .path()
            .join("github.com/acme/widgets")
            .join("0123456789abcdef");
        let before = fs::read_to_string(&counter).unwrap();

        env::set_var("BUILD_NUMBER", "42");
        assert_eq!(numbers.next(&git()).unwrap(), 42);
        assert_eq!(numbers.next(&git()).unwrap(), 42);
        env::remove_var("BUILD_NUMBER");

        assert_eq!(fs::read_to_string(&counter).unwrap(), before);
    }

    #[test]
    #[serial]
    fn test_invalid_override_is_reported() {
        env::set_var("BUILD_NUMBER", "not-a-number");
        let dir = TempDir::new().unwrap();
        let numbers = BuildNumbers::new(dir.path());
        let err = numbers.next(&git()).unwrap_err();
        env::remove_var("BUILD_NUMBER");
        assert!(matches!(err, BuildNumberError::InvalidOverride { .. }));
    }

    #[test]
    #[serial]
    fn test_peek_does_not_increment() {
        env::remove_var("BUILD_NUMBER");
        let dir = TempDir::new().unwrap();
        let numbers = BuildNumbers::new(dir.path());

        assert_eq!(numbers.peek(&git()).unwrap(), None);
        numbers.next(&git()).unwrap();
        assert_eq!(numbers.peek(&git()).unwrap(), Some(1));
        assert_eq!(numbers.peek(&git()).unwrap(), Some(1));
    }

    #[test]
    #[serial]
    fn test_concurrent_allocations_are_unique() {
        env::remove_var("BUILD_NUMBER");
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                thread::spawn(move || BuildNumbers::new(root).next(&git()).unwrap())
            })
            .collect();

        let mut seen: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    #[serial]
    fn test_corrupt_counter_is_reported() {
        env::remove_var("BUILD_NUMBER");
        let dir = TempDir::new().unwrap();
        let numbers = BuildNumbers::new(dir.path());

        let counter = dir
            .path()
            .join("github.com/acme/widgets")
            .join("0123456789abcdef");
        fs::create_dir_all(counter.parent().unwrap()).unwrap();
        fs::write(&counter, "three").unwrap();

        let err = numbers.next(&git()).unwrap_err();
        assert!(matches!(err, BuildNumberError::CorruptCounter { .. }));
    }

    #[test]
    fn test_image_tags() {
        let cx = BuildContext {
            git: git(),
            build_number: 3,
            docker_registry: "registry.example.com".to_string(),
            work_dir: PathBuf::from("/work"),
            scratch_dir: PathBuf::from("/scratch"),
        };
        assert_eq!(
            cx.image_tag("widgets"),
            "registry.example.com/widgets:01234567-3"
        );
        assert_eq!(
            cx.fingerprint_tag("widgets-compile", "deadbeefdeadbeefdeadbeef"),
            "registry.example.com/widgets-compile:deadbeefdead"
        );
    }

    #[test]
    fn test_env_contract_key_set() {
        let cx = BuildContext {
            git: git(),
            build_number: 7,
            docker_registry: "registry.example.com".to_string(),
            work_dir: PathBuf::from("/work"),
            scratch_dir: PathBuf::from("/scratch"),
        };
        let env = cx.env();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "PREPLINE_PACKAGE_NAME",
                "PREPLINE_COMMIT_SHA",
                "PREPLINE_BUILD_NUMBER",
                "PREPLINE_WORK_DIR",
                "PREPLINE_DOCKER_REGISTRY",
            ]
        );
        assert!(env.contains(&("PREPLINE_BUILD_NUMBER".to_string(), "7".to_string())));
    }
}
