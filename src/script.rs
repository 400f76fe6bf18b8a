//! Buildpack script execution
//!
//! A buildpack script never runs alone: the catalog's shared `common.sh`
//! prelude and the pack's `base.sh` are concatenated ahead of the named
//! body, the result is written into the working directory under a unique
//! name, executed as a subprocess, and removed again on every exit path.
//!
//! The caller receives only the final trimmed stdout or a diagnostic error
//! embedding the combined stdout+stderr stream. Every execution runs under
//! an explicit deadline; expiry kills the subprocess and surfaces as a
//! distinct error kind.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Script execution errors
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Unable to write script {name} to {path}: {source}")]
    Write {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to start script {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Script {name} failed ({status}); output:\n{combined}")]
    Failed {
        name: String,
        status: String,
        combined: String,
    },

    #[error("Script {name} exceeded its deadline of {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// Executes assembled buildpack scripts in a working directory.
///
/// The runner carries the flattened Build Context environment and the
/// configured deadline; it is cheap to clone and safe to share between
/// detection and target execution.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(env: Vec<(String, String)>, timeout: Duration) -> Self {
        Self { env, timeout }
    }

    pub fn for_context(context: &crate::context::BuildContext, timeout: Duration) -> Self {
        Self::new(context.env(), timeout)
    }

    /// Runs an assembled script in `work_dir`, returning its trimmed stdout.
    ///
    /// `name` is the logical script name (e.g. `detect.sh`) used in
    /// diagnostics; the on-disk file gets a unique suffix so concurrent
    /// executions in the same directory never collide.
    pub async fn run(
        &self,
        name: &str,
        script: &str,
        work_dir: &Path,
    ) -> Result<String, ScriptError> {
        let temp = TempScript::write(work_dir, name, script)?;
        debug!(script = name, path = %temp.path().display(), "running buildpack script");

        let mut child = Command::new(temp.path())
            .current_dir(work_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                name: name.to_string(),
                source,
            })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let combined = Arc::new(Mutex::new(Vec::new()));
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let waited = tokio::time::timeout(self.timeout, async {
            let (_, _, status) = tokio::join!(
                drain(stdout_pipe, &mut stdout_buf, Arc::clone(&combined)),
                drain(stderr_pipe, &mut stderr_buf, Arc::clone(&combined)),
                child.wait(),
            );
            status
        })
        .await;

        let status = match waited {
            Err(_elapsed) => {
                warn!(script = name, timeout = ?self.timeout, "script deadline exceeded, killing");
                let _ = child.kill().await;
                return Err(ScriptError::Timeout {
                    name: name.to_string(),
                    timeout: self.timeout,
                });
            }
            Ok(status) => status.map_err(|source| ScriptError::Spawn {
                name: name.to_string(),
                source,
            })?,
        };

        if !status.success() {
            let combined = take_buffer(&combined);
            return Err(ScriptError::Failed {
                name: name.to_string(),
                status: status.to_string(),
                combined: String::from_utf8_lossy(&combined).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout_buf).trim().to_string())
    }
}

async fn drain(
    pipe: Option<impl tokio::io::AsyncRead + Unpin>,
    own: &mut Vec<u8>,
    combined: Arc<Mutex<Vec<u8>>>,
) {
    let Some(mut pipe) = pipe else { return };
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                own.extend_from_slice(&chunk[..n]);
                if let Ok(mut c) = combined.lock() {
                    c.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

fn take_buffer(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<u8> {
    buffer.lock().map(|mut b| std::mem::take(&mut *b)).unwrap_or_default()
}

/// An assembled script on disk, removed again when the guard drops.
pub struct TempScript {
    path: PathBuf,
}

impl TempScript {
    /// Writes `contents` into `work_dir` under a collision-free name and
    /// marks it executable.
    pub fn write(work_dir: &Path, name: &str, contents: &str) -> Result<Self, ScriptError> {
        let file_name = format!(".prepline-{}.{}", Uuid::new_v4().simple(), name);
        let path = work_dir.join(file_name);
        std::fs::write(&path, contents).map_err(|source| ScriptError::Write {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(
                |source| ScriptError::Write {
                    name: name.to_string(),
                    path: path.clone(),
                    source,
                },
            )?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
