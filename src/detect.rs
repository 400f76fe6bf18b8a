//! Project type detection
//!
//! Detection runs a buildpack's `detect.sh` probe against the project
//! directory. The script's stdout is a strict contract: exactly two
//! whitespace-separated tokens, `"<packName> <versionToken>"`, where the
//! version token is either `default` or a semver range. A conforming answer
//! binds the pack to the project as a [`RunnableBuildpack`] with a concrete
//! stack version resolved from the pack's catalog.
//!
//! [`Detector::detect_any`] probes every pack in the catalog and enforces
//! the top-level invariant that at most one pack may match a directory.

use crate::buildpack::{Buildpack, Catalog, RunnableBuildpack, ScriptKind};
use crate::script::{ScriptError, ScriptRunner};
use crate::version;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Detection errors
#[derive(Debug, Error)]
pub enum DetectError {
    /// The detect script's output broke the two-token contract.
    #[error(
        "buildpack {pack}: detect.sh returned {output:?}; want '{pack} <stackversion>' \
         where <stackversion> is either 'default' or a semver range"
    )]
    ContractViolation { pack: String, output: String },

    /// The detect script requested a range that does not parse. Still the
    /// script's fault, not the resolver's.
    #[error("buildpack {pack}: detect.sh: unable to parse {range:?} as a semver range: {source}")]
    InvalidRequestedRange {
        pack: String,
        range: String,
        #[source]
        source: semver::Error,
    },

    /// The buildpack's own static configuration is broken.
    #[error(
        "buildpack {pack} misconfigured: unable to parse default stack version {range:?} \
         as a semver range: {source}"
    )]
    Misconfigured {
        pack: String,
        range: String,
        #[source]
        source: semver::Error,
    },

    /// The requested range has no match in the pack's version catalog.
    #[error(
        "buildpack {pack}: unable to satisfy version {range:?}; available versions are: {}",
        available.join(", ")
    )]
    VersionUnsatisfiable {
        pack: String,
        range: String,
        available: Vec<String>,
    },

    /// More than one buildpack positively matched the same directory.
    #[error("multiple project types detected: {}", matches.join(" and "))]
    Ambiguous { matches: Vec<String> },

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Runs buildpack detection scripts and binds matching packs to projects.
#[derive(Debug, Clone)]
pub struct Detector {
    runner: ScriptRunner,
}

impl Detector {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    /// Probes one buildpack against `project_dir`.
    pub async fn detect(
        &self,
        pack: &Arc<Buildpack>,
        project_dir: &Path,
    ) -> Result<RunnableBuildpack, DetectError> {
        let output = self
            .runner
            .run(
                ScriptKind::Detect.file_name(),
                &pack.assemble(ScriptKind::Detect),
                project_dir,
            )
            .await?;

        let mut tokens = output.split_whitespace();
        let (name, token) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(name), Some(token), None) => (name, token),
            _ => {
                return Err(DetectError::ContractViolation {
                    pack: pack.name.clone(),
                    output,
                })
            }
        };
        if name != pack.name {
            return Err(DetectError::ContractViolation {
                pack: pack.name.clone(),
                output,
            });
        }

        let resolved_range = if token == version::DEFAULT_TOKEN {
            version::parse_range(&pack.default_version_range).map_err(|source| {
                DetectError::Misconfigured {
                    pack: pack.name.clone(),
                    range: pack.default_version_range.clone(),
                    source,
                }
            })?
        } else {
            version::parse_range(token).map_err(|source| DetectError::InvalidRequestedRange {
                pack: pack.name.clone(),
                range: token.to_string(),
                source,
            })?
        };

        let resolved_version = version::best_match(&resolved_range, pack.versions.versions())
            .cloned()
            .ok_or_else(|| DetectError::VersionUnsatisfiable {
                pack: pack.name.clone(),
                range: resolved_range.to_string(),
                available: pack.versions.version_strings(),
            })?;

        info!(
            pack = %pack.name,
            requested = token,
            version = %resolved_version,
            "project matched buildpack"
        );

        Ok(RunnableBuildpack {
            pack: Arc::clone(pack),
            detected_range: token.to_string(),
            resolved_range,
            resolved_version,
        })
    }

    /// Probes every buildpack in the catalog against `project_dir`.
    ///
    /// A pack whose probe fails (script error, contract violation,
    /// unsatisfiable version) simply did not match and is skipped with a
    /// log line. A pack whose own static configuration is broken is fatal
    /// immediately: a broken buildpack must not be silently skipped.
    ///
    /// At most one pack may match. Zero matches is the valid "undetected"
    /// outcome; more than one is an unrecoverable ambiguity.
    pub async fn detect_any(
        &self,
        catalog: &Catalog,
        project_dir: &Path,
    ) -> Result<Option<RunnableBuildpack>, DetectError> {
        let mut matches: Vec<RunnableBuildpack> = Vec::new();

        for pack in catalog.iter() {
            match self.detect(pack, project_dir).await {
                Ok(runnable) => matches.push(runnable),
                Err(err @ DetectError::Misconfigured { .. }) => return Err(err),
                Err(DetectError::VersionUnsatisfiable {
                    pack,
                    range,
                    available,
                }) => {
                    // Worth more than a debug line: the project asked for
                    // something the catalog cannot provide.
                    warn!(
                        pack = %pack,
                        range = %range,
                        available = %available.join(", "),
                        "buildpack matched but version is unsatisfiable; skipping"
                    );
                }
                Err(err) => {
                    debug!(pack = %pack.name, error = %err, "buildpack did not match");
                }
            }
        }

        if matches.len() > 1 {
            return Err(DetectError::Ambiguous {
                matches: matches.iter().map(|m| m.name().to_string()).collect(),
            });
        }

        Ok(matches.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildpack::{Scripts, StackVersionCatalog};
    use semver::Version;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pack_with(detect: &str, default_range: &str) -> Arc<Buildpack> {
        let mut targets = BTreeMap::new();
        targets.insert("app".to_string(), "registry.example.com/node:6.9.1".to_string());
        let mut entries = BTreeMap::new();
        entries.insert(Version::parse("6.9.1").unwrap(), targets);

        Arc::new(Buildpack {
            name: "nodejs".to_string(),
            description: String::new(),
            default_version_range: default_range.to_string(),
            versions: StackVersionCatalog::new(entries),
            scripts: Scripts {
                common: "#!/bin/sh".to_string(),
                detect: detect.to_string(),
                ..Scripts::default()
            },
        })
    }

    fn detector() -> Detector {
        Detector::new(ScriptRunner::new(Vec::new(), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_detect_default_resolves_configured_range() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("echo nodejs default", "6.9.1");

        let runnable = detector().detect(&pack, dir.path()).await.unwrap();
        assert_eq!(runnable.detected_range, "default");
        assert_eq!(runnable.resolved_version, Version::parse("6.9.1").unwrap());
        assert_eq!(
            runnable.base_image("app").unwrap(),
            "registry.example.com/node:6.9.1"
        );
    }

    #[tokio::test]
    async fn test_detect_missing_token_is_contract_violation() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("echo nodejs", "6.9.1");

        let err = detector().detect(&pack, dir.path()).await.unwrap_err();
        assert!(matches!(err, DetectError::ContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_detect_wrong_name_is_contract_violation() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("echo golang default", "6.9.1");

        let err = detector().detect(&pack, dir.path()).await.unwrap_err();
        assert!(matches!(err, DetectError::ContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_detect_unparsable_default_is_misconfiguration() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("echo nodejs default", "not a range");

        let err = detector().detect(&pack, dir.path()).await.unwrap_err();
        assert!(matches!(err, DetectError::Misconfigured { .. }));
    }

    #[tokio::test]
    async fn test_detect_unsatisfiable_reports_candidates() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("echo nodejs ^9", "6.9.1");

        let err = detector().detect(&pack, dir.path()).await.unwrap_err();
        match err {
            DetectError::VersionUnsatisfiable { available, .. } => {
                assert_eq!(available, vec!["6.9.1"]);
            }
            other => panic!("expected VersionUnsatisfiable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_nonzero_exit_is_script_error() {
        let dir = TempDir::new().unwrap();
        let pack = pack_with("exit 1", "6.9.1");

        let err = detector().detect(&pack, dir.path()).await.unwrap_err();
        assert!(matches!(err, DetectError::Script(ScriptError::Failed { .. })));
    }
}
