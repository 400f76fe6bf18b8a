//! Buildpack data model
//!
//! A buildpack is a named bundle of user-authored shell scripts plus a
//! stack-version catalog mapping supported runtime versions to per-target
//! base images. Buildpacks are immutable once loaded and shared behind
//! `Arc` for the process lifetime.

pub mod catalog;

pub use catalog::{Catalog, CatalogError};

use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The named script bodies every buildpack carries.
///
/// `common` is the catalog-wide prelude shared by all packs; `base` is the
/// pack's own prelude. Both are prepended to every assembled script.
#[derive(Debug, Clone, Default)]
pub struct Scripts {
    pub common: String,
    pub base: String,
    pub command: String,
    pub compile: String,
    pub detect: String,
    pub test: String,
    pub list_base_image: Option<String>,
}

/// A runnable script body by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Command,
    Compile,
    Detect,
    Test,
}

impl ScriptKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::Command => "command.sh",
            ScriptKind::Compile => "compile.sh",
            ScriptKind::Detect => "detect.sh",
            ScriptKind::Test => "test.sh",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Mapping from supported stack version to a per-target table of base-image
/// references.
#[derive(Debug, Clone, Default)]
pub struct StackVersionCatalog {
    entries: BTreeMap<Version, BTreeMap<String, String>>,
}

impl StackVersionCatalog {
    pub fn new(entries: BTreeMap<Version, BTreeMap<String, String>>) -> Self {
        Self { entries }
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.keys()
    }

    /// All supported versions as strings, for "available versions are: ..."
    /// diagnostics.
    pub fn version_strings(&self) -> Vec<String> {
        self.entries.keys().map(Version::to_string).collect()
    }

    pub fn base_image(&self, version: &Version, target: &str) -> Option<&str> {
        self.entries
            .get(version)
            .and_then(|targets| targets.get(target))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A loaded buildpack: identity, scripts, and version catalog.
#[derive(Debug, Clone)]
pub struct Buildpack {
    pub name: String,
    pub description: String,
    /// Raw semver range used when a detect script answers `default`
    pub default_version_range: String,
    pub versions: StackVersionCatalog,
    pub scripts: Scripts,
}

impl Buildpack {
    /// Concatenates the shared prelude, the pack prelude, and the named
    /// body into one executable script text.
    pub fn assemble(&self, kind: ScriptKind) -> String {
        let body = match kind {
            ScriptKind::Command => &self.scripts.command,
            ScriptKind::Compile => &self.scripts.compile,
            ScriptKind::Detect => &self.scripts.detect,
            ScriptKind::Test => &self.scripts.test,
        };
        format!(
            "{}\n\n# base.sh\n{}\n\n# {}\n{}\n",
            self.scripts.common,
            self.scripts.base,
            kind.file_name(),
            body
        )
    }
}

/// A buildpack bound to a project by a successful detection.
///
/// Carries the raw version token the detect script printed, the parsed
/// range, and the concrete catalog version chosen for it. Never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct RunnableBuildpack {
    pub pack: Arc<Buildpack>,
    pub detected_range: String,
    pub resolved_range: VersionReq,
    pub resolved_version: Version,
}

impl RunnableBuildpack {
    pub fn name(&self) -> &str {
        &self.pack.name
    }

    /// The base image for `target` at the resolved stack version.
    ///
    /// Every version reachable by a range match must have an entry for the
    /// targets it is built with; a miss is an explicit catalog error, not a
    /// silent fallback.
    pub fn base_image(&self, target: &str) -> Result<&str, CatalogError> {
        self.pack
            .versions
            .base_image(&self.resolved_version, target)
            .ok_or_else(|| CatalogError::MissingBaseImage {
                pack: self.pack.name.clone(),
                version: self.resolved_version.to_string(),
                target: target.to_string(),
            })
    }
}
