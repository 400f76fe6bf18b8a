//! Buildpack catalog loading
//!
//! The catalog root holds one `common.sh` prelude shared by every pack and
//! one subdirectory per buildpack, named after it:
//!
//! ```text
//! packs/
//!   common.sh
//!   nodejs/
//!     base.sh  command.sh  compile.sh  detect.sh  test.sh
//!     versions.toml  [list_base_image.sh]
//! ```
//!
//! `versions.toml` carries the pack description, its default version range,
//! and the per-version table of target base images:
//!
//! ```toml
//! description = "NodeJS projects"
//! default-version = "^6"
//!
//! [versions."6.9.1"]
//! compile = "registry.example.com/node-build:6.9.1"
//! app = "registry.example.com/node:6.9.1"
//! ```

use super::{Buildpack, Scripts, StackVersionCatalog};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const COMMON_SCRIPT: &str = "common.sh";
const VERSIONS_FILE: &str = "versions.toml";
const OPTIONAL_LIST_BASE_IMAGE: &str = "list_base_image.sh";

/// Catalog loading and lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Buildpack dir not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Buildpack {name}: invalid {path}: {source}")]
    InvalidVersionsFile {
        name: String,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Buildpack {name}: {version:?} is not a valid semantic version: {source}")]
    InvalidVersionKey {
        name: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("Buildpack {name} declares no stack versions")]
    EmptyVersions { name: String },

    #[error("Buildpack {pack} does not have a {target} base image for version {version}")]
    MissingBaseImage {
        pack: String,
        version: String,
        target: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct VersionsFile {
    #[serde(default)]
    description: String,
    default_version: String,
    versions: BTreeMap<String, BTreeMap<String, String>>,
}

/// All buildpacks loaded from a catalog root.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    packs: Vec<Arc<Buildpack>>,
}

impl Catalog {
    /// Loads every buildpack under `root`.
    ///
    /// The root must exist. A missing required file in any pack fails the
    /// whole load, naming the offending path. Packs are ordered by name so
    /// detection order is deterministic.
    pub fn load(root: &Path) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(root.to_path_buf()));
        }

        // The shared prelude is optional; packs simply get an empty common
        // section when it is absent.
        let common = match fs::read_to_string(root.join(COMMON_SCRIPT)) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(CatalogError::Io {
                    path: root.join(COMMON_SCRIPT),
                    source,
                })
            }
        };

        let mut dirs: Vec<PathBuf> = Vec::new();
        let entries = fs::read_dir(root).map_err(|source| CatalogError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut packs = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let pack = parse_buildpack(&dir, &common)?;
            debug!(pack = %pack.name, versions = pack.versions.version_strings().len(), "loaded buildpack");
            packs.push(Arc::new(pack));
        }

        info!(count = packs.len(), root = %root.display(), "buildpack catalog loaded");
        Ok(Self { packs })
    }

    /// Looks up a buildpack by name, handing out an owned reference.
    pub fn get(&self, name: &str) -> Option<Arc<Buildpack>> {
        self.packs
            .iter()
            .find(|p| p.name == name)
            .map(Arc::clone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Buildpack>> {
        self.packs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.packs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

fn parse_buildpack(dir: &Path, common: &str) -> Result<Buildpack, CatalogError> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let read = |file: &str| -> Result<String, CatalogError> {
        let path = dir.join(file);
        fs::read_to_string(&path).map_err(|source| CatalogError::Io { path, source })
    };

    let base = read("base.sh")?;
    let command = read("command.sh")?;
    let compile = read("compile.sh")?;
    let detect = read("detect.sh")?;
    let test = read("test.sh")?;

    let list_base_image = match fs::read_to_string(dir.join(OPTIONAL_LIST_BASE_IMAGE)) {
        Ok(s) => Some(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(CatalogError::Io {
                path: dir.join(OPTIONAL_LIST_BASE_IMAGE),
                source,
            })
        }
    };

    let versions_path = dir.join(VERSIONS_FILE);
    let versions_raw = read(VERSIONS_FILE)?;
    let parsed: VersionsFile =
        toml::from_str(&versions_raw).map_err(|source| CatalogError::InvalidVersionsFile {
            name: name.clone(),
            path: versions_path,
            source,
        })?;

    if parsed.versions.is_empty() {
        return Err(CatalogError::EmptyVersions { name });
    }

    let mut entries = BTreeMap::new();
    for (version, targets) in parsed.versions {
        let parsed_version =
            Version::parse(&version).map_err(|source| CatalogError::InvalidVersionKey {
                name: name.clone(),
                version: version.clone(),
                source,
            })?;
        entries.insert(parsed_version, targets);
    }

    Ok(Buildpack {
        name,
        description: parsed.description,
        default_version_range: parsed.default_version,
        versions: StackVersionCatalog::new(entries),
        scripts: Scripts {
            common: common.to_string(),
            base,
            command,
            compile,
            detect,
            test,
            list_base_image,
        },
    })
}
