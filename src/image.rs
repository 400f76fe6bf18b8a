//! Image builder seam
//!
//! Actual container-image construction is an external collaborator: the
//! engine hands a finished [`BuildSpec`] and a tag to an [`ImageBuilder`]
//! and only cares about success or failure. [`DryRunBuilder`] is the
//! in-tree implementation used by the CLI's dry-run mode and the test
//! suites; real docker/buildkit drivers live elsewhere.

use crate::spec::BuildSpec;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use thiserror::Error;
use tracing::info;

/// Image construction errors
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image build failed for {tag}: {message}")]
    BuildFailed { tag: String, message: String },

    #[error("Unable to materialize build artifact {path}: {source}")]
    Artifact {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Consumes build specifications and produces tagged images.
#[async_trait]
pub trait ImageBuilder: Send {
    /// Whether an image with this tag is already available for reuse.
    fn has_image(&self, tag: &str) -> bool;

    /// Builds an image from `spec` and tags it `tag`.
    async fn build(&mut self, spec: &BuildSpec, tag: &str) -> Result<(), ImageError>;
}

/// Builder that records build specs instead of invoking a container engine.
///
/// Declared artifacts are materialized as empty files so downstream targets
/// that link artifacts into their build context keep working without a real
/// container run.
#[derive(Debug, Default)]
pub struct DryRunBuilder {
    built: Vec<(String, BuildSpec)>,
    preexisting: HashSet<String>,
}

impl DryRunBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `tag` as already present, as a registry/daemon cache would.
    pub fn with_existing_image(mut self, tag: impl Into<String>) -> Self {
        self.preexisting.insert(tag.into());
        self
    }

    /// Every `(tag, spec)` pair built so far, in order.
    pub fn built(&self) -> &[(String, BuildSpec)] {
        &self.built
    }

    pub fn build_count(&self) -> usize {
        self.built.len()
    }
}

#[async_trait]
impl ImageBuilder for DryRunBuilder {
    fn has_image(&self, tag: &str) -> bool {
        self.preexisting.contains(tag) || self.built.iter().any(|(t, _)| t == tag)
    }

    async fn build(&mut self, spec: &BuildSpec, tag: &str) -> Result<(), ImageError> {
        info!(tag, "dry-run image build:\n{}", spec.to_dockerfile());

        for artifact in &spec.artifacts {
            if let Some(dir) = artifact.parent() {
                std::fs::create_dir_all(dir).map_err(|source| ImageError::Artifact {
                    path: artifact.display().to_string(),
                    source,
                })?;
            }
            std::fs::write(artifact, b"").map_err(|source| ImageError::Artifact {
                path: artifact.display().to_string(),
                source,
            })?;
        }

        self.built.push((tag.to_string(), spec.clone()));
        Ok(())
    }
}
