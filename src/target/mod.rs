//! Build pipeline targets
//!
//! A target is one named, orderable step of the build pipeline (compile,
//! app, ...) with lifecycle hooks and optional produced state. Targets
//! declare dependencies on one another by name; the engine resolves the
//! requested target's dependency closure, executes it in order, and hands
//! each target's published state to its dependents.

pub mod app;
pub mod compile;
pub mod engine;

pub use app::AppTarget;
pub use compile::CompileTarget;
pub use engine::{Engine, PipelineReport, TargetRun};

use crate::buildpack::{CatalogError, RunnableBuildpack};
use crate::context::BuildContext;
use crate::image::ImageError;
use crate::script::{ScriptError, ScriptRunner};
use crate::spec::{BuildSpec, RunSpec};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Where project contents live inside built images.
pub const IMAGE_WORKDIR: &str = "/srv/app";

/// Pipeline execution errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown target {0:?}")]
    UnknownTarget(String),

    #[error("Dependency cycle in targets: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Target {target}: {message}")]
    CheckFailed { target: String, message: String },

    #[error(
        "Target {target} got {got} state from {from} target, expected {expected}"
    )]
    StateShapeMismatch {
        target: String,
        from: String,
        got: &'static str,
        expected: &'static str,
    },

    #[error("Target {target}: no state received from {from} target")]
    MissingState { target: String, from: String },

    #[error("Target {target}: artifact not at {path}")]
    MissingArtifact { target: String, path: PathBuf },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Target {target}: {message}: {source}")]
    Io {
        target: String,
        message: String,
        #[source]
        source: io::Error,
    },
}

/// The typed state bundle a target publishes after it runs.
///
/// Dependents declare which variant they expect; the engine delivers the
/// payload by producer name and a dependent rejects unexpected shapes
/// instead of silently ignoring them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    /// A packaged build artifact on the host, e.g. a compile target's
    /// tarball under the scratch directory
    Artifact { path: PathBuf },
    /// A finished, tagged image
    Image { tag: String },
}

impl TargetState {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetState::Artifact { .. } => "artifact",
            TargetState::Image { .. } => "image",
        }
    }
}

/// Per-target image reuse policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Rebuild on every invocation
    NeverReuse { reason: String },
    /// Reusable while an image built for this content fingerprint exists
    Fingerprint(String),
}

/// Everything a target's hooks can see during one invocation.
#[derive(Debug, Clone)]
pub struct TargetContext<'a> {
    pub build: &'a BuildContext,
    pub pack: &'a RunnableBuildpack,
    pub scripts: &'a ScriptRunner,
    /// Label namespace, e.g. "dev.prepline"
    pub label_prefix: &'a str,
}

impl TargetContext<'_> {
    /// The stack-identifying label pair every image carries.
    pub fn stack_labels(&self, spec: &mut BuildSpec) {
        spec.add_label(
            format!("{}.stack.id", self.label_prefix),
            self.pack.name(),
        );
        spec.add_label(
            format!("{}.stack.version", self.label_prefix),
            self.pack.resolved_version.to_string(),
        );
        spec.add_label(
            format!("{}.build.commit", self.label_prefix),
            self.build.git.commit_sha.as_str(),
        );
        spec.add_label(
            format!("{}.build.number", self.label_prefix),
            self.build.build_number.to_string(),
        );
    }
}

/// One named pipeline step.
#[async_trait]
pub trait Target: Send {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Names of targets that must run before this one.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Ordering hint among targets with no direct edge between them.
    fn run_after(&self) -> Vec<String> {
        Vec::new()
    }

    /// Target-specific precondition; failure aborts the whole run.
    async fn check(&mut self, _cx: &TargetContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// Build-time side effects before the image build, e.g. materializing a
    /// dependency's artifact into the working directory.
    async fn pre_build(&mut self, _cx: &TargetContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// The name images of this target are published under.
    fn container_name(&self, cx: &TargetContext<'_>) -> String;

    /// Image reuse policy for this invocation.
    fn staleness(&self, cx: &TargetContext<'_>) -> Staleness;

    /// The image to construct for this target.
    async fn build_spec(&self, cx: &TargetContext<'_>) -> Result<BuildSpec, EngineError>;

    /// How to start a container from the built image, for runnable targets.
    fn run_spec(
        &self,
        _cx: &TargetContext<'_>,
        _image_tag: &str,
    ) -> Result<Option<RunSpec>, EngineError> {
        Ok(None)
    }

    /// Receives a producer's published state. A payload from a producer
    /// this target does not depend on is ignored; a payload of the wrong
    /// shape is an error.
    fn set_state(&mut self, _from: &str, _state: &TargetState) -> Result<(), EngineError> {
        Ok(())
    }

    /// The state this target hands to its dependents, once it has run.
    fn published_state(&self, _cx: &TargetContext<'_>) -> Option<TargetState> {
        None
    }
}

/// The standard target set every buildpack is built with.
pub fn standard_targets() -> Vec<Box<dyn Target>> {
    vec![
        Box::new(CompileTarget::new()),
        Box::new(AppTarget::new()),
    ]
}
