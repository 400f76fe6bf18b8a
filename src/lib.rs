//! prepline - buildpack-driven project detection and container build pipeline
//!
//! This library detects a project's technology stack with user-authored
//! shell-script buildpacks, resolves a compatible runtime version against
//! each pack's curated catalog, and drives a dependency-ordered pipeline of
//! build targets that hand typed state to one another, ending in container
//! build and run specifications for an external image builder.
//!
//! # Core Concepts
//!
//! - **Buildpacks**: named bundles of scripts (`detect.sh`, `compile.sh`,
//!   `command.sh`, ...) plus a stack-version catalog, loaded from a
//!   directory tree
//! - **Detection**: running every pack's probe script against a project
//!   directory; at most one pack may match, and its requested version range
//!   is resolved to a concrete catalog version
//! - **Targets**: named pipeline steps (`compile`, `app`) with lifecycle
//!   hooks, dependency ordering, state propagation, and per-target image
//!   reuse policies
//!
//! # Example Usage
//!
//! ```ignore
//! use prepline::buildpack::Catalog;
//! use prepline::detect::Detector;
//! use prepline::image::DryRunBuilder;
//! use prepline::script::ScriptRunner;
//! use prepline::target::{standard_targets, Engine, TargetContext};
//!
//! async fn build(context: &prepline::context::BuildContext) -> anyhow::Result<()> {
//!     let catalog = Catalog::load("packs".as_ref())?;
//!     let runner = ScriptRunner::for_context(context, std::time::Duration::from_secs(300));
//!     let detector = Detector::new(runner.clone());
//!
//!     let pack = detector
//!         .detect_any(&catalog, &context.work_dir)
//!         .await?
//!         .expect("no buildpack matched");
//!
//!     let cx = TargetContext {
//!         build: context,
//!         pack: &pack,
//!         scripts: &runner,
//!         label_prefix: "dev.prepline",
//!     };
//!     let mut builder = DryRunBuilder::new();
//!     let report = Engine::new(cx, &mut builder)
//!         .execute("app", standard_targets())
//!         .await?;
//!     println!("built {} image(s)", report.runs.len());
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`buildpack`]: buildpack model and catalog loading
//! - [`detect`]: the detection protocol and its strict output contract
//! - [`version`]: semver range resolution over the version catalog
//! - [`script`]: assembled script execution with captured output
//! - [`target`]: the target graph engine and the standard targets
//! - [`context`]: build context and the build-number allocator
//! - [`spec`]: build and run specifications
//! - [`image`]: the external image-builder seam

// Public modules
pub mod buildpack;
pub mod cli;
pub mod config;
pub mod context;
pub mod detect;
pub mod image;
pub mod script;
pub mod spec;
pub mod target;
pub mod util;
pub mod version;

// Re-export key types for convenient access
pub use buildpack::{Buildpack, Catalog, CatalogError, RunnableBuildpack};
pub use config::{Config, ConfigError};
pub use context::{BuildContext, BuildNumbers, GitInfo};
pub use detect::{DetectError, Detector};
pub use image::{DryRunBuilder, ImageBuilder};
pub use script::{ScriptError, ScriptRunner};
pub use spec::{BuildSpec, RunSpec};
pub use target::{Engine, EngineError, PipelineReport, Target, TargetState};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
