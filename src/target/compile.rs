//! The compile target
//!
//! Builds a compilation image for the project: the buildpack's assembled
//! `compile.sh` is materialized into the working directory, baked into the
//! image, and run as its command. The container packages the build output
//! as a tarball under the invocation's scratch directory, which this target
//! publishes to dependents as artifact state.
//!
//! Compile images are reused across invocations while the working tree's
//! content fingerprint is unchanged.

use super::{EngineError, Staleness, Target, TargetContext, TargetState, IMAGE_WORKDIR};
use crate::buildpack::ScriptKind;
use crate::spec::BuildSpec;
use crate::util;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

const COMPILE_SCRIPT: &str = "prepline-compile.sh";

#[derive(Debug, Default)]
pub struct CompileTarget {
    script_guard: Option<util::RemoveOnDrop>,
}

impl CompileTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn artifact_path(cx: &TargetContext<'_>) -> PathBuf {
        cx.build.scratch_dir.join(format!(
            "{}-{}.tar.gz",
            cx.build.package_name(),
            cx.pack.resolved_version
        ))
    }
}

#[async_trait]
impl Target for CompileTarget {
    fn name(&self) -> &str {
        "compile"
    }

    fn description(&self) -> &str {
        "Compiles the project inside a container using the buildpack's compile \
         script and publishes the packaged artifact for dependent targets."
    }

    fn container_name(&self, cx: &TargetContext<'_>) -> String {
        format!("{}-compile", cx.build.package_name())
    }

    fn staleness(&self, cx: &TargetContext<'_>) -> Staleness {
        match util::fingerprint_tree(&cx.build.work_dir) {
            Ok(digest) => Staleness::Fingerprint(digest),
            Err(e) => Staleness::NeverReuse {
                reason: format!("unable to fingerprint working tree: {}", e),
            },
        }
    }

    async fn pre_build(&mut self, cx: &TargetContext<'_>) -> Result<(), EngineError> {
        let path = cx.build.work_dir.join(COMPILE_SCRIPT);
        let script = cx.pack.pack.assemble(ScriptKind::Compile);
        debug!(path = %path.display(), "materializing compile script");
        let guard =
            util::scoped_executable(&path, &script).map_err(|source| EngineError::Io {
                target: self.name().to_string(),
                message: format!("unable to write {}", path.display()),
                source,
            })?;
        self.script_guard = Some(guard);
        Ok(())
    }

    async fn build_spec(&self, cx: &TargetContext<'_>) -> Result<BuildSpec, EngineError> {
        let mut spec = BuildSpec::new(cx.pack.base_image("compile")?);
        spec.add_copy(vec![".".to_string()], format!("{}/", IMAGE_WORKDIR));
        spec.workdir = IMAGE_WORKDIR.to_string();
        cx.stack_labels(&mut spec);
        spec.command = vec!["/bin/sh".to_string(), COMPILE_SCRIPT.to_string()];
        spec.artifacts.push(Self::artifact_path(cx));
        Ok(spec)
    }

    fn published_state(&self, cx: &TargetContext<'_>) -> Option<TargetState> {
        Some(TargetState::Artifact {
            path: Self::artifact_path(cx),
        })
    }
}
