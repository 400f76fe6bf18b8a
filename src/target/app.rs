//! The app target
//!
//! Packages the compiled artifact into a runnable image. The startup
//! command comes from the buildpack's `command.sh`, so the application
//! binary receives signals directly instead of hiding behind a process
//! manager. App images are never reused; every invocation rebuilds.

use super::{EngineError, Staleness, Target, TargetContext, TargetState, IMAGE_WORKDIR};
use crate::buildpack::ScriptKind;
use crate::spec::{BuildSpec, RunSpec};
use crate::util;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct AppTarget {
    start_command: Option<Vec<String>>,
    artifact_path: Option<PathBuf>,
    local_artifact: Option<String>,
    link_guard: Option<util::RemoveOnDrop>,
}

impl AppTarget {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Target for AppTarget {
    fn name(&self) -> &str {
        "app"
    }

    fn description(&self) -> &str {
        "Packages the artifact produced by the compile target into an image \
         whose command is the start command printed by the buildpack's \
         command script."
    }

    fn depends_on(&self) -> Vec<String> {
        vec!["compile".to_string()]
    }

    fn run_after(&self) -> Vec<String> {
        vec!["compile".to_string()]
    }

    async fn check(&mut self, cx: &TargetContext<'_>) -> Result<(), EngineError> {
        let output = cx
            .scripts
            .run(
                ScriptKind::Command.file_name(),
                &cx.pack.pack.assemble(ScriptKind::Command),
                &cx.build.work_dir,
            )
            .await?;
        let argv: Vec<String> = output.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            return Err(EngineError::CheckFailed {
                target: self.name().to_string(),
                message: "buildpack command.sh printed no start command".to_string(),
            });
        }
        self.start_command = Some(argv);
        Ok(())
    }

    fn set_state(&mut self, from: &str, state: &TargetState) -> Result<(), EngineError> {
        if from != "compile" {
            return Ok(());
        }
        match state {
            TargetState::Artifact { path } => {
                self.artifact_path = Some(path.clone());
                Ok(())
            }
            other => Err(EngineError::StateShapeMismatch {
                target: self.name().to_string(),
                from: from.to_string(),
                got: other.kind(),
                expected: "artifact",
            }),
        }
    }

    async fn pre_build(&mut self, cx: &TargetContext<'_>) -> Result<(), EngineError> {
        let artifact = self
            .artifact_path
            .clone()
            .ok_or_else(|| EngineError::MissingState {
                target: self.name().to_string(),
                from: "compile".to_string(),
            })?;
        if !artifact.exists() {
            return Err(EngineError::MissingArtifact {
                target: self.name().to_string(),
                path: artifact,
            });
        }

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EngineError::MissingArtifact {
                target: self.name().to_string(),
                path: artifact.clone(),
            })?;
        let dest = cx.build.work_dir.join(&file_name);
        let guard = util::temporary_link(&artifact, &dest).map_err(|source| EngineError::Io {
            target: self.name().to_string(),
            message: format!("unable to link artifact into {}", dest.display()),
            source,
        })?;
        self.link_guard = Some(guard);
        self.local_artifact = Some(file_name);
        Ok(())
    }

    fn container_name(&self, cx: &TargetContext<'_>) -> String {
        cx.build.package_name().to_string()
    }

    fn staleness(&self, _cx: &TargetContext<'_>) -> Staleness {
        Staleness::NeverReuse {
            reason: "it is not reusable".to_string(),
        }
    }

    async fn build_spec(&self, cx: &TargetContext<'_>) -> Result<BuildSpec, EngineError> {
        let mut spec = BuildSpec::new(cx.pack.base_image("app")?);

        let artifact = self
            .local_artifact
            .clone()
            .ok_or_else(|| EngineError::MissingState {
                target: self.name().to_string(),
                from: "compile".to_string(),
            })?;
        // The artifact is a tarball; ADD unpacks it into the workdir.
        spec.add_copy(vec![artifact], format!("{}/", IMAGE_WORKDIR));
        spec.workdir = IMAGE_WORKDIR.to_string();
        cx.stack_labels(&mut spec);

        spec.command = self
            .start_command
            .clone()
            .ok_or_else(|| EngineError::CheckFailed {
                target: self.name().to_string(),
                message: "start command not resolved; check() did not run".to_string(),
            })?;
        Ok(spec)
    }

    fn run_spec(
        &self,
        _cx: &TargetContext<'_>,
        image_tag: &str,
    ) -> Result<Option<RunSpec>, EngineError> {
        let port = util::free_port().map_err(|source| EngineError::Io {
            target: self.name().to_string(),
            message: "unable to get a free port".to_string(),
            source,
        })?;
        let mut run = RunSpec::new(image_tag);
        run.host_port = port;
        run.add_env("PORT0", port.to_string());
        run.add_env("TASK_HOST", util::task_host());
        Ok(Some(run))
    }

    fn published_state(&self, cx: &TargetContext<'_>) -> Option<TargetState> {
        Some(TargetState::Image {
            tag: cx.build.image_tag(&self.container_name(cx)),
        })
    }
}
