//! CLI command handlers
//!
//! Thin wiring only: each handler assembles the library components, runs
//! them, and renders the result. Every fatal error exits with the single
//! fixed status [`EXIT_FAILURE`].

use super::commands::{BuildArgs, DetectArgs, ImageArgs, OutputFormatArg, ProjectArgs};
use crate::buildpack::Catalog;
use crate::config::Config;
use crate::context::{BuildContext, BuildNumbers, GitInfo};
use crate::detect::Detector;
use crate::image::DryRunBuilder;
use crate::script::ScriptRunner;
use crate::target::{standard_targets, Engine, PipelineReport, TargetContext};
use anyhow::{anyhow, bail, Context as _, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;
use uuid::Uuid;

/// Exit status for every fatal error in the pipeline.
pub const EXIT_FAILURE: i32 = 70;

pub async fn handle_detect(args: &DetectArgs) -> i32 {
    finish(detect_inner(args).await)
}

pub async fn handle_build(args: &BuildArgs) -> i32 {
    finish(build_inner(args).await)
}

pub async fn handle_buildspec(args: &BuildArgs) -> i32 {
    finish(buildspec_inner(args).await)
}

pub async fn handle_image(args: &ImageArgs) -> i32 {
    finish(image_inner(args).await)
}

fn finish(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

async fn detect_inner(args: &DetectArgs) -> Result<i32> {
    let config = load_config()?;
    let context = build_context(&config, &args.project, false)?;
    let catalog = Catalog::load(&config.pack_dir)?;
    let runner = ScriptRunner::for_context(&context, config.script_timeout());
    let detector = Detector::new(runner);

    match detector.detect_any(&catalog, &context.work_dir).await? {
        Some(pack) => {
            match args.format {
                OutputFormatArg::Human => {
                    println!("{} {}", pack.name(), pack.resolved_version);
                }
                OutputFormatArg::Json => {
                    let value = serde_json::json!({
                        "buildpack": pack.name(),
                        "detected_range": pack.detected_range,
                        "resolved_version": pack.resolved_version.to_string(),
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
            Ok(0)
        }
        None => {
            println!("no buildpack matched {}", context.work_dir.display());
            Ok(EXIT_FAILURE)
        }
    }
}

async fn build_inner(args: &BuildArgs) -> Result<i32> {
    let config = load_config()?;
    let context = build_context(&config, &args.project, true)?;
    let (report, _) = run_pipeline(&config, &context, &args.target).await?;

    match args.format {
        OutputFormatArg::Human => {
            for run in &report.runs {
                let note = if run.reused { " (reused)" } else { "" };
                println!("{:<10} {}{}", run.target, run.image_tag, note);
            }
            if let Some(last) = report.runs.last() {
                println!(
                    "Successfully built {} as {}",
                    context.package_name(),
                    last.image_tag
                );
            }
        }
        OutputFormatArg::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    let _ = fs::remove_dir_all(&context.scratch_dir);
    Ok(0)
}

async fn buildspec_inner(args: &BuildArgs) -> Result<i32> {
    let config = load_config()?;
    let context = build_context(&config, &args.project, false)?;
    let (_report, builder) = run_pipeline(&config, &context, &args.target).await?;

    let spec = builder
        .built()
        .last()
        .map(|(_, spec)| spec)
        .ok_or_else(|| anyhow!("target {} produced no build specification", args.target))?;

    match args.format {
        OutputFormatArg::Human => print!("{}", spec.to_dockerfile()),
        OutputFormatArg::Json => println!("{}", serde_json::to_string_pretty(spec)?),
    }

    let _ = fs::remove_dir_all(&context.scratch_dir);
    Ok(0)
}

async fn image_inner(args: &ImageArgs) -> Result<i32> {
    let config = load_config()?;
    let work_dir = resolve_work_dir(&args.project)?;
    let git = git_info(&args.project, &work_dir)?;

    let numbers = BuildNumbers::new(&config.build_numbers_dir);
    let Some(build_number) = numbers.peek(&git)? else {
        bail!("no builds yet");
    };

    let context = BuildContext {
        git,
        build_number,
        docker_registry: config.docker_registry.clone(),
        work_dir,
        scratch_dir: env::temp_dir(),
    };
    println!("{}", context.image_tag(context.package_name()));
    Ok(0)
}

/// Detects the project and executes the requested target chain against a
/// dry-run builder.
async fn run_pipeline(
    config: &Config,
    context: &BuildContext,
    target: &str,
) -> Result<(PipelineReport, DryRunBuilder)> {
    let catalog = Catalog::load(&config.pack_dir)?;
    let runner = ScriptRunner::for_context(context, config.script_timeout());
    let detector = Detector::new(runner.clone());

    let pack = detector
        .detect_any(&catalog, &context.work_dir)
        .await?
        .ok_or_else(|| anyhow!("no buildpack matched {}", context.work_dir.display()))?;

    let cx = TargetContext {
        build: context,
        pack: &pack,
        scripts: &runner,
        label_prefix: &config.label_prefix,
    };
    let mut builder = DryRunBuilder::new();
    let report = Engine::new(cx, &mut builder)
        .execute(target, standard_targets())
        .await?;
    Ok((report, builder))
}

fn load_config() -> Result<Config> {
    let config = Config::default();
    config.validate()?;
    Ok(config)
}

fn resolve_work_dir(project: &ProjectArgs) -> Result<PathBuf> {
    let path = match &project.path {
        Some(path) => path.clone(),
        None => env::current_dir().context("unable to determine working directory")?,
    };
    let path = path
        .canonicalize()
        .with_context(|| format!("unable to resolve project path {}", path.display()))?;
    if !path.is_dir() {
        bail!("project path {} is not a directory", path.display());
    }
    Ok(path)
}

fn git_info(project: &ProjectArgs, work_dir: &Path) -> Result<GitInfo> {
    let commit_sha = project
        .commit_sha
        .clone()
        .or_else(|| env::var("GIT_COMMIT").ok())
        .ok_or_else(|| anyhow!("commit SHA required: pass --commit-sha or set $GIT_COMMIT"))?;

    let canonical_name = match &project.canonical_name {
        Some(name) => name.clone(),
        None => work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("unable to derive a package name from {}", work_dir.display()))?,
    };

    Ok(GitInfo::new(commit_sha, canonical_name))
}

fn build_context(
    config: &Config,
    project: &ProjectArgs,
    allocate_build_number: bool,
) -> Result<BuildContext> {
    let work_dir = resolve_work_dir(project)?;
    let git = git_info(project, &work_dir)?;

    let numbers = BuildNumbers::new(&config.build_numbers_dir);
    let build_number = if allocate_build_number {
        numbers.next(&git)?
    } else {
        numbers.peek(&git)?.unwrap_or(0)
    };

    let scratch_dir = env::temp_dir().join(format!("prepline-{}", Uuid::new_v4().simple()));
    fs::create_dir_all(&scratch_dir)
        .with_context(|| format!("unable to create scratch dir {}", scratch_dir.display()))?;

    Ok(BuildContext {
        git,
        build_number,
        docker_registry: config.docker_registry.clone(),
        work_dir,
        scratch_dir,
    })
}
