//! Pipeline integration tests
//!
//! Runs the full target chain against real catalog fixtures and a dry-run
//! image builder: dependency ordering, state propagation from compile to
//! app, per-target staleness policies, and check-failure aborts.

mod support;

use prepline::buildpack::{Catalog, RunnableBuildpack};
use prepline::context::BuildContext;
use prepline::detect::Detector;
use prepline::image::DryRunBuilder;
use prepline::script::ScriptRunner;
use prepline::target::{standard_targets, Engine, EngineError, TargetContext};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _catalog_dir: TempDir,
    _project_dir: TempDir,
    _scratch_dir: TempDir,
    context: BuildContext,
    runner: ScriptRunner,
    pack: RunnableBuildpack,
}

impl Harness {
    /// Loads the fixture catalog, detects the project, and binds the pack.
    async fn new() -> Self {
        let catalog_dir = TempDir::new().unwrap();
        support::write_common(catalog_dir.path());
        support::write_nodejs_pack(catalog_dir.path());

        let project_dir = TempDir::new().unwrap();
        support::write_node_project(project_dir.path());

        let scratch_dir = TempDir::new().unwrap();
        let context = support::build_context(
            project_dir.path().to_path_buf(),
            scratch_dir.path().to_path_buf(),
        );

        let catalog = Catalog::load(catalog_dir.path()).unwrap();
        let runner = ScriptRunner::for_context(&context, Duration::from_secs(10));
        let pack = Detector::new(runner.clone())
            .detect_any(&catalog, &context.work_dir)
            .await
            .unwrap()
            .expect("nodejs pack should match");

        Self {
            _catalog_dir: catalog_dir,
            _project_dir: project_dir,
            _scratch_dir: scratch_dir,
            context,
            runner,
            pack,
        }
    }

    fn target_context(&self) -> TargetContext<'_> {
        TargetContext {
            build: &self.context,
            pack: &self.pack,
            scripts: &self.runner,
            label_prefix: "dev.prepline",
        }
    }

    async fn execute(
        &self,
        builder: &mut DryRunBuilder,
        target: &str,
    ) -> Result<prepline::target::PipelineReport, EngineError> {
        Engine::new(self.target_context(), builder)
            .execute(target, standard_targets())
            .await
    }
}

#[tokio::test]
async fn test_pipeline_builds_compile_then_app() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    let report = harness.execute(&mut builder, "app").await.unwrap();

    let order: Vec<&str> = report.runs.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(order, vec!["compile", "app"]);
    assert!(report.runs.iter().all(|r| !r.reused));

    let (compile_tag, compile_spec) = &builder.built()[0];
    assert!(compile_tag.starts_with("registry.example.com/widgets-compile:"));
    assert_eq!(compile_spec.base, "registry.example.com/nodejs-build:6.9.1");
    assert_eq!(
        compile_spec.command,
        vec!["/bin/sh", "prepline-compile.sh"]
    );

    let (app_tag, app_spec) = &builder.built()[1];
    assert_eq!(app_tag, "registry.example.com/widgets:01234567-1");
    assert_eq!(app_spec.base, "registry.example.com/nodejs:6.9.1");
    assert_eq!(app_spec.command, vec!["node", "server.js"]);
    assert_eq!(
        app_spec.labels.get("dev.prepline.stack.id").map(String::as_str),
        Some("nodejs")
    );
    assert_eq!(
        app_spec
            .labels
            .get("dev.prepline.stack.version")
            .map(String::as_str),
        Some("6.9.1")
    );
}

#[tokio::test]
async fn test_compile_state_reaches_app_target() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    harness.execute(&mut builder, "app").await.unwrap();

    // The app image copies exactly the artifact the compile target
    // published, linked under its local file name.
    let (_, app_spec) = &builder.built()[1];
    assert_eq!(app_spec.copy.len(), 1);
    assert_eq!(app_spec.copy[0].sources, vec!["widgets-6.9.1.tar.gz"]);
    assert_eq!(app_spec.copy[0].dest, "/srv/app/");
}

#[tokio::test]
async fn test_run_spec_allocates_port_and_task_host() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    let report = harness.execute(&mut builder, "app").await.unwrap();
    let run = report.run_spec.expect("app target is runnable");

    assert_eq!(run.image, "registry.example.com/widgets:01234567-1");
    let port: u16 = run.env.get("PORT0").unwrap().parse().unwrap();
    assert_eq!(port, run.host_port);
    assert!(run.env.contains_key("TASK_HOST"));
}

#[tokio::test]
async fn test_compile_only_pipeline_skips_app() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    let report = harness.execute(&mut builder, "compile").await.unwrap();
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].target, "compile");
    assert!(report.run_spec.is_none());
}

#[tokio::test]
async fn test_unchanged_tree_reuses_compile_but_not_app() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    let first = harness.execute(&mut builder, "app").await.unwrap();
    assert!(!first.runs[0].reused);
    assert_eq!(builder.build_count(), 2);

    let second = harness.execute(&mut builder, "app").await.unwrap();
    assert!(second.runs[0].reused, "compile image should be reused");
    assert!(!second.runs[1].reused, "app declares itself never reusable");
    // Only the app image was rebuilt on the second invocation.
    assert_eq!(builder.build_count(), 3);
}

#[tokio::test]
async fn test_source_change_invalidates_compile_image() {
    let harness = Harness::new().await;
    let mut builder = DryRunBuilder::new();

    harness.execute(&mut builder, "app").await.unwrap();
    fs::write(harness.context.work_dir.join("server.js"), "changed").unwrap();

    let second = harness.execute(&mut builder, "app").await.unwrap();
    assert!(!second.runs[0].reused);
    assert_eq!(builder.build_count(), 4);
}

#[tokio::test]
async fn test_missing_start_command_aborts_run() {
    let catalog_dir = TempDir::new().unwrap();
    support::write_common(catalog_dir.path());
    // command.sh prints nothing, so the app target's precondition fails.
    support::write_pack(
        catalog_dir.path(),
        "nodejs",
        "echo \"nodejs default\"\n",
        "true\n",
    );

    let project_dir = TempDir::new().unwrap();
    let scratch_dir = TempDir::new().unwrap();
    let context = support::build_context(
        project_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    );

    let catalog = Catalog::load(catalog_dir.path()).unwrap();
    let runner = ScriptRunner::for_context(&context, Duration::from_secs(10));
    let pack = Detector::new(runner.clone())
        .detect_any(&catalog, &context.work_dir)
        .await
        .unwrap()
        .unwrap();

    let cx = TargetContext {
        build: &context,
        pack: &pack,
        scripts: &runner,
        label_prefix: "dev.prepline",
    };
    let mut builder = DryRunBuilder::new();
    let err = Engine::new(cx, &mut builder)
        .execute("app", standard_targets())
        .await
        .unwrap_err();

    match err {
        EngineError::CheckFailed { target, message } => {
            assert_eq!(target, "app");
            assert!(message.contains("start command"));
        }
        other => panic!("expected CheckFailed, got {:?}", other),
    }
}
