//! Target graph resolution and execution
//!
//! One invocation moves through `Requested -> Resolving -> Executing ->
//! Done | Failed`: the requested target's transitive `depends_on` closure
//! is topologically ordered (dependencies strictly before dependents, with
//! `run_after` as a tie-break hint), then each target runs its lifecycle in
//! sequence. Execution is deliberately sequential; the graph would permit
//! parallelism, simplicity wins.

use super::{EngineError, Staleness, Target, TargetContext};
use crate::image::ImageBuilder;
use crate::spec::RunSpec;
use serde::Serialize;
use tracing::{debug, info};

/// One executed pipeline step.
#[derive(Debug, Clone, Serialize)]
pub struct TargetRun {
    pub target: String,
    pub image_tag: String,
    /// True when a previous image for the same content fingerprint was
    /// reused instead of rebuilding
    pub reused: bool,
}

/// The outcome of a pipeline invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub runs: Vec<TargetRun>,
    /// Run specification of the last runnable target in the chain
    pub run_spec: Option<RunSpec>,
}

/// Computes the execution order for `requested` over `targets`.
///
/// Returns indices into `targets`, dependencies first. A `depends_on`
/// cycle is a fatal configuration error naming the cycle path.
pub fn resolve(
    requested: &str,
    targets: &[Box<dyn Target>],
) -> Result<Vec<usize>, EngineError> {
    let root = targets
        .iter()
        .position(|t| t.name() == requested)
        .ok_or_else(|| EngineError::UnknownTarget(requested.to_string()))?;

    let mut marks = vec![Mark::Unvisited; targets.len()];
    let mut path = Vec::new();
    let mut order = Vec::new();
    visit(root, targets, &mut marks, &mut path, &mut order)?;
    Ok(order)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InStack,
    Done,
}

fn visit(
    idx: usize,
    targets: &[Box<dyn Target>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), EngineError> {
    match marks[idx] {
        Mark::Done => return Ok(()),
        Mark::InStack => {
            let start = path.iter().position(|&p| p == idx).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&p| targets[p].name().to_string())
                .collect();
            cycle.push(targets[idx].name().to_string());
            return Err(EngineError::DependencyCycle { cycle });
        }
        Mark::Unvisited => {}
    }

    marks[idx] = Mark::InStack;
    path.push(idx);
    for dep in ordered_deps(idx, targets)? {
        visit(dep, targets, marks, path, order)?;
    }
    path.pop();
    marks[idx] = Mark::Done;
    order.push(idx);
    Ok(())
}

/// A target's dependencies, ordered by its `run_after` hints first and
/// declaration order second.
fn ordered_deps(
    idx: usize,
    targets: &[Box<dyn Target>],
) -> Result<Vec<usize>, EngineError> {
    let hints = targets[idx].run_after();
    let mut deps: Vec<(usize, usize, usize)> = Vec::new();
    for (declared, name) in targets[idx].depends_on().iter().enumerate() {
        let dep = targets
            .iter()
            .position(|t| t.name() == name.as_str())
            .ok_or_else(|| EngineError::UnknownTarget(name.clone()))?;
        let rank = hints
            .iter()
            .position(|h| h == name)
            .unwrap_or(usize::MAX);
        deps.push((rank, declared, dep));
    }
    deps.sort_unstable();
    Ok(deps.into_iter().map(|(_, _, dep)| dep).collect())
}

/// Drives an ordered target chain to completion against one bound
/// buildpack and an external image builder.
pub struct Engine<'a> {
    cx: TargetContext<'a>,
    builder: &'a mut dyn ImageBuilder,
}

impl<'a> Engine<'a> {
    pub fn new(cx: TargetContext<'a>, builder: &'a mut dyn ImageBuilder) -> Self {
        Self { cx, builder }
    }

    pub async fn execute(
        &mut self,
        requested: &str,
        mut targets: Vec<Box<dyn Target>>,
    ) -> Result<PipelineReport, EngineError> {
        let order = resolve(requested, &targets)?;
        info!(target = requested, steps = order.len(), "executing target pipeline");

        let mut report = PipelineReport::default();
        for &i in &order {
            let name = targets[i].name().to_string();
            targets[i].check(&self.cx).await?;

            let container = targets[i].container_name(&self.cx);
            let (tag, reused) = match targets[i].staleness(&self.cx) {
                Staleness::Fingerprint(fingerprint) => {
                    let tag = self.cx.build.fingerprint_tag(&container, &fingerprint);
                    let exists = self.builder.has_image(&tag);
                    (tag, exists)
                }
                Staleness::NeverReuse { reason } => {
                    debug!(target = %name, reason = %reason, "container is stale");
                    (self.cx.build.image_tag(&container), false)
                }
            };

            if reused {
                info!(target = %name, tag = %tag, "image is up to date; skipping rebuild");
            } else {
                targets[i].pre_build(&self.cx).await?;
                let spec = targets[i].build_spec(&self.cx).await?;
                info!(target = %name, tag = %tag, base = %spec.base, "building image");
                self.builder.build(&spec, &tag).await?;
            }

            if let Some(run) = targets[i].run_spec(&self.cx, &tag)? {
                report.run_spec = Some(run);
            }
            report.runs.push(TargetRun {
                target: name.clone(),
                image_tag: tag,
                reused,
            });

            // Hand the just-produced state to every dependent of this
            // target, whether or not it is part of this invocation's chain.
            if let Some(state) = targets[i].published_state(&self.cx) {
                for j in 0..targets.len() {
                    if j == i {
                        continue;
                    }
                    if targets[j].depends_on().iter().any(|d| d == &name) {
                        debug!(
                            from = %name,
                            to = %targets[j].name(),
                            kind = state.kind(),
                            "propagating target state"
                        );
                        targets[j].set_state(&name, &state)?;
                    }
                }
            }
        }

        Ok(report)
    }
}
