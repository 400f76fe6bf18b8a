//! Build and run specifications
//!
//! This module defines the declarative output of the pipeline: a
//! [`BuildSpec`] describing the image to construct (the equivalent of a
//! Dockerfile) and a [`RunSpec`] describing how to start a container from
//! it. Both serialize to JSON for machine-readable CLI output; the build
//! spec also renders to Dockerfile text for the external image builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One file-copy instruction: host sources into an image destination.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CopySpec {
    pub sources: Vec<String>,
    pub dest: String,
}

/// Declarative description of an image to construct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSpec {
    /// Base image reference resolved from the buildpack's version catalog
    pub base: String,
    /// Copy instructions applied in order. Rendered as `ADD`, so tar
    /// archives unpack into place.
    pub copy: Vec<CopySpec>,
    /// Working directory inside the image
    pub workdir: String,
    /// Image labels, including the stack-identifying pair
    pub labels: BTreeMap<String, String>,
    /// Shell commands baked into the image ahead of the final command
    pub run: Vec<String>,
    /// Container startup command
    pub command: Vec<String>,
    /// Host paths the build produces under the scratch directory, consumed
    /// by dependent targets
    pub artifacts: Vec<PathBuf>,
}

impl BuildSpec {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn add_copy(&mut self, sources: Vec<String>, dest: impl Into<String>) {
        self.copy.push(CopySpec {
            sources,
            dest: dest.into(),
        });
    }

    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn add_run(&mut self, command: impl Into<String>) {
        self.run.push(command.into());
    }

    /// Renders the spec as Dockerfile text.
    pub fn to_dockerfile(&self) -> String {
        let mut out = format!("FROM {}\n", self.base);
        for copy in &self.copy {
            out.push_str(&format!("ADD {} {}\n", copy.sources.join(" "), copy.dest));
        }
        if !self.workdir.is_empty() {
            out.push_str(&format!("WORKDIR {}\n", self.workdir));
        }
        for (key, value) in &self.labels {
            out.push_str(&format!("LABEL {}={:?}\n", key, value));
        }
        for run in &self.run {
            out.push_str(&format!("RUN {}\n", run));
        }
        if !self.command.is_empty() {
            let argv = serde_json::to_string(&self.command).unwrap_or_default();
            out.push_str(&format!("CMD {}\n", argv));
        }
        out
    }
}

impl fmt::Display for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dockerfile())
    }
}

/// Declarative description of how to start a container from a built image.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSpec {
    /// The image tag to run
    pub image: String,
    /// Environment injected into the container, including the allocated
    /// `PORT0` and a resolvable `TASK_HOST`
    pub env: BTreeMap<String, String>,
    /// The dynamically allocated free host port backing `PORT0`
    pub host_port: u16,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn add_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dockerfile_rendering() {
        let mut spec = BuildSpec::new("registry.example.com/node:6.9.1");
        spec.add_copy(vec!["widgets.tar.gz".to_string()], "/srv/app/");
        spec.workdir = "/srv/app".to_string();
        spec.add_label("dev.prepline.stack.id", "nodejs");
        spec.add_label("dev.prepline.stack.version", "6.9.1");
        spec.add_run("npm install -g npm@3");
        spec.command = vec!["node".to_string(), "server.js".to_string()];

        let rendered = spec.to_dockerfile();
        assert_eq!(
            rendered,
            "FROM registry.example.com/node:6.9.1\n\
             ADD widgets.tar.gz /srv/app/\n\
             WORKDIR /srv/app\n\
             LABEL dev.prepline.stack.id=\"nodejs\"\n\
             LABEL dev.prepline.stack.version=\"6.9.1\"\n\
             RUN npm install -g npm@3\n\
             CMD [\"node\",\"server.js\"]\n"
        );
    }

    #[test]
    fn test_dockerfile_omits_empty_sections() {
        let spec = BuildSpec::new("alpine:3.19");
        assert_eq!(spec.to_dockerfile(), "FROM alpine:3.19\n");
    }

    #[test]
    fn test_labels_render_sorted() {
        let mut spec = BuildSpec::new("alpine:3.19");
        spec.add_label("b.key", "2");
        spec.add_label("a.key", "1");
        let rendered = spec.to_dockerfile();
        let a = rendered.find("a.key").unwrap();
        let b = rendered.find("b.key").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_run_spec_env() {
        let mut run = RunSpec::new("registry.example.com/widgets:01234567-1");
        run.host_port = 31337;
        run.add_env("PORT0", "31337");
        run.add_env("TASK_HOST", "127.0.0.1");
        assert_eq!(run.env.get("PORT0").map(String::as_str), Some("31337"));
    }
}
