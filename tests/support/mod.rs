//! Shared fixtures for integration tests
#![allow(dead_code)]

use prepline::context::{BuildContext, GitInfo};
use std::fs;
use std::path::{Path, PathBuf};

pub const REGISTRY: &str = "registry.example.com";

/// Writes the catalog-wide shared prelude.
pub fn write_common(catalog_root: &Path) {
    fs::create_dir_all(catalog_root).unwrap();
    fs::write(catalog_root.join("common.sh"), "#!/bin/sh\nset -e\n").unwrap();
}

/// Writes a complete nodejs-style buildpack whose detect script matches
/// directories containing a `package.json`.
pub fn write_nodejs_pack(catalog_root: &Path) {
    write_pack(
        catalog_root,
        "nodejs",
        "if [ -f package.json ]; then\n  echo \"nodejs default\"\nelse\n  exit 1\nfi\n",
        "echo \"node server.js\"\n",
    );
}

/// Writes a buildpack with the given detect and command script bodies and a
/// single-version catalog entry for `compile` and `app`.
pub fn write_pack(catalog_root: &Path, name: &str, detect: &str, command: &str) {
    let dir = catalog_root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("base.sh"), format!("PACK_NAME={}\n", name)).unwrap();
    fs::write(dir.join("detect.sh"), detect).unwrap();
    fs::write(dir.join("command.sh"), command).unwrap();
    fs::write(
        dir.join("compile.sh"),
        "echo \"compiling $PREPLINE_PACKAGE_NAME\"\n",
    )
    .unwrap();
    fs::write(dir.join("test.sh"), "echo \"testing\"\n").unwrap();
    fs::write(
        dir.join("versions.toml"),
        format!(
            "description = \"{name} projects\"\n\
             default-version = \"^6\"\n\n\
             [versions.\"6.9.1\"]\n\
             compile = \"{REGISTRY}/{name}-build:6.9.1\"\n\
             app = \"{REGISTRY}/{name}:6.9.1\"\n"
        ),
    )
    .unwrap();
}

/// A build context rooted at the given project and scratch directories.
pub fn build_context(work_dir: PathBuf, scratch_dir: PathBuf) -> BuildContext {
    BuildContext {
        git: GitInfo::new("0123456789abcdef0123", "github.com/acme/widgets"),
        build_number: 1,
        docker_registry: REGISTRY.to_string(),
        work_dir,
        scratch_dir,
    }
}

/// Marks a directory as a nodejs project for the fixture pack's detect
/// script.
pub fn write_node_project(work_dir: &Path) {
    fs::write(
        work_dir.join("package.json"),
        "{\"name\": \"widgets\", \"version\": \"1.0.0\"}\n",
    )
    .unwrap();
    fs::write(work_dir.join("server.js"), "console.log('hi');\n").unwrap();
}
