use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Buildpack-driven project detection and container build pipeline
#[derive(Parser, Debug)]
#[command(
    name = "prepline",
    about = "Buildpack-driven project detection and container build pipeline",
    version,
    author,
    long_about = "prepline probes a project with the detect scripts of every buildpack in \
                  its catalog, binds the matching pack to a supported stack version, and \
                  drives the pack's build targets in dependency order, producing container \
                  build and run specifications."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Detect which buildpack matches a project",
        long_about = "Runs every catalog buildpack's detect script against the project \
                      directory and reports the single matching pack and its resolved \
                      stack version.\n\n\
                      Examples:\n  \
                      prepline detect\n  \
                      prepline detect /path/to/project --format json"
    )]
    Detect(DetectArgs),

    #[command(
        about = "Build a target and its dependencies",
        long_about = "Resolves the requested target's dependency chain and executes it in \
                      order, producing an image build specification per target.\n\n\
                      Examples:\n  \
                      prepline build\n  \
                      prepline build --target compile\n  \
                      prepline build /path/to/project --format json"
    )]
    Build(BuildArgs),

    #[command(
        about = "Print the build specification for a target",
        long_about = "Runs the pipeline up to the requested target and prints the \
                      Dockerfile it would build from.\n\n\
                      Examples:\n  \
                      prepline buildspec\n  \
                      prepline buildspec --target compile"
    )]
    Buildspec(BuildArgs),

    #[command(about = "Print the last built image tag for this project")]
    Image(ImageArgs),
}

/// Arguments shared by every command that operates on a project directory.
#[derive(Parser, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(
        value_name = "PATH",
        help = "Path to project (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SHA",
        help = "Commit SHA of the working tree (defaults to $GIT_COMMIT)"
    )]
    pub commit_sha: Option<String>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Canonical package name, e.g. github.com/acme/widgets (defaults to the project directory name)"
    )]
    pub canonical_name: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[arg(
        short = 't',
        long,
        default_value = "app",
        help = "Target to build (its dependencies build first)"
    )]
    pub target: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ImageArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Human,
    Json,
}
