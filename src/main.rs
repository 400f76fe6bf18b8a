use prepline::cli::commands::{CliArgs, Commands};
use prepline::cli::handlers::{handle_build, handle_buildspec, handle_detect, handle_image};
use prepline::util::logging::{init_logging, parse_level, LoggingConfig};
use prepline::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("prepline v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Detect(detect_args) => handle_detect(detect_args).await,
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Buildspec(build_args) => handle_buildspec(build_args).await,
        Commands::Image(image_args) => handle_image(image_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("PREPLINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig::with_level(level));
}
