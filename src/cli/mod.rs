pub mod commands;
pub mod handlers;

pub use commands::{BuildArgs, CliArgs, Commands, DetectArgs, ImageArgs, OutputFormatArg};
pub use handlers::{handle_build, handle_buildspec, handle_detect, handle_image, EXIT_FAILURE};
