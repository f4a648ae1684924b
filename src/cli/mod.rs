//! CLI command implementations

pub mod backup;
pub mod error;
pub mod folders;
pub mod status;

pub use backup::{BackupArgs, Cli, Commands, OutputFormat};
pub use error::CliError;
pub use folders::FoldersArgs;
pub use status::StatusArgs;
