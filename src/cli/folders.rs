//! Folder listing command

use clap::Parser;

use crate::client::ContentExtractor;

use super::backup::{Cli, OutputFormat};
use super::CliError;

/// Arguments for listing remote folders
#[derive(Parser, Debug)]
pub struct FoldersArgs {}

impl FoldersArgs {
    /// Execute the folders command.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let client = cli.client()?;
        let folders = client.list_folders()?;

        match cli.output_format {
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string_pretty(&folders) {
                    println!("{json}");
                }
            }
            OutputFormat::Human => {
                println!("{} folders:", folders.len());
                for folder in &folders {
                    println!("  {folder}");
                }
            }
        }
        Ok(())
    }
}
