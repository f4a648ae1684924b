//! Local database status command

use clap::Parser;

use crate::storage::SqliteStore;

use super::backup::{Cli, OutputFormat};
use super::CliError;

/// Arguments for inspecting the local database
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Also list the most recently saved items of this content type
    #[arg(long)]
    pub list: Option<String>,

    /// Maximum number of items to list
    #[arg(long, default_value = "20")]
    pub limit: u64,
}

impl StatusArgs {
    /// Execute the status command.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = SqliteStore::open(&cli.db)?;
        let counts = store.count_by_type()?;

        match cli.output_format {
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string_pretty(&counts) {
                    println!("{json}");
                }
            }
            OutputFormat::Human => {
                if counts.is_empty() {
                    println!("Database is empty: {}", cli.db.display());
                } else {
                    println!("Content in {}:", cli.db.display());
                    for (content_type, count) in &counts {
                        println!("  {content_type}: {count}");
                    }
                }
            }
        }

        if let Some(content_type) = &self.list {
            let items = store.list_content(content_type, self.limit)?;
            for (id, name) in &items {
                println!("  {id}  {name}");
            }
        }
        Ok(())
    }
}
