//! `yakka fetch`: fetch components from the registries without building.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

use super::CliConfig;
use crate::project::Project;

#[derive(Args, Debug)]
pub struct FetchCommand {
    /// Registry names of the components to fetch
    #[arg(required = true, value_name = "NAME")]
    names: Vec<String>,
}

impl FetchCommand {
    pub async fn execute(self, workspace: &Path, config: &CliConfig) -> Result<()> {
        let mut project = Project::open(workspace).await?;
        let fetched = project.fetch_components(&self.names, config.show_progress()).await?;
        if config.log_level.is_some() {
            for path in fetched {
                println!("{} {}", "✓".green(), path.display());
            }
        }
        Ok(())
    }
}
