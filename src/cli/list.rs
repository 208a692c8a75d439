//! `yakka list`: show the components a workspace knows.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use crate::project::Project;

#[derive(Args, Debug)]
pub struct ListCommand {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Also list registry entries that have not been fetched
    #[arg(long)]
    registry: bool,
}

impl ListCommand {
    pub async fn execute(self, workspace: &Path) -> Result<()> {
        let project = Project::open(workspace).await?;
        let components = project.components();
        let available: Vec<&str> = if self.registry {
            project
                .registry()
                .names()
                .filter(|name| !components.iter().any(|(id, _)| id == *name))
                .collect()
        } else {
            Vec::new()
        };

        if self.json {
            let local: serde_json::Map<String, serde_json::Value> = components
                .iter()
                .map(|(id, path)| (id.clone(), json!(path.display().to_string())))
                .collect();
            let output = json!({
                "components": local,
                "registry": available,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if components.is_empty() && available.is_empty() {
            println!("No components found in {}", workspace.display());
            return Ok(());
        }

        let width = components
            .iter()
            .map(|(id, _)| id.len())
            .chain(available.iter().map(|name| name.len()))
            .max()
            .unwrap_or(0);
        for (id, path) in &components {
            let path = path.strip_prefix(workspace).unwrap_or(path.as_path());
            println!("{:<width$}  {}", id.bold(), path.display().to_string().dimmed());
        }
        for name in available {
            println!("{:<width$}  {}", name, "(registry)".yellow());
        }
        Ok(())
    }
}
